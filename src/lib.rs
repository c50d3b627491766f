pub mod engine;
pub mod games;
pub mod relay;
pub mod server;

pub mod config;
pub mod processed;
pub mod registry;

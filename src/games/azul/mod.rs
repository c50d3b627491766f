pub mod evaluator;
pub mod plugin;
pub mod scoring;
pub mod supply;
pub mod turn;
pub mod types;

pub mod arena;
pub mod bot_strategy;
pub mod clock;
pub mod evaluator;
pub mod models;
pub mod plugin;
pub mod replica;

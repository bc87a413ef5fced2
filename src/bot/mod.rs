//! Trading bot orchestration

pub mod config;
pub mod trader;

pub use config::BotConfig;
pub use trader::TradingBot;

// Library crate - order flow analysis, regime detection and decision fusion

pub mod types;
pub mod analysis;
pub mod decision;
pub mod llm;
pub mod market_data;
pub mod bot;

// Re-export commonly used types
pub use types::*;
pub use bot::{BotConfig, TradingBot};
pub use decision::{PositionSizer, TradingDecision};

//! LLM decision providers
//!
//! # Components
//!
//! - [`client`] - DeepSeek chat-completions client
//! - [`prompt`] - Multi-timeframe prompt generation
//! - [`parse`] - Response cleanup and decision validation
//! - [`models`] - Request/response data types
//! - [`error`] - Classified provider failures

pub mod client;
pub mod error;
pub mod models;
pub mod parse;
pub mod prompt;

use async_trait::async_trait;

use crate::decision::TradingDecision;
use crate::types::MultiTimeframe;

pub use client::{DeepSeekConfig, DeepSeekProvider};
pub use error::DecisionError;
pub use prompt::{AdditionalContext, PromptBuilder};

/// Source of directional trade recommendations
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn get_trading_decision(
        &self,
        frames: &MultiTimeframe,
        context: &AdditionalContext,
    ) -> Result<TradingDecision, DecisionError>;
}

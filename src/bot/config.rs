use std::time::Duration;

use crate::analysis::AnalysisConfig;
use crate::decision::PositionSizer;

/// Configuration for one symbol's trading bot
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Symbol to trade (e.g., "SPY")
    pub symbol: String,
    /// Wait between decision cycles in live mode
    pub update_interval: Duration,
    /// Maximum position size (1.0 = 100%)
    pub max_position_size: f64,
    /// Minimum confidence required to take a trade
    pub min_confidence: f64,
    /// Minimum risk/reward ratio required
    pub min_risk_reward: f64,
    /// Order flow analysis settings
    pub analysis: AnalysisConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "SPY".to_string(),
            update_interval: Duration::from_secs(60),
            max_position_size: 1.0,
            min_confidence: 0.6,
            min_risk_reward: 1.5,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl BotConfig {
    /// Build the position sizer from the flat config
    pub fn to_sizer(&self) -> PositionSizer {
        PositionSizer {
            max_position_size: self.max_position_size,
            min_confidence: self.min_confidence,
            min_risk_reward: self.min_risk_reward,
        }
    }
}

use serde::{Deserialize, Serialize};

/// One cycle's trade recommendation, from the provider through sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingDecision {
    /// -1.0 (full short) to 1.0 (full long)
    pub position: f64,
    /// 0.0 to 1.0
    pub confidence: f64,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    pub reasoning: String,
    /// Set by the position sizer
    #[serde(default)]
    pub size: f64,
}

impl TradingDecision {
    /// Flat, zero-confidence decision carrying `reason`
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            position: 0.0,
            confidence: 0.0,
            current_price: None,
            take_profit: None,
            stop_loss: None,
            reasoning: reason.into(),
            size: 0.0,
        }
    }

    pub fn is_long(&self) -> bool {
        self.position > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.position < 0.0
    }

    pub fn side_label(&self) -> &'static str {
        if self.is_long() {
            "LONG"
        } else if self.is_short() {
            "SHORT"
        } else {
            "FLAT"
        }
    }
}

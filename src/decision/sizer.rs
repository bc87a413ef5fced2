//! Position Sizer
//!
//! Turns an adjusted decision into a position size in `[0, max_position_size]`
//! from its confidence and risk/reward.

use tracing::info;

use super::model::TradingDecision;

/// Positions smaller than this are treated as no trade
const MIN_POSITION: f64 = 0.1;

/// Sizing limits
#[derive(Debug, Clone, Copy)]
pub struct PositionSizer {
    /// Largest size returned (default: 1.0 = 100%)
    pub max_position_size: f64,
    /// Confidence below this never trades (default: 0.6)
    pub min_confidence: f64,
    /// Risk/reward at or below this never trades (default: 1.5)
    pub min_risk_reward: f64,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self {
            max_position_size: 1.0,
            min_confidence: 0.6,
            min_risk_reward: 1.5,
        }
    }
}

impl PositionSizer {
    /// Reward over risk for the decision's side; None without usable levels
    pub fn risk_reward(decision: &TradingDecision) -> Option<f64> {
        let cp = decision.current_price.filter(|v| *v != 0.0)?;
        let tp = decision.take_profit.filter(|v| *v != 0.0)?;
        let sl = decision.stop_loss.filter(|v| *v != 0.0)?;

        let (reward, risk) = if decision.position > 0.0 {
            (tp - cp, cp - sl)
        } else {
            (cp - tp, sl - cp)
        };

        if risk.is_nan() || risk <= 0.0 {
            return None;
        }
        let rr = reward / risk;
        rr.is_finite().then_some(rr)
    }

    /// Position size for `decision`, rounded to 2 decimals
    pub fn size(&self, decision: &TradingDecision) -> f64 {
        if decision.position.is_nan()
            || decision.confidence.is_nan()
            || decision.position.abs() < MIN_POSITION
            || decision.confidence < self.min_confidence
        {
            return 0.0;
        }

        let Some(rr) = Self::risk_reward(decision) else {
            return 0.0;
        };

        if rr <= self.min_risk_reward {
            info!(
                "Risk/reward {:.2} not above minimum {}",
                rr, self.min_risk_reward
            );
            return 0.0;
        }

        let confidence_factor = decision.confidence.min(1.0);
        let risk_reward_factor = (rr / (2.0 * self.min_risk_reward)).min(1.0);

        let size = self.max_position_size * confidence_factor * risk_reward_factor;
        (size * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(position: f64, confidence: f64, tp: f64, sl: f64) -> TradingDecision {
        TradingDecision {
            position,
            confidence,
            current_price: Some(100.0),
            take_profit: Some(tp),
            stop_loss: Some(sl),
            reasoning: String::new(),
            size: 0.0,
        }
    }

    #[test]
    fn test_dead_zone_and_low_confidence() {
        let sizer = PositionSizer::default();
        assert_eq!(sizer.size(&decision(0.05, 0.9, 105.0, 99.0)), 0.0);
        assert_eq!(sizer.size(&decision(-0.09, 0.9, 95.0, 101.0)), 0.0);
        assert_eq!(sizer.size(&decision(0.5, 0.59, 105.0, 99.0)), 0.0);
        assert_eq!(sizer.size(&TradingDecision::neutral("no data")), 0.0);
    }

    #[test]
    fn test_risk_reward_gate() {
        let sizer = PositionSizer::default();
        // rr exactly 1.5
        assert_eq!(sizer.size(&decision(0.5, 0.9, 103.0, 98.0)), 0.0);
        // rr 1.0
        assert_eq!(sizer.size(&decision(0.5, 0.9, 102.0, 98.0)), 0.0);
        // Stop on the wrong side
        assert_eq!(sizer.size(&decision(0.5, 0.9, 105.0, 101.0)), 0.0);
    }

    #[test]
    fn test_full_risk_reward_factor() {
        let sizer = PositionSizer::default();
        let d = decision(0.5, 0.8, 105.0, 99.0);
        assert_eq!(PositionSizer::risk_reward(&d), Some(5.0));
        assert_eq!(sizer.size(&d), 0.8);

        // Short: reward 6, risk 2, rr 3 -> factor 1.0
        let d = decision(-0.5, 0.7, 94.0, 102.0);
        assert_eq!(PositionSizer::risk_reward(&d), Some(3.0));
        assert_eq!(sizer.size(&d), 0.7);
    }

    #[test]
    fn test_partial_risk_reward_factor() {
        let sizer = PositionSizer::default();
        // rr 2.0 -> factor 2/3, size 0.9 * 0.6667 = 0.6
        assert_eq!(sizer.size(&decision(0.5, 0.9, 104.0, 98.0)), 0.6);
    }

    #[test]
    fn test_missing_levels() {
        let sizer = PositionSizer::default();
        let mut d = decision(0.5, 0.9, 105.0, 99.0);
        d.take_profit = None;
        assert_eq!(sizer.size(&d), 0.0);

        let mut d = decision(0.5, 0.9, 105.0, 99.0);
        d.current_price = Some(0.0);
        assert_eq!(sizer.size(&d), 0.0);
    }

    #[test]
    fn test_idempotent() {
        let sizer = PositionSizer::default();
        let d = decision(0.7, 0.75, 106.0, 98.5);
        let first = sizer.size(&d);
        assert_eq!(first, sizer.size(&d));
        assert!(first > 0.0 && first <= sizer.max_position_size);
    }
}

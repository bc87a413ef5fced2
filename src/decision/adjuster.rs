//! Decision Adjuster
//!
//! Blends an external decision with the sweep-flow verdict and the market
//! regime. Stages run in a fixed order:
//!
//! 1. flow gating (confidence)
//! 2. regime adjustment (confidence, position, high-vol stop tightening)
//! 3. position rescaling by regime factor, regime confidence and confidence
//! 4. take-profit / stop-loss distance rescaling by regime risk multiplier
//!
//! A stage whose inputs are missing or non-finite hands the decision on
//! unchanged.

use tracing::debug;

use super::model::TradingDecision;
use crate::analysis::{MarketRegime, RegimeVerdict, SweepFlow};

/// Ranging markets trade smaller
const RANGING_POSITION_MULT: f64 = 0.7;

/// High-vol ranges keep this fraction of the stop distance
const HIGH_VOL_STOP_KEEP: f64 = 0.7;

/// Stopping volume in the window cuts confidence
const STOPPING_VOLUME_CONFIDENCE_MULT: f64 = 0.7;

/// Base position scaling per regime
pub fn position_factor(regime: MarketRegime) -> f64 {
    match regime {
        MarketRegime::TrendingUp | MarketRegime::TrendingDown => 1.0,
        MarketRegime::Momentum => 1.2,
        MarketRegime::Breakout => 1.1,
        MarketRegime::RangingLowVol => 0.8,
        MarketRegime::RangingHighVol => 0.6,
        MarketRegime::Reversal => 0.7,
        MarketRegime::Accumulation => 0.9,
        MarketRegime::Distribution => 0.7,
        MarketRegime::Exhaustion => 0.5,
        MarketRegime::Unknown => 0.5,
    }
}

/// Stop/target distance scaling per regime
pub fn risk_multiplier(regime: MarketRegime) -> f64 {
    match regime {
        MarketRegime::TrendingUp | MarketRegime::TrendingDown => 1.0,
        MarketRegime::Momentum => 0.8,
        MarketRegime::Breakout => 1.2,
        MarketRegime::RangingLowVol => 0.9,
        MarketRegime::RangingHighVol => 1.3,
        MarketRegime::Reversal => 1.1,
        MarketRegime::Accumulation => 0.9,
        MarketRegime::Distribution => 1.1,
        MarketRegime::Exhaustion => 1.2,
        MarketRegime::Unknown => 1.0,
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Stage 1: boost confidence on agreeing aggressive sweeps, cut it on stopping volume
pub fn apply_flow(mut decision: TradingDecision, flow: &SweepFlow) -> TradingDecision {
    if !decision.position.is_finite() || !decision.confidence.is_finite() {
        return decision;
    }

    if flow.aggressive_flow
        && flow.sweep_strength.is_finite()
        && flow.sweep_bias.agrees_with(decision.position)
    {
        decision.confidence = (decision.confidence * (1.0 + flow.sweep_strength)).min(1.0);
    }

    if flow.stopping_volume_detected {
        decision.confidence *= STOPPING_VOLUME_CONFIDENCE_MULT;
    }

    decision
}

/// Stage 2: regime-specific confidence/position tweaks and the reasoning prefix
pub fn apply_regime(mut decision: TradingDecision, verdict: &RegimeVerdict) -> TradingDecision {
    let regime_conf = verdict.confidence;
    if !decision.position.is_finite()
        || !decision.confidence.is_finite()
        || !regime_conf.is_finite()
    {
        return decision;
    }

    let position = decision.position;
    let confidence = decision.confidence;
    let trend_direction = verdict.details.trend_direction;

    match verdict.regime {
        MarketRegime::RangingLowVol | MarketRegime::RangingHighVol => {
            decision.position = position * RANGING_POSITION_MULT;

            if verdict.regime == MarketRegime::RangingHighVol {
                if let (Some(cp), Some(sl)) =
                    (finite(decision.current_price), finite(decision.stop_loss))
                {
                    if position > 0.0 {
                        decision.stop_loss = Some(sl.max(cp - (cp - sl) * HIGH_VOL_STOP_KEEP));
                    } else if position < 0.0 {
                        decision.stop_loss = Some(sl.min(cp + (sl - cp) * HIGH_VOL_STOP_KEEP));
                    }
                }
            }
        }
        MarketRegime::TrendingUp | MarketRegime::TrendingDown => {
            let aligned = (verdict.regime == MarketRegime::TrendingUp && position > 0.0)
                || (verdict.regime == MarketRegime::TrendingDown && position < 0.0);
            decision.confidence = if aligned {
                (confidence * (1.0 + regime_conf * 0.3)).min(1.0)
            } else {
                confidence * 0.5
            };
        }
        MarketRegime::Breakout => {
            let aligned = (trend_direction > 0 && position > 0.0)
                || (trend_direction < 0 && position < 0.0);
            if aligned {
                decision.confidence = (confidence * (1.0 + regime_conf * 0.5)).min(1.0);
            }
        }
        MarketRegime::Reversal => {
            // Trading against the old trend
            let aligned = (trend_direction < 0 && position > 0.0)
                || (trend_direction > 0 && position < 0.0);
            if aligned {
                decision.confidence = (confidence * (1.0 + regime_conf * 0.4)).min(1.0);
            }
        }
        MarketRegime::Momentum
        | MarketRegime::Accumulation
        | MarketRegime::Distribution
        | MarketRegime::Exhaustion
        | MarketRegime::Unknown => {}
    }

    decision.reasoning = format!(
        "Market Regime: {} (conf: {:.2})\n{}",
        verdict.regime, regime_conf, decision.reasoning
    );

    decision
}

/// Stage 3: scale position by regime factor, regime confidence and decision confidence
pub fn rescale_position(mut decision: TradingDecision, verdict: &RegimeVerdict) -> TradingDecision {
    let scaled = decision.position
        * position_factor(verdict.regime)
        * verdict.confidence
        * decision.confidence;

    if scaled.is_finite() {
        decision.position = scaled.clamp(-1.0, 1.0);
    }
    decision
}

/// Stage 4: stretch or shrink target and stop distances around the current price
pub fn rescale_stops(mut decision: TradingDecision, verdict: &RegimeVerdict) -> TradingDecision {
    let Some(cp) = finite(decision.current_price) else {
        return decision;
    };
    let multiplier = risk_multiplier(verdict.regime);

    let rescale = |level: f64| {
        let side = if level > cp { 1.0 } else { -1.0 };
        cp + (level - cp).abs() * multiplier * side
    };

    if let Some(tp) = finite(decision.take_profit) {
        decision.take_profit = Some(rescale(tp));
    }
    if let Some(sl) = finite(decision.stop_loss) {
        decision.stop_loss = Some(rescale(sl));
    }
    decision
}

/// Run all four stages
pub fn adjust(decision: TradingDecision, flow: &SweepFlow, verdict: &RegimeVerdict) -> TradingDecision {
    let raw_position = decision.position;

    let decision = apply_flow(decision, flow);
    let decision = apply_regime(decision, verdict);
    let decision = rescale_position(decision, verdict);
    let decision = rescale_stops(decision, verdict);

    debug!(
        "Adjusted: pos={:.2} (raw={:.2}) conf={:.2} regime={}",
        decision.position, raw_position, decision.confidence, verdict.regime
    );

    decision
}

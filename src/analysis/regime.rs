//! Market Regime Detection
//!
//! Classifies the higher-timeframe market as trending, ranging, breaking out,
//! reversing and so on. The decision adjuster only consumes the
//! [`RegimeVerdict`] contract; [`HeuristicRegimeDetector`] is the default
//! implementation and can be swapped for any [`RegimeDetector`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::features::mean;
use crate::types::{Candle, CandleSeries};

/// Regime classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    /// Trend with accelerating lower-timeframe follow-through
    Momentum,
    /// Range expansion out of a consolidation
    Breakout,
    RangingLowVol,
    RangingHighVol,
    /// Lower timeframe pushing hard against the higher-timeframe trend
    Reversal,
    Accumulation,
    Distribution,
    /// Climax volume at the end of an extended trend
    Exhaustion,
    Unknown,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrendingUp => "trending_up",
            Self::TrendingDown => "trending_down",
            Self::Momentum => "momentum",
            Self::Breakout => "breakout",
            Self::RangingLowVol => "ranging_low_vol",
            Self::RangingHighVol => "ranging_high_vol",
            Self::Reversal => "reversal",
            Self::Accumulation => "accumulation",
            Self::Distribution => "distribution",
            Self::Exhaustion => "exhaustion",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegimeDetails {
    /// 1 = up, -1 = down, 0 = neutral
    pub trend_direction: i8,
    /// Supporting measurements (atr, rotation_count, range_ratio, ...)
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
}

/// Output contract of any regime detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeVerdict {
    pub regime: MarketRegime,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub details: RegimeDetails,
}

impl RegimeVerdict {
    pub fn unknown() -> Self {
        Self {
            regime: MarketRegime::Unknown,
            confidence: 0.0,
            details: RegimeDetails::default(),
        }
    }
}

/// Classifies the market from a higher and a lower timeframe
pub trait RegimeDetector: Send + Sync {
    fn detect(&self, higher_tf: &CandleSeries, lower_tf: &CandleSeries) -> RegimeVerdict;
}

/// Configuration for heuristic regime detection
#[derive(Debug, Clone)]
pub struct RegimeConfig {
    /// Higher-timeframe bars to analyze (default: 20)
    pub lookback_bars: usize,
    /// Fair value crossings that mark a rotational market (default: 3)
    pub rotation_threshold: u32,
    /// Net move in ATRs that counts as a trend (default: 3.0)
    pub trend_threshold: f64,
    /// Trailing bars treated as the breakout leg (default: 3)
    pub breakout_bars: usize,
    /// Distance beyond the base range, in ATRs, for a breakout (default: 0.5)
    pub breakout_atr_mult: f64,
    /// Lower-timeframe bars measured for momentum (default: 5)
    pub momentum_bars: usize,
    /// Lower-timeframe move in ATRs that counts as momentum (default: 2.0)
    pub momentum_atr_mult: f64,
    /// ATR / price above which a range is high volatility (default: 0.01)
    pub high_vol_atr_pct: f64,
    /// Signed-volume ratio marking accumulation/distribution (default: 0.4)
    pub accumulation_delta_ratio: f64,
    /// Last-bar volume over the window mean for a climax (default: 2.5)
    pub climax_volume_mult: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            lookback_bars: 20,
            rotation_threshold: 3,
            trend_threshold: 3.0,
            breakout_bars: 3,
            breakout_atr_mult: 0.5,
            momentum_bars: 5,
            momentum_atr_mult: 2.0,
            high_vol_atr_pct: 0.01,
            accumulation_delta_ratio: 0.4,
            climax_volume_mult: 2.5,
        }
    }
}

/// Rule-based detector built on VWAP rotations, ATR and signed volume
#[derive(Debug, Clone, Default)]
pub struct HeuristicRegimeDetector {
    config: RegimeConfig,
}

impl HeuristicRegimeDetector {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }
}

/// Calculate VWAP (Volume Weighted Average Price) for a window of bars
fn calculate_vwap(bars: &[Candle]) -> f64 {
    let (first, last) = match (bars.first(), bars.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return 0.0,
    };

    let sum_v: f64 = bars.iter().map(|b| b.volume).sum();
    if sum_v <= 0.0 {
        // Fallback to simple midpoint
        return (first.open + last.close) / 2.0;
    }

    bars.iter().map(|b| b.typical_price() * b.volume).sum::<f64>() / sum_v
}

/// Mean true range over consecutive bar pairs; the bar's own range when alone
fn calculate_atr(bars: &[Candle]) -> f64 {
    match bars {
        [] => 0.0,
        [only] => only.high - only.low,
        _ => {
            let total: f64 = bars
                .windows(2)
                .map(|pair| {
                    let (prev, bar) = (&pair[0], &pair[1]);
                    (bar.high - bar.low)
                        .max((bar.high - prev.close).abs())
                        .max((bar.low - prev.close).abs())
                })
                .sum();
            total / (bars.len() - 1) as f64
        }
    }
}

/// Closes that land on the other side of `fair_value` from the previous close
fn count_fair_value_crosses(bars: &[Candle], fair_value: f64) -> u32 {
    bars.windows(2)
        .filter(|pair| (pair[0].close > fair_value) != (pair[1].close > fair_value))
        .count() as u32
}

/// Net signed volume over total volume, in [-1, 1]
fn signed_volume_ratio(bars: &[Candle]) -> f64 {
    let total: f64 = bars.iter().map(|b| b.volume).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let signed: f64 = bars
        .iter()
        .map(|b| {
            if b.is_bullish() {
                b.volume
            } else if b.is_bearish() {
                -b.volume
            } else {
                0.0
            }
        })
        .sum();
    signed / total
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

impl RegimeDetector for HeuristicRegimeDetector {
    fn detect(&self, higher_tf: &CandleSeries, lower_tf: &CandleSeries) -> RegimeVerdict {
        let config = &self.config;
        let window = higher_tf.tail(config.lookback_bars);

        if window.len() < config.breakout_bars + 2 {
            return RegimeVerdict::unknown();
        }
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            return RegimeVerdict::unknown();
        };

        let atr = calculate_atr(window);
        if atr <= 0.0 || last.close <= 0.0 {
            return RegimeVerdict::unknown();
        }

        let fair_value = calculate_vwap(window);
        let rotation_count = count_fair_value_crosses(window, fair_value);
        let window_high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let window_low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let range_ratio = (window_high - window_low) / atr;
        let atr_pct = atr / last.close;
        let delta_ratio = signed_volume_ratio(window);

        let trend_strength = (last.close - first.open) / atr;

        // Consolidation the breakout leg is measured against
        let base = &window[..window.len() - config.breakout_bars];
        let base_high = base.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let base_low = base.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let base_trend = base
            .first()
            .zip(base.last())
            .map(|(f, l)| (l.close - f.open) / atr)
            .unwrap_or(0.0);

        let lower = lower_tf.tail(config.lookback_bars);
        let lower_atr = calculate_atr(lower);
        let momentum_leg = lower_tf.tail(config.momentum_bars);
        let lower_momentum = match (momentum_leg.first(), momentum_leg.last()) {
            (Some(f), Some(l)) if lower_atr > 0.0 => (l.close - f.open) / lower_atr,
            _ => 0.0,
        };

        let prior_volumes: Vec<f64> = window[..window.len() - 1].iter().map(|b| b.volume).collect();
        let avg_volume = mean(&prior_volumes);
        let climax = avg_volume > 0.0 && last.volume > avg_volume * config.climax_volume_mult;

        let trending = trend_strength.abs() >= config.trend_threshold;
        let trend_dir = sign(trend_strength);
        let breakout_distance = config.breakout_atr_mult * atr;

        let (regime, confidence, trend_direction) = if base_trend.abs() < config.trend_threshold
            && last.close > base_high + breakout_distance
        {
            let conf = (last.close - base_high) / (2.0 * atr);
            (MarketRegime::Breakout, conf, 1)
        } else if base_trend.abs() < config.trend_threshold
            && last.close < base_low - breakout_distance
        {
            let conf = (base_low - last.close) / (2.0 * atr);
            (MarketRegime::Breakout, conf, -1)
        } else if trending && climax && sign(last.close - last.open) == -trend_dir {
            let conf = 0.5 + last.volume / (avg_volume * config.climax_volume_mult * 4.0);
            (MarketRegime::Exhaustion, conf, trend_dir)
        } else if trending
            && sign(lower_momentum) == -trend_dir
            && lower_momentum.abs() >= config.momentum_atr_mult
        {
            let conf = lower_momentum.abs() / (2.0 * config.momentum_atr_mult);
            (MarketRegime::Reversal, conf, trend_dir)
        } else if trending
            && sign(lower_momentum) == trend_dir
            && lower_momentum.abs() >= config.momentum_atr_mult
        {
            let conf = lower_momentum.abs() / (2.0 * config.momentum_atr_mult);
            (MarketRegime::Momentum, conf, trend_dir)
        } else if trending {
            let conf = trend_strength.abs() / (2.0 * config.trend_threshold);
            let regime = if trend_dir > 0 {
                MarketRegime::TrendingUp
            } else {
                MarketRegime::TrendingDown
            };
            (regime, conf, trend_dir)
        } else if delta_ratio >= config.accumulation_delta_ratio {
            (MarketRegime::Accumulation, delta_ratio, 0)
        } else if delta_ratio <= -config.accumulation_delta_ratio {
            (MarketRegime::Distribution, -delta_ratio, 0)
        } else {
            // Rotational market: more crossings, more conviction
            let conf = 0.3 + rotation_count as f64 / (2.0 * config.rotation_threshold.max(1) as f64);
            let regime = if atr_pct > config.high_vol_atr_pct {
                MarketRegime::RangingHighVol
            } else {
                MarketRegime::RangingLowVol
            };
            (regime, conf, 0)
        };

        let metrics = BTreeMap::from([
            ("atr".to_string(), atr),
            ("atr_pct".to_string(), atr_pct),
            ("fair_value".to_string(), fair_value),
            ("rotation_count".to_string(), rotation_count as f64),
            ("range_ratio".to_string(), range_ratio),
            ("trend_strength".to_string(), trend_strength),
            ("delta_ratio".to_string(), delta_ratio),
            ("lower_momentum".to_string(), lower_momentum),
        ]);

        RegimeVerdict {
            regime,
            confidence: confidence.clamp(0.0, 1.0),
            details: RegimeDetails {
                trend_direction,
                metrics,
            },
        }
    }
}

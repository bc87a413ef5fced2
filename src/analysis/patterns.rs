//! Pattern Classifier
//!
//! Flags discrete order-flow events per bar from the derived features. Every
//! flag reads only the bar itself, the previous bar and trailing rolling
//! statistics, so the flags for a bar never change when later bars arrive.

use serde::{Deserialize, Serialize};

use super::features::FeatureFrame;
use crate::types::CandleSeries;

/// Spread below this fraction of the average spread counts as compressed
const ABSORPTION_SPREAD_RATIO: f64 = 0.7;

/// Rejection wick must exceed body by this factor for stopping volume
const STOPPING_WICK_RATIO: f64 = 1.5;

/// Elevated volume for accumulation/distribution bars
const ELEVATED_VOLUME_MULT: f64 = 1.2;

/// Volume multiple of the mean for a sweep bar
const SWEEP_VOLUME_MULT: f64 = 2.0;

/// Volume multiple of the mean for the looser stopping rule used by sweep flow
const FLOW_STOPPING_VOLUME_MULT: f64 = 1.5;

/// Per-bar pattern flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternFlags {
    /// Volume above the adaptive institutional threshold
    pub institutional_volume: bool,
    /// Institutional volume absorbed without range expansion
    pub absorption: bool,
    /// Institutional volume concentrated in a rejection wick
    pub stopping_volume: bool,
    pub accumulation: bool,
    pub distribution: bool,
    /// Large aggressive directional bar
    pub sweep: bool,
    /// Elevated volume with a wick longer than the body
    pub flow_stopping: bool,
}

/// Classify every bar of `series` using its precomputed `features`
pub fn classify(series: &CandleSeries, features: &FeatureFrame) -> Vec<PatternFlags> {
    let bars = series.candles();
    debug_assert_eq!(bars.len(), features.len());

    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let volume = bar.volume;
            let vol_mean = features.vol_mean[i];
            let body = features.body[i];
            let upper_wick = features.upper_wick[i];
            let lower_wick = features.lower_wick[i];
            let bullish = bar.is_bullish();
            let bearish = bar.is_bearish();

            // NaN thresholds compare false, so warm-up bars never flag
            let institutional_volume = volume > features.institutional_threshold[i];

            let absorption = institutional_volume
                && features.spread[i] < features.spread_mean[i] * ABSORPTION_SPREAD_RATIO;

            let stopping_volume = institutional_volume
                && ((bullish && lower_wick > body * STOPPING_WICK_RATIO)
                    || (bearish && upper_wick > body * STOPPING_WICK_RATIO));

            let elevated = volume > vol_mean * ELEVATED_VOLUME_MULT;
            let prev = i.checked_sub(1).map(|p| &bars[p]);

            let distribution = elevated
                && prev.is_some_and(|p| bar.high < p.high)
                && bearish
                && upper_wick > body;

            let accumulation = elevated
                && prev.is_some_and(|p| bar.low > p.low)
                && bullish
                && lower_wick > body;

            let sweep =
                volume > vol_mean * SWEEP_VOLUME_MULT && body > features.body_mean[i];

            let flow_stopping = volume > vol_mean * FLOW_STOPPING_VOLUME_MULT
                && ((bullish && lower_wick > body) || (bearish && upper_wick > body));

            PatternFlags {
                institutional_volume,
                absorption,
                stopping_volume,
                accumulation,
                distribution,
                sweep,
                flow_stopping,
            }
        })
        .collect()
}

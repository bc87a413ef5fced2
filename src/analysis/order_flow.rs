//! Order Flow Summarizer
//!
//! Aggregates per-bar pattern flags over the trailing window into the
//! institutional footprint verdict, plus the lighter sweep-flow verdict the
//! decision adjuster gates on. Everything is recomputed from the series on
//! each call; nothing is carried between calls.

use chrono::Timelike;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::features::{derive_features, mean, sample_std, FeatureFrame, DEFAULT_WINDOW};
use super::patterns::{classify, PatternFlags};
use crate::types::{Candle, CandleSeries};

/// Last bar above this fraction of the window's max volume is a climax
const CLIMAX_RATIO: f64 = 0.8;

/// Per-bar volume multiple of the rolling mean counted as elevated
const STEALTH_VOLUME_MULT: f64 = 1.2;

/// Wick longer than this many bodies is a price rejection
const REJECTION_WICK_RATIO: f64 = 2.0;

/// Sweep volume above this many average bars is aggressive flow
const AGGRESSIVE_FLOW_MULT: f64 = 10.0;

/// Configuration for order flow analysis
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Rolling window and trailing summary window (default: 20)
    pub window: usize,
    /// Exchange timezone used to bucket bars into session hours
    pub session_tz: Tz,
    /// Opening hour, typically retail-driven (default: 9)
    pub early_session_hour: u32,
    /// Closing hour, typically institutional (default: 15)
    pub late_session_hour: u32,
    /// Equal-frequency price buckets in the volume profile (default: 10)
    pub profile_buckets: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            session_tz: chrono_tz::America::New_York,
            early_session_hour: 9,
            late_session_hour: 15,
            profile_buckets: 10,
        }
    }
}

/// Directional lean of large participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
}

impl Bias {
    /// Larger side wins; ties lean bearish
    fn from_volumes(bullish: f64, bearish: f64) -> Self {
        if bullish > bearish {
            Self::Bullish
        } else {
            Self::Bearish
        }
    }

    /// Whether a signed position points the same way
    pub fn agrees_with(&self, position: f64) -> bool {
        match self {
            Self::Bullish => position > 0.0,
            Self::Bearish => position < 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaTrend {
    /// Sign of the last cumulative delta: 1, 0 or -1
    pub direction: i8,
    /// |cumulative delta| / window volume
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeNode {
    pub price: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    /// Buckets with volume above mean + one std
    pub high_nodes: Vec<VolumeNode>,
    /// Bucket volume std / mean
    pub concentration: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRejection {
    pub up: bool,
    pub down: bool,
}

/// Institutional footprint over the trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFlowVerdict {
    pub institutional_bias: Bias,
    /// None when the window holds no institutional-volume bars
    pub bias_strength: Option<f64>,
    pub smart_money_ratio: f64,
    pub absorption_detected: bool,
    pub stopping_volume: bool,
    pub climax_volume: bool,
    pub stealth_mode: bool,
    pub accumulation: bool,
    pub delta_trend: DeltaTrend,
    pub volume_profile: VolumeProfile,
    pub large_player_activity: f64,
    pub price_rejection: PriceRejection,
}

/// Sweep-based flow summary used to gate decision confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepFlow {
    pub sweep_bias: Bias,
    pub sweep_strength: f64,
    pub stopping_volume_detected: bool,
    pub aggressive_flow: bool,
}

impl SweepFlow {
    /// No sweeps, no stopping volume
    pub fn quiet() -> Self {
        Self {
            sweep_bias: Bias::Bearish,
            sweep_strength: 0.0,
            stopping_volume_detected: false,
            aggressive_flow: false,
        }
    }
}

/// Both verdicts for one analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFlowReport {
    pub footprint: OrderFlowVerdict,
    pub sweep: SweepFlow,
}

/// L1 order flow analyzer over OHLCV bars
#[derive(Debug, Clone, Default)]
pub struct OrderFlowAnalyzer {
    config: AnalysisConfig,
}

impl OrderFlowAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Analyze `series`; None when it has no bars
    pub fn analyze(&self, series: &CandleSeries) -> Option<OrderFlowReport> {
        if series.is_empty() {
            return None;
        }

        let features = derive_features(series, self.config.window);
        let flags = classify(series, &features);

        let footprint = summarize_footprint(series, &features, &flags, &self.config);
        let sweep = summarize_sweeps(series, &features, &flags, self.config.window);

        debug!(
            "Order flow: bias={:?} strength={:?} sweep_bias={:?} aggressive={}",
            footprint.institutional_bias,
            footprint.bias_strength,
            sweep.sweep_bias,
            sweep.aggressive_flow
        );

        Some(OrderFlowReport { footprint, sweep })
    }
}

/// Build the footprint verdict from the trailing `config.window` bars
pub fn summarize_footprint(
    series: &CandleSeries,
    features: &FeatureFrame,
    flags: &[PatternFlags],
    config: &AnalysisConfig,
) -> OrderFlowVerdict {
    let start = series.len().saturating_sub(config.window);
    let bars = &series.candles()[start..];
    let recent_flags = &flags[start..];

    // Directional bias with volume weighting
    let (mut bullish_volume, mut bearish_volume) = (0.0, 0.0);
    for (bar, f) in bars.iter().zip(recent_flags) {
        if !f.institutional_volume {
            continue;
        }
        if bar.is_bullish() {
            bullish_volume += bar.volume;
        } else if bar.is_bearish() {
            bearish_volume += bar.volume;
        }
    }
    let institutional_total = bullish_volume + bearish_volume;
    let bias_strength = (institutional_total > 0.0)
        .then(|| (bullish_volume - bearish_volume).abs() / institutional_total);

    let max_volume = bars.iter().map(|b| b.volume).fold(0.0, f64::max);
    let climax_volume = bars
        .last()
        .is_some_and(|b| b.volume > max_volume * CLIMAX_RATIO);

    let elevated_bars = bars
        .iter()
        .enumerate()
        .filter(|(i, b)| b.volume > features.vol_mean[start + i] * STEALTH_VOLUME_MULT)
        .count();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let displacement = match (closes.first(), closes.last()) {
        (Some(first), Some(last)) => (last - first).abs(),
        _ => 0.0,
    };
    let stealth_mode = elevated_bars * 2 > bars.len() && displacement < sample_std(&closes);

    let accumulation_count = recent_flags.iter().filter(|f| f.accumulation).count();
    let distribution_count = recent_flags.iter().filter(|f| f.distribution).count();

    let window_volume: f64 = bars.iter().map(|b| b.volume).sum();
    let last_cum_delta = features.cumulative_delta.last().copied().unwrap_or(f64::NAN);
    let delta_trend = if last_cum_delta.is_nan() {
        DeltaTrend {
            direction: 0,
            strength: 0.0,
        }
    } else {
        DeltaTrend {
            direction: if last_cum_delta > 0.0 {
                1
            } else if last_cum_delta < 0.0 {
                -1
            } else {
                0
            },
            strength: if window_volume > 0.0 {
                last_cum_delta.abs() / window_volume
            } else {
                0.0
            },
        }
    };

    let institutional_count = recent_flags.iter().filter(|f| f.institutional_volume).count();

    let price_rejection = PriceRejection {
        up: (start..series.len())
            .any(|i| features.upper_wick[i] > features.body[i] * REJECTION_WICK_RATIO),
        down: (start..series.len())
            .any(|i| features.lower_wick[i] > features.body[i] * REJECTION_WICK_RATIO),
    };

    OrderFlowVerdict {
        institutional_bias: Bias::from_volumes(bullish_volume, bearish_volume),
        bias_strength,
        smart_money_ratio: smart_money_ratio(series.candles(), config),
        absorption_detected: recent_flags.iter().any(|f| f.absorption),
        stopping_volume: recent_flags.iter().any(|f| f.stopping_volume),
        climax_volume,
        stealth_mode,
        accumulation: accumulation_count > distribution_count,
        delta_trend,
        volume_profile: volume_profile(
            &features.typical_price[start..],
            bars,
            config.profile_buckets,
        ),
        large_player_activity: institutional_count as f64 / bars.len().max(1) as f64,
        price_rejection,
    }
}

/// Build the sweep-flow verdict from the trailing `window` bars
pub fn summarize_sweeps(
    series: &CandleSeries,
    features: &FeatureFrame,
    flags: &[PatternFlags],
    window: usize,
) -> SweepFlow {
    let start = series.len().saturating_sub(window);
    let bars = &series.candles()[start..];
    let recent_flags = &flags[start..];

    let (mut bullish_sweeps, mut bearish_sweeps) = (0.0, 0.0);
    for (bar, f) in bars.iter().zip(recent_flags) {
        if !f.sweep {
            continue;
        }
        if bar.is_bullish() {
            bullish_sweeps += bar.volume;
        } else if bar.is_bearish() {
            bearish_sweeps += bar.volume;
        }
    }

    let defined: Vec<f64> = features
        .vol_mean
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    let avg_bar_volume = mean(&defined);

    let (sweep_strength, aggressive_flow) = if avg_bar_volume > 0.0 {
        (
            bullish_sweeps.max(bearish_sweeps) / avg_bar_volume,
            bullish_sweeps + bearish_sweeps > avg_bar_volume * AGGRESSIVE_FLOW_MULT,
        )
    } else {
        (0.0, false)
    };

    SweepFlow {
        sweep_bias: Bias::from_volumes(bullish_sweeps, bearish_sweeps),
        sweep_strength,
        stopping_volume_detected: recent_flags.iter().any(|f| f.flow_stopping),
        aggressive_flow,
    }
}

/// Late-session mean volume over early-session mean volume.
///
/// Buckets use the bar's hour in the exchange timezone. Returns 1.0 when
/// either bucket is empty or the early bucket averages zero.
pub fn smart_money_ratio(bars: &[Candle], config: &AnalysisConfig) -> f64 {
    let hour_volumes = |hour: u32| -> Vec<f64> {
        bars.iter()
            .filter(|b| b.timestamp.with_timezone(&config.session_tz).hour() == hour)
            .map(|b| b.volume)
            .collect()
    };

    let early = hour_volumes(config.early_session_hour);
    let late = hour_volumes(config.late_session_hour);
    if early.is_empty() || late.is_empty() {
        return 1.0;
    }

    let early_mean = mean(&early);
    if early_mean > 0.0 {
        mean(&late) / early_mean
    } else {
        1.0
    }
}

/// Equal-frequency volume profile over `prices` (typical prices of `bars`)
pub fn volume_profile(prices: &[f64], bars: &[Candle], buckets: usize) -> VolumeProfile {
    let empty = VolumeProfile {
        high_nodes: Vec::new(),
        concentration: 0.0,
    };
    if prices.is_empty() || buckets == 0 {
        return empty;
    }

    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut edges: Vec<f64> = (0..=buckets)
        .map(|k| quantile(&sorted, k as f64 / buckets as f64))
        .collect();
    edges.dedup();

    // All prices equal: one bucket, nothing stands out
    if edges.len() < 2 {
        return empty;
    }

    let mut volumes = vec![0.0; edges.len() - 1];
    for (price, bar) in prices.iter().zip(bars) {
        // Intervals are (lo, hi]; the lowest edge belongs to the first bucket
        let idx = edges[1..]
            .iter()
            .position(|hi| *price <= *hi)
            .unwrap_or(volumes.len() - 1);
        volumes[idx] += bar.volume;
    }

    let bucket_mean = mean(&volumes);
    let bucket_std = sample_std(&volumes);

    let high_nodes = volumes
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > bucket_mean + bucket_std)
        .map(|(i, v)| VolumeNode {
            price: (edges[i] + edges[i + 1]) / 2.0,
            volume: *v,
        })
        .collect();

    let concentration = if bucket_mean > 0.0 && bucket_std.is_finite() {
        bucket_std / bucket_mean
    } else {
        0.0
    };

    VolumeProfile {
        high_nodes,
        concentration,
    }
}

/// Linear-interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

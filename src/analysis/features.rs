//! Feature Deriver
//!
//! Computes per-bar derived columns from a [`CandleSeries`]: price geometry,
//! money flow, signed/weighted volume delta and the rolling statistics the
//! pattern classifier thresholds against. Every rolling value covers the
//! trailing window ending at (and including) its bar; bars without a full
//! window get `NaN`.

use crate::types::CandleSeries;

/// Default rolling window (bars)
pub const DEFAULT_WINDOW: usize = 20;

/// Base multiplier of the adaptive institutional-volume threshold
const INSTITUTIONAL_BASE_MULT: f64 = 2.0;

/// Derived columns, index-aligned with the source series
#[derive(Debug, Clone, Default)]
pub struct FeatureFrame {
    pub window: usize,
    pub typical_price: Vec<f64>,
    pub money_flow: Vec<f64>,
    pub vol_mean: Vec<f64>,
    pub vol_std: Vec<f64>,
    /// vol_mean + (2 + vol_std / vol_mean) * vol_std
    pub institutional_threshold: Vec<f64>,
    pub weighted_delta: Vec<f64>,
    pub cumulative_delta: Vec<f64>,
    pub body: Vec<f64>,
    pub upper_wick: Vec<f64>,
    pub lower_wick: Vec<f64>,
    pub spread: Vec<f64>,
    pub spread_mean: Vec<f64>,
    pub body_mean: Vec<f64>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.typical_price.len()
    }

    pub fn is_empty(&self) -> bool {
        self.typical_price.is_empty()
    }
}

/// Derive all feature columns for `series` over a `window`-bar rolling window
pub fn derive_features(series: &CandleSeries, window: usize) -> FeatureFrame {
    let window = window.max(1);
    let bars = series.candles();

    let typical_price: Vec<f64> = bars.iter().map(|b| b.typical_price()).collect();
    let money_flow: Vec<f64> = bars
        .iter()
        .zip(&typical_price)
        .map(|(b, tp)| tp * b.volume)
        .collect();

    let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let vol_mean = rolling_mean(&volume, window);
    let vol_std = rolling_std(&volume, window);

    let institutional_threshold = vol_mean
        .iter()
        .zip(&vol_std)
        .map(|(&mean, &std)| {
            if mean > 0.0 {
                mean + (INSTITUTIONAL_BASE_MULT + std / mean) * std
            } else {
                f64::NAN
            }
        })
        .collect();

    // Larger directional moves weigh more than the raw volume imbalance
    let weighted_delta: Vec<f64> = bars
        .iter()
        .map(|b| {
            let move_weight = if b.open != 0.0 {
                1.0 + ((b.close - b.open) / b.open).abs()
            } else {
                1.0
            };
            let signed = if b.is_bullish() { b.volume } else { -b.volume };
            signed * move_weight
        })
        .collect();
    let cumulative_delta = rolling_sum(&weighted_delta, window);

    let body: Vec<f64> = bars.iter().map(|b| (b.close - b.open).abs()).collect();
    let upper_wick = bars.iter().map(|b| b.high - b.open.max(b.close)).collect();
    let lower_wick = bars.iter().map(|b| b.open.min(b.close) - b.low).collect();
    let spread: Vec<f64> = bars.iter().map(|b| b.high - b.low).collect();

    let spread_mean = rolling_mean(&spread, window);
    let body_mean = rolling_mean(&body, window);

    FeatureFrame {
        window,
        typical_price,
        money_flow,
        vol_mean,
        vol_std,
        institutional_threshold,
        weighted_delta,
        cumulative_delta,
        body,
        upper_wick,
        lower_wick,
        spread,
        spread_mean,
        body_mean,
    }
}

/// Trailing rolling sum, NaN until `window` values are available
pub fn rolling_sum(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| w.iter().sum())
}

/// Trailing rolling mean, NaN until `window` values are available
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, mean)
}

/// Apply `f` to each full trailing window on its own
fn rolling_apply(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    for i in (window - 1)..values.len() {
        out[i] = f(&values[i + 1 - window..=i]);
    }
    out
}

/// Trailing rolling sample standard deviation (ddof = 1)
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    if window < 2 {
        return vec![f64::NAN; values.len()];
    }
    rolling_apply(values, window, sample_std)
}

/// Arithmetic mean; exact for constant input
pub fn mean(values: &[f64]) -> f64 {
    let Some(&first) = values.first() else {
        return f64::NAN;
    };
    if values.iter().all(|v| *v == first) {
        return first;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (ddof = 1); NaN for fewer than two values
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::*;
    use crate::types::{Candle, CandleSeries};
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_rolling_helpers() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        let s = rolling_sum(&v, 3);
        assert!(s[0].is_nan() && s[1].is_nan());
        approx(s[2], 6.0);
        approx(s[4], 12.0);

        let m = rolling_mean(&v, 3);
        approx(m[3], 3.0);

        let sd = rolling_std(&v, 3);
        assert!(sd[1].is_nan());
        approx(sd[2], 1.0);

        assert!(rolling_std(&v, 1).iter().all(|x| x.is_nan()));
        assert!(rolling_mean(&v, 10).iter().all(|x| x.is_nan()));
    }

    #[test]
    fn test_geometry_and_delta() {
        let s = series(vec![
            candle(0, 100.0, 103.0, 99.0, 102.0, 1000.0),
            candle(1, 102.0, 102.5, 100.0, 101.0, 500.0),
        ]);
        let f = derive_features(&s, 2);

        approx(f.typical_price[0], (103.0 + 99.0 + 102.0) / 3.0);
        approx(f.money_flow[1], (102.5 + 100.0 + 101.0) / 3.0 * 500.0);
        approx(f.body[0], 2.0);
        approx(f.upper_wick[0], 1.0);
        approx(f.lower_wick[0], 1.0);
        approx(f.spread[1], 2.5);

        approx(f.weighted_delta[0], 1000.0 * 1.02);
        approx(f.weighted_delta[1], -500.0 * (1.0 + 1.0 / 102.0));
        assert!(f.cumulative_delta[0].is_nan());
        approx(
            f.cumulative_delta[1],
            f.weighted_delta[0] + f.weighted_delta[1],
        );
    }

    /// 40 bars of uneven fractional volume, then 20 bars at 37.3
    fn flat_after_fractional(seed: u64) -> Vec<Candle> {
        let mut bars = quiet_series(60, 0.0);
        for (i, bar) in bars.iter_mut().enumerate() {
            bar.volume = if i < 40 {
                let k = (i as u64 * 7919 + seed * 104_729) % 1_000;
                1.0 + k as f64 * 0.0731
            } else {
                37.3
            };
        }
        bars
    }

    #[test]
    fn test_constant_window_is_exact() {
        for seed in 0..200 {
            let s = series(flat_after_fractional(seed));
            let f = derive_features(&s, DEFAULT_WINDOW);
            assert_eq!(f.vol_mean[59], 37.3, "seed {seed}");
            assert_eq!(f.vol_std[59], 0.0, "seed {seed}");
            assert_eq!(f.institutional_threshold[59], 37.3, "seed {seed}");
        }
    }

    #[test]
    fn test_warmup_is_nan() {
        let s = series(quiet_series(5, 100.0));
        let f = derive_features(&s, DEFAULT_WINDOW);
        assert_eq!(f.len(), 5);
        assert!(f.vol_mean.iter().all(|v| v.is_nan()));
        assert!(f.institutional_threshold.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_zero_volume_threshold_undefined() {
        let bars = quiet_series(25, 0.0)
            .into_iter()
            .map(|c| Candle { volume: 0.0, ..c })
            .collect();
        let s = series(bars);
        let f = derive_features(&s, DEFAULT_WINDOW);
        assert!(f.institutional_threshold[24].is_nan());
    }

    fn arb_candles() -> impl Strategy<Value = Vec<Candle>> {
        prop::collection::vec(
            (1.0f64..500.0, 0.0f64..5.0, 0.0f64..5.0, -5.0f64..5.0, 0.0f64..1e6),
            20..60,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (open, up, down, delta, volume))| {
                    let close = (open + delta).max(0.5);
                    candle(
                        i as i64,
                        open,
                        open.max(close) + up,
                        open.min(close) - down,
                        close,
                        volume,
                    )
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn wicks_never_negative(bars in arb_candles()) {
            let s = CandleSeries::new(bars).unwrap();
            let f = derive_features(&s, DEFAULT_WINDOW);
            prop_assert!(f.upper_wick.iter().all(|w| *w >= 0.0));
            prop_assert!(f.lower_wick.iter().all(|w| *w >= 0.0));
            prop_assert!(f.spread.iter().all(|w| *w >= 0.0));
        }

        #[test]
        fn derivation_leaves_input_untouched(bars in arb_candles()) {
            let s = CandleSeries::new(bars).unwrap();
            let before = s.clone();
            let _ = derive_features(&s, DEFAULT_WINDOW);
            prop_assert_eq!(s, before);
        }
    }
}

//! Prompt generation
//!
//! Summarizes each timeframe (price action, key levels, EMA trend, RSI,
//! relative volume, unfilled fair value gaps) and appends the order-flow and
//! regime context as JSON.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::features::{mean, rolling_mean};
use crate::analysis::{OrderFlowVerdict, RegimeVerdict, SweepFlow};
use crate::types::{Candle, CandleSeries, MultiTimeframe};

/// System message sent with every decision request
pub const SYSTEM_PROMPT: &str = "You are a professional futures trader. You will analyze market data and provide trading decisions in JSON format with position, confidence, and reasoning fields.";

const PREAMBLE: &str = "You are an expert futures trader specializing in market structure analysis and risk management.
Analyze the following market data and provide a detailed trading decision.

Key Requirements:
1. Position size must reflect both directional conviction AND current market regime
2. Stop-loss must be placed beyond the nearest significant structure (support/resistance, fair value gap)
3. Take-profit must target the next major structure level with good risk:reward (minimum 1:1.5)
4. Confidence should consider:
   - Alignment of trends across timeframes
   - Volume confirmation
   - Market structure (support/resistance, fair value gaps)
   - Current market regime and volatility

Market Analysis:
";

const ANSWER_FORMAT: &str = "
Based on this analysis, provide a trading decision with:
1. Position (-1.0 for full short to 1.0 for full long)
2. Confidence level (0.0 to 1.0)
3. Take-profit price (must be at significant structure level)
4. Stop-loss price (must be beyond nearest structure)
5. Detailed reasoning including:
   - Primary market structure levels being used
   - Multi-timeframe trend alignment
   - Volume confirmation/concerns
   - Risk:reward ratio justification

Format response as JSON with keys: position, confidence, take_profit, stop_loss, reasoning
Note: reasoning should be a dictionary with keys: primary_levels, multi_timeframe_alignment, volume_confirmation, risk_reward";

/// Analysis results handed to the provider alongside the candles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditionalContext {
    pub market_regime: RegimeVerdict,
    pub order_flow: SweepFlow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footprint: Option<OrderFlowVerdict>,
}

/// Timeframe summary settings
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    /// Window for support/resistance detection (default: 20)
    pub level_period: usize,
    /// Bars used for the price/volume change figures (default: 10)
    pub change_period: usize,
    /// Unfilled fair value gaps listed per timeframe (default: 3)
    pub max_gaps: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            level_period: 20,
            change_period: 10,
            max_gaps: 3,
        }
    }
}

/// Three-bar imbalance not yet traded back into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairValueGap {
    pub bullish: bool,
    pub low: f64,
    pub high: f64,
}

impl PromptBuilder {
    /// Full user prompt for one decision request
    pub fn build(&self, frames: &MultiTimeframe, context: Option<&AdditionalContext>) -> String {
        let summaries: Vec<String> = [
            ("Hourly", &frames.hourly, "40%"),
            ("15-minute", &frames.min15, "30%"),
            ("5-minute", &frames.min5, "20%"),
            ("1-minute", &frames.min1, "10%"),
        ]
        .into_iter()
        .filter_map(|(name, series, weight)| self.summarize(name, series, weight))
        .collect();

        let mut prompt = String::from(PREAMBLE);
        prompt.push_str(&summaries.join("\n"));

        if let Some(ctx) = context {
            match serde_json::to_string_pretty(ctx) {
                Ok(json) => prompt.push_str(&format!("\nMarket Context:\n{json}\n")),
                Err(e) => warn!("Failed to serialize market context: {}", e),
            }
        }

        prompt.push_str(ANSWER_FORMAT);
        prompt
    }

    fn summarize(&self, name: &str, series: &CandleSeries, weight: &str) -> Option<String> {
        let bars = series.candles();
        let current = series.last()?;
        let recent = series.tail(self.change_period);
        let first = recent.first()?;

        let price_change = pct_change(first.close, current.close);
        let recent_volumes: Vec<f64> = recent.iter().map(|b| b.volume).collect();
        let vol_change = pct_change(mean(&recent_volumes), current.volume);

        let (supports, resistances) = key_levels(bars, self.level_period);
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let ema20 = ema(&closes, 20);
        let ema50 = ema(&closes, 50);
        let ema_trend = if ema20 > ema50 { "Bullish" } else { "Bearish" };

        let mut lines = vec![
            format!("\n{name} Analysis (Weight: {weight}):"),
            "Price Action:".to_string(),
            format!(
                "- Current: {:.2} ({:+.2}% last {} periods)",
                current.close, price_change, self.change_period
            ),
            format!("- Key Resistances: {}", join_prices(&resistances)),
            format!("- Key Supports: {}", join_prices(&supports)),
        ];

        let gaps = unfilled_fair_value_gaps(bars, self.max_gaps);
        if !gaps.is_empty() {
            let listed: Vec<String> = gaps
                .iter()
                .map(|g| {
                    format!(
                        "{} {:.2}-{:.2}",
                        if g.bullish { "Bullish" } else { "Bearish" },
                        g.low,
                        g.high
                    )
                })
                .collect();
            lines.push(format!("- Unfilled Fair Value Gaps: {}", listed.join(", ")));
        }

        lines.extend([
            "\nTechnical Indicators:".to_string(),
            format!("- Trend: {ema_trend} (EMA20 vs EMA50)"),
            format!("- RSI: {}", fmt_or_na(rsi(&closes, 14), 1)),
            format!(
                "- Volume: {:+.2}% vs average (Relative: {}x)",
                vol_change,
                fmt_or_na(relative_volume(bars, 20), 2)
            ),
        ]);

        let mut s = lines.join("\n");
        s.push('\n');
        Some(s)
    }
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from != 0.0 && from.is_finite() {
        (to - from) / from * 100.0
    } else {
        0.0
    }
}

fn fmt_or_na(value: f64, decimals: usize) -> String {
    if value.is_finite() {
        format!("{value:.decimals$}")
    } else {
        "n/a".to_string()
    }
}

fn join_prices(levels: &[f64]) -> String {
    levels
        .iter()
        .map(|p| format!("{p:.2}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Three nearest supports (below) and resistances (above) the last close,
/// from centered rolling lows/highs
pub fn key_levels(bars: &[Candle], period: usize) -> (Vec<f64>, Vec<f64>) {
    let Some(current) = bars.last().map(|b| b.close) else {
        return (Vec::new(), Vec::new());
    };
    if period == 0 || bars.len() < period {
        return (Vec::new(), Vec::new());
    }

    let half = period / 2;
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    for center in half..=(bars.len() - period + half) {
        let window = &bars[center - half..center - half + period];
        highs.push(window.iter().map(|b| b.high).fold(f64::MIN, f64::max));
        lows.push(window.iter().map(|b| b.low).fold(f64::MAX, f64::min));
    }

    let mut resistances: Vec<f64> = highs.into_iter().filter(|p| *p > current).collect();
    resistances.sort_by(|a, b| a.total_cmp(b));
    resistances.dedup();
    resistances.truncate(3);

    let mut supports: Vec<f64> = lows.into_iter().filter(|p| *p < current).collect();
    supports.sort_by(|a, b| b.total_cmp(a));
    supports.dedup();
    supports.truncate(3);

    (supports, resistances)
}

/// Last value of an adjusted exponential moving average with the given span
pub fn ema(values: &[f64], span: usize) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let decay = 1.0 - alpha;
    let (mut num, mut den) = (0.0, 0.0);
    for v in values {
        num = v + decay * num;
        den = 1.0 + decay * den;
    }
    num / den
}

/// Simple-average RSI of the last `period` close-to-close changes
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() <= period {
        return f64::NAN;
    }
    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &changes[changes.len() - period..];

    let gain = recent.iter().map(|d| d.max(0.0)).sum::<f64>() / period as f64;
    let loss = recent.iter().map(|d| (-d).max(0.0)).sum::<f64>() / period as f64;
    if loss == 0.0 {
        return if gain == 0.0 { f64::NAN } else { 100.0 };
    }
    100.0 - 100.0 / (1.0 + gain / loss)
}

/// Last bar volume over its rolling mean
pub fn relative_volume(bars: &[Candle], window: usize) -> f64 {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let avg = rolling_mean(&volumes, window);
    match (volumes.last(), avg.last()) {
        (Some(v), Some(m)) if *m > 0.0 => v / m,
        _ => f64::NAN,
    }
}

/// Most recent three-bar gaps that later bars have not traded back into
pub fn unfilled_fair_value_gaps(bars: &[Candle], limit: usize) -> Vec<FairValueGap> {
    let mut gaps = Vec::new();
    if bars.len() < 3 {
        return gaps;
    }

    for i in (2..bars.len()).rev() {
        if gaps.len() >= limit {
            break;
        }
        let (before, after) = (&bars[i - 2], &bars[i]);
        let later = &bars[i + 1..];

        let gap = if before.high < after.low {
            Some(FairValueGap {
                bullish: true,
                low: before.high,
                high: after.low,
            })
        } else if before.low > after.high {
            Some(FairValueGap {
                bullish: false,
                low: after.high,
                high: before.low,
            })
        } else {
            None
        };

        if let Some(gap) = gap {
            let filled = later.iter().any(|b| {
                if gap.bullish {
                    b.low <= gap.low
                } else {
                    b.high >= gap.high
                }
            });
            if !filled {
                gaps.push(gap);
            }
        }
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Bias, RegimeVerdict};
    use crate::types::fixtures::*;

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_ema_and_rsi() {
        // Constant series: EMA is the constant
        approx(ema(&[5.0; 30], 20), 5.0);
        // Adjusted EMA of [1, 2] with span 1 weights only the last value
        approx(ema(&[1.0, 2.0], 1), 2.0);

        let rising: Vec<f64> = (0..20).map(|i| i as f64).collect();
        approx(rsi(&rising, 14), 100.0);

        let mixed: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        approx(rsi(&mixed, 14), 50.0);
        assert!(rsi(&mixed[..10], 14).is_nan());
    }

    #[test]
    fn test_key_levels() {
        let bars: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 100.0 + ((i % 10) as f64 - 5.0);
                candle(i, base, base + 1.0, base - 1.0, base, 100.0)
            })
            .collect();
        let (supports, resistances) = key_levels(&bars, 20);
        let current = bars.last().unwrap().close;
        assert!(supports.iter().all(|s| *s < current));
        assert!(resistances.iter().all(|r| *r > current));
        assert!(supports.len() <= 3 && resistances.len() <= 3);
        assert!(!resistances.is_empty());
    }

    #[test]
    fn test_fair_value_gaps() {
        let bars = vec![
            candle(0, 100.0, 101.0, 99.5, 100.8, 100.0),
            candle(1, 100.8, 103.0, 100.7, 102.8, 300.0),
            candle(2, 102.8, 104.0, 102.0, 103.5, 200.0),
            candle(3, 103.5, 104.2, 102.5, 104.0, 150.0),
        ];
        let gaps = unfilled_fair_value_gaps(&bars, 3);
        assert_eq!(
            gaps,
            vec![FairValueGap {
                bullish: true,
                low: 101.0,
                high: 102.0
            }]
        );

        // A later bar trading down to 101 fills it
        let mut filled = bars.clone();
        filled.push(candle(4, 104.0, 104.1, 100.9, 101.5, 150.0));
        assert!(unfilled_fair_value_gaps(&filled, 3).is_empty());
    }

    #[test]
    fn test_prompt_includes_timeframes_and_context() {
        let frames = MultiTimeframe {
            hourly: series(quiet_series(30, 1_000.0)),
            min15: CandleSeries::empty(),
            min5: series(quiet_series(30, 200.0)),
            min1: series(quiet_series(30, 50.0)),
        };
        let ctx = AdditionalContext {
            market_regime: RegimeVerdict::unknown(),
            order_flow: SweepFlow {
                sweep_bias: Bias::Bullish,
                ..SweepFlow::quiet()
            },
            footprint: None,
        };

        let prompt = PromptBuilder::default().build(&frames, Some(&ctx));
        assert!(prompt.contains("Hourly Analysis (Weight: 40%)"));
        assert!(prompt.contains("\nHourly Analysis (Weight: 40%):\nPrice Action:\n- Current: 100.15 ("));
        assert!(prompt.contains("\n\nTechnical Indicators:\n- Trend: "));
        assert!(!prompt.contains("15-minute Analysis"));
        assert!(prompt.contains("1-minute Analysis (Weight: 10%)"));
        assert!(prompt.contains("\"sweep_bias\": \"bullish\""));
        assert!(prompt.contains("\"regime\": \"unknown\""));
        assert!(prompt.ends_with("volume_confirmation, risk_reward"));
    }
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Reasons a bar sequence is rejected as a [`CandleSeries`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("bar {index}: non-finite price or volume")]
    NonFinite { index: usize },

    #[error("bar {index}: high {high} below open/close")]
    HighBelowBody { index: usize, high: f64 },

    #[error("bar {index}: low {low} above open/close")]
    LowAboveBody { index: usize, low: f64 },

    #[error("bar {index}: negative volume {volume}")]
    NegativeVolume { index: usize, volume: f64 },

    #[error("bar {index}: timestamp {timestamp} does not follow the previous bar")]
    OutOfOrder {
        index: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Ordered, validated sequence of candles.
///
/// Construction checks the OHLC invariant, non-negative volume and strictly
/// increasing timestamps, so every consumer downstream can rely on
/// `upper_wick >= 0` and `lower_wick >= 0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self, SeriesError> {
        for (index, c) in candles.iter().enumerate() {
            if ![c.open, c.high, c.low, c.close, c.volume]
                .iter()
                .all(|v| v.is_finite())
            {
                return Err(SeriesError::NonFinite { index });
            }
            if c.high < c.open.max(c.close) {
                return Err(SeriesError::HighBelowBody { index, high: c.high });
            }
            if c.low > c.open.min(c.close) {
                return Err(SeriesError::LowAboveBody { index, low: c.low });
            }
            if c.volume < 0.0 {
                return Err(SeriesError::NegativeVolume {
                    index,
                    volume: c.volume,
                });
            }
            if index > 0 && c.timestamp <= candles[index - 1].timestamp {
                return Err(SeriesError::OutOfOrder {
                    index,
                    timestamp: c.timestamp,
                });
            }
        }
        Ok(Self { candles })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Last `n` bars (or all of them when shorter)
    pub fn tail(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }

    /// Bars with `timestamp <= end`, keeping at most the last `limit`
    pub fn truncated(&self, end: Option<DateTime<Utc>>, limit: usize) -> Self {
        let upto = match end {
            Some(end) => self.candles.partition_point(|c| c.timestamp <= end),
            None => self.candles.len(),
        };
        let start = upto.saturating_sub(limit);
        Self {
            candles: self.candles[start..upto].to_vec(),
        }
    }
}

/// Bar timeframes consumed by the decision cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Hour1,
    Min15,
    Min5,
    Min1,
}

impl Timeframe {
    pub fn duration(&self) -> Duration {
        match self {
            Self::Hour1 => Duration::hours(1),
            Self::Min15 => Duration::minutes(15),
            Self::Min5 => Duration::minutes(5),
            Self::Min1 => Duration::minutes(1),
        }
    }

    /// File/CLI label ("1h", "15m", "5m", "1m")
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hour1 => "1h",
            Self::Min15 => "15m",
            Self::Min5 => "5m",
            Self::Min1 => "1m",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The four series one decision cycle works from
#[derive(Debug, Clone, Default)]
pub struct MultiTimeframe {
    pub hourly: CandleSeries,
    pub min15: CandleSeries,
    pub min5: CandleSeries,
    pub min1: CandleSeries,
}

impl MultiTimeframe {
    pub fn get(&self, timeframe: Timeframe) -> &CandleSeries {
        match timeframe {
            Timeframe::Hour1 => &self.hourly,
            Timeframe::Min15 => &self.min15,
            Timeframe::Min5 => &self.min5,
            Timeframe::Min1 => &self.min1,
        }
    }

    /// Close of the most recent 1-minute bar
    pub fn current_price(&self) -> Option<f64> {
        self.min1.last().map(|c| c.close)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn ts(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap() + Duration::minutes(minute)
    }

    /// Build a candle at minute `i` with explicit OHLCV
    pub fn candle(i: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            timestamp: ts(i),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Quiet alternating series: tiny bodies, constant-ish volume
    pub fn quiet_series(n: usize, volume: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + (i % 2) as f64 * 0.1;
                let v = volume + (i % 3) as f64;
                candle(i as i64, base, base + 0.3, base - 0.3, base + 0.05, v)
            })
            .collect()
    }

    pub fn series(candles: Vec<Candle>) -> CandleSeries {
        CandleSeries::new(candles).unwrap()
    }
}

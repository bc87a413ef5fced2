//! Bar resampling
//!
//! Aggregates finer bars into a coarser timeframe. Buckets are aligned to
//! multiples of the timeframe since the Unix epoch and stamped with their
//! start time.

use chrono::{DateTime, Utc};

use crate::types::{Candle, CandleSeries, SeriesError, Timeframe};

struct BarBuilder {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl BarBuilder {
    fn new(timestamp: DateTime<Utc>, bar: &Candle) -> Self {
        Self {
            timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }

    fn add_bar(&mut self, bar: &Candle) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
        self.volume += bar.volume;
    }

    fn to_candle(&self) -> Candle {
        Candle {
            timestamp: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Start of the `timeframe` bucket containing `ts`
pub fn bucket_start(ts: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let secs = timeframe.duration().num_seconds();
    let start = ts.timestamp() - ts.timestamp().rem_euclid(secs);
    DateTime::from_timestamp(start, 0).unwrap_or(ts)
}

/// Aggregate `series` into `timeframe` bars; the last bucket may be partial
pub fn resample(series: &CandleSeries, timeframe: Timeframe) -> Result<CandleSeries, SeriesError> {
    let mut completed = Vec::new();
    let mut current: Option<BarBuilder> = None;

    for bar in series.candles() {
        let bucket = bucket_start(bar.timestamp, timeframe);
        match &mut current {
            Some(builder) if builder.timestamp == bucket => builder.add_bar(bar),
            Some(builder) => {
                completed.push(builder.to_candle());
                current = Some(BarBuilder::new(bucket, bar));
            }
            None => current = Some(BarBuilder::new(bucket, bar)),
        }
    }

    if let Some(builder) = current {
        completed.push(builder.to_candle());
    }

    CandleSeries::new(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::*;

    #[test]
    fn test_resample_to_five_minutes() {
        // ts(0) is 14:30 UTC, aligned to 5m and 15m
        let bars: Vec<Candle> = (0..12)
            .map(|i| {
                let p = 100.0 + i as f64;
                candle(i, p, p + 0.5, p - 0.5, p + 0.2, 10.0)
            })
            .collect();
        let out = resample(&series(bars), Timeframe::Min5).unwrap();

        assert_eq!(out.len(), 3);
        let first = out.candles()[0];
        assert_eq!(first.timestamp, ts(0));
        assert_eq!(first.open, 100.0);
        assert_eq!(first.high, 104.5);
        assert_eq!(first.low, 99.5);
        assert_eq!(first.close, 104.2);
        assert_eq!(first.volume, 50.0);

        // Partial trailing bucket
        let last = out.candles()[2];
        assert_eq!(last.timestamp, ts(10));
        assert_eq!(last.volume, 20.0);
    }

    #[test]
    fn test_bucket_alignment() {
        assert_eq!(bucket_start(ts(7), Timeframe::Min5), ts(5));
        assert_eq!(bucket_start(ts(44), Timeframe::Min15), ts(30));
        // 14:30 UTC falls in the 14:00 hour
        assert_eq!(bucket_start(ts(0), Timeframe::Hour1), ts(-30));
    }

    #[test]
    fn test_empty() {
        let out = resample(&CandleSeries::empty(), Timeframe::Hour1).unwrap();
        assert!(out.is_empty());
    }
}

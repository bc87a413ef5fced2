//! CSV candle files
//!
//! Reads `<dir>/<SYMBOL>_<tf>.csv` with a `timestamp,open,high,low,close,volume`
//! header and RFC 3339 timestamps. A missing higher-timeframe file is built
//! from the 1-minute file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::resample::resample;
use super::{Lookback, MarketDataProvider};
use crate::types::{Candle, CandleSeries, Timeframe};

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Candle files in one directory
#[derive(Debug, Clone)]
pub struct CsvMarketData {
    dir: PathBuf,
    lookback: Lookback,
}

impl CsvMarketData {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lookback: Lookback::default(),
        }
    }

    fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", symbol.to_uppercase(), timeframe.label()))
    }
}

/// Parse one candle file
pub async fn load_csv(path: &Path) -> Result<CandleSeries> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;

    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let mut candles = Vec::new();

    for result in reader.deserialize() {
        let row: CsvRow = result.with_context(|| format!("Failed to parse CSV row in {:?}", path))?;
        let timestamp = DateTime::parse_from_rfc3339(row.timestamp.trim())
            .with_context(|| format!("Failed to parse timestamp: {}", row.timestamp))?
            .with_timezone(&Utc);

        candles.push(Candle {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    debug!("Loaded {} bars from {:?}", candles.len(), path);
    CandleSeries::new(candles).with_context(|| format!("Invalid candles in {:?}", path))
}

#[async_trait]
impl MarketDataProvider for CsvMarketData {
    async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        end: Option<DateTime<Utc>>,
    ) -> Result<CandleSeries> {
        let limit = self.lookback.get(timeframe);
        let path = self.path_for(symbol, timeframe);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(load_csv(&path).await?.truncated(end, limit));
        }

        let minute_path = self.path_for(symbol, Timeframe::Min1);
        if timeframe != Timeframe::Min1 && tokio::fs::try_exists(&minute_path).await.unwrap_or(false) {
            debug!("No {} file for {}, resampling 1m bars", timeframe, symbol);
            let minutes = load_csv(&minute_path).await?.truncated(end, usize::MAX);
            let resampled = resample(&minutes, timeframe)
                .with_context(|| format!("Failed to resample {} to {}", symbol, timeframe))?;
            return Ok(resampled.truncated(None, limit));
        }

        warn!("No {} data for {} in {:?}", timeframe, symbol, self.dir);
        Ok(CandleSeries::empty())
    }
}

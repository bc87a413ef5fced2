//! Market data sources
//!
//! [`MarketDataProvider`] is the one interface the bot fetches candles
//! through; concrete sources are chosen at runtime behind
//! `Arc<dyn MarketDataProvider>`.

pub mod csv_source;
pub mod resample;
pub mod synthetic;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{CandleSeries, MultiTimeframe, Timeframe};

pub use csv_source::CsvMarketData;
pub use resample::resample;
pub use synthetic::{SyntheticConfig, SyntheticMarketData};

/// Bars kept per timeframe
#[derive(Debug, Clone, Copy)]
pub struct Lookback {
    pub hourly: usize,
    pub min15: usize,
    pub min5: usize,
    pub min1: usize,
}

impl Default for Lookback {
    fn default() -> Self {
        Self {
            hourly: 100,
            min15: 200,
            min5: 300,
            min1: 500,
        }
    }
}

impl Lookback {
    pub fn get(&self, timeframe: Timeframe) -> usize {
        match timeframe {
            Timeframe::Hour1 => self.hourly,
            Timeframe::Min15 => self.min15,
            Timeframe::Min5 => self.min5,
            Timeframe::Min1 => self.min1,
        }
    }
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Bars for one timeframe ending at or before `end` (latest when None).
    /// No data is an empty series, not an error.
    async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        end: Option<DateTime<Utc>>,
    ) -> Result<CandleSeries>;

    /// All four timeframes, fetched concurrently
    async fn fetch_multi_timeframe(
        &self,
        symbol: &str,
        end: Option<DateTime<Utc>>,
    ) -> Result<MultiTimeframe> {
        let (hourly, min15, min5, min1) = futures::try_join!(
            self.candles(symbol, Timeframe::Hour1, end),
            self.candles(symbol, Timeframe::Min15, end),
            self.candles(symbol, Timeframe::Min5, end),
            self.candles(symbol, Timeframe::Min1, end),
        )?;

        Ok(MultiTimeframe {
            hourly,
            min15,
            min5,
            min1,
        })
    }
}

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::shared::LookbackWindow;

pub mod error;

use error::MarketDataResult;

/// A single OHLCV bar for a ticker, with the volume-weighted average price.
///
/// Bars are produced by the external data collaborator and are assumed to be
/// fully ingested: a bar handed to this crate is never partially written.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub vwap: f64,
}

impl Bar {
    #[cfg(test)]
    pub(crate) fn new_simple(time: DateTime<Utc>, price: f64, volume: i64) -> Self {
        Self {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            vwap: price,
        }
    }

    /// Returns a formatted string representation of the bar data for display
    /// purposes.
    pub fn as_data_str(&self) -> String {
        format!(
            "time: {}\n\
             open: {:.2}\n\
             high: {:.2}\n\
             low: {:.2}\n\
             close: {:.2}\n\
             volume: {}\n\
             vwap: {:.2}",
            self.time, self.open, self.high, self.low, self.close, self.volume, self.vwap
        )
    }
}

impl fmt::Display for Bar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bar:")?;
        for line in self.as_data_str().lines() {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}

/// Read-only interface to the external time-series collaborator.
///
/// Persisting fetched or streamed bars is the collaborator's responsibility;
/// this crate only ever reads. All methods are idempotent. A ticker with no
/// stored data yields an empty series (or `None` for
/// [`latest_price`](Self::latest_price)), never an error: data unavailability
/// is handled per cycle by the callers, while `Err` is reserved for transport
/// failures.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Returns the most recent `window` bars for `ticker`, ordered
    /// chronologically (oldest first).
    async fn fetch_recent(&self, ticker: &str, window: LookbackWindow)
    -> MarketDataResult<Vec<Bar>>;

    /// Returns up to `window` bars for `ticker` whose timestamps do not exceed
    /// `as_of`, ordered chronologically. Used to bound evaluation at a
    /// simulated clock during backtests.
    async fn fetch_until(
        &self,
        ticker: &str,
        as_of: DateTime<Utc>,
        window: LookbackWindow,
    ) -> MarketDataResult<Vec<Bar>>;

    /// Returns the full stored history for `ticker`, ordered chronologically.
    async fn full_history(&self, ticker: &str) -> MarketDataResult<Vec<Bar>>;

    /// Returns the latest known price for `ticker`, if any data is stored.
    async fn latest_price(&self, ticker: &str) -> MarketDataResult<Option<f64>>;
}

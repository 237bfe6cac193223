use std::result;

use thiserror::Error;
use tokio::task::JoinError;

use crate::{market::error::MarketDataError, risk::error::RiskError, signal::error::SignalError};

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("no strategy registered under name `{0}`")]
    UnknownStrategy(String),

    #[error("no stored history for ticker `{ticker}`")]
    NoHistory { ticker: String },

    #[error("market data failure, {0}")]
    MarketData(#[from] MarketDataError),

    #[error("signal generation failure, {0}")]
    Signal(#[from] SignalError),

    #[error("risk engine failure, {0}")]
    Risk(#[from] RiskError),

    #[error("backtest task join failure, {0}")]
    TaskJoin(JoinError),

    #[error("backtest process handle already consumed")]
    ProcessAlreadyConsumed,

    #[error("snapshot interval must be at least 1 bar, got {bars}")]
    InvalidConfigurationSnapshotEvery { bars: usize },

    #[error("channel capacity must be at least 16, got {capacity}")]
    InvalidConfigurationChannelCapacity { capacity: usize },
}

pub type Result<T> = result::Result<T, BacktestError>;

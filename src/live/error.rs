use std::{result, sync::Arc};

use thiserror::Error;
use tokio::{
    sync::broadcast::error::{RecvError, SendError},
    task::JoinError,
};

use crate::{market::error::MarketDataError, risk::error::RiskError, signal::error::SignalError};

use super::state::LiveStatus;

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("live engine requires at least one ticker")]
    EmptyTickersVec,

    #[error("live engine requires at least one registered strategy")]
    EmptyStrategiesVec,

    #[error("intervals must be non-zero")]
    InvalidConfigurationZeroInterval,

    #[error("channel capacity must be at least 16, got {capacity}")]
    InvalidConfigurationChannelCapacity { capacity: usize },

    #[error("live process already shut down")]
    LiveAlreadyShutdown,

    #[error("live process already terminated, status: {0}")]
    LiveAlreadyTerminated(LiveStatus),

    #[error("live shutdown failed: {0}")]
    LiveShutdownFailed(Arc<LiveProcessFatalError>),
}

pub type Result<T> = result::Result<T, LiveError>;

/// Failures the process recovers from by restarting the control loop after
/// the configured interval.
#[derive(Error, Debug)]
pub enum LiveProcessRecoverableError {
    #[error("[Risk] {0}")]
    Risk(#[from] RiskError),

    #[error("[MarketData] {0}")]
    MarketData(#[from] MarketDataError),

    #[error("[Signal] {0}")]
    Signal(#[from] SignalError),
}

pub type LiveProcessRecoverableResult<T> = result::Result<T, LiveProcessRecoverableError>;

/// Failures that terminate the live process.
#[derive(Error, Debug)]
pub enum LiveProcessFatalError {
    #[error("shutdown signal channel recv error: {0}")]
    ShutdownSignalRecv(RecvError),

    #[error("failed to send live process shutdown signal: {0}")]
    SendShutdownSignalFailed(SendError<()>),

    #[error("live process task join failure: {0}")]
    LiveProcessTaskJoin(JoinError),

    #[error("live shutdown timed out")]
    ShutdownTimeout,
}

pub type LiveProcessFatalResult<T> = result::Result<T, LiveProcessFatalError>;

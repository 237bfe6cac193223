use std::result;

use thiserror::Error;

use crate::broker::error::BrokerError;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum RiskConfigError {
    #[error("max position size must be within (0.0, 1.0], got {fraction}")]
    InvalidMaxPositionSize { fraction: f64 },

    #[error("position step size must be within (0.0, 1.0], got {fraction}")]
    InvalidPositionStepSize { fraction: f64 },

    #[error("max total exposure must be positive, got {fraction}")]
    InvalidMaxTotalExposure { fraction: f64 },

    #[error("loss thresholds must be negative, got {fraction}")]
    InvalidLossThreshold { fraction: f64 },

    #[error(
        "score bands must lie in [0.0, 1.0] with weak_long <= strong_short, \
         got weak_long {weak_long}, strong_short {strong_short}"
    )]
    InvalidScoreBands { weak_long: f64, strong_short: f64 },

    #[error("momentum threshold must be positive, got {fraction}")]
    InvalidMomentumThreshold { fraction: f64 },

    #[error("stagnation rule requires days >= 1 and pl_pct > 0, got {days} days, {pl_pct}")]
    InvalidStagnationRule { days: i64, pl_pct: f64 },

    #[error("starting balance must be positive, got {balance}")]
    InvalidStartingBalance { balance: f64 },
}

pub type RiskConfigResult<T> = result::Result<T, RiskConfigError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

pub type LedgerResult<T> = result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type RiskResult<T> = result::Result<T, RiskError>;

use thiserror::Error;

use crate::util::PanicPayload;

pub type SignalResult<T> = Result<T, SignalError>;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("strategy panicked while reporting its name, payload: {0}")]
    StrategyNamePanicked(PanicPayload),
    #[error("strategy panicked while reporting its lookback, payload: {0}")]
    StrategyLookbackPanicked(PanicPayload),
    #[error("strategy panicked during evaluation, payload: {0}")]
    StrategyEvaluatePanicked(PanicPayload),
    #[error("strategy evaluation failed, {0}")]
    StrategyEvaluateError(String),
    #[error("no strategy registered under name `{0}`")]
    UnknownStrategy(String),
    #[error(transparent)]
    MarketData(#[from] crate::market::error::MarketDataError),
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ScoreValidationError {
    #[error("score must be within [0.0, 1.0], got {score}")]
    OutOfRange { score: f64 },
}

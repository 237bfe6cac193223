use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookbackWindowValidationError {
    #[error("Lookback window must be between {min} and {max} bars, got {bars}")]
    OutOfRange { bars: u64, min: u64, max: u64 },
}

use std::result;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("[Transport] {0}")]
    Transport(String),
}

pub type MarketDataResult<T> = result::Result<T, MarketDataError>;

use std::result;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("[Transport] {0}")]
    Transport(String),

    #[error("Order rejected by brokerage: {reason}")]
    Rejected { reason: String },
}

pub type BrokerResult<T> = result::Result<T, BrokerError>;

mod config;
mod engine;
mod process;
mod state;

pub(crate) mod error;

pub use config::LiveTradeConfig;
pub use engine::{LiveTradeController, LiveTradeEngine};
pub use state::{LiveReader, LiveReceiver, LiveSnapshot, LiveStatus, LiveUpdate};

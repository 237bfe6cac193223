mod config;
mod controller;
mod engine;
mod state;

pub(crate) mod error;

pub use config::BacktestConfig;
pub use controller::BacktestController;
pub use engine::{BacktestOrchestrator, StartBacktest};
pub use state::{
    BacktestReceiver, BacktestSnapshot, BacktestStatus, BacktestStatusManager,
    BacktestTransmitter, BacktestUpdate,
};

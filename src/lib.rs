#![doc = include_str!("../README.md")]

/// Exports [`BacktestOrchestrator`] and other types related to per-ticker
/// history replays.
///
/// [`BacktestOrchestrator`]: crate::backtest::BacktestOrchestrator
pub mod backtest;
/// Exports the [`Brokerage`] trait and the order and account types it speaks.
///
/// [`Brokerage`]: crate::broker::Brokerage
pub mod broker;
/// Exports [`LiveTradeEngine`], [`LiveTradeController`], and other types
/// related to the live trading control loop.
///
/// [`LiveTradeEngine`]: crate::live::LiveTradeEngine
/// [`LiveTradeController`]: crate::live::LiveTradeController
pub mod live;
/// Exports the [`MarketData`] trait and the [`Bar`] type it serves.
///
/// [`MarketData`]: crate::market::MarketData
/// [`Bar`]: crate::market::Bar
pub mod market;
/// Exports [`Position`], [`ClosedPositionHistory`], and other portfolio
/// bookkeeping types.
///
/// [`Position`]: crate::position::Position
/// [`ClosedPositionHistory`]: crate::position::ClosedPositionHistory
pub mod position;
/// Exports [`PositionManager`], [`RiskConfig`], and other types related to
/// sizing, exits, and ledger execution.
///
/// [`PositionManager`]: crate::risk::PositionManager
/// [`RiskConfig`]: crate::risk::RiskConfig
pub mod risk;
mod shared;
/// Exports the [`Strategy`] trait, [`StrategyAggregator`], and other types
/// related to signal generation.
///
/// [`Strategy`]: crate::signal::Strategy
/// [`StrategyAggregator`]: crate::signal::StrategyAggregator
pub mod signal;
mod util;

/// Error types returned by `stratoxide`.
pub mod error {
    pub use super::backtest::error::BacktestError;
    pub use super::broker::error::BrokerError;
    pub use super::live::error::{LiveError, LiveProcessFatalError, LiveProcessRecoverableError};
    pub use super::market::error::MarketDataError;
    pub use super::risk::error::{LedgerError, RiskConfigError, RiskError};
    pub use super::shared::error::LookbackWindowValidationError;
    pub use super::signal::error::{ScoreValidationError, SignalError};
    pub use super::util::PanicPayload;

    /// Convenience general-purpose Result type alias.
    pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
}

/// Exports shared configuration and model types.
pub mod models {
    pub use super::shared::LookbackWindow;
}

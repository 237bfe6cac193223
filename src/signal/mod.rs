mod aggregator;
mod core;
pub(crate) mod error;

pub use aggregator::{AggregatorConfig, MergePolicy, SignalMode, StrategyAggregator};
pub use core::{Score, Signal, SignalAction, Strategy};

#[cfg(test)]
mod tests;

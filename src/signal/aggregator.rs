use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{market::MarketData, shared::LookbackWindow};

use super::{
    core::{Signal, Strategy, WrappedStrategy},
    error::{SignalError, SignalResult},
};

/// Clock context for a signal generation pass.
#[derive(Debug, Clone, Copy)]
pub enum SignalMode {
    /// Evaluate against the most recent stored bars.
    Live,
    /// Evaluate as if the clock read `as_of`, seeing only bars at or before
    /// that instant. Used by backtests to prevent lookahead.
    Backtest { as_of: DateTime<Utc> },
}

/// Rule used to pick one signal per ticker when several strategies speak at
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// The earliest-registered strategy that produced a signal wins.
    Priority,
    /// The signal whose score lies furthest from neutral wins. Ties go to the
    /// earlier-registered strategy.
    #[default]
    StrongestConviction,
}

/// Configuration parameters for a [`StrategyAggregator`].
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    window: LookbackWindow,
    merge_policy: MergePolicy,
}

impl AggregatorConfig {
    /// Returns a new config with the provided default lookback window. The
    /// window applies to every strategy that does not declare its own.
    pub fn with_window(mut self, window: LookbackWindow) -> Self {
        self.window = window;
        self
    }

    /// Returns a new config with the provided merge policy.
    pub fn with_merge_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    pub fn window(&self) -> LookbackWindow {
        self.window
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window: LookbackWindow::DEFAULT,
            merge_policy: MergePolicy::default(),
        }
    }
}

/// Fans a set of tickers out to every registered strategy and merges the
/// results down to at most one [`Signal`] per ticker.
///
/// Strategies are isolated from one another: a strategy that fails or panics
/// is logged and skipped for that cycle, and the remaining strategies still
/// run. Registration order is significant, it breaks ties under both merge
/// policies.
pub struct StrategyAggregator {
    config: AggregatorConfig,
    data: Arc<dyn MarketData>,
    tickers: Vec<String>,
    strategies: Vec<WrappedStrategy>,
}

impl StrategyAggregator {
    pub fn new(config: AggregatorConfig, data: Arc<dyn MarketData>, tickers: Vec<String>) -> Self {
        Self {
            config,
            data,
            tickers,
            strategies: Vec::new(),
        }
    }

    /// Registers a strategy. Later registrations rank lower for tie-breaking.
    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        self.strategies.push(WrappedStrategy::new(strategy));
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Returns the names of all registered strategies, in registration order.
    /// A strategy that panics while reporting its name is skipped.
    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies
            .iter()
            .filter_map(|s| match s.name() {
                Ok(name) => Some(name),
                Err(e) => {
                    warn!("skipping unnameable strategy, {e}");
                    None
                }
            })
            .collect()
    }

    pub fn has_strategy(&self, name: &str) -> bool {
        self.strategy_names().iter().any(|n| n == name)
    }

    /// Runs every registered strategy over every ticker and returns the merged
    /// winner per ticker. Tickers with no stored data, and strategies that
    /// fail or panic, are skipped for the cycle. `Hold` signals are dropped
    /// before merging.
    pub async fn generate_signals(
        &self,
        mode: SignalMode,
    ) -> SignalResult<HashMap<String, Signal>> {
        let mut merged: HashMap<String, Signal> = HashMap::new();

        for ticker in &self.tickers {
            let mut best: Option<(usize, Signal)> = None;

            for (rank, strategy) in self.strategies.iter().enumerate() {
                let candidate = match self.evaluate_one(strategy, ticker, mode).await {
                    Ok(candidate) => candidate,
                    Err(e) => {
                        warn!(ticker, "strategy skipped for this cycle, {e}");
                        continue;
                    }
                };

                let Some(signal) = candidate else {
                    continue;
                };

                if !signal.action.is_actionable() {
                    continue;
                }

                best = Some(match best.take() {
                    None => (rank, signal),
                    Some(current) => self.merge(current, (rank, signal)),
                });
            }

            if let Some((_, signal)) = best {
                merged.insert(ticker.clone(), signal);
            }
        }

        Ok(merged)
    }

    /// Runs a single named strategy over a single ticker at the given instant.
    /// Used by backtests, which pin one strategy per run.
    pub async fn generate_for(
        &self,
        ticker: &str,
        strategy_name: &str,
        as_of: DateTime<Utc>,
    ) -> SignalResult<Option<Signal>> {
        for strategy in &self.strategies {
            if strategy.name()? != strategy_name {
                continue;
            }

            return self
                .evaluate_one(strategy, ticker, SignalMode::Backtest { as_of })
                .await;
        }

        Err(SignalError::UnknownStrategy(strategy_name.to_string()))
    }

    async fn evaluate_one(
        &self,
        strategy: &WrappedStrategy,
        ticker: &str,
        mode: SignalMode,
    ) -> SignalResult<Option<Signal>> {
        let window = strategy.lookback()?.unwrap_or(self.config.window);

        let bars = match mode {
            SignalMode::Live => self.data.fetch_recent(ticker, window).await?,
            SignalMode::Backtest { as_of } => {
                self.data.fetch_until(ticker, as_of, window).await?
            }
        };

        if bars.is_empty() {
            return Ok(None);
        }

        strategy.evaluate(ticker, &bars).await
    }

    fn merge(&self, current: (usize, Signal), candidate: (usize, Signal)) -> (usize, Signal) {
        match self.config.merge_policy {
            MergePolicy::Priority => {
                if candidate.0 < current.0 {
                    candidate
                } else {
                    current
                }
            }
            MergePolicy::StrongestConviction => {
                let (cur_conv, cand_conv) =
                    (current.1.score.conviction(), candidate.1.score.conviction());

                if cand_conv > cur_conv || (cand_conv == cur_conv && candidate.0 < current.0) {
                    candidate
                } else {
                    current
                }
            }
        }
    }
}

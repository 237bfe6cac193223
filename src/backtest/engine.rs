use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    market::{Bar, MarketData},
    risk::{PositionManager, RiskConfig},
    signal::{Signal, SignalAction, StrategyAggregator},
    util::AbortOnDropHandle,
};

use super::{
    config::BacktestConfig,
    controller::BacktestController,
    error::{BacktestError, Result},
    state::{BacktestSnapshot, BacktestStatus, BacktestStatusManager, BacktestTransmitter, BacktestUpdate},
};

/// Outcome of a start request.
#[derive(Debug, Clone)]
pub enum StartBacktest {
    /// A new run was accepted; the controller follows it.
    Started(Arc<BacktestController>),
    /// The ticker already has an active run. No new run was started.
    AlreadyRunning,
}

impl StartBacktest {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    pub fn is_already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning)
    }
}

type ActiveRuns = Arc<Mutex<HashMap<String, Arc<BacktestController>>>>;

/// Removes its ticker from the active set when the run future completes or
/// is dropped by an abort.
struct ActiveRunGuard {
    ticker: String,
    active: ActiveRuns,
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .expect("active-run mutex can't be poisoned")
            .remove(&self.ticker);
    }
}

/// Schedules per-ticker history replays, at most one active run per ticker.
///
/// Each accepted run spawns an independent task with its own simulated ledger
/// and pushes incremental state to subscribers over a broadcast channel.
pub struct BacktestOrchestrator {
    config: BacktestConfig,
    risk_config: RiskConfig,
    data: Arc<dyn MarketData>,
    aggregator: Arc<StrategyAggregator>,
    active: ActiveRuns,
}

impl BacktestOrchestrator {
    pub fn new(
        config: BacktestConfig,
        risk_config: RiskConfig,
        data: Arc<dyn MarketData>,
        aggregator: Arc<StrategyAggregator>,
    ) -> Self {
        Self {
            config,
            risk_config,
            data,
            aggregator,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the tickers with an active run.
    pub fn active_tickers(&self) -> Vec<String> {
        self.lock_active().keys().cloned().collect()
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<BacktestController>>> {
        self.active
            .lock()
            .expect("active-run mutex can't be poisoned")
    }

    /// Starts a replay of `strategy_name` over the full stored history of
    /// `ticker`.
    ///
    /// An unknown strategy or a ticker with no stored bars is a typed error;
    /// a ticker that is already running is a [`StartBacktest::AlreadyRunning`]
    /// outcome, not an error. The active set is checked and claimed under one
    /// lock, so two concurrent starts for the same ticker resolve to exactly
    /// one accepted run.
    pub async fn start_backtest(&self, ticker: &str, strategy_name: &str) -> Result<StartBacktest> {
        if !self.aggregator.has_strategy(strategy_name) {
            return Err(BacktestError::UnknownStrategy(strategy_name.to_string()));
        }

        let bars = self.data.full_history(ticker).await?;
        if bars.is_empty() {
            return Err(BacktestError::NoHistory {
                ticker: ticker.to_string(),
            });
        }

        let (update_tx, _) = broadcast::channel::<BacktestUpdate>(self.config.channel_capacity());
        let status_manager = BacktestStatusManager::new(update_tx.clone());

        let mut active = self.lock_active();

        if active.contains_key(ticker) {
            debug!(ticker, "backtest start rejected, already running");
            return Ok(StartBacktest::AlreadyRunning);
        }

        let guard = ActiveRunGuard {
            ticker: ticker.to_string(),
            active: self.active.clone(),
        };

        let run = BacktestRun {
            ticker: ticker.to_string(),
            strategy_name: strategy_name.to_string(),
            bars,
            snapshot_every: self.config.snapshot_every(),
            risk_config: self.risk_config,
            aggregator: self.aggregator.clone(),
            status_manager: status_manager.clone(),
            update_tx,
        };

        let handle: AbortOnDropHandle<()> = tokio::spawn(async move {
            // Owned by the task so an abort releases the ticker too.
            let _guard = guard;

            let final_status = match run.replay().await {
                Ok(()) => BacktestStatus::Finished,
                Err(e) => BacktestStatus::Failed(Arc::new(e)),
            };

            run.status_manager.update(final_status);
        })
        .into();

        let controller = BacktestController::new(ticker.to_string(), handle, status_manager);
        active.insert(ticker.to_string(), controller.clone());
        drop(active);

        info!(ticker, strategy = strategy_name, "backtest started");
        Ok(StartBacktest::Started(controller))
    }

    /// Aborts the active run for `ticker`, if any. Returns `true` if a run
    /// was stopped.
    pub async fn stop_backtest(&self, ticker: &str) -> bool {
        let controller = self.lock_active().remove(ticker);

        match controller {
            Some(controller) => {
                match controller.abort().await {
                    // A `TaskJoin` error is expected after an abort.
                    Ok(()) | Err(BacktestError::TaskJoin(_)) => {}
                    Err(BacktestError::ProcessAlreadyConsumed) => {
                        warn!(ticker, "backtest handle already consumed, nothing to abort");
                    }
                    Err(e) => {
                        warn!(ticker, error = %e, "backtest abort failed");
                    }
                }
                info!(ticker, "backtest stopped");
                true
            }
            None => false,
        }
    }

    /// Aborts every active run.
    pub async fn shutdown(&self) {
        let controllers: Vec<Arc<BacktestController>> =
            self.lock_active().drain().map(|(_, c)| c).collect();

        for controller in controllers {
            let _ = controller.abort().await;
        }
    }
}

struct BacktestRun {
    ticker: String,
    strategy_name: String,
    bars: Vec<Bar>,
    snapshot_every: usize,
    risk_config: RiskConfig,
    aggregator: Arc<StrategyAggregator>,
    status_manager: Arc<BacktestStatusManager>,
    update_tx: BacktestTransmitter,
}

impl BacktestRun {
    /// Replays the stored history bar by bar against a fresh simulated
    /// ledger, pushing snapshots as the clock advances.
    async fn replay(&self) -> Result<()> {
        self.status_manager.update(BacktestStatus::Starting);

        let manager = PositionManager::simulated(self.risk_config);
        let total_bars = self.bars.len();

        self.status_manager.update(BacktestStatus::Running);

        for (i, bar) in self.bars.iter().enumerate() {
            let clock = bar.time;

            let prices = HashMap::from([(self.ticker.clone(), bar.close)]);
            manager.apply_price_update(&prices).await;

            let signal = self
                .aggregator
                .generate_for(&self.ticker, &self.strategy_name, clock)
                .await?;

            let mut signals = HashMap::new();
            if let Some(signal) = &signal {
                signals.insert(self.ticker.clone(), signal.clone());
            }

            manager.check_positions(&signals, clock).await?;

            if let Some(signal) = &signal {
                if signal.action == SignalAction::Buy {
                    manager.process_entry(signal, None).await?;
                }
            }

            if (i + 1) % self.snapshot_every == 0 || i + 1 == total_bars {
                self.push_snapshot(clock, signal, &manager).await?;
            }
        }

        Ok(())
    }

    async fn push_snapshot(
        &self,
        time: DateTime<Utc>,
        signal: Option<Signal>,
        manager: &PositionManager,
    ) -> Result<()> {
        let snapshot = BacktestSnapshot {
            time,
            ticker: self.ticker.clone(),
            signal,
            positions: manager.positions().await,
            account: manager.account().await.map_err(BacktestError::Risk)?,
        };

        // Ignore no-receivers errors
        let _ = self.update_tx.send(snapshot.into());

        Ok(())
    }
}

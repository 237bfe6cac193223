use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::{sync::broadcast, time};
use tracing::{debug, warn};

use crate::{
    market::MarketData,
    risk::{CloseOutcome, PositionManager},
    signal::{SignalAction, SignalMode, StrategyAggregator},
    util::{AbortOnDropHandle, Never},
};

use super::{
    config::{LiveProcessConfig, LiveTradeConfig},
    error::{LiveProcessFatalError, LiveProcessFatalResult, LiveProcessRecoverableResult},
    state::{LiveSnapshot, LiveStatus, LiveStatusManager, LiveTransmitter},
};

pub(super) struct LiveProcess {
    config: LiveProcessConfig,
    shutdown_tx: broadcast::Sender<()>,
    data: Arc<dyn MarketData>,
    aggregator: Arc<StrategyAggregator>,
    manager: Arc<PositionManager>,
    status_manager: Arc<LiveStatusManager>,
    update_tx: LiveTransmitter,
}

impl LiveProcess {
    pub fn spawn(
        config: &LiveTradeConfig,
        shutdown_tx: broadcast::Sender<()>,
        data: Arc<dyn MarketData>,
        aggregator: Arc<StrategyAggregator>,
        manager: Arc<PositionManager>,
        status_manager: Arc<LiveStatusManager>,
        update_tx: LiveTransmitter,
    ) -> AbortOnDropHandle<LiveProcessFatalResult<()>> {
        let config = config.into();

        tokio::spawn(async move {
            let process = Self {
                config,
                shutdown_tx,
                data,
                aggregator,
                manager,
                status_manager,
                update_tx,
            };

            process.recovery_loop().await
        })
        .into()
    }

    /// Runs the control loop, restarting it after recoverable errors until a
    /// shutdown signal arrives.
    async fn recovery_loop(self) -> LiveProcessFatalResult<()> {
        self.status_manager.update(LiveStatus::Starting);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let recoverable = tokio::select! {
                Err(e) = self.run() => e,
                shutdown_res = shutdown_rx.recv() => {
                    let Err(e) = shutdown_res else {
                        return Ok(());
                    };

                    let status = LiveProcessFatalError::ShutdownSignalRecv(e).into();
                    self.status_manager.update(status);

                    return Ok(());
                }
            };

            self.status_manager.update(recoverable.into());

            tokio::select! {
                _ = time::sleep(self.config.restart_interval()) => {}
                shutdown_res = shutdown_rx.recv() => {
                    let Err(e) = shutdown_res else {
                        return Ok(());
                    };

                    let status = LiveProcessFatalError::ShutdownSignalRecv(e).into();
                    self.status_manager.update(status);

                    return Ok(());
                }
            }

            self.status_manager.update(LiveStatus::Restarting);
        }
    }

    async fn run(&self) -> LiveProcessRecoverableResult<Never> {
        self.status_manager.update(LiveStatus::Running);

        loop {
            self.iterate().await?;
            time::sleep(self.config.tick_interval()).await;
        }
    }

    /// One control-loop cycle. Reconciles with the brokerage, refreshes
    /// prices, generates signals, runs exit checks, then stepped entries, and
    /// broadcasts a portfolio snapshot.
    ///
    /// Per-ticker failures are logged and skipped so one bad quote or order
    /// does not take the whole cycle down. Failures of the cycle-wide stages
    /// are returned as recoverable errors.
    async fn iterate(&self) -> LiveProcessRecoverableResult<()> {
        let now = Utc::now();

        self.manager.sync(now).await?;

        let mut prices = HashMap::new();
        for ticker in self.aggregator.tickers() {
            match self.data.latest_price(ticker).await {
                Ok(Some(price)) => {
                    prices.insert(ticker.clone(), price);
                }
                Ok(None) => debug!(ticker, "no quote this cycle"),
                Err(e) => warn!(ticker, error = %e, "quote fetch failed, skipping ticker"),
            }
        }

        self.manager.apply_price_update(&prices).await;

        let signals = self.aggregator.generate_signals(SignalMode::Live).await?;

        for signal in signals.values() {
            // Ignore no-receivers errors
            let _ = self.update_tx.send(signal.clone().into());
        }

        match self.manager.check_positions(&signals, now).await {
            Ok(executed) => {
                for close in executed {
                    if let CloseOutcome::Closed(closed) = close.outcome {
                        let _ = self.update_tx.send(closed.into());
                    }
                }
            }
            Err(e) => warn!(error = %e, "exit checks failed"),
        }

        for signal in signals.values() {
            if signal.action != SignalAction::Buy {
                continue;
            }

            let entry_res = async {
                let target = self.manager.stepped_target(&signal.ticker).await?;
                self.manager.process_entry(signal, Some(target)).await
            }
            .await;

            if let Err(e) = entry_res {
                warn!(ticker = %signal.ticker, error = %e, "entry processing failed");
            }
        }

        match self.manager.account().await {
            Ok(account) => {
                let snapshot = LiveSnapshot {
                    time: now,
                    positions: self.manager.positions().await,
                    pending_orders: self.manager.pending_orders().await,
                    account,
                };

                let _ = self.update_tx.send(snapshot.into());
            }
            Err(e) => warn!(error = %e, "account snapshot failed"),
        }

        Ok(())
    }
}

use std::sync::{Arc, Mutex};

use tokio::{sync::broadcast, time};

use crate::{
    broker::Brokerage,
    market::MarketData,
    risk::{PositionManager, RiskConfig},
    signal::StrategyAggregator,
    util::AbortOnDropHandle,
};

use super::{
    config::{LiveControllerConfig, LiveTradeConfig},
    error::{LiveError, LiveProcessFatalError, LiveProcessFatalResult, Result},
    process::LiveProcess,
    state::{LiveReader, LiveReceiver, LiveStatus, LiveStatusManager, LiveUpdate},
};

/// Controller for managing and monitoring a running live trading process.
/// Provides an interface to monitor status, receive updates, and perform
/// graceful shutdown operations.
pub struct LiveTradeController {
    config: LiveControllerConfig,
    process_handle: Mutex<Option<AbortOnDropHandle<LiveProcessFatalResult<()>>>>,
    shutdown_tx: broadcast::Sender<()>,
    status_manager: Arc<LiveStatusManager>,
}

impl LiveTradeController {
    fn new(
        config: &LiveTradeConfig,
        process_handle: AbortOnDropHandle<LiveProcessFatalResult<()>>,
        shutdown_tx: broadcast::Sender<()>,
        status_manager: Arc<LiveStatusManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: config.into(),
            process_handle: Mutex::new(Some(process_handle)),
            shutdown_tx,
            status_manager,
        })
    }

    /// Returns a [`LiveReader`] interface for accessing live status and updates.
    pub fn reader(&self) -> Arc<dyn LiveReader> {
        self.status_manager.clone()
    }

    /// Creates a new [`LiveReceiver`] for subscribing to live status and updates.
    pub fn update_receiver(&self) -> LiveReceiver {
        self.status_manager.update_receiver()
    }

    /// Returns the current [`LiveStatus`] as a snapshot.
    pub fn status_snapshot(&self) -> LiveStatus {
        self.status_manager.status_snapshot()
    }

    fn try_consume_handle(&self) -> Option<AbortOnDropHandle<LiveProcessFatalResult<()>>> {
        self.process_handle
            .lock()
            .expect("`LiveTradeController` mutex can't be poisoned")
            .take()
    }

    /// Tries to perform a clean shutdown of the live trading process and
    /// consumes the task handle. If a clean shutdown fails, the process is
    /// aborted.
    ///
    /// This method can only be called once per controller instance.
    ///
    /// Returns an error if the process had to be aborted, or if the handle was
    /// already consumed.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(mut handle) = self.try_consume_handle() else {
            return Err(LiveError::LiveAlreadyShutdown);
        };

        if handle.is_finished() {
            let status = self.status_manager.status_snapshot();
            return Err(LiveError::LiveAlreadyTerminated(status));
        }

        self.status_manager.update(LiveStatus::ShutdownInitiated);

        let live_shutdown_send_res = self.shutdown_tx.send(()).map_err(|e| {
            handle.abort();
            LiveProcessFatalError::SendShutdownSignalFailed(e)
        });

        let live_shutdown_res = match live_shutdown_send_res {
            Ok(_) => {
                tokio::select! {
                    join_res = &mut handle => {
                        join_res.map_err(LiveProcessFatalError::LiveProcessTaskJoin).and_then(|r| r)
                    }
                    _ = time::sleep(self.config.shutdown_timeout()) => {
                        handle.abort();
                        Err(LiveProcessFatalError::ShutdownTimeout)
                    }
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = live_shutdown_res {
            let e_ref = Arc::new(e);
            self.status_manager.update(e_ref.clone().into());

            return Err(LiveError::LiveShutdownFailed(e_ref));
        }

        self.status_manager.update(LiveStatus::Shutdown);
        Ok(())
    }

    /// Waits until the live trading process has stopped and returns the final
    /// status, either through graceful shutdown or termination.
    pub async fn until_stopped(&self) -> LiveStatus {
        let mut live_rx = self.update_receiver();

        let status = self.status_snapshot();
        if status.is_stopped() {
            return status;
        }

        loop {
            match live_rx.recv().await {
                Ok(live_update) => {
                    if let LiveUpdate::Status(status) = live_update
                        && status.is_stopped()
                    {
                        return status;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    let status = self.status_snapshot();
                    if status.is_stopped() {
                        return status;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return self.status_snapshot(),
            }
        }
    }
}

/// Builder for configuring and starting a live trading engine. Encapsulates
/// the configuration, market data source, brokerage connection, signal
/// aggregator, and position manager. The live trading process is started when
/// [`start`](Self::start) is called, returning a [`LiveTradeController`].
pub struct LiveTradeEngine {
    config: LiveTradeConfig,
    data: Arc<dyn MarketData>,
    aggregator: Arc<StrategyAggregator>,
    manager: Arc<PositionManager>,
    status_manager: Arc<LiveStatusManager>,
    update_tx: broadcast::Sender<LiveUpdate>,
}

impl LiveTradeEngine {
    /// Creates a new live trading engine. Trading decisions flow from the
    /// aggregator's merged signals through the risk engine to the brokerage.
    ///
    /// Returns an error if the aggregator has no tickers or no registered
    /// strategies.
    pub fn new(
        config: LiveTradeConfig,
        risk_config: RiskConfig,
        data: Arc<dyn MarketData>,
        broker: Arc<dyn Brokerage>,
        aggregator: StrategyAggregator,
    ) -> Result<Self> {
        if aggregator.tickers().is_empty() {
            return Err(LiveError::EmptyTickersVec);
        }

        if aggregator.strategy_names().is_empty() {
            return Err(LiveError::EmptyStrategiesVec);
        }

        let manager = Arc::new(PositionManager::live(risk_config, broker));

        let (update_tx, _) = broadcast::channel::<LiveUpdate>(config.channel_capacity());

        let status_manager = LiveStatusManager::new(update_tx.clone());

        Ok(Self {
            config,
            data,
            aggregator: Arc::new(aggregator),
            manager,
            status_manager,
            update_tx,
        })
    }

    /// Returns a [`LiveReader`] interface for accessing live status and updates.
    pub fn reader(&self) -> Arc<dyn LiveReader> {
        self.status_manager.clone()
    }

    /// Creates a new [`LiveReceiver`] for subscribing to live status and updates.
    pub fn update_receiver(&self) -> LiveReceiver {
        self.status_manager.update_receiver()
    }

    /// Returns the current [`LiveStatus`] as a snapshot.
    pub fn status_snapshot(&self) -> LiveStatus {
        self.status_manager.status_snapshot()
    }

    /// Starts the live trading process and returns a [`LiveTradeController`]
    /// for managing it. This consumes the engine and spawns the live trading
    /// task in the background.
    pub fn start(self) -> Arc<LiveTradeController> {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let process_handle = LiveProcess::spawn(
            &self.config,
            shutdown_tx.clone(),
            self.data,
            self.aggregator,
            self.manager,
            self.status_manager.clone(),
            self.update_tx,
        );

        LiveTradeController::new(
            &self.config,
            process_handle,
            shutdown_tx,
            self.status_manager,
        )
    }
}

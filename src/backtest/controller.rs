use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;

use crate::util::AbortOnDropHandle;

use super::{
    error::{BacktestError, Result},
    state::{BacktestReceiver, BacktestStatus, BacktestStatusManager, BacktestUpdate},
};

/// Handle to one running backtest.
///
/// Observers subscribe through [`receiver`](Self::receiver); dropping a
/// receiver never affects the run. The task handle can be consumed exactly
/// once, by waiting or aborting.
#[derive(Debug)]
pub struct BacktestController {
    ticker: String,
    handle: Mutex<Option<AbortOnDropHandle<()>>>,
    status_manager: Arc<BacktestStatusManager>,
}

impl BacktestController {
    pub(super) fn new(
        ticker: String,
        handle: AbortOnDropHandle<()>,
        status_manager: Arc<BacktestStatusManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ticker,
            handle: Mutex::new(Some(handle)),
            status_manager,
        })
    }

    /// Returns the ticker this run replays.
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn receiver(&self) -> BacktestReceiver {
        self.status_manager.receiver()
    }

    pub fn status_snapshot(&self) -> BacktestStatus {
        self.status_manager.snapshot()
    }

    fn try_consume_handle(&self) -> Option<AbortOnDropHandle<()>> {
        self.handle
            .lock()
            .expect("`BacktestController` mutex can't be poisoned")
            .take()
    }

    /// Waits until the backtest has stopped and returns the final status.
    ///
    /// Unlike [`wait_for_completion`](Self::wait_for_completion) this does
    /// not consume the task handle, so any number of observers can wait.
    pub async fn until_stopped(&self) -> BacktestStatus {
        let mut backtest_rx = self.receiver();

        let status = self.status_snapshot();
        if status.is_stopped() {
            return status;
        }

        loop {
            match backtest_rx.recv().await {
                Ok(backtest_update) => {
                    if let BacktestUpdate::Status(status) = backtest_update
                        && status.is_stopped()
                    {
                        return status;
                    }
                }
                Err(RecvError::Lagged(_)) => {
                    let status = self.status_snapshot();
                    if status.is_stopped() {
                        return status;
                    }
                }
                Err(RecvError::Closed) => return self.status_snapshot(),
            }
        }
    }

    /// Consumes the task handle and waits for the backtest to complete.
    /// This method can only be called once per controller instance.
    /// Returns an error if the internal task was not properly handled.
    pub async fn wait_for_completion(&self) -> Result<()> {
        if let Some(handle) = self.try_consume_handle() {
            return handle.await.map_err(BacktestError::TaskJoin);
        }

        Err(BacktestError::ProcessAlreadyConsumed)
    }

    /// Consumes the task handle and aborts the backtest.
    /// This method can only be called once per controller instance.
    /// Returns an error if the internal task was not properly handled.
    pub async fn abort(&self) -> Result<()> {
        if let Some(handle) = self.try_consume_handle() {
            if !handle.is_finished() {
                handle.abort();
                // The task may have finished between the check and the abort,
                // so the terminal status must not be overwritten.
                self.status_manager
                    .update_if_not_stopped(BacktestStatus::Aborted);
            }

            return handle.await.map_err(BacktestError::TaskJoin);
        }

        Err(BacktestError::ProcessAlreadyConsumed)
    }
}

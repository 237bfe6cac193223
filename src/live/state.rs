use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::{
    broker::AccountSnapshot,
    position::{ClosedPosition, PendingOrder, Position},
    signal::Signal,
};

use super::error::{LiveProcessFatalError, LiveProcessRecoverableError};

/// Represents the current status of the live trading process.
#[derive(Debug, Clone)]
pub enum LiveStatus {
    /// Live process has been created but not yet started.
    NotInitiated,
    /// Live process is initializing.
    Starting,
    /// Control loop is actively running.
    Running,
    /// Live process encountered a recoverable error.
    Failed(Arc<LiveProcessRecoverableError>),
    /// Live process is restarting after a recoverable error.
    Restarting,
    /// Shutdown has been initiated.
    ShutdownInitiated,
    /// Live process has been shut down.
    Shutdown,
    /// Live process encountered a fatal error and terminated.
    Terminated(Arc<LiveProcessFatalError>),
}

impl LiveStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }

    /// Whether the live process has stopped for good, either through graceful
    /// shutdown or termination.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Shutdown | Self::Terminated(_))
    }
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitiated => write!(f, "Not initiated"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Failed(error) => write!(f, "Failed: {error}"),
            Self::Restarting => write!(f, "Restarting"),
            Self::ShutdownInitiated => write!(f, "Shutdown initiated"),
            Self::Shutdown => write!(f, "Shutdown"),
            Self::Terminated(error) => write!(f, "Terminated: {error}"),
        }
    }
}

impl From<LiveProcessRecoverableError> for LiveStatus {
    fn from(value: LiveProcessRecoverableError) -> Self {
        Self::Failed(Arc::new(value))
    }
}

impl From<Arc<LiveProcessFatalError>> for LiveStatus {
    fn from(value: Arc<LiveProcessFatalError>) -> Self {
        Self::Terminated(value)
    }
}

impl From<LiveProcessFatalError> for LiveStatus {
    fn from(value: LiveProcessFatalError) -> Self {
        Arc::new(value).into()
    }
}

/// Portfolio state pushed once per control-loop iteration.
#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    pub time: DateTime<Utc>,
    pub positions: Vec<Position>,
    pub pending_orders: Vec<PendingOrder>,
    pub account: AccountSnapshot,
}

/// Update events emitted during live trading.
#[derive(Debug, Clone)]
pub enum LiveUpdate {
    /// Live status changed.
    Status(LiveStatus),
    /// A merged signal was generated for a ticker.
    Signal(Signal),
    /// The portfolio state after an iteration.
    Snapshot(LiveSnapshot),
    /// A position was closed.
    ClosedPosition(ClosedPosition),
}

impl From<LiveStatus> for LiveUpdate {
    fn from(value: LiveStatus) -> Self {
        Self::Status(value)
    }
}

impl From<Signal> for LiveUpdate {
    fn from(value: Signal) -> Self {
        Self::Signal(value)
    }
}

impl From<LiveSnapshot> for LiveUpdate {
    fn from(value: LiveSnapshot) -> Self {
        Self::Snapshot(value)
    }
}

impl From<ClosedPosition> for LiveUpdate {
    fn from(value: ClosedPosition) -> Self {
        Self::ClosedPosition(value)
    }
}

pub(super) type LiveTransmitter = broadcast::Sender<LiveUpdate>;

/// Receiver for subscribing to [`LiveUpdate`]s.
pub type LiveReceiver = broadcast::Receiver<LiveUpdate>;

/// Trait for reading live status and subscribing to updates.
pub trait LiveReader: Send + Sync + 'static {
    /// Creates a new [`LiveReceiver`] for subscribing to live updates.
    fn update_receiver(&self) -> LiveReceiver;

    /// Returns the current [`LiveStatus`] as a snapshot.
    fn status_snapshot(&self) -> LiveStatus;
}

#[derive(Debug)]
pub(super) struct LiveStatusManager {
    status: Mutex<LiveStatus>,
    update_tx: LiveTransmitter,
}

impl LiveStatusManager {
    pub fn new(update_tx: LiveTransmitter) -> Arc<Self> {
        let status = Mutex::new(LiveStatus::NotInitiated);

        Arc::new(Self { status, update_tx })
    }

    fn lock_status(&self) -> MutexGuard<'_, LiveStatus> {
        self.status
            .lock()
            .expect("`LiveStatusManager` mutex can't be poisoned")
    }

    pub fn update(&self, new_status: LiveStatus) {
        let mut status_guard = self.lock_status();
        *status_guard = new_status.clone();
        drop(status_guard);

        // Ignore no-receivers errors
        let _ = self.update_tx.send(new_status.into());
    }
}

impl LiveReader for LiveStatusManager {
    fn update_receiver(&self) -> LiveReceiver {
        self.update_tx.subscribe()
    }

    fn status_snapshot(&self) -> LiveStatus {
        self.lock_status().clone()
    }
}

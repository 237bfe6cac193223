mod config;
mod engine;
mod ledger;

pub(crate) mod error;

pub use config::RiskConfig;
pub use engine::{
    CloseEvaluation, CloseOutcome, CloseReason, EntryOutcome, ExecutedClose, PositionManager,
    SizingDecision, SizingRefusal,
};
pub use ledger::{
    CloseExecution, Ledger, LedgerRefusal, LiveLedger, OpenExecution, SimulatedLedger,
};

#[cfg(test)]
mod tests;

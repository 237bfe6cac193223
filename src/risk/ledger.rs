use std::{num::NonZeroU64, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    broker::{AccountSnapshot, BrokerOrder, BrokerPosition, Brokerage},
    position::{PendingOrder, Position, PositionSide},
};

use super::error::LedgerResult;

/// Reason a ledger declined to execute an otherwise well-formed request.
///
/// Refusals are policy outcomes, not failures; callers log them and move on.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerRefusal {
    InsufficientFunds { required: f64, available: f64 },
    OrderRejected { reason: String },
}

/// Outcome of an open (or add) request against the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenExecution {
    /// Filled synchronously at the given price. Simulated mode only.
    Filled { price: f64 },
    /// Submitted to the brokerage; confirmation arrives on a later sync.
    Submitted(PendingOrder),
    Refused(LedgerRefusal),
}

/// Outcome of a close request against the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseExecution {
    /// Filled synchronously at the given price. Simulated mode only.
    Filled { price: f64 },
    /// Submitted to the brokerage; the position is pending close until the
    /// brokerage confirms.
    Submitted(PendingOrder),
    Refused(LedgerRefusal),
}

/// Account-state capability behind the position manager, selected once at
/// construction.
///
/// `LiveLedger` reads through to the brokerage and fills asynchronously;
/// `SimulatedLedger` holds a local cash balance and fills synchronously.
/// The position manager never branches on mode, it only speaks this trait.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Returns the current account snapshot.
    async fn account(&self) -> LedgerResult<AccountSnapshot>;

    /// Requests `shares` of `ticker` on the entry side of `side` at the given
    /// reference price.
    async fn submit_open(
        &self,
        ticker: &str,
        shares: NonZeroU64,
        side: PositionSide,
        price: f64,
    ) -> LedgerResult<OpenExecution>;

    /// Requests liquidation of the full position.
    async fn submit_close(&self, position: &Position) -> LedgerResult<CloseExecution>;

    /// Replaces the ledger's total unrealized P&L with a freshly recomputed
    /// value. No-op for live ledgers, whose account state lives at the
    /// brokerage.
    async fn apply_unrealized(&self, total_unrealized: f64);

    /// Returns the brokerage's view of held positions, or `None` for ledgers
    /// with no external source of truth to synchronize against.
    async fn broker_positions(&self) -> LedgerResult<Option<Vec<BrokerPosition>>>;

    /// Returns orders still in flight at the brokerage. Always empty in
    /// simulated mode, where fills are synchronous.
    async fn open_orders(&self) -> LedgerResult<Vec<BrokerOrder>>;
}

#[derive(Debug, Clone, Copy)]
struct SimulatedAccount {
    cash_balance: f64,
    unrealized_pnl: f64,
}

/// In-process ledger for backtests and paper runs.
///
/// Holds cash and total unrealized P&L behind one lock so every snapshot is
/// derived in a single critical section and `equity` always equals
/// `cash_balance + unrealized_pnl`.
pub struct SimulatedLedger {
    account: Mutex<SimulatedAccount>,
}

impl SimulatedLedger {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            account: Mutex::new(SimulatedAccount {
                cash_balance: starting_balance,
                unrealized_pnl: 0.0,
            }),
        }
    }
}

#[async_trait]
impl Ledger for SimulatedLedger {
    async fn account(&self) -> LedgerResult<AccountSnapshot> {
        let account = self.account.lock().await;
        let equity = account.cash_balance + account.unrealized_pnl;

        Ok(AccountSnapshot {
            equity,
            buying_power: account.cash_balance,
            initial_margin: 0.0,
            margin_multiplier: 1.0,
            daytrading_buying_power: account.cash_balance,
        })
    }

    async fn submit_open(
        &self,
        _ticker: &str,
        shares: NonZeroU64,
        side: PositionSide,
        price: f64,
    ) -> LedgerResult<OpenExecution> {
        let notional = shares.get() as f64 * price;
        let mut account = self.account.lock().await;

        match side {
            PositionSide::Long => {
                if notional > account.cash_balance {
                    return Ok(OpenExecution::Refused(LedgerRefusal::InsufficientFunds {
                        required: notional,
                        available: account.cash_balance,
                    }));
                }
                account.cash_balance -= notional;
            }
            PositionSide::Short => {
                account.cash_balance += notional;
            }
        }

        Ok(OpenExecution::Filled { price })
    }

    async fn submit_close(&self, position: &Position) -> LedgerResult<CloseExecution> {
        let price = position.current_price();
        let notional = position.qty() as f64 * price;
        let mut account = self.account.lock().await;

        match position.side() {
            PositionSide::Long => account.cash_balance += notional,
            PositionSide::Short => account.cash_balance -= notional,
        }

        Ok(CloseExecution::Filled { price })
    }

    async fn apply_unrealized(&self, total_unrealized: f64) {
        self.account.lock().await.unrealized_pnl = total_unrealized;
    }

    async fn broker_positions(&self) -> LedgerResult<Option<Vec<BrokerPosition>>> {
        Ok(None)
    }

    async fn open_orders(&self) -> LedgerResult<Vec<BrokerOrder>> {
        Ok(Vec::new())
    }
}

/// Read-through ledger backed by the brokerage capability.
pub struct LiveLedger {
    broker: Arc<dyn Brokerage>,
}

impl LiveLedger {
    pub fn new(broker: Arc<dyn Brokerage>) -> Self {
        Self { broker }
    }
}

fn pending_from(order: BrokerOrder) -> PendingOrder {
    PendingOrder {
        order_id: order.id,
        ticker: order.ticker,
        shares: order.qty,
        side: order.side,
        status: order.status,
    }
}

#[async_trait]
impl Ledger for LiveLedger {
    async fn account(&self) -> LedgerResult<AccountSnapshot> {
        Ok(self.broker.get_account().await?)
    }

    async fn submit_open(
        &self,
        ticker: &str,
        shares: NonZeroU64,
        side: PositionSide,
        _price: f64,
    ) -> LedgerResult<OpenExecution> {
        let order = match self
            .broker
            .submit_order(ticker, shares.get(), side.entry_order_side())
            .await
        {
            Ok(order) => order,
            Err(crate::broker::error::BrokerError::Rejected { reason }) => {
                return Ok(OpenExecution::Refused(LedgerRefusal::OrderRejected {
                    reason,
                }));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(OpenExecution::Submitted(pending_from(order)))
    }

    async fn submit_close(&self, position: &Position) -> LedgerResult<CloseExecution> {
        let order = match self.broker.close_position(position.ticker()).await {
            Ok(order) => order,
            Err(crate::broker::error::BrokerError::Rejected { reason }) => {
                return Ok(CloseExecution::Refused(LedgerRefusal::OrderRejected {
                    reason,
                }));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(CloseExecution::Submitted(pending_from(order)))
    }

    async fn apply_unrealized(&self, _total_unrealized: f64) {}

    async fn broker_positions(&self) -> LedgerResult<Option<Vec<BrokerPosition>>> {
        Ok(Some(self.broker.get_all_positions().await?))
    }

    async fn open_orders(&self) -> LedgerResult<Vec<BrokerOrder>> {
        let orders = self.broker.get_orders().await?;
        Ok(orders.into_iter().filter(|o| o.status.is_open()).collect())
    }
}

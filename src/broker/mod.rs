use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod error;

use error::BrokerResult;

/// Side of an order sent to the brokerage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Lifecycle status of a brokerage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    New,
    Accepted,
    Pending,
    Filled,
    Rejected,
    Canceled,
}

impl OrderStatus {
    /// Returns `true` if the order is still in flight at the brokerage.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::New | Self::Accepted | Self::Pending)
    }
}

/// Account state as reported by the brokerage, or derived from the simulated
/// ledger.
///
/// In simulated mode the snapshot is derived in a single critical section from
/// the ledger's cash balance and unrealized P&L, so `equity` always equals
/// `cash_balance + unrealized_pnl`.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub equity: f64,
    pub buying_power: f64,
    pub initial_margin: f64,
    pub margin_multiplier: f64,
    pub daytrading_buying_power: f64,
}

impl AccountSnapshot {
    /// Returns a formatted string representation of the account for display
    /// purposes.
    pub fn as_data_str(&self) -> String {
        format!(
            "equity: {:.2}\n\
             buying_power: {:.2}\n\
             initial_margin: {:.2}\n\
             margin_multiplier: {:.1}\n\
             daytrading_buying_power: {:.2}",
            self.equity,
            self.buying_power,
            self.initial_margin,
            self.margin_multiplier,
            self.daytrading_buying_power
        )
    }
}

impl fmt::Display for AccountSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account:")?;
        for line in self.as_data_str().lines() {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}

/// A holding as reported by the brokerage.
///
/// Quantity is signed: positive for long, negative for short. The unsigned
/// quantity + side convention used by [`Position`](crate::position::Position)
/// is derived from this during synchronization.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerPosition {
    pub ticker: String,
    pub qty: f64,
    pub qty_available: f64,
    pub avg_entry_price: f64,
    pub current_price: f64,
}

/// An order record as reported by the brokerage.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerOrder {
    pub id: Uuid,
    pub ticker: String,
    pub qty: f64,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub submitted_at: DateTime<Utc>,
}

/// Opaque order-submission capability of the brokerage.
///
/// Everything here may fail transiently (network, rate limits, brokerage
/// outages) and must be treated as retryable: callers log the failure, apply
/// no state change, and try again on the next control-loop tick.
#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Fetches the current account snapshot.
    async fn get_account(&self) -> BrokerResult<AccountSnapshot>;

    /// Fetches all currently held positions.
    async fn get_all_positions(&self) -> BrokerResult<Vec<BrokerPosition>>;

    /// Fetches all order records, including in-flight ones.
    async fn get_orders(&self) -> BrokerResult<Vec<BrokerOrder>>;

    /// Submits a market order for `qty` shares of `ticker`.
    async fn submit_order(&self, ticker: &str, qty: u64, side: OrderSide)
    -> BrokerResult<BrokerOrder>;

    /// Requests liquidation of the full position in `ticker`.
    async fn close_position(&self, ticker: &str) -> BrokerResult<BrokerOrder>;
}

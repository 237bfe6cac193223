use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::broker::{OrderSide, OrderStatus};

/// Directional bias of a holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Returns the order side that grows a position with this bias.
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Buy,
            Self::Short => OrderSide::Sell,
        }
    }
}

/// A per-ticker holding with P&L bookkeeping.
///
/// Quantity is unsigned; direction is carried by [`PositionSide`]. The P&L
/// percentage is sign-adjusted by side, so a price drop on a short position is
/// a positive `pl_pct`. Positions are exclusively owned by the
/// [`PositionManager`](crate::risk::PositionManager) and handed out only as
/// clones.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    ticker: String,
    qty: u64,
    side: PositionSide,
    entry_price: f64,
    current_price: f64,
    entry_time: DateTime<Utc>,
    open: bool,
    pl: f64,
    pl_pct: f64,
}

impl Position {
    pub(crate) fn new(
        ticker: impl Into<String>,
        qty: u64,
        side: PositionSide,
        entry_price: f64,
        entry_time: DateTime<Utc>,
    ) -> Self {
        let mut position = Self {
            ticker: ticker.into(),
            qty,
            side,
            entry_price,
            current_price: entry_price,
            entry_time,
            open: true,
            pl: 0.0,
            pl_pct: 0.0,
        };
        position.update_pl(entry_price);
        position
    }

    /// Refreshes the unrealized P&L against a new market price.
    pub(crate) fn update_pl(&mut self, price: f64) {
        self.current_price = price;

        if self.entry_price == 0.0 || self.qty == 0 {
            self.pl = 0.0;
            self.pl_pct = 0.0;
            return;
        }

        let per_share = match self.side {
            PositionSide::Long => price - self.entry_price,
            PositionSide::Short => self.entry_price - price,
        };

        self.pl = per_share * self.qty as f64;
        self.pl_pct = per_share / self.entry_price;
    }

    /// Extends the position with a new fill, averaging the entry price.
    pub(crate) fn add_shares(&mut self, qty: u64, fill_price: f64) {
        let total = self.qty + qty;
        if total == 0 {
            return;
        }

        self.entry_price = (self.entry_price * self.qty as f64 + fill_price * qty as f64)
            / total as f64;
        self.qty = total;
        self.update_pl(fill_price);
    }

    /// Consumes the position into a closed record at the given exit fill.
    pub(crate) fn into_closed(mut self, exit_price: f64, exit_time: DateTime<Utc>) -> ClosedPosition {
        self.update_pl(exit_price);
        self.open = false;

        ClosedPosition {
            id: Uuid::new_v4(),
            ticker: self.ticker,
            qty: self.qty,
            side: self.side,
            entry_price: self.entry_price,
            exit_price,
            entry_time: self.entry_time,
            exit_time,
            realized_pl: self.pl,
        }
    }

    /// Returns the ticker this position holds.
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Returns the unsigned share count.
    pub fn qty(&self) -> u64 {
        self.qty
    }

    /// Returns the directional bias of the position.
    pub fn side(&self) -> PositionSide {
        self.side
    }

    /// Returns the (volume-weighted) entry price.
    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    /// Returns the last market price applied to this position.
    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    /// Returns the time the holding was opened.
    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    /// Returns `true` while the holding is open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Returns the unrealized P&L in account currency.
    pub fn pl(&self) -> f64 {
        self.pl
    }

    /// Returns the unrealized P&L as a fraction of the entry price,
    /// sign-adjusted by side.
    pub fn pl_pct(&self) -> f64 {
        self.pl_pct
    }

    /// Returns the absolute market value of the holding.
    pub fn market_value(&self) -> f64 {
        self.qty as f64 * self.current_price
    }

    /// Returns the position's market value as a fraction of account equity.
    ///
    /// Zero when equity is non-positive, so a drained simulated account never
    /// produces a negative or infinite exposure.
    pub fn exposure(&self, equity: f64) -> f64 {
        if equity <= 0.0 {
            return 0.0;
        }
        self.market_value() / equity
    }

    /// Returns the number of whole days this position has been held.
    pub fn held_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entry_time).num_days()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} x{} @ {:.2} (now {:.2}, pl {:+.2} / {:+.2}%)",
            self.side,
            self.ticker,
            self.qty,
            self.entry_price,
            self.current_price,
            self.pl,
            self.pl_pct * 100.0
        )
    }
}

/// An in-flight brokerage order tracked to prevent duplicate open/close
/// submissions for the same ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub order_id: Uuid,
    pub ticker: String,
    pub shares: f64,
    pub side: OrderSide,
    pub status: OrderStatus,
}

/// A completed holding retained for trade-history reporting.
///
/// Unlike the live position map, closed records survive position closure in
/// both live and simulated modes, so the query surface can always render past
/// trades.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub id: Uuid,
    pub ticker: String,
    pub qty: u64,
    pub side: PositionSide,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub realized_pl: f64,
}

/// A chronologically ordered collection of closed positions, indexed by entry
/// time and id.
#[derive(Debug, Clone, Default)]
pub struct ClosedPositionHistory {
    records: BTreeMap<(DateTime<Utc>, Uuid), ClosedPosition>,
    /// Maps id to entry timestamp for O(1) lookups by record id.
    id_to_time: HashMap<Uuid, DateTime<Utc>>,
}

impl ClosedPositionHistory {
    /// Creates a new empty history.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, record: ClosedPosition) {
        self.id_to_time.insert(record.id, record.entry_time);
        self.records.insert((record.entry_time, record.id), record);
    }

    /// Returns a reference to the record with the given id, if it exists.
    pub fn get_by_id(&self, id: Uuid) -> Option<&ClosedPosition> {
        let entry_time = self.id_to_time.get(&id)?;
        self.records.get(&(*entry_time, id))
    }

    /// Returns `true` if the history contains no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of closed positions in the history.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns the sum of realized P&L across all records.
    pub fn realized_pl(&self) -> f64 {
        self.records.values().map(|r| r.realized_pl).sum()
    }

    /// Returns an iterator over records in ascending chronological order
    /// (oldest first).
    pub fn iter(&self) -> impl Iterator<Item = &ClosedPosition> {
        self.records.values()
    }

    /// Returns an iterator over records in descending chronological order
    /// (newest first).
    pub fn iter_desc(&self) -> impl Iterator<Item = &ClosedPosition> {
        self.records.values().rev()
    }

    /// Returns a formatted table of all closed positions with their entry/exit
    /// details and realized P&L.
    pub fn to_table(&self) -> String {
        if self.records.is_empty() {
            return "No closed positions.".to_string();
        }

        let mut table = String::new();

        table.push_str(&format!(
            "{:>16} | {:>8} | {:>5} | {:>8} | {:>11} | {:>11} | {:>16} | {:>11}",
            "entry_time", "ticker", "side", "qty", "entry_price", "exit_price", "exit_time", "pl"
        ));

        table.push_str(&format!("\n{}", "-".repeat(106)));

        for record in self.records.values().rev() {
            table.push_str(&format!(
                "\n{:>16} | {:>8} | {:>5} | {:>8} | {:>11.2} | {:>11.2} | {:>16} | {:>11.2}",
                record.entry_time.format("%y-%m-%d %H:%M"),
                record.ticker,
                record.side,
                record.qty,
                record.entry_price,
                record.exit_price,
                record.exit_time.format("%y-%m-%d %H:%M"),
                record.realized_pl
            ));
        }

        table
    }
}

#[cfg(test)]
mod tests;

use std::{
    collections::{HashMap, HashSet},
    fmt,
    num::NonZeroU64,
    sync::Arc,
};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    broker::{AccountSnapshot, Brokerage, OrderSide},
    position::{ClosedPosition, ClosedPositionHistory, PendingOrder, Position, PositionSide},
    signal::Signal,
};

use super::{
    config::RiskConfig,
    error::RiskResult,
    ledger::{CloseExecution, Ledger, LedgerRefusal, LiveLedger, OpenExecution, SimulatedLedger},
};

/// Reason the sizing algorithm declined to authorize shares.
///
/// Refusals are policy outcomes, never errors; the caller logs them and
/// retries on a later cycle if conditions change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingRefusal {
    /// Total portfolio exposure already meets or exceeds the ceiling.
    ExposureCeilingReached { total_exposure: f64, ceiling: f64 },
    /// The ticker's position already meets or exceeds its target fraction.
    TargetSizeReached { exposure: f64, target: f64 },
    /// A sell was requested against a position with no shares.
    NoSharesToSell,
    /// The position is underwater beyond the averaging-down limit.
    Underwater { pl_pct: f64, limit: f64 },
    /// A sell with no existing position would open a short, which the sizing
    /// entry path does not do.
    ShortOpenUnsupported,
    /// The target value rounds down to zero whole shares at this price.
    ZeroTargetShares,
}

impl fmt::Display for SizingRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExposureCeilingReached {
                total_exposure,
                ceiling,
            } => write!(
                f,
                "total exposure {:.2} at or above ceiling {:.2}",
                total_exposure, ceiling
            ),
            Self::TargetSizeReached { exposure, target } => write!(
                f,
                "position exposure {:.3} at or above target {:.3}",
                exposure, target
            ),
            Self::NoSharesToSell => write!(f, "no shares to sell"),
            Self::Underwater { pl_pct, limit } => write!(
                f,
                "position underwater at {:.2}%, add limit {:.2}%",
                pl_pct * 100.0,
                limit * 100.0
            ),
            Self::ShortOpenUnsupported => write!(f, "sell without a position, short opens unsupported"),
            Self::ZeroTargetShares => write!(f, "target value rounds to zero shares"),
        }
    }
}

/// Outcome of the sizing algorithm.
///
/// The `Open` variant carries a `NonZeroU64`, so an authorized decision can
/// never name zero shares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingDecision {
    Open { shares: NonZeroU64 },
    Refused(SizingRefusal),
}

/// A single exit-rule hit. Reasons are accumulated, not short-circuited, so
/// logs show every rule a close satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum CloseReason {
    StopLoss,
    AdverseScore,
    AdverseMomentum,
    Deleveraging,
    Stagnant,
}

/// Result of evaluating the exit rules against one open position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloseEvaluation {
    pub reasons: Vec<CloseReason>,
}

impl CloseEvaluation {
    /// Returns `true` if at least one exit rule fired.
    pub fn should_close(&self) -> bool {
        !self.reasons.is_empty()
    }
}

impl fmt::Display for CloseEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reasons.is_empty() {
            return write!(f, "hold");
        }

        for (i, reason) in self.reasons.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{reason}")?;
        }
        Ok(())
    }
}

/// Outcome of an entry request.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// Filled synchronously against the simulated ledger.
    Filled { ticker: String, shares: NonZeroU64 },
    /// Submitted to the brokerage, confirmation pending.
    Pending(PendingOrder),
    /// An order for this ticker is already in flight.
    AlreadyPending,
    /// Sizing declined the entry.
    Refused(SizingRefusal),
    /// The ledger declined the authorized entry.
    LedgerRefused(LedgerRefusal),
}

/// Outcome of a close request.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// Closed synchronously; the record went to history.
    Closed(ClosedPosition),
    /// Close submitted to the brokerage; the ticker is pending close until
    /// the next sync confirms.
    Pending { order_id: Uuid },
    /// A close for this ticker is already in flight.
    AlreadyPending,
    /// No open position for the ticker.
    NoPosition,
    /// The ledger declined the close.
    LedgerRefused(LedgerRefusal),
}

/// A close executed by [`PositionManager::check_positions`], with the exit
/// rules that triggered it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedClose {
    pub ticker: String,
    pub evaluation: CloseEvaluation,
    pub outcome: CloseOutcome,
}

#[derive(Default)]
struct PositionBook {
    positions: HashMap<String, Position>,
    /// Tickers with a close in flight at the brokerage. Guards against
    /// duplicate close submissions.
    pending_closes: HashSet<String>,
    pending_orders: Vec<PendingOrder>,
    history: ClosedPositionHistory,
}

impl PositionBook {
    /// Sum of exposures of positions not pending close.
    fn total_exposure(&self, equity: f64) -> f64 {
        self.positions
            .values()
            .filter(|p| !self.pending_closes.contains(p.ticker()))
            .map(|p| p.exposure(equity))
            .sum()
    }

    fn has_open_order_for(&self, ticker: &str) -> bool {
        self.pending_orders
            .iter()
            .any(|o| o.ticker == ticker && o.status.is_open())
    }

    fn total_unrealized(&self) -> f64 {
        self.positions.values().map(|p| p.pl()).sum()
    }
}

/// Sizing, exposure accounting, exit evaluation, and position bookkeeping
/// over a [`Ledger`] selected at construction.
///
/// All book mutations happen behind one async lock, so a price refresh can
/// never interleave with a close for the same ticker.
pub struct PositionManager {
    config: RiskConfig,
    ledger: Arc<dyn Ledger>,
    book: Mutex<PositionBook>,
}

impl PositionManager {
    /// Creates a manager trading live capital through the given brokerage.
    pub fn live(config: RiskConfig, broker: Arc<dyn Brokerage>) -> Self {
        Self::with_ledger(config, Arc::new(LiveLedger::new(broker)))
    }

    /// Creates a manager over a fresh simulated ledger seeded with the
    /// configured starting balance.
    pub fn simulated(config: RiskConfig) -> Self {
        let balance = config.starting_balance();
        Self::with_ledger(config, Arc::new(SimulatedLedger::new(balance)))
    }

    pub fn with_ledger(config: RiskConfig, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            config,
            ledger,
            book: Mutex::new(PositionBook::default()),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Returns the current account snapshot from the underlying ledger.
    pub async fn account(&self) -> RiskResult<AccountSnapshot> {
        Ok(self.ledger.account().await?)
    }

    /// Sizes an open or add for `ticker` at `price`.
    ///
    /// `target_pct` overrides the configured per-ticker maximum; the live
    /// loop passes a stepped target while gradually building a position.
    pub async fn calculate_target_position(
        &self,
        ticker: &str,
        price: f64,
        side: OrderSide,
        target_pct: Option<f64>,
    ) -> RiskResult<SizingDecision> {
        let account = self.ledger.account().await?;
        let book = self.book.lock().await;

        Ok(self.sizing_decision(&book, &account, ticker, price, side, target_pct))
    }

    fn sizing_decision(
        &self,
        book: &PositionBook,
        account: &AccountSnapshot,
        ticker: &str,
        price: f64,
        side: OrderSide,
        target_pct: Option<f64>,
    ) -> SizingDecision {
        let equity = account.equity;
        let target_pct = target_pct.unwrap_or(self.config.max_position_size());
        let total_exposure = book.total_exposure(equity);

        if side == OrderSide::Buy && total_exposure >= self.config.max_total_exposure() {
            return SizingDecision::Refused(SizingRefusal::ExposureCeilingReached {
                total_exposure,
                ceiling: self.config.max_total_exposure(),
            });
        }

        let Some(position) = book.positions.get(ticker) else {
            if side == OrderSide::Sell {
                return SizingDecision::Refused(SizingRefusal::ShortOpenUnsupported);
            }

            let shares = (equity * target_pct / price).floor() as u64;
            return match NonZeroU64::new(shares) {
                Some(shares) => SizingDecision::Open { shares },
                None => SizingDecision::Refused(SizingRefusal::ZeroTargetShares),
            };
        };

        let exposure = position.exposure(equity);
        if exposure >= target_pct {
            return SizingDecision::Refused(SizingRefusal::TargetSizeReached {
                exposure,
                target: target_pct,
            });
        }

        if side == OrderSide::Sell && position.qty() == 0 {
            return SizingDecision::Refused(SizingRefusal::NoSharesToSell);
        }

        // Never average down into a losing position.
        if position.pl_pct() < self.config.add_loss_limit() {
            return SizingDecision::Refused(SizingRefusal::Underwater {
                pl_pct: position.pl_pct(),
                limit: self.config.add_loss_limit(),
            });
        }

        let remaining = ((equity * target_pct - position.market_value()) / price).floor() as u64;
        match NonZeroU64::new(remaining) {
            Some(shares) => SizingDecision::Open { shares },
            None => SizingDecision::Refused(SizingRefusal::ZeroTargetShares),
        }
    }

    /// Returns the per-cycle target fraction for `ticker`: one step above its
    /// current exposure, capped at the configured maximum. Lets the live loop
    /// build toward the full target gradually instead of in one fill.
    pub async fn stepped_target(&self, ticker: &str) -> RiskResult<f64> {
        let account = self.ledger.account().await?;
        let book = self.book.lock().await;

        let current = book
            .positions
            .get(ticker)
            .map(|p| p.exposure(account.equity))
            .unwrap_or(0.0);

        Ok(self
            .config
            .max_position_size()
            .min(current + self.config.position_step_size()))
    }

    /// Sizes and executes an entry for a buy signal.
    pub async fn process_entry(
        &self,
        signal: &Signal,
        target_pct: Option<f64>,
    ) -> RiskResult<EntryOutcome> {
        let account = self.ledger.account().await?;
        let mut book = self.book.lock().await;
        let ticker = signal.ticker.as_str();

        if book.pending_closes.contains(ticker) || book.has_open_order_for(ticker) {
            debug!(ticker, "entry skipped, order already in flight");
            return Ok(EntryOutcome::AlreadyPending);
        }

        let shares = match self.sizing_decision(
            &book,
            &account,
            ticker,
            signal.price,
            OrderSide::Buy,
            target_pct,
        ) {
            SizingDecision::Open { shares } => shares,
            SizingDecision::Refused(refusal) => {
                debug!(ticker, %refusal, "entry refused by sizing");
                return Ok(EntryOutcome::Refused(refusal));
            }
        };

        let execution = self
            .ledger
            .submit_open(ticker, shares, PositionSide::Long, signal.price)
            .await?;

        match execution {
            OpenExecution::Filled { price } => {
                match book.positions.get_mut(ticker) {
                    Some(position) => position.add_shares(shares.get(), price),
                    None => {
                        let position =
                            Position::new(ticker, shares.get(), PositionSide::Long, price, signal.time);
                        book.positions.insert(ticker.to_string(), position);
                    }
                }

                let total = book.total_unrealized();
                self.ledger.apply_unrealized(total).await;

                info!(ticker, shares = shares.get(), price, "entry filled");
                Ok(EntryOutcome::Filled {
                    ticker: ticker.to_string(),
                    shares,
                })
            }
            OpenExecution::Submitted(order) => {
                info!(ticker, order_id = %order.order_id, "entry submitted");
                book.pending_orders.push(order.clone());
                Ok(EntryOutcome::Pending(order))
            }
            OpenExecution::Refused(refusal) => {
                warn!(ticker, ?refusal, "entry refused by ledger");
                Ok(EntryOutcome::LedgerRefused(refusal))
            }
        }
    }

    /// Closes the position in `ticker`, synchronously in simulated mode or
    /// via the brokerage in live mode.
    pub async fn close_position(&self, ticker: &str, now: DateTime<Utc>) -> RiskResult<CloseOutcome> {
        let mut book = self.book.lock().await;
        self.close_locked(&mut book, ticker, now).await
    }

    async fn close_locked(
        &self,
        book: &mut PositionBook,
        ticker: &str,
        now: DateTime<Utc>,
    ) -> RiskResult<CloseOutcome> {
        if book.pending_closes.contains(ticker) {
            debug!(ticker, "close skipped, already pending");
            return Ok(CloseOutcome::AlreadyPending);
        }

        let Some(position) = book.positions.get(ticker) else {
            return Ok(CloseOutcome::NoPosition);
        };

        let execution = self.ledger.submit_close(position).await?;

        match execution {
            CloseExecution::Filled { price } => {
                let Some(position) = book.positions.remove(ticker) else {
                    return Ok(CloseOutcome::NoPosition);
                };

                let record = position.into_closed(price, now);
                info!(ticker, realized_pl = record.realized_pl, "position closed");
                book.history.add(record.clone());

                let total = book.total_unrealized();
                self.ledger.apply_unrealized(total).await;

                Ok(CloseOutcome::Closed(record))
            }
            CloseExecution::Submitted(order) => {
                info!(ticker, order_id = %order.order_id, "close submitted");
                book.pending_closes.insert(ticker.to_string());
                let order_id = order.order_id;
                book.pending_orders.push(order);
                Ok(CloseOutcome::Pending { order_id })
            }
            CloseExecution::Refused(refusal) => {
                warn!(ticker, ?refusal, "close refused by ledger");
                Ok(CloseOutcome::LedgerRefused(refusal))
            }
        }
    }

    /// Evaluates every exit rule for one position against the latest signal.
    /// Pure policy, no state change.
    pub fn evaluate_close(
        &self,
        position: &Position,
        signal: &Signal,
        total_exposure: f64,
        now: DateTime<Utc>,
    ) -> CloseEvaluation {
        let mut reasons = Vec::new();
        let score = signal.score.as_f64();

        if position.pl_pct() < self.config.stop_loss_pct() {
            reasons.push(CloseReason::StopLoss);
        }

        let score_contradicts = match position.side() {
            PositionSide::Long => score < self.config.weak_long_score(),
            PositionSide::Short => score > self.config.strong_short_score(),
        };
        if score_contradicts {
            reasons.push(CloseReason::AdverseScore);
        }

        let momentum_adverse = match position.side() {
            PositionSide::Long => signal.momentum < -self.config.momentum_threshold(),
            PositionSide::Short => signal.momentum > self.config.momentum_threshold(),
        };
        if momentum_adverse {
            reasons.push(CloseReason::AdverseMomentum);
        }

        if total_exposure > self.config.max_total_exposure() {
            let weak_side = match position.side() {
                PositionSide::Long => score < 0.5,
                PositionSide::Short => score > 0.5,
            };
            if weak_side {
                reasons.push(CloseReason::Deleveraging);
            }
        }

        if position.held_days(now) > self.config.stagnation_days()
            && position.pl_pct().abs() < self.config.stagnation_pl_pct()
        {
            reasons.push(CloseReason::Stagnant);
        }

        CloseEvaluation { reasons }
    }

    /// Convenience predicate over [`evaluate_close`](Self::evaluate_close).
    pub fn should_close_position(
        &self,
        position: &Position,
        signal: &Signal,
        total_exposure: f64,
        now: DateTime<Utc>,
    ) -> bool {
        self.evaluate_close(position, signal, total_exposure, now)
            .should_close()
    }

    /// Applies a batch of price updates: refreshes each named position's
    /// unrealized P&L and rolls the new total into the ledger. Positions and
    /// the ledger total change under their respective locks, so no account
    /// reader observes equity diverging from cash plus unrealized P&L.
    pub async fn apply_price_update(&self, prices: &HashMap<String, f64>) {
        let mut book = self.book.lock().await;

        for (ticker, price) in prices {
            if let Some(position) = book.positions.get_mut(ticker) {
                position.update_pl(*price);
            }
        }

        let total = book.total_unrealized();
        self.ledger.apply_unrealized(total).await;
    }

    /// Evaluates exit rules for every open position and closes the ones with
    /// at least one reason. Positions without a signal this cycle are checked
    /// against a neutral probe so price-driven exits still fire.
    pub async fn check_positions(
        &self,
        signals: &HashMap<String, Signal>,
        now: DateTime<Utc>,
    ) -> RiskResult<Vec<ExecutedClose>> {
        let account = self.ledger.account().await?;
        let mut book = self.book.lock().await;
        let total_exposure = book.total_exposure(account.equity);

        let mut to_close = Vec::new();

        for position in book.positions.values() {
            if book.pending_closes.contains(position.ticker()) {
                continue;
            }

            let probe;
            let signal = match signals.get(position.ticker()) {
                Some(signal) => signal,
                None => {
                    probe = Signal::exit_probe(position.ticker(), position.current_price(), now);
                    &probe
                }
            };

            let evaluation = self.evaluate_close(position, signal, total_exposure, now);
            if evaluation.should_close() {
                to_close.push((position.ticker().to_string(), evaluation));
            }
        }

        let mut executed = Vec::with_capacity(to_close.len());

        for (ticker, evaluation) in to_close {
            info!(ticker, %evaluation, "closing position");
            let outcome = self.close_locked(&mut book, &ticker, now).await?;
            executed.push(ExecutedClose {
                ticker,
                evaluation,
                outcome,
            });
        }

        Ok(executed)
    }

    /// Rebuilds the book from the brokerage's view of positions and orders.
    ///
    /// No-op for simulated ledgers. A position that vanished from the
    /// brokerage while pending close is recorded into history at its last
    /// known price.
    pub async fn sync(&self, now: DateTime<Utc>) -> RiskResult<()> {
        let Some(broker_positions) = self.ledger.broker_positions().await? else {
            return Ok(());
        };
        let open_orders = self.ledger.open_orders().await?;

        let mut book = self.book.lock().await;

        let mut synced: HashMap<String, Position> = HashMap::new();
        for bp in broker_positions {
            if bp.qty == 0.0 {
                continue;
            }

            let side = if bp.qty > 0.0 {
                PositionSide::Long
            } else {
                PositionSide::Short
            };
            let qty = bp.qty.abs() as u64;

            // Brokerage snapshots carry no entry time, so an already-tracked
            // position keeps its own.
            let entry_time = book
                .positions
                .get(&bp.ticker)
                .map(|p| p.entry_time())
                .unwrap_or(now);

            let mut position = Position::new(&bp.ticker, qty, side, bp.avg_entry_price, entry_time);
            position.update_pl(bp.current_price);
            synced.insert(bp.ticker.clone(), position);
        }

        // A pending-close position the brokerage no longer reports was
        // filled between syncs, record it before dropping the stale entry.
        let vanished: Vec<String> = book
            .pending_closes
            .iter()
            .filter(|t| !synced.contains_key(*t))
            .cloned()
            .collect();

        for ticker in vanished {
            if let Some(position) = book.positions.remove(&ticker) {
                let price = position.current_price();
                let record = position.into_closed(price, now);
                info!(ticker, realized_pl = record.realized_pl, "pending close confirmed");
                book.history.add(record);
            }
            book.pending_closes.remove(&ticker);
        }

        book.positions = synced;
        let PositionBook {
            positions,
            pending_closes,
            ..
        } = &mut *book;
        pending_closes.retain(|t| positions.contains_key(t));
        book.pending_orders = open_orders
            .into_iter()
            .map(|o| PendingOrder {
                order_id: o.id,
                ticker: o.ticker,
                shares: o.qty,
                side: o.side,
                status: o.status,
            })
            .collect();

        Ok(())
    }

    /// Returns clones of all open positions.
    pub async fn positions(&self) -> Vec<Position> {
        self.book.lock().await.positions.values().cloned().collect()
    }

    /// Returns a clone of the open position in `ticker`, if any.
    pub async fn position(&self, ticker: &str) -> Option<Position> {
        self.book.lock().await.positions.get(ticker).cloned()
    }

    /// Returns the in-flight orders currently tracked.
    pub async fn pending_orders(&self) -> Vec<PendingOrder> {
        self.book.lock().await.pending_orders.clone()
    }

    /// Returns a snapshot of the closed-position history.
    pub async fn closed_history(&self) -> ClosedPositionHistory {
        self.book.lock().await.history.clone()
    }

    /// Returns total exposure of positions not pending close, as a fraction
    /// of current equity.
    pub async fn total_exposure(&self) -> RiskResult<f64> {
        let account = self.ledger.account().await?;
        let book = self.book.lock().await;
        Ok(book.total_exposure(account.equity))
    }
}

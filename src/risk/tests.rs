use super::*;

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    broker::{
        AccountSnapshot, BrokerOrder, BrokerPosition, Brokerage, OrderSide, OrderStatus,
        error::BrokerResult,
    },
    signal::{Score, Signal, SignalAction},
};

fn buy_signal(ticker: &str, price: f64, time: DateTime<Utc>) -> Signal {
    Signal {
        strategy: "test".to_string(),
        ticker: ticker.to_string(),
        price,
        action: SignalAction::Buy,
        score: Score::try_from(0.7).unwrap(),
        momentum: 0.01,
        time,
    }
}

fn neutral_signal(ticker: &str, price: f64, time: DateTime<Utc>) -> Signal {
    Signal {
        strategy: "test".to_string(),
        ticker: ticker.to_string(),
        price,
        action: SignalAction::Hold,
        score: Score::NEUTRAL,
        momentum: 0.0,
        time,
    }
}

#[tokio::test]
async fn new_position_sizing_follows_target_fraction() {
    // equity 30_000, target 8%, price 50 -> floor(2400 / 50) = 48 shares
    let manager = PositionManager::simulated(RiskConfig::default());

    let decision = manager
        .calculate_target_position("AAPL", 50.0, OrderSide::Buy, None)
        .await
        .unwrap();

    match decision {
        SizingDecision::Open { shares } => assert_eq!(shares.get(), 48),
        other => panic!("expected an open decision, got {other:?}"),
    }
}

#[tokio::test]
async fn sell_without_a_position_is_a_refusal_not_a_short() {
    let manager = PositionManager::simulated(RiskConfig::default());

    let decision = manager
        .calculate_target_position("AAPL", 50.0, OrderSide::Sell, None)
        .await
        .unwrap();

    assert_eq!(
        decision,
        SizingDecision::Refused(SizingRefusal::ShortOpenUnsupported)
    );
}

#[tokio::test]
async fn sizing_refuses_to_average_down_into_a_loser() {
    // Step 1: Open a 2% slice at 50, leaving room below the 8% target
    let manager = PositionManager::simulated(RiskConfig::default());
    let now = Utc::now();

    let outcome = manager
        .process_entry(&buy_signal("AAPL", 50.0, now), Some(0.02))
        .await
        .unwrap();
    assert!(matches!(outcome, EntryOutcome::Filled { .. }));

    // Step 2: Price drops 3%, below the -2% averaging-down limit
    let prices = HashMap::from([("AAPL".to_string(), 48.5)]);
    manager.apply_price_update(&prices).await;

    // Step 3: A further buy is refused as underwater, not resized
    let decision = manager
        .calculate_target_position("AAPL", 48.5, OrderSide::Buy, None)
        .await
        .unwrap();

    assert!(matches!(
        decision,
        SizingDecision::Refused(SizingRefusal::Underwater { .. })
    ));
}

#[tokio::test]
async fn sizing_refuses_once_target_exposure_is_reached() {
    let manager = PositionManager::simulated(RiskConfig::default());
    let now = Utc::now();

    manager
        .process_entry(&buy_signal("AAPL", 50.0, now), None)
        .await
        .unwrap();

    let decision = manager
        .calculate_target_position("AAPL", 50.0, OrderSide::Buy, None)
        .await
        .unwrap();

    assert!(matches!(
        decision,
        SizingDecision::Refused(SizingRefusal::TargetSizeReached { .. })
    ));
}

#[tokio::test]
async fn buys_are_refused_at_the_exposure_ceiling() {
    // Ceiling lowered below one full position so a second ticker hits it
    let config = RiskConfig::default().with_max_total_exposure(0.04).unwrap();
    let manager = PositionManager::simulated(config);
    let now = Utc::now();

    manager
        .process_entry(&buy_signal("AAPL", 50.0, now), None)
        .await
        .unwrap();

    let decision = manager
        .calculate_target_position("MSFT", 100.0, OrderSide::Buy, None)
        .await
        .unwrap();

    assert!(matches!(
        decision,
        SizingDecision::Refused(SizingRefusal::ExposureCeilingReached { .. })
    ));
}

#[tokio::test]
async fn simulated_equity_always_equals_cash_plus_unrealized() {
    // Step 1: Open 48 shares at 50, cash drops to 27_600
    let manager = PositionManager::simulated(RiskConfig::default());
    let now = Utc::now();

    manager
        .process_entry(&buy_signal("AAPL", 50.0, now), None)
        .await
        .unwrap();

    let account = manager.account().await.unwrap();
    assert_eq!(account.buying_power, 27_600.0);
    assert_eq!(account.equity, 27_600.0);

    // Step 2: Price rises to 55, unrealized P&L 240
    let prices = HashMap::from([("AAPL".to_string(), 55.0)]);
    manager.apply_price_update(&prices).await;

    let account = manager.account().await.unwrap();
    assert_eq!(account.buying_power, 27_600.0);
    assert_eq!(account.equity, 27_840.0);

    // Step 3: Close; the cash effect is qty * close price, position map
    // empties and the record lands in history
    let outcome = manager.close_position("AAPL", now).await.unwrap();
    let record = match outcome {
        CloseOutcome::Closed(record) => record,
        other => panic!("expected a synchronous close, got {other:?}"),
    };
    assert_eq!(record.realized_pl, 240.0);

    let account = manager.account().await.unwrap();
    assert_eq!(account.buying_power, 30_240.0);
    assert_eq!(account.equity, 30_240.0);

    assert!(manager.positions().await.is_empty());

    let history = manager.closed_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history.get_by_id(record.id), Some(&record));
    assert_eq!(history.realized_pl(), 240.0);
}

#[tokio::test]
async fn stagnant_positions_are_flagged_for_close() {
    // Held 6 days with pl_pct 0.005, under the 1% flat band
    let manager = PositionManager::simulated(RiskConfig::default());
    let entry_time = Utc::now() - Duration::days(6);

    manager
        .process_entry(&buy_signal("AAPL", 50.0, entry_time), None)
        .await
        .unwrap();

    let prices = HashMap::from([("AAPL".to_string(), 50.25)]);
    manager.apply_price_update(&prices).await;

    let position = manager.position("AAPL").await.unwrap();
    let now = Utc::now();
    let evaluation = manager.evaluate_close(
        &position,
        &neutral_signal("AAPL", 50.25, now),
        0.0,
        now,
    );

    assert_eq!(evaluation.reasons, vec![CloseReason::Stagnant]);
    assert!(manager.should_close_position(
        &position,
        &neutral_signal("AAPL", 50.25, now),
        0.0,
        now
    ));
}

#[tokio::test]
async fn deleveraging_fires_above_the_ceiling_on_the_weak_side() {
    let manager = PositionManager::simulated(RiskConfig::default());
    let now = Utc::now();

    manager
        .process_entry(&buy_signal("AAPL", 50.0, now), None)
        .await
        .unwrap();

    let position = manager.position("AAPL").await.unwrap();

    // Score 0.45 sits under the long bias midpoint but above the 0.4 exit
    // threshold, so only the deleveraging rule is in play
    let weak = Signal {
        strategy: "test".to_string(),
        ticker: "AAPL".to_string(),
        price: 50.0,
        action: SignalAction::Hold,
        score: Score::try_from(0.45).unwrap(),
        momentum: 0.0,
        time: now,
    };

    // Portfolio over the 1.6x ceiling: the weakest conviction gets shed
    let evaluation = manager.evaluate_close(&position, &weak, 1.7, now);
    assert_eq!(evaluation.reasons, vec![CloseReason::Deleveraging]);

    // Exactly at the ceiling, nothing fires
    let evaluation = manager.evaluate_close(&position, &weak, 1.6, now);
    assert!(evaluation.reasons.is_empty());

    // Over the ceiling but with conviction on the long side, the position
    // is kept
    let strong = Signal {
        score: Score::try_from(0.6).unwrap(),
        ..weak.clone()
    };
    let evaluation = manager.evaluate_close(&position, &strong, 1.7, now);
    assert!(evaluation.reasons.is_empty());
}

#[tokio::test]
async fn exit_reasons_accumulate_instead_of_short_circuiting() {
    let manager = PositionManager::simulated(RiskConfig::default());
    let now = Utc::now();

    manager
        .process_entry(&buy_signal("AAPL", 50.0, now), None)
        .await
        .unwrap();

    // 6% down breaches the stop loss; score 0.2 contradicts the long bias;
    // momentum -5% has turned against it
    let prices = HashMap::from([("AAPL".to_string(), 47.0)]);
    manager.apply_price_update(&prices).await;

    let position = manager.position("AAPL").await.unwrap();
    let signal = Signal {
        strategy: "test".to_string(),
        ticker: "AAPL".to_string(),
        price: 47.0,
        action: SignalAction::Sell,
        score: Score::try_from(0.2).unwrap(),
        momentum: -0.05,
        time: now,
    };

    let evaluation = manager.evaluate_close(&position, &signal, 0.0, now);
    assert_eq!(
        evaluation.reasons,
        vec![
            CloseReason::StopLoss,
            CloseReason::AdverseScore,
            CloseReason::AdverseMomentum,
        ]
    );
}

#[tokio::test]
async fn check_positions_applies_the_stop_loss_without_a_signal() {
    // Step 1: Open at 50, then let the price fall through the stop loss
    let manager = PositionManager::simulated(RiskConfig::default());
    let now = Utc::now();

    manager
        .process_entry(&buy_signal("AAPL", 50.0, now), None)
        .await
        .unwrap();

    let prices = HashMap::from([("AAPL".to_string(), 47.0)]);
    manager.apply_price_update(&prices).await;

    // Step 2: No strategy produced a signal this cycle; the neutral probe
    // still drives the price-based exit
    let closes = manager.check_positions(&HashMap::new(), now).await.unwrap();

    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0].ticker, "AAPL");
    assert_eq!(closes[0].evaluation.reasons, vec![CloseReason::StopLoss]);
    assert!(matches!(closes[0].outcome, CloseOutcome::Closed(_)));
    assert!(manager.positions().await.is_empty());
}

#[tokio::test]
async fn entry_is_refused_when_cash_cannot_cover_the_notional() {
    let config = RiskConfig::default().with_starting_balance(1_000.0).unwrap();
    let manager = PositionManager::simulated(config);
    let now = Utc::now();

    // Step 1: Open 80 shares at 1.00, leaving 920 of cash
    let outcome = manager
        .process_entry(&buy_signal("AAPL", 1.0, now), None)
        .await
        .unwrap();
    assert!(matches!(outcome, EntryOutcome::Filled { .. }));

    // Step 2: A huge rally inflates equity far past remaining cash
    let prices = HashMap::from([("AAPL".to_string(), 500.0)]);
    manager.apply_price_update(&prices).await;

    // Step 3: Sizing authorizes an 8%-of-equity position in a second ticker,
    // but the notional exceeds cash and the ledger refuses
    let outcome = manager
        .process_entry(&buy_signal("MSFT", 50.0, now), None)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        EntryOutcome::LedgerRefused(LedgerRefusal::InsufficientFunds { .. })
    ));
}

/// Brokerage double with a scriptable position list and a close-call counter.
struct StubBroker {
    positions: Mutex<Vec<BrokerPosition>>,
    orders: Mutex<Vec<BrokerOrder>>,
    close_calls: AtomicUsize,
}

impl StubBroker {
    fn new(positions: Vec<BrokerPosition>) -> Self {
        Self {
            positions: Mutex::new(positions),
            orders: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        }
    }

    fn clear_positions(&self) {
        self.positions.lock().unwrap().clear();
        self.orders.lock().unwrap().clear();
    }
}

#[async_trait]
impl Brokerage for StubBroker {
    async fn get_account(&self) -> BrokerResult<AccountSnapshot> {
        Ok(AccountSnapshot {
            equity: 30_000.0,
            buying_power: 60_000.0,
            initial_margin: 0.0,
            margin_multiplier: 2.0,
            daytrading_buying_power: 120_000.0,
        })
    }

    async fn get_all_positions(&self) -> BrokerResult<Vec<BrokerPosition>> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn get_orders(&self) -> BrokerResult<Vec<BrokerOrder>> {
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn submit_order(
        &self,
        ticker: &str,
        qty: u64,
        side: OrderSide,
    ) -> BrokerResult<BrokerOrder> {
        let order = BrokerOrder {
            id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            qty: qty as f64,
            side,
            status: OrderStatus::Accepted,
            submitted_at: Utc::now(),
        };
        self.orders.lock().unwrap().push(order.clone());
        Ok(order)
    }

    async fn close_position(&self, ticker: &str) -> BrokerResult<BrokerOrder> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let order = BrokerOrder {
            id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            qty: 48.0,
            side: OrderSide::Sell,
            status: OrderStatus::Accepted,
            submitted_at: Utc::now(),
        };
        self.orders.lock().unwrap().push(order.clone());
        Ok(order)
    }
}

#[tokio::test]
async fn live_close_is_pending_once_and_confirmed_on_sync() {
    // Step 1: Sync a held position in from the brokerage
    let broker = Arc::new(StubBroker::new(vec![BrokerPosition {
        ticker: "AAPL".to_string(),
        qty: 48.0,
        qty_available: 48.0,
        avg_entry_price: 50.0,
        current_price: 52.0,
    }]));
    let manager = PositionManager::live(RiskConfig::default(), broker.clone());
    let now = Utc::now();

    manager.sync(now).await.unwrap();
    let position = manager.position("AAPL").await.unwrap();
    assert_eq!(position.qty(), 48);
    assert_eq!(position.current_price(), 52.0);

    // Step 2: First close submits, second is deduplicated
    let outcome = manager.close_position("AAPL", now).await.unwrap();
    assert!(matches!(outcome, CloseOutcome::Pending { .. }));

    let outcome = manager.close_position("AAPL", now).await.unwrap();
    assert_eq!(outcome, CloseOutcome::AlreadyPending);
    assert_eq!(broker.close_calls.load(Ordering::SeqCst), 1);

    // Step 3: The brokerage fills the close; the next sync retires the
    // position into history
    broker.clear_positions();
    manager.sync(now).await.unwrap();

    assert!(manager.positions().await.is_empty());
    let history = manager.closed_history().await;
    assert_eq!(history.len(), 1);
    let record = history.iter().next().unwrap();
    assert_eq!(record.ticker, "AAPL");
    assert_eq!(record.exit_price, 52.0);
}

#[tokio::test]
async fn stepped_target_caps_per_cycle_builds() {
    let manager = PositionManager::simulated(RiskConfig::default());
    let now = Utc::now();

    // No position yet: one step (2%) above zero
    let target = manager.stepped_target("AAPL").await.unwrap();
    assert_eq!(target, 0.02);

    // Open a 2% slice; the next step targets one step above the current
    // exposure, still well short of the 8% maximum
    let outcome = manager
        .process_entry(&buy_signal("AAPL", 50.0, now), Some(target))
        .await
        .unwrap();
    assert!(matches!(outcome, EntryOutcome::Filled { .. }));

    let target = manager.stepped_target("AAPL").await.unwrap();
    assert!(target > 0.03 && target < 0.06, "target was {target}");
}

#[test]
fn risk_config_rejects_invalid_fractions() {
    assert!(RiskConfig::default().with_max_position_size(0.0).is_err());
    assert!(RiskConfig::default().with_max_position_size(1.5).is_err());
    assert!(RiskConfig::default().with_stop_loss_pct(0.04).is_err());
    assert!(RiskConfig::default().with_score_bands(0.7, 0.4).is_err());
    assert!(RiskConfig::default().with_stagnation_rule(0, 0.01).is_err());
    assert!(RiskConfig::default().with_starting_balance(-1.0).is_err());

    let config = RiskConfig::default()
        .with_max_position_size(0.1)
        .unwrap()
        .with_stop_loss_pct(-0.05)
        .unwrap();
    assert_eq!(config.max_position_size(), 0.1);
    assert_eq!(config.stop_loss_pct(), -0.05);
}

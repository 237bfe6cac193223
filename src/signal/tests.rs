use super::*;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::{
    error::Result,
    market::{Bar, MarketData, fixtures::FixedHistory},
};

use super::error::SignalError;

/// Strategy double that always emits the same action and score on the last
/// bar it sees.
struct FixedStrategy {
    name: &'static str,
    action: SignalAction,
    score: f64,
}

#[async_trait]
impl Strategy for FixedStrategy {
    fn name(&self) -> &str {
        self.name
    }

    async fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<Option<Signal>> {
        let last = bars.last().ok_or("no bars provided")?;

        Ok(Some(Signal {
            strategy: self.name.to_string(),
            ticker: ticker.to_string(),
            price: last.close,
            action: self.action,
            score: Score::try_from(self.score)?,
            momentum: 0.0,
            time: last.time,
        }))
    }
}

struct PanickyStrategy;

#[async_trait]
impl Strategy for PanickyStrategy {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn evaluate(&self, _ticker: &str, _bars: &[Bar]) -> Result<Option<Signal>> {
        panic!("boom");
    }
}

struct FailingStrategy;

#[async_trait]
impl Strategy for FailingStrategy {
    fn name(&self) -> &str {
        "failing"
    }

    async fn evaluate(&self, _ticker: &str, _bars: &[Bar]) -> Result<Option<Signal>> {
        Err("upstream indicator unavailable".into())
    }
}

fn history(ticker: &str, bars: usize) -> Arc<dyn MarketData> {
    let start = Utc::now() - Duration::days(bars as i64);
    let bars = (0..bars)
        .map(|i| Bar::new_simple(start + Duration::days(i as i64), 100.0 + i as f64, 1_000))
        .collect();

    Arc::new(FixedHistory::new().with_ticker(ticker, bars))
}

#[tokio::test]
async fn strongest_conviction_picks_score_furthest_from_neutral() {
    // Step 1: Register a mildly bullish and a strongly bearish strategy
    let mut aggregator = StrategyAggregator::new(
        AggregatorConfig::default(),
        history("AAPL", 10),
        vec!["AAPL".to_string()],
    );

    aggregator.register(Box::new(FixedStrategy {
        name: "mild-bull",
        action: SignalAction::Buy,
        score: 0.6,
    }));
    aggregator.register(Box::new(FixedStrategy {
        name: "strong-bear",
        action: SignalAction::Sell,
        score: 0.1,
    }));

    // Step 2: The bearish signal wins, 0.4 from neutral beats 0.1
    let signals = aggregator.generate_signals(SignalMode::Live).await.unwrap();
    let signal = signals.get("AAPL").unwrap();
    assert_eq!(signal.strategy, "strong-bear");
    assert_eq!(signal.action, SignalAction::Sell);
}

#[tokio::test]
async fn conviction_ties_go_to_earlier_registration() {
    let mut aggregator = StrategyAggregator::new(
        AggregatorConfig::default(),
        history("AAPL", 10),
        vec!["AAPL".to_string()],
    );

    // Both are 0.3 from neutral
    aggregator.register(Box::new(FixedStrategy {
        name: "first",
        action: SignalAction::Buy,
        score: 0.8,
    }));
    aggregator.register(Box::new(FixedStrategy {
        name: "second",
        action: SignalAction::Sell,
        score: 0.2,
    }));

    let signals = aggregator.generate_signals(SignalMode::Live).await.unwrap();
    assert_eq!(signals.get("AAPL").unwrap().strategy, "first");
}

#[tokio::test]
async fn priority_policy_ignores_conviction() {
    let config = AggregatorConfig::default().with_merge_policy(MergePolicy::Priority);
    let mut aggregator =
        StrategyAggregator::new(config, history("AAPL", 10), vec!["AAPL".to_string()]);

    aggregator.register(Box::new(FixedStrategy {
        name: "weak-but-first",
        action: SignalAction::Buy,
        score: 0.55,
    }));
    aggregator.register(Box::new(FixedStrategy {
        name: "strong-but-second",
        action: SignalAction::Sell,
        score: 0.05,
    }));

    let signals = aggregator.generate_signals(SignalMode::Live).await.unwrap();
    assert_eq!(signals.get("AAPL").unwrap().strategy, "weak-but-first");
}

#[tokio::test]
async fn failing_and_panicking_strategies_do_not_poison_the_cycle() {
    // Step 1: Register a panicking, a failing, and a healthy strategy
    let mut aggregator = StrategyAggregator::new(
        AggregatorConfig::default(),
        history("AAPL", 10),
        vec!["AAPL".to_string()],
    );

    aggregator.register(Box::new(PanickyStrategy));
    aggregator.register(Box::new(FailingStrategy));
    aggregator.register(Box::new(FixedStrategy {
        name: "healthy",
        action: SignalAction::Buy,
        score: 0.7,
    }));

    // Step 2: The healthy strategy still produces the winning signal
    let signals = aggregator.generate_signals(SignalMode::Live).await.unwrap();
    assert_eq!(signals.get("AAPL").unwrap().strategy, "healthy");
}

#[tokio::test]
async fn hold_signals_and_dataless_tickers_are_skipped() {
    let mut aggregator = StrategyAggregator::new(
        AggregatorConfig::default(),
        history("AAPL", 10),
        vec!["AAPL".to_string(), "MSFT".to_string()],
    );

    aggregator.register(Box::new(FixedStrategy {
        name: "holder",
        action: SignalAction::Hold,
        score: 0.9,
    }));

    // AAPL only ever yields Hold signals and MSFT has no stored bars, so no
    // ticker gets a merged signal
    let signals = aggregator.generate_signals(SignalMode::Live).await.unwrap();
    assert!(signals.is_empty());
}

#[tokio::test]
async fn backtest_mode_hides_bars_after_the_simulated_clock() {
    let start = Utc::now() - Duration::days(10);
    let bars: Vec<Bar> = (0..10)
        .map(|i| Bar::new_simple(start + Duration::days(i), 100.0 + i as f64, 1_000))
        .collect();
    let cutoff = bars[4].time;
    let data = Arc::new(FixedHistory::new().with_ticker("AAPL", bars));

    let mut aggregator = StrategyAggregator::new(
        AggregatorConfig::default(),
        data,
        vec!["AAPL".to_string()],
    );
    aggregator.register(Box::new(FixedStrategy {
        name: "last-close",
        action: SignalAction::Buy,
        score: 0.7,
    }));

    // The signal price comes from the bar at the cutoff, not the real latest
    let signal = aggregator
        .generate_for("AAPL", "last-close", cutoff)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(signal.price, 104.0);
    assert_eq!(signal.time, cutoff);
}

#[tokio::test]
async fn unknown_strategy_name_is_a_typed_error() {
    let aggregator = StrategyAggregator::new(
        AggregatorConfig::default(),
        history("AAPL", 10),
        vec!["AAPL".to_string()],
    );

    let err = aggregator
        .generate_for("AAPL", "missing", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, SignalError::UnknownStrategy(name) if name == "missing"));
}

#[test]
fn score_rejects_values_outside_unit_interval() {
    assert!(Score::try_from(-0.1).is_err());
    assert!(Score::try_from(1.1).is_err());
    assert!(Score::try_from(f64::NAN).is_err());

    let score = Score::try_from(0.75).unwrap();
    assert_eq!(score.as_f64(), 0.75);
    assert_eq!(score.conviction(), 0.25);
    assert_eq!(Score::NEUTRAL.conviction(), 0.0);
}

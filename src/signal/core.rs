use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;

use crate::{error::Result, market::Bar, shared::LookbackWindow};

use super::error::{ScoreValidationError, SignalError, SignalResult};

/// Action recommended by a strategy for a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    /// Returns `true` if the action asks the risk engine to do something.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::Hold)
    }
}

/// Validated strength score in `[0, 1]`.
///
/// Expresses a strategy's confidence that a bullish case holds: above 0.5
/// leans bullish, below 0.5 leans bearish.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Score(f64);

impl Score {
    /// The indifferent score, `0.5`.
    pub const NEUTRAL: Self = Self(0.5);

    /// Returns the score as an `f64`.
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Returns the absolute distance from [`Score::NEUTRAL`], used by the
    /// strongest-conviction merge policy.
    pub fn conviction(self) -> f64 {
        (self.0 - 0.5).abs()
    }
}

impl TryFrom<f64> for Score {
    type Error = ScoreValidationError;

    fn try_from(value: f64) -> std::result::Result<Self, Self::Error> {
        if !(0.0..=1.0).contains(&value) || value.is_nan() {
            return Err(ScoreValidationError::OutOfRange { score: value });
        }
        Ok(Self(value))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Strategy output for a ticker at a point in time.
///
/// Ephemeral: created per evaluation cycle, consumed immediately by the risk
/// engine, never persisted.
#[derive(Debug, Clone)]
pub struct Signal {
    /// Name of the strategy that produced this signal.
    pub strategy: String,
    pub ticker: String,
    /// Market price at evaluation time.
    pub price: f64,
    pub action: SignalAction,
    pub score: Score,
    /// Signed recent price rate-of-change.
    pub momentum: f64,
    pub time: DateTime<Utc>,
}

impl Signal {
    /// Builds the synthetic signal used when evaluating exit rules for a
    /// ticker no strategy spoke about this cycle. Neutral score and zero
    /// momentum leave only the price-driven exit rules (stop-loss,
    /// stagnation) armed.
    pub(crate) fn exit_probe(ticker: &str, price: f64, time: DateTime<Utc>) -> Self {
        Self {
            strategy: "stop-loss".to_string(),
            ticker: ticker.to_string(),
            price,
            action: SignalAction::Hold,
            score: Score::NEUTRAL,
            momentum: 0.0,
            time,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} @ {:.2} (score {}, momentum {:+.4})",
            self.strategy, self.action, self.ticker, self.price, self.score, self.momentum
        )
    }
}

/// Pluggable trading strategy contract.
///
/// A strategy is polymorphic over a single capability: evaluate a ticker's
/// time series and optionally produce a [`Signal`]. Strategies never observe
/// each other's output. Returning `Ok(None)` means the strategy declines to
/// act this cycle.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use chrono::Utc;
/// use stratoxide::{
///     error::Result,
///     market::Bar,
///     signal::{Score, Signal, SignalAction, Strategy},
/// };
///
/// struct CloseAboveOpen;
///
/// #[async_trait]
/// impl Strategy for CloseAboveOpen {
///     fn name(&self) -> &str {
///         "close-above-open"
///     }
///
///     async fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<Option<Signal>> {
///         let Some(last) = bars.last() else {
///             return Ok(None);
///         };
///
///         if last.close <= last.open {
///             return Ok(None);
///         }
///
///         Ok(Some(Signal {
///             strategy: self.name().to_string(),
///             ticker: ticker.to_string(),
///             price: last.close,
///             action: SignalAction::Buy,
///             score: Score::try_from(0.7)?,
///             momentum: (last.close - last.open) / last.open,
///             time: last.time,
///         }))
///     }
/// }
/// ```
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Returns the unique name of this strategy, used for registration and
    /// backtest selection.
    fn name(&self) -> &str;

    /// Returns the number of bars this strategy wants to see, or `None` to use
    /// the aggregator's configured window.
    fn lookback(&self) -> Option<LookbackWindow> {
        None
    }

    /// Evaluates a ticker's time series, ordered chronologically with the most
    /// recent bar last, and optionally produces a signal.
    async fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<Option<Signal>>;
}

/// Internal wrapper that provides panic protection for strategy
/// implementations, so a panicking strategy cannot take down the engine.
pub(super) struct WrappedStrategy(Box<dyn Strategy>);

impl WrappedStrategy {
    pub fn new(strategy: Box<dyn Strategy>) -> Self {
        Self(strategy)
    }

    pub fn name(&self) -> SignalResult<String> {
        panic::catch_unwind(AssertUnwindSafe(|| self.0.name().to_string()))
            .map_err(|e| SignalError::StrategyNamePanicked(e.into()))
    }

    pub fn lookback(&self) -> SignalResult<Option<LookbackWindow>> {
        panic::catch_unwind(AssertUnwindSafe(|| self.0.lookback()))
            .map_err(|e| SignalError::StrategyLookbackPanicked(e.into()))
    }

    pub async fn evaluate(&self, ticker: &str, bars: &[Bar]) -> SignalResult<Option<Signal>> {
        FutureExt::catch_unwind(AssertUnwindSafe(self.0.evaluate(ticker, bars)))
            .await
            .map_err(|e| SignalError::StrategyEvaluatePanicked(e.into()))?
            .map_err(|e| SignalError::StrategyEvaluateError(e.to_string()))
    }
}

use super::error::{RiskConfigError, RiskConfigResult};

/// Sizing and exit policy parameters for a [`PositionManager`](super::PositionManager).
///
/// Percentage fields are fractions of account equity, not whole percents.
/// Loss thresholds are negative fractions.
#[derive(Debug, Clone, Copy)]
pub struct RiskConfig {
    max_position_size: f64,
    position_step_size: f64,
    max_total_exposure: f64,
    stop_loss_pct: f64,
    add_loss_limit: f64,
    weak_long_score: f64,
    strong_short_score: f64,
    momentum_threshold: f64,
    stagnation_days: i64,
    stagnation_pl_pct: f64,
    starting_balance: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: 0.08,
            position_step_size: 0.02,
            max_total_exposure: 1.6,
            stop_loss_pct: -0.04,
            add_loss_limit: -0.02,
            weak_long_score: 0.4,
            strong_short_score: 0.6,
            momentum_threshold: 0.02,
            stagnation_days: 5,
            stagnation_pl_pct: 0.01,
            starting_balance: 30_000.0,
        }
    }
}

impl RiskConfig {
    /// Per-ticker target position size as a fraction of equity.
    pub fn max_position_size(&self) -> f64 {
        self.max_position_size
    }

    /// Per-cycle cap on how much of equity a single add may claim while
    /// building toward the target.
    pub fn position_step_size(&self) -> f64 {
        self.position_step_size
    }

    /// Portfolio-wide exposure ceiling as a fraction of equity.
    pub fn max_total_exposure(&self) -> f64 {
        self.max_total_exposure
    }

    /// P&L fraction below which a position is force-closed.
    pub fn stop_loss_pct(&self) -> f64 {
        self.stop_loss_pct
    }

    /// P&L fraction below which further adds are refused.
    pub fn add_loss_limit(&self) -> f64 {
        self.add_loss_limit
    }

    /// Score below which a long position is considered contradicted.
    pub fn weak_long_score(&self) -> f64 {
        self.weak_long_score
    }

    /// Score above which a short position is considered contradicted.
    pub fn strong_short_score(&self) -> f64 {
        self.strong_short_score
    }

    /// Momentum magnitude beyond which a move against the position triggers
    /// an exit.
    pub fn momentum_threshold(&self) -> f64 {
        self.momentum_threshold
    }

    /// Days held after which a flat position is considered stagnant.
    pub fn stagnation_days(&self) -> i64 {
        self.stagnation_days
    }

    /// Absolute P&L fraction under which a long-held position counts as flat.
    pub fn stagnation_pl_pct(&self) -> f64 {
        self.stagnation_pl_pct
    }

    /// Opening cash balance for simulated ledgers.
    pub fn starting_balance(&self) -> f64 {
        self.starting_balance
    }

    pub fn with_max_position_size(mut self, fraction: f64) -> RiskConfigResult<Self> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(RiskConfigError::InvalidMaxPositionSize { fraction });
        }
        self.max_position_size = fraction;
        Ok(self)
    }

    pub fn with_position_step_size(mut self, fraction: f64) -> RiskConfigResult<Self> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(RiskConfigError::InvalidPositionStepSize { fraction });
        }
        self.position_step_size = fraction;
        Ok(self)
    }

    pub fn with_max_total_exposure(mut self, fraction: f64) -> RiskConfigResult<Self> {
        if !(fraction > 0.0) {
            return Err(RiskConfigError::InvalidMaxTotalExposure { fraction });
        }
        self.max_total_exposure = fraction;
        Ok(self)
    }

    pub fn with_stop_loss_pct(mut self, fraction: f64) -> RiskConfigResult<Self> {
        if !(fraction < 0.0) {
            return Err(RiskConfigError::InvalidLossThreshold { fraction });
        }
        self.stop_loss_pct = fraction;
        Ok(self)
    }

    pub fn with_add_loss_limit(mut self, fraction: f64) -> RiskConfigResult<Self> {
        if !(fraction < 0.0) {
            return Err(RiskConfigError::InvalidLossThreshold { fraction });
        }
        self.add_loss_limit = fraction;
        Ok(self)
    }

    pub fn with_score_bands(mut self, weak_long: f64, strong_short: f64) -> RiskConfigResult<Self> {
        if !(0.0..=1.0).contains(&weak_long)
            || !(0.0..=1.0).contains(&strong_short)
            || weak_long > strong_short
        {
            return Err(RiskConfigError::InvalidScoreBands {
                weak_long,
                strong_short,
            });
        }
        self.weak_long_score = weak_long;
        self.strong_short_score = strong_short;
        Ok(self)
    }

    pub fn with_momentum_threshold(mut self, fraction: f64) -> RiskConfigResult<Self> {
        if !(fraction > 0.0) {
            return Err(RiskConfigError::InvalidMomentumThreshold { fraction });
        }
        self.momentum_threshold = fraction;
        Ok(self)
    }

    pub fn with_stagnation_rule(mut self, days: i64, pl_pct: f64) -> RiskConfigResult<Self> {
        if days < 1 || !(pl_pct > 0.0) {
            return Err(RiskConfigError::InvalidStagnationRule { days, pl_pct });
        }
        self.stagnation_days = days;
        self.stagnation_pl_pct = pl_pct;
        Ok(self)
    }

    pub fn with_starting_balance(mut self, balance: f64) -> RiskConfigResult<Self> {
        if !(balance > 0.0) {
            return Err(RiskConfigError::InvalidStartingBalance { balance });
        }
        self.starting_balance = balance;
        Ok(self)
    }
}

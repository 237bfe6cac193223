use super::error::{BacktestError, Result};

/// Configuration parameters for backtest runs.
pub struct BacktestConfig {
    snapshot_every: usize,
    channel_capacity: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            snapshot_every: 1,
            channel_capacity: 100,
        }
    }
}

impl BacktestConfig {
    /// Number of bars between pushed snapshots. The final bar always
    /// produces one.
    pub fn snapshot_every(&self) -> usize {
        self.snapshot_every
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn with_snapshot_every(mut self, bars: usize) -> Result<Self> {
        if bars == 0 {
            return Err(BacktestError::InvalidConfigurationSnapshotEvery { bars });
        }
        self.snapshot_every = bars;
        Ok(self)
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Result<Self> {
        if capacity < 16 {
            return Err(BacktestError::InvalidConfigurationChannelCapacity { capacity });
        }
        self.channel_capacity = capacity;
        Ok(self)
    }
}

use tokio::time;

use super::error::{LiveError, Result};

/// Configuration parameters for the live trading control loop.
#[derive(Clone, Debug)]
pub struct LiveTradeConfig {
    tick_interval: time::Duration,
    restart_interval: time::Duration,
    shutdown_timeout: time::Duration,
    channel_capacity: usize,
}

impl Default for LiveTradeConfig {
    fn default() -> Self {
        Self {
            tick_interval: time::Duration::from_secs(60),
            restart_interval: time::Duration::from_secs(10),
            shutdown_timeout: time::Duration::from_secs(6),
            channel_capacity: 1_000,
        }
    }
}

impl LiveTradeConfig {
    /// Sleep between control-loop iterations.
    pub fn tick_interval(&self) -> time::Duration {
        self.tick_interval
    }

    /// Sleep before restarting after a recoverable failure.
    pub fn restart_interval(&self) -> time::Duration {
        self.restart_interval
    }

    /// How long a graceful shutdown waits before aborting the process task.
    pub fn shutdown_timeout(&self) -> time::Duration {
        self.shutdown_timeout
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn with_tick_interval(mut self, interval: time::Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(LiveError::InvalidConfigurationZeroInterval);
        }
        self.tick_interval = interval;
        Ok(self)
    }

    pub fn with_restart_interval(mut self, interval: time::Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(LiveError::InvalidConfigurationZeroInterval);
        }
        self.restart_interval = interval;
        Ok(self)
    }

    pub fn with_shutdown_timeout(mut self, timeout: time::Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Result<Self> {
        if capacity < 16 {
            return Err(LiveError::InvalidConfigurationChannelCapacity { capacity });
        }
        self.channel_capacity = capacity;
        Ok(self)
    }
}

#[derive(Clone, Debug)]
pub(super) struct LiveProcessConfig {
    tick_interval: time::Duration,
    restart_interval: time::Duration,
}

impl LiveProcessConfig {
    pub fn tick_interval(&self) -> time::Duration {
        self.tick_interval
    }

    pub fn restart_interval(&self) -> time::Duration {
        self.restart_interval
    }
}

impl From<&LiveTradeConfig> for LiveProcessConfig {
    fn from(value: &LiveTradeConfig) -> Self {
        Self {
            tick_interval: value.tick_interval,
            restart_interval: value.restart_interval,
        }
    }
}

#[derive(Clone, Debug)]
pub(super) struct LiveControllerConfig {
    shutdown_timeout: time::Duration,
}

impl LiveControllerConfig {
    pub fn shutdown_timeout(&self) -> time::Duration {
        self.shutdown_timeout
    }
}

impl From<&LiveTradeConfig> for LiveControllerConfig {
    fn from(value: &LiveTradeConfig) -> Self {
        Self {
            shutdown_timeout: value.shutdown_timeout,
        }
    }
}

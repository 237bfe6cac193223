use std::fmt;

pub mod error;

use error::LookbackWindowValidationError;

/// Validated lookback window specifying how many bars of historical data to
/// provide for strategy evaluation.
///
/// Represents a number of bars with enforced minimum and maximum bounds. The
/// actual time span depends on the bar resolution served by the data
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
pub struct LookbackWindow(u64);

impl LookbackWindow {
    /// Minimum lookback window: 2 bars.
    pub const MIN: Self = Self(2);

    /// Maximum lookback window: 10,000 bars.
    pub const MAX: Self = Self(10_000);

    /// Default lookback window: 50 bars.
    pub const DEFAULT: Self = Self(50);

    /// Returns the number of bars as a `u64`.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the number of bars as a `usize`.
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u64> for LookbackWindow {
    type Error = LookbackWindowValidationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < Self::MIN.0 || value > Self::MAX.0 {
            return Err(LookbackWindowValidationError::OutOfRange {
                bars: value,
                min: Self::MIN.0,
                max: Self::MAX.0,
            });
        }

        Ok(Self(value))
    }
}

impl fmt::Display for LookbackWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bars", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookback_window_bounds_are_enforced() {
        assert!(LookbackWindow::try_from(1).is_err());
        assert!(LookbackWindow::try_from(10_001).is_err());

        let window = LookbackWindow::try_from(200).unwrap();
        assert_eq!(window.as_u64(), 200);
        assert_eq!(window.as_usize(), 200);
        assert_eq!(window.to_string(), "200 bars");
    }
}

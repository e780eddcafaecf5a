use core::time::Duration;
use std::sync::Arc;

use crate::{Error, Result};

/// Default epoch: Friday, May 20, 2016 00:00:00 UTC
pub const DEFAULT_EPOCH: Duration = Duration::from_secs(1_463_702_400);

/// Custom epoch: Friday, January 1, 2021 00:00:00 UTC
pub const EPOCH_2021: Duration = Duration::from_secs(1_609_459_200);

/// A trait for time sources that return a wall-clock timestamp.
///
/// This abstraction allows you to plug in a real system clock or a mocked
/// time source in tests.
///
/// The unit is whole **seconds** since the UNIX epoch, truncated. Generators
/// subtract their configured epoch and detect readings that move backwards.
///
/// # Example
///
/// ```
/// use ringuid::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_seconds(&self) -> u64 {
///         1234
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_seconds(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in whole seconds since the UNIX epoch.
    fn current_seconds(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn current_seconds(&self) -> u64 {
        (**self).current_seconds()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn current_seconds(&self) -> u64 {
        (**self).current_seconds()
    }
}

/// Converts an absolute second into seconds since `epoch_seconds`, checking
/// that it fits in `max_delta_seconds`.
///
/// # Errors
///
/// - [`Error::ClockBeforeEpoch`] if `current_second` precedes the epoch.
/// - [`Error::TimestampExhausted`] if the delta no longer fits.
pub fn checked_delta(
    current_second: u64,
    epoch_seconds: u64,
    max_delta_seconds: u64,
) -> Result<u64> {
    let Some(delta_seconds) = current_second.checked_sub(epoch_seconds) else {
        return Err(Error::ClockBeforeEpoch {
            current_second,
            epoch_seconds,
        });
    };
    if delta_seconds > max_delta_seconds {
        return Err(Error::TimestampExhausted {
            delta_seconds,
            max_delta_seconds,
        });
    }
    Ok(delta_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_delta_bounds() {
        assert_eq!(checked_delta(150, 100, 50).unwrap(), 50);
        assert!(matches!(
            checked_delta(151, 100, 50),
            Err(Error::TimestampExhausted {
                delta_seconds: 51,
                max_delta_seconds: 50
            })
        ));
        assert!(matches!(
            checked_delta(99, 100, 50),
            Err(Error::ClockBeforeEpoch { .. })
        ));
    }
}

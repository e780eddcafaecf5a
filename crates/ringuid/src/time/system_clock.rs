use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;

use crate::{Error, Result, TimeSource};

/// A wall-clock time source backed by [`SystemTime`].
///
/// Unlike a monotonic timer, the wall clock may be adjusted externally (NTP
/// steps, manual changes). That is intentional: generators compare each
/// reading against the last issued second and refuse to mint ids when the
/// clock moves backwards.
///
/// A system time earlier than the UNIX epoch reads as `0`, which every
/// generator rejects as being before its configured epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs())
    }
}

/// Parses an epoch given as a `YYYY-MM-DD` date, taken as midnight UTC.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if the string is not a valid date or the
/// date precedes 1970-01-01.
///
/// # Example
///
/// ```
/// use ringuid::{EPOCH_2021, parse_epoch};
///
/// assert_eq!(parse_epoch("2021-01-01").unwrap(), EPOCH_2021);
/// ```
pub fn parse_epoch(date: &str) -> Result<Duration> {
    let parsed = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|e| {
        Error::InvalidConfig {
            reason: format!("epoch `{date}` is not a YYYY-MM-DD date: {e}"),
        }
    })?;

    let seconds = parsed
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .and_then(|secs| u64::try_from(secs).ok())
        .ok_or_else(|| Error::InvalidConfig {
            reason: format!("epoch `{date}` precedes 1970-01-01"),
        })?;

    Ok(Duration::from_secs(seconds))
}

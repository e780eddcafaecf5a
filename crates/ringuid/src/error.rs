//! Error types for ID generation.
//!
//! Every failure `ringuid` can surface is a variant of [`Error`], so callers
//! only ever match on one type while still seeing the specific cause.
//!
//! ## Error classes
//! - Boot failures: [`Error::InvalidBitLayout`], [`Error::WorkerIdOutOfRange`],
//!   [`Error::InstanceIdUnavailable`], [`Error::InvalidConfig`] and
//!   [`Error::Spawn`]. The generator never comes up.
//! - Clock failures: [`Error::ClockMovedBackward`] is per call and may succeed
//!   once the clock recovers. [`Error::TimestampExhausted`] and
//!   [`Error::ClockBeforeEpoch`] are [fatal](Error::is_fatal) and need an
//!   operator to rotate the epoch or the bit layout.
//! - Buffer failures: [`Error::BufferExhausted`] is transient.

/// A result type defaulting to the crate [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `ringuid` can emit.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// `1 + timestamp_bits + worker_id_bits + sequence_bits` must be exactly
    /// 64 and no field may be empty.
    #[error(
        "invalid bit layout: 1 sign + {timestamp_bits} timestamp + {worker_id_bits} worker + {sequence_bits} sequence bits must total 64 with no empty field"
    )]
    InvalidBitLayout {
        /// Requested timestamp width.
        timestamp_bits: u32,
        /// Requested worker id width.
        worker_id_bits: u32,
        /// Requested sequence width.
        sequence_bits: u32,
    },

    /// The assigned instance id does not fit in the worker id field.
    #[error("instance id {worker_id} exceeds the maximum worker id {max_worker_id}")]
    WorkerIdOutOfRange {
        /// Assigned instance id.
        worker_id: u64,
        /// Largest id the layout can encode.
        max_worker_id: u64,
    },

    /// The instance id assigner kept answering "retry".
    #[error("no instance id could be assigned after {attempts} attempts")]
    InstanceIdUnavailable {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human readable description of the offending value.
        reason: String,
    },

    /// A background padding thread could not be started.
    #[error("failed to spawn padding thread: {0}")]
    Spawn(std::io::Error),

    /// The clock went backwards relative to the last issued second.
    #[error("clock moved backwards, refusing to generate ids for {refused_seconds} seconds")]
    ClockMovedBackward {
        /// How far behind the last issued second the clock is.
        refused_seconds: u64,
    },

    /// The current time no longer fits in the timestamp field.
    #[error("timestamp bits exhausted: delta {delta_seconds}s exceeds {max_delta_seconds}s")]
    TimestampExhausted {
        /// Seconds elapsed since the configured epoch.
        delta_seconds: u64,
        /// Largest delta the layout can encode.
        max_delta_seconds: u64,
    },

    /// The clock reads earlier than the configured epoch.
    #[error("clock reads {current_second}s, before the epoch at {epoch_seconds}s")]
    ClockBeforeEpoch {
        /// Clock reading in seconds since the UNIX epoch.
        current_second: u64,
        /// Configured epoch in seconds since the UNIX epoch.
        epoch_seconds: u64,
    },

    /// Every sequence of the current second was issued and the clock did not
    /// advance within the allowed wait.
    #[error("sequence exhausted for second {second} and the clock did not advance")]
    SequenceExhausted {
        /// The exhausted second.
        second: u64,
    },

    /// No precomputed id was available.
    #[error("ring buffer exhausted: no precomputed id available")]
    BufferExhausted,

    /// A claimed slot was not in the takable state.
    #[error("ring buffer slot {index} is not takable (cursor {cursor})")]
    InconsistentSlot {
        /// Slot index within the ring.
        index: usize,
        /// Cursor position that claimed the slot.
        cursor: u64,
    },

    /// The operation failed because the lock was **poisoned**.
    ///
    /// This occurs when a thread panics while holding the lock. When the
    /// `parking-lot` feature is enabled, mutexes do **not** poison, so this
    /// variant is not available.
    #[cfg(not(feature = "parking-lot"))]
    #[error("lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Returns `true` for failures that must abort process startup.
    pub const fn is_boot_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidBitLayout { .. }
                | Self::WorkerIdOutOfRange { .. }
                | Self::InstanceIdUnavailable { .. }
                | Self::InvalidConfig { .. }
                | Self::Spawn(_)
        )
    }

    /// Returns `true` for clock failures no retry can recover from: the
    /// layout's timestamp space no longer covers the clock.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TimestampExhausted { .. } | Self::ClockBeforeEpoch { .. }
        )
    }

    /// Copy of a fatal clock error, `None` for every other variant.
    pub(crate) fn fatal_copy(&self) -> Option<Self> {
        match *self {
            Self::TimestampExhausted {
                delta_seconds,
                max_delta_seconds,
            } => Some(Self::TimestampExhausted {
                delta_seconds,
                max_delta_seconds,
            }),
            Self::ClockBeforeEpoch {
                current_second,
                epoch_seconds,
            } => Some(Self::ClockBeforeEpoch {
                current_second,
                epoch_seconds,
            }),
            _ => None,
        }
    }

    /// Returns `true` when retrying the same call later may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ClockMovedBackward { .. }
                | Self::SequenceExhausted { .. }
                | Self::BufferExhausted
        )
    }
}

#[cfg(not(feature = "parking-lot"))]
use crate::mutex::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failures_are_boot_failures() {
        let err = Error::Spawn(std::io::Error::other("no threads left"));
        assert!(err.is_boot_failure());
        assert!(!err.is_retryable());
        assert!(err.fatal_copy().is_none());
        assert_eq!(
            err.to_string(),
            "failed to spawn padding thread: no threads left"
        );
    }

    #[test]
    fn only_clock_capacity_errors_are_fatal() {
        let exhausted = Error::TimestampExhausted {
            delta_seconds: 4,
            max_delta_seconds: 3,
        };
        assert!(exhausted.is_fatal());
        assert!(matches!(
            exhausted.fatal_copy(),
            Some(Error::TimestampExhausted {
                delta_seconds: 4,
                max_delta_seconds: 3
            })
        ));

        let before_epoch = Error::ClockBeforeEpoch {
            current_second: 1,
            epoch_seconds: 2,
        };
        assert!(before_epoch.is_fatal());
        assert!(before_epoch.fatal_copy().is_some());

        assert!(!Error::BufferExhausted.is_fatal());
        assert!(Error::BufferExhausted.fatal_copy().is_none());
        assert!(!Error::ClockMovedBackward { refused_seconds: 1 }.is_fatal());
    }
}

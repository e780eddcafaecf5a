use core::{fmt, time::Duration};
use std::{thread, time::Instant};

use crate::{Error, Result, RingBuffer};

/// Why [`RingBuffer::put`] refused an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutRejection {
    /// The buffer already holds `buffer_size` ids.
    Full,
    /// The target slot was claimed by a consumer that has not finished
    /// reading it.
    SlotInUse,
}

impl fmt::Display for PutRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "ring buffer is full",
            Self::SlotInUse => "target slot is still being read",
        })
    }
}

/// Policy invoked when [`RingBuffer::put`] cannot accept an id.
///
/// Rejected puts are not errors. The padding pass that hit the rejection
/// stops early and resumes on the next trigger.
pub trait RejectedPutHandler: Send + Sync {
    /// Called with the id that was not stored and the reason.
    fn rejected_put(&self, buffer: &RingBuffer, uid: u64, reason: PutRejection);
}

/// Policy invoked when [`RingBuffer::take`] finds no id to hand out.
///
/// The returned value is what `take` returns to its caller.
pub trait RejectedTakeHandler: Send + Sync {
    /// Called when the buffer is empty.
    ///
    /// # Errors
    ///
    /// Implementations decide; the default fails with
    /// [`Error::BufferExhausted`].
    fn rejected_take(&self, buffer: &RingBuffer) -> Result<u64>;
}

impl<F> RejectedPutHandler for F
where
    F: Fn(&RingBuffer, u64, PutRejection) + Send + Sync,
{
    fn rejected_put(&self, buffer: &RingBuffer, uid: u64, reason: PutRejection) {
        self(buffer, uid, reason);
    }
}

impl<F> RejectedTakeHandler for F
where
    F: Fn(&RingBuffer) -> Result<u64> + Send + Sync,
{
    fn rejected_take(&self, buffer: &RingBuffer) -> Result<u64> {
        self(buffer)
    }
}

/// Default put policy: drop the id and log.
///
/// Dropped ids were never handed out, so skipping them cannot break
/// uniqueness.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardPut;

impl RejectedPutHandler for DiscardPut {
    fn rejected_put(&self, _buffer: &RingBuffer, _uid: u64, _reason: PutRejection) {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            uid = _uid,
            tail = _buffer.tail(),
            cursor = _buffer.cursor(),
            reason = %_reason,
            "rejected putting uid into ring buffer"
        );
    }
}

/// Default take policy: fail immediately with [`Error::BufferExhausted`].
///
/// The caller is never blocked.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFastTake;

impl RejectedTakeHandler for FailFastTake {
    fn rejected_take(&self, _buffer: &RingBuffer) -> Result<u64> {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            tail = _buffer.tail(),
            cursor = _buffer.cursor(),
            "rejected taking uid from empty ring buffer"
        );
        Err(Error::BufferExhausted)
    }
}

/// Opt-in blocking take policy: poll the buffer until an id shows up or
/// `timeout` elapses.
///
/// Polling yields the thread between attempts and backs off to short sleeps
/// after the first millisecond, so waiting callers do not pin a core while the
/// padding worker catches up.
#[derive(Debug, Clone, Copy)]
pub struct WaitingTake {
    /// Longest time a single `take` may wait.
    pub timeout: Duration,
}

impl WaitingTake {
    const YIELD_PHASE: Duration = Duration::from_millis(1);
    const SLEEP_STEP: Duration = Duration::from_micros(100);

    /// Creates a policy that waits at most `timeout`.
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl RejectedTakeHandler for WaitingTake {
    fn rejected_take(&self, buffer: &RingBuffer) -> Result<u64> {
        let start = Instant::now();
        loop {
            if let Some(uid) = buffer.try_take()? {
                return Ok(uid);
            }

            let waited = start.elapsed();
            if waited >= self.timeout {
                #[cfg(feature = "tracing")]
                tracing::warn!(?waited, "timed out waiting for ring buffer padding");
                return Err(Error::BufferExhausted);
            }

            if waited < Self::YIELD_PHASE {
                thread::yield_now();
            } else {
                thread::sleep(Self::SLEEP_STEP);
            }
        }
    }
}

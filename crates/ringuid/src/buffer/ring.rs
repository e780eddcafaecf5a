use core::fmt;
use std::sync::OnceLock;

use portable_atomic::{AtomicU8, AtomicU64, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    DiscardPut, Error, FailFastTake, PutRejection, RejectedPutHandler, RejectedTakeHandler,
    Result,
    mutex::{Mutex, lock_unpoisoned},
};

/// `buffer_size * padding_factor / 100`, at least 1.
///
/// The product is taken in `u64` so it cannot overflow a 32-bit `usize`. The
/// result never exceeds `buffer_size` for factors below 100.
pub(crate) const fn padding_threshold_for(buffer_size: usize, padding_factor: u32) -> usize {
    let threshold = buffer_size as u64 * padding_factor as u64 / 100;
    if threshold == 0 { 1 } else { threshold as usize }
}

/// Slot holds no id; a producer may write it.
const PUTTABLE: u8 = 0;
/// Slot holds a published id; a consumer may read it.
const TAKABLE: u8 = 1;

#[cfg(feature = "cache-padded")]
type Padded<T> = crossbeam_utils::CachePadded<T>;
#[cfg(not(feature = "cache-padded"))]
type Padded<T> = T;

#[cfg(feature = "cache-padded")]
fn padded<T>(value: T) -> Padded<T> {
    crossbeam_utils::CachePadded::new(value)
}
#[cfg(not(feature = "cache-padded"))]
fn padded<T>(value: T) -> Padded<T> {
    value
}

type PaddingTrigger = Box<dyn Fn() + Send + Sync>;

/// A fixed-capacity circular store of precomputed ids.
///
/// Two monotonically increasing counters drive the ring: `tail` counts
/// published ids and `cursor` counts taken ones, so `tail - cursor` is the
/// number of ids currently held (never more than [`Self::buffer_size`]).
/// Position `p` lives in slot `p & (buffer_size - 1)`. Each slot carries a
/// `PUTTABLE`/`TAKABLE` flag so a producer never overwrites a slot that a
/// consumer has claimed but not finished reading.
///
/// ## Concurrency
/// - [`Self::take`] is lock-free. Consumers claim a position by CAS on
///   `cursor`, then read the slot and hand it back to producers.
/// - [`Self::put`] writes the value, then flips the flag to `TAKABLE`, then
///   publishes `tail` with release ordering. Producers are serialized by a
///   producer-side mutex rather than a CAS on `tail`: there is normally one
///   producer (the padding worker) and it puts a whole second per lock
///   acquisition via [`Self::put_batch`]. Consumers never touch that mutex.
///
/// ## Padding
/// After every take, if fewer than [`Self::padding_threshold`] ids remain,
/// the registered padding trigger fires. The trigger must not block.
///
/// # Example
///
/// ```
/// use ringuid::{Error, RingBuffer};
///
/// let buffer = RingBuffer::new(4, 50).unwrap();
/// assert!(buffer.put(10));
/// assert!(buffer.put(11));
/// assert_eq!(buffer.take().unwrap(), 10);
/// assert_eq!(buffer.take().unwrap(), 11);
/// assert!(matches!(buffer.take(), Err(Error::BufferExhausted)));
/// ```
pub struct RingBuffer {
    slots: Box<[AtomicU64]>,
    flags: Box<[AtomicU8]>,
    tail: Padded<AtomicU64>,
    cursor: Padded<AtomicU64>,
    index_mask: u64,
    buffer_size: usize,
    padding_threshold: usize,
    put_lock: Mutex<()>,
    put_handler: Box<dyn RejectedPutHandler>,
    take_handler: Box<dyn RejectedTakeHandler>,
    padding_trigger: OnceLock<PaddingTrigger>,
}

impl RingBuffer {
    /// Padding factor used when none is configured, in percent.
    pub const DEFAULT_PADDING_FACTOR: u32 = 50;

    /// Largest supported buffer size.
    pub const MAX_BUFFER_SIZE: usize = 1 << 28;

    /// Creates a buffer with the default [`DiscardPut`] and [`FailFastTake`]
    /// policies.
    ///
    /// # Errors
    ///
    /// See [`Self::with_handlers`].
    pub fn new(buffer_size: usize, padding_factor: u32) -> Result<Self> {
        Self::with_handlers(
            buffer_size,
            padding_factor,
            Box::new(DiscardPut),
            Box::new(FailFastTake),
        )
    }

    /// Creates a buffer with custom rejection policies.
    ///
    /// `padding_threshold = buffer_size * padding_factor / 100`, but at least
    /// one so that draining the buffer always triggers padding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `buffer_size` is not a power of two
    /// in `1..=MAX_BUFFER_SIZE` or `padding_factor` is not in `1..100`.
    pub fn with_handlers(
        buffer_size: usize,
        padding_factor: u32,
        put_handler: Box<dyn RejectedPutHandler>,
        take_handler: Box<dyn RejectedTakeHandler>,
    ) -> Result<Self> {
        if !buffer_size.is_power_of_two() || buffer_size > Self::MAX_BUFFER_SIZE {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "ring buffer size {buffer_size} must be a power of two no larger than {}",
                    Self::MAX_BUFFER_SIZE
                ),
            });
        }
        if padding_factor == 0 || padding_factor >= 100 {
            return Err(Error::InvalidConfig {
                reason: format!("padding factor {padding_factor} must be in 1..100 percent"),
            });
        }

        let padding_threshold = padding_threshold_for(buffer_size, padding_factor);

        Ok(Self {
            slots: (0..buffer_size).map(|_| AtomicU64::new(0)).collect(),
            flags: (0..buffer_size).map(|_| AtomicU8::new(PUTTABLE)).collect(),
            tail: padded(AtomicU64::new(0)),
            cursor: padded(AtomicU64::new(0)),
            index_mask: buffer_size as u64 - 1,
            buffer_size,
            padding_threshold,
            put_lock: Mutex::new(()),
            put_handler,
            take_handler,
            padding_trigger: OnceLock::new(),
        })
    }

    /// Registers the callback fired when the buffer runs low.
    ///
    /// Only the first registration takes effect; returns `false` if a trigger
    /// was already set.
    pub fn set_padding_trigger(&self, trigger: impl Fn() + Send + Sync + 'static) -> bool {
        self.padding_trigger.set(Box::new(trigger)).is_ok()
    }

    /// Stores one id.
    ///
    /// Returns `false` (after invoking the rejected put policy) if the buffer
    /// is full or the next slot is still being read.
    pub fn put(&self, uid: u64) -> bool {
        let result = {
            let _guard = lock_unpoisoned(&self.put_lock);
            self.put_locked(uid)
        };
        match result {
            Ok(()) => true,
            Err(reason) => {
                self.put_handler.rejected_put(self, uid, reason);
                false
            }
        }
    }

    /// Stores ids in order under a single acquisition of the producer lock.
    ///
    /// Stops at the first id that does not fit, invokes the rejected put
    /// policy for it, and returns how many ids were stored.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
    pub fn put_batch<I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = u64>,
    {
        let mut stored = 0;
        let mut rejected = None;
        {
            let _guard = lock_unpoisoned(&self.put_lock);
            for uid in ids {
                if let Err(reason) = self.put_locked(uid) {
                    rejected = Some((uid, reason));
                    break;
                }
                stored += 1;
            }
        }
        if let Some((uid, reason)) = rejected {
            self.put_handler.rejected_put(self, uid, reason);
        }
        stored
    }

    /// Takes the oldest id.
    ///
    /// # Errors
    ///
    /// - Whatever the rejected take policy returns if the buffer is empty;
    ///   [`Error::BufferExhausted`] by default.
    /// - [`Error::InconsistentSlot`] if a claimed slot was not published.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn take(&self) -> Result<u64> {
        match self.try_take()? {
            Some(uid) => Ok(uid),
            None => self.take_handler.rejected_take(self),
        }
    }

    /// Takes the oldest id, returning `Ok(None)` instead of invoking the
    /// rejected take policy when the buffer is empty.
    ///
    /// # Errors
    ///
    /// [`Error::InconsistentSlot`] if a claimed slot was not published.
    pub fn try_take(&self) -> Result<Option<u64>> {
        let mut cursor = self.cursor.load(Ordering::Relaxed);
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            if cursor >= tail {
                self.fire_padding_trigger();
                return Ok(None);
            }
            match self.cursor.compare_exchange_weak(
                cursor,
                cursor + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => cursor = actual,
            }
        }

        let index = self.index(cursor);
        if self.flags[index].load(Ordering::Acquire) != TAKABLE {
            return Err(Self::cold_inconsistent_slot(index, cursor));
        }
        let uid = self.slots[index].load(Ordering::Relaxed);
        self.flags[index].store(PUTTABLE, Ordering::Release);

        let remaining = self.tail.load(Ordering::Acquire) - (cursor + 1);
        if remaining < self.padding_threshold as u64 {
            self.fire_padding_trigger();
        }

        Ok(Some(uid))
    }

    /// Total number of slots.
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Fill level under which a take fires the padding trigger.
    pub const fn padding_threshold(&self) -> usize {
        self.padding_threshold
    }

    /// Number of ids published so far.
    pub fn tail(&self) -> u64 {
        self.tail.load(Ordering::Acquire)
    }

    /// Number of ids taken so far.
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Number of ids currently held.
    pub fn len(&self) -> usize {
        // Cursor first: tail only grows, so it can never read below it.
        let cursor = self.cursor();
        let tail = self.tail();
        (tail - cursor) as usize
    }

    /// Returns `true` if no id is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if every slot holds an id.
    pub fn is_full(&self) -> bool {
        self.len() >= self.buffer_size
    }

    /// Caller must hold `put_lock`.
    fn put_locked(&self, uid: u64) -> Result<(), PutRejection> {
        let tail = self.tail.load(Ordering::Relaxed);
        let cursor = self.cursor.load(Ordering::Acquire);
        if tail - cursor >= self.buffer_size as u64 {
            return Err(PutRejection::Full);
        }

        let index = self.index(tail);
        if self.flags[index].load(Ordering::Acquire) != PUTTABLE {
            return Err(PutRejection::SlotInUse);
        }

        self.slots[index].store(uid, Ordering::Relaxed);
        self.flags[index].store(TAKABLE, Ordering::Release);
        self.tail.store(tail + 1, Ordering::Release);
        Ok(())
    }

    fn fire_padding_trigger(&self) {
        if let Some(trigger) = self.padding_trigger.get() {
            trigger();
        }
    }

    #[inline]
    const fn index(&self, position: u64) -> usize {
        (position & self.index_mask) as usize
    }

    #[cold]
    #[inline(never)]
    fn cold_inconsistent_slot(index: usize, cursor: u64) -> Error {
        #[cfg(feature = "tracing")]
        tracing::error!(index, cursor, "claimed ring buffer slot is not takable");
        Error::InconsistentSlot { index, cursor }
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("buffer_size", &self.buffer_size)
            .field("padding_threshold", &self.padding_threshold)
            .field("tail", &self.tail())
            .field("cursor", &self.cursor())
            .finish_non_exhaustive()
    }
}

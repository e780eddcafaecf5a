use core::{cmp::Ordering, time::Duration};
use std::{thread, time::Instant};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    BitsAllocator, BootEnv, Error, InstanceIdAssigner, ParsedUid, Result, RetryPolicy,
    TimeSource, UidGenerator, UidProvider, checked_delta, mutex::Mutex, resolve_instance_id,
};

/// Upper bound on how long [`SynchronousIdGenerator::next_id`] waits for the
/// next second once the current second's sequence space is used up.
pub const MAX_SEQUENCE_WAIT: Duration = Duration::from_secs(2);

/// Nap taken between clock polls while waiting for the next second.
const SEQUENCE_WAIT_STEP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, Default)]
struct State {
    sequence: u64,
    /// `None` until the first id is issued.
    last_second: Option<u64>,
}

/// A lock-based unique id generator suitable for multi-threaded environments.
///
/// Every call to [`Self::next_id`] reads the clock and updates the
/// `(last_second, sequence)` state inside one generator-wide critical
/// section. The path is intentionally blocking: it is the bootstrap and
/// fallback generator, and the batch provider behind
/// [`CachedIdGenerator`](crate::CachedIdGenerator).
///
/// ## Clock handling
/// - Same second: the sequence increments. Once it wraps, the call sleeps in
///   1 ms steps until the clock reaches the next second (at most
///   [`MAX_SEQUENCE_WAIT`]).
/// - New second: the sequence resets to zero.
/// - Earlier second: the call fails with [`Error::ClockMovedBackward`] and
///   leaves the state untouched.
///
/// ## See Also
/// - [`CachedIdGenerator`](crate::CachedIdGenerator)
pub struct SynchronousIdGenerator<T>
where
    T: TimeSource,
{
    #[cfg(feature = "cache-padded")]
    state: crossbeam_utils::CachePadded<Mutex<State>>,
    #[cfg(not(feature = "cache-padded"))]
    state: Mutex<State>,
    bits: BitsAllocator,
    epoch_seconds: u64,
    instance_id: u64,
    time: T,
}

impl<T> SynchronousIdGenerator<T>
where
    T: TimeSource,
{
    /// Creates a generator for a known instance id.
    ///
    /// # Parameters
    ///
    /// - `bits`: the id layout.
    /// - `epoch`: the reference instant, as a [`Duration`] since 1970-01-01
    ///   UTC. Only whole seconds are used.
    /// - `instance_id`: this process's worker id.
    /// - `time`: a [`TimeSource`] such as [`SystemClock`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerIdOutOfRange`] if `instance_id` does not fit in
    /// the layout's worker id field.
    ///
    /// # Example
    ///
    /// ```
    /// use ringuid::{BitsAllocator, DEFAULT_EPOCH, SynchronousIdGenerator, SystemClock};
    ///
    /// let bits = BitsAllocator::new(30, 20, 13).unwrap();
    /// let generator = SynchronousIdGenerator::new(bits, DEFAULT_EPOCH, 1, SystemClock).unwrap();
    ///
    /// let a = generator.next_id().unwrap();
    /// let b = generator.next_id().unwrap();
    /// assert_ne!(a, b);
    /// ```
    ///
    /// [`SystemClock`]: crate::SystemClock
    pub fn new(bits: BitsAllocator, epoch: Duration, instance_id: u64, time: T) -> Result<Self> {
        if instance_id > bits.max_worker_id() {
            return Err(Error::WorkerIdOutOfRange {
                worker_id: instance_id,
                max_worker_id: bits.max_worker_id(),
            });
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            instance_id,
            epoch_seconds = epoch.as_secs(),
            timestamp_bits = bits.timestamp_bits(),
            worker_id_bits = bits.worker_id_bits(),
            sequence_bits = bits.sequence_bits(),
            "synchronous id generator initialized"
        );

        Ok(Self {
            #[cfg(feature = "cache-padded")]
            state: crossbeam_utils::CachePadded::new(Mutex::new(State::default())),
            #[cfg(not(feature = "cache-padded"))]
            state: Mutex::new(State::default()),
            bits,
            epoch_seconds: epoch.as_secs(),
            instance_id,
            time,
        })
    }

    /// Boots a generator, obtaining the instance id from `assigner`.
    ///
    /// # Errors
    ///
    /// - [`Error::InstanceIdUnavailable`] if the assigner never produced an
    ///   id within `policy`.
    /// - [`Error::WorkerIdOutOfRange`] if the assigned id does not fit.
    pub fn boot<A>(
        bits: BitsAllocator,
        epoch: Duration,
        assigner: &A,
        env: &BootEnv,
        policy: RetryPolicy,
        time: T,
    ) -> Result<Self>
    where
        A: InstanceIdAssigner + ?Sized,
    {
        let instance_id = resolve_instance_id(assigner, env, policy)?;
        Self::new(bits, epoch, instance_id, time)
    }

    /// Generates the next id.
    ///
    /// # Errors
    ///
    /// - [`Error::ClockMovedBackward`] if the clock reads earlier than the
    ///   last issued second. The generator does not retry.
    /// - [`Error::TimestampExhausted`] or [`Error::ClockBeforeEpoch`] if the
    ///   clock reading cannot be encoded.
    /// - [`Error::SequenceExhausted`] if the sequence wrapped and the clock
    ///   did not advance within [`MAX_SEQUENCE_WAIT`].
    /// - [`Error::LockPoisoned`] if another thread panicked while holding the
    ///   lock (std mutex only).
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_id(&self) -> Result<u64> {
        let mut state = {
            #[cfg(feature = "parking-lot")]
            {
                self.state.lock()
            }
            #[cfg(not(feature = "parking-lot"))]
            {
                self.state.lock()?
            }
        };

        let mut current = self.current_second()?;

        let sequence = match state.last_second.map(|last| (last, current.cmp(&last))) {
            Some((last, Ordering::Less)) => return Err(Self::cold_clock_behind(current, last)),
            Some((last, Ordering::Equal)) => {
                let next = (state.sequence + 1) & self.bits.max_sequence();
                if next == 0 {
                    current = self.wait_next_second(last)?;
                }
                next
            }
            Some((_, Ordering::Greater)) | None => 0,
        };

        state.sequence = sequence;
        state.last_second = Some(current);

        Ok(self
            .bits
            .allocate(current - self.epoch_seconds, self.instance_id, sequence))
    }

    /// Returns every id of the absolute `second`, sequences `0..=max`.
    ///
    /// The second is fixed for the whole batch, so no locking or clock reads
    /// are needed. Used by the padding executor, which walks seconds forward
    /// on its own and never shares them with [`Self::next_id`].
    ///
    /// # Errors
    ///
    /// [`Error::TimestampExhausted`] or [`Error::ClockBeforeEpoch`] if the
    /// second cannot be encoded.
    pub fn ids_for_second(&self, second: u64) -> Result<Vec<u64>> {
        let delta_seconds =
            checked_delta(second, self.epoch_seconds, self.bits.max_delta_seconds())?;

        Ok((0..=self.bits.max_sequence())
            .map(|sequence| self.bits.allocate(delta_seconds, self.instance_id, sequence))
            .collect())
    }

    /// Decodes an id minted with this generator's layout and epoch.
    pub fn parse_uid(&self, uid: u64) -> ParsedUid {
        ParsedUid::new(&self.bits, self.epoch_seconds, uid)
    }

    /// Reads the clock, validated against the epoch and timestamp capacity.
    ///
    /// # Errors
    ///
    /// [`Error::TimestampExhausted`] or [`Error::ClockBeforeEpoch`].
    pub fn current_second(&self) -> Result<u64> {
        let current = self.time.current_seconds();
        checked_delta(current, self.epoch_seconds, self.bits.max_delta_seconds())?;
        Ok(current)
    }

    /// The second of the last issued id, if any.
    ///
    /// # Errors
    ///
    /// [`Error::LockPoisoned`] (std mutex only).
    pub fn last_second(&self) -> Result<Option<u64>> {
        #[cfg(feature = "parking-lot")]
        let state = self.state.lock();
        #[cfg(not(feature = "parking-lot"))]
        let state = self.state.lock()?;
        Ok(state.last_second)
    }

    /// The id layout.
    pub const fn bits(&self) -> &BitsAllocator {
        &self.bits
    }

    /// The epoch, in seconds since the UNIX epoch.
    pub const fn epoch_seconds(&self) -> u64 {
        self.epoch_seconds
    }

    /// This process's worker id.
    pub const fn instance_id(&self) -> u64 {
        self.instance_id
    }

    #[cold]
    #[inline(never)]
    fn wait_next_second(&self, last: u64) -> Result<u64> {
        #[cfg(feature = "tracing")]
        tracing::debug!(second = last, "sequence exhausted, waiting for next second");

        let deadline = Instant::now() + MAX_SEQUENCE_WAIT;
        loop {
            let current = self.current_second()?;
            if current > last {
                return Ok(current);
            }
            if Instant::now() >= deadline {
                return Err(Error::SequenceExhausted { second: last });
            }
            thread::sleep(SEQUENCE_WAIT_STEP);
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(current: u64, last: u64) -> Error {
        let refused_seconds = last - current;

        #[cfg(feature = "tracing")]
        tracing::error!(refused_seconds, "clock moved backwards");

        Error::ClockMovedBackward { refused_seconds }
    }
}

impl<T> UidGenerator for SynchronousIdGenerator<T>
where
    T: TimeSource,
{
    fn get_uid(&self) -> Result<u64> {
        self.next_id()
    }

    fn parse_uid(&self, uid: u64) -> ParsedUid {
        self.parse_uid(uid)
    }
}

impl<T> UidProvider for SynchronousIdGenerator<T>
where
    T: TimeSource + Send + Sync,
{
    fn provide(&self, second: u64) -> Result<Vec<u64>> {
        self.ids_for_second(second)
    }
}

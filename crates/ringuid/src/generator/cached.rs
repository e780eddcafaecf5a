use core::time::Duration;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    BitsAllocator, BufferPaddingExecutor, DiscardPut, Error, FailFastTake, ParsedUid,
    RejectedPutHandler, RejectedTakeHandler, Result, RingBuffer, SynchronousIdGenerator,
    TimeSource, UidGenerator,
};

/// Default ring buffer boost: the buffer holds `2^3 = 8` seconds of ids.
pub const DEFAULT_BOOST_POWER: u32 = 3;

/// Ring buffer size for a layout: `(max_sequence + 1) << boost_power`.
///
/// # Errors
///
/// [`Error::InvalidConfig`] if the size exceeds
/// [`RingBuffer::MAX_BUFFER_SIZE`].
pub fn buffer_size_for(bits: &BitsAllocator, boost_power: u32) -> Result<usize> {
    let max_power = RingBuffer::MAX_BUFFER_SIZE.trailing_zeros();
    match bits.sequence_bits().checked_add(boost_power) {
        Some(power) if power <= max_power => Ok(1 << power),
        _ => Err(Error::InvalidConfig {
            reason: format!(
                "{} sequence bits with boost power {boost_power} exceed the maximum ring buffer size 2^{max_power}",
                bits.sequence_bits()
            ),
        }),
    }
}

/// A unique id generator that hands out precomputed ids from a ring buffer.
///
/// Ids for whole seconds are computed ahead of demand by a background
/// [`BufferPaddingExecutor`] and stored in a [`RingBuffer`], so
/// [`Self::get_uid`] is a lock-free pop. Because padding runs ahead of the
/// wall clock, the timestamp inside an id is the second it was *computed
/// for*, which may be later than the moment it was handed out.
///
/// The wrapped [`SynchronousIdGenerator`] validates the layout and instance
/// id at boot, supplies the per-second batches and decodes ids. It is not
/// exposed for direct generation: its per-call ids could collide with seconds
/// already padded into the buffer.
///
/// ## Features
/// - ✅ Thread-safe, lock-free takes
/// - ✅ Throughput not capped by `max_sequence` per wall-clock second
///
/// ## Caveats
/// - The default take policy fails fast with [`Error::BufferExhausted`] when
///   consumers outrun padding. Use [`WaitingTake`] for blocking semantics.
/// - Once the clock outgrows the layout, padding stops for good and, after
///   the remaining ids are served, [`Self::get_uid`] returns the fatal
///   [`Error::TimestampExhausted`].
///
/// # Example
///
/// ```
/// use ringuid::{BitsAllocator, CachedIdGenerator, DEFAULT_EPOCH, SynchronousIdGenerator, SystemClock};
///
/// let bits = BitsAllocator::new(30, 20, 13).unwrap();
/// let generator = SynchronousIdGenerator::new(bits, DEFAULT_EPOCH, 1, SystemClock).unwrap();
/// let cached = CachedIdGenerator::builder(generator).boost_power(1).build().unwrap();
///
/// let uid = cached.get_uid().unwrap();
/// assert_eq!(cached.parse_uid(uid).instance_id, 1);
/// ```
///
/// [`WaitingTake`]: crate::WaitingTake
pub struct CachedIdGenerator<T>
where
    T: TimeSource,
{
    generator: Arc<SynchronousIdGenerator<T>>,
    buffer: Arc<RingBuffer>,
    executor: BufferPaddingExecutor,
}

impl<T> CachedIdGenerator<T>
where
    T: TimeSource + Send + Sync + 'static,
{
    /// Starts configuring a cached generator around `generator`.
    pub fn builder(generator: SynchronousIdGenerator<T>) -> CachedIdGeneratorBuilder<T> {
        CachedIdGeneratorBuilder::new(generator)
    }

    /// Pops the next precomputed id.
    ///
    /// # Errors
    ///
    /// - [`Error::TimestampExhausted`] or [`Error::ClockBeforeEpoch`] once
    ///   padding has stopped on that error and the buffer is drained.
    /// - Otherwise whatever the rejected take policy returns on an empty
    ///   buffer, [`Error::BufferExhausted`] by default.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn get_uid(&self) -> Result<u64> {
        // Skip the take policy: no padding will ever come.
        if self.buffer.is_empty() {
            if let Some(err) = self.fatal_error() {
                return Err(err);
            }
        }

        match self.buffer.take() {
            Err(Error::BufferExhausted) => {
                Err(self.fatal_error().unwrap_or(Error::BufferExhausted))
            }
            result => result,
        }
    }

    fn fatal_error(&self) -> Option<Error> {
        self.executor.fatal_error().and_then(Error::fatal_copy)
    }

    /// Decodes an id minted by this generator.
    pub fn parse_uid(&self, uid: u64) -> ParsedUid {
        self.generator.parse_uid(uid)
    }

    /// The id layout.
    pub fn bits(&self) -> &BitsAllocator {
        self.generator.bits()
    }

    /// This process's worker id.
    pub fn instance_id(&self) -> u64 {
        self.generator.instance_id()
    }

    /// The backing ring buffer.
    pub fn buffer(&self) -> &RingBuffer {
        &self.buffer
    }

    /// The padding executor.
    pub const fn executor(&self) -> &BufferPaddingExecutor {
        &self.executor
    }

    /// Stops background padding. Ids already in the buffer can still be
    /// taken. Also runs on drop.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }
}

impl<T> UidGenerator for CachedIdGenerator<T>
where
    T: TimeSource + Send + Sync + 'static,
{
    fn get_uid(&self) -> Result<u64> {
        self.get_uid()
    }

    fn parse_uid(&self, uid: u64) -> ParsedUid {
        self.parse_uid(uid)
    }
}

/// Builder for [`CachedIdGenerator`].
pub struct CachedIdGeneratorBuilder<T>
where
    T: TimeSource,
{
    generator: SynchronousIdGenerator<T>,
    boost_power: u32,
    padding_factor: u32,
    schedule_interval: Option<Duration>,
    put_handler: Box<dyn RejectedPutHandler>,
    take_handler: Box<dyn RejectedTakeHandler>,
}

impl<T> CachedIdGeneratorBuilder<T>
where
    T: TimeSource + Send + Sync + 'static,
{
    /// Starts from the defaults: boost power 3, padding factor 50, no
    /// scheduled padding, [`DiscardPut`] and [`FailFastTake`].
    pub fn new(generator: SynchronousIdGenerator<T>) -> Self {
        Self {
            generator,
            boost_power: DEFAULT_BOOST_POWER,
            padding_factor: RingBuffer::DEFAULT_PADDING_FACTOR,
            schedule_interval: None,
            put_handler: Box::new(DiscardPut),
            take_handler: Box::new(FailFastTake),
        }
    }

    /// Ring buffer size is `(max_sequence + 1) << boost_power`.
    #[must_use]
    pub const fn boost_power(mut self, boost_power: u32) -> Self {
        self.boost_power = boost_power;
        self
    }

    /// Percentage of the buffer under which padding is triggered.
    #[must_use]
    pub const fn padding_factor(mut self, padding_factor: u32) -> Self {
        self.padding_factor = padding_factor;
        self
    }

    /// Also pad on a fixed interval.
    #[must_use]
    pub const fn schedule_interval(mut self, interval: Option<Duration>) -> Self {
        self.schedule_interval = interval;
        self
    }

    /// Policy for ids that do not fit in a full buffer.
    #[must_use]
    pub fn rejected_put_handler(mut self, handler: impl RejectedPutHandler + 'static) -> Self {
        self.put_handler = Box::new(handler);
        self
    }

    /// Policy for takes from an empty buffer.
    #[must_use]
    pub fn rejected_take_handler(mut self, handler: impl RejectedTakeHandler + 'static) -> Self {
        self.take_handler = Box::new(handler);
        self
    }

    /// Allocates the ring buffer, pre-fills it and starts background padding.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] for an unusable buffer size, padding factor
    ///   or schedule interval.
    /// - Clock errors from the initial fill ([`Error::TimestampExhausted`],
    ///   [`Error::ClockBeforeEpoch`]).
    /// - [`Error::Spawn`] if a padding thread could not be started.
    pub fn build(self) -> Result<CachedIdGenerator<T>> {
        if self.schedule_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::InvalidConfig {
                reason: "schedule interval must be greater than zero".into(),
            });
        }

        let buffer_size = buffer_size_for(self.generator.bits(), self.boost_power)?;
        let buffer = Arc::new(RingBuffer::with_handlers(
            buffer_size,
            self.padding_factor,
            self.put_handler,
            self.take_handler,
        )?);

        let generator = Arc::new(self.generator);
        let start_second = generator.current_second()?;
        let provider = {
            let generator = Arc::clone(&generator);
            move |second: u64| generator.ids_for_second(second)
        };

        let executor = BufferPaddingExecutor::new(Arc::clone(&buffer), provider, start_second);
        let _initial = executor.padding_buffer()?;
        executor.start(self.schedule_interval)?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            buffer_size,
            padding_threshold = buffer.padding_threshold(),
            initial = _initial,
            schedule_interval = ?self.schedule_interval,
            "cached id generator initialized"
        );

        Ok(CachedIdGenerator {
            generator,
            buffer,
            executor,
        })
    }
}

use core::time::Duration;

use crate::{
    BitsAllocator, CachedIdGenerator, CachedIdGeneratorBuilder, DEFAULT_BOOST_POWER,
    DEFAULT_EPOCH, Error, Result, RingBuffer, SynchronousIdGenerator, TimeSource, buffer_size_for,
};

/// Every recognized generator option in one place.
///
/// The defaults give 30 timestamp bits (about 34 years from the 2016 epoch),
/// about a million worker ids and 8192 ids per second, with a ring buffer of
/// eight seconds.
///
/// # Example
///
/// ```
/// use ringuid::{GeneratorConfig, SystemClock};
///
/// let config = GeneratorConfig {
///     boost_power: 1,
///     ..GeneratorConfig::default()
/// };
/// let generator = config.build_cached(42, SystemClock).unwrap();
/// assert_eq!(generator.parse_uid(generator.get_uid().unwrap()).instance_id, 42);
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Reference instant, as a duration since the UNIX epoch.
    pub epoch: Duration,
    /// Width of the delta seconds field. Bounds how long the epoch lasts.
    pub timestamp_bits: u32,
    /// Width of the worker id field, the largest assignable instance id.
    pub worker_id_bits: u32,
    /// Width of the per-second sequence; `2^sequence_bits` ids per second.
    /// The three widths must sum to 63.
    pub sequence_bits: u32,
    /// Ring buffer size is `(max_sequence + 1) << boost_power`.
    pub boost_power: u32,
    /// Percent of the buffer under which padding is triggered.
    pub padding_factor: u32,
    /// Optional fixed padding interval in addition to threshold triggers.
    pub schedule_interval: Option<Duration>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            epoch: DEFAULT_EPOCH,
            timestamp_bits: 30,
            worker_id_bits: 20,
            sequence_bits: 13,
            boost_power: DEFAULT_BOOST_POWER,
            padding_factor: RingBuffer::DEFAULT_PADDING_FACTOR,
            schedule_interval: None,
        }
    }
}

impl GeneratorConfig {
    /// Checks every option without building anything.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBitLayout`] or [`Error::InvalidConfig`].
    pub fn validate(&self) -> Result<()> {
        let bits = self.bits_allocator()?;
        buffer_size_for(&bits, self.boost_power)?;
        if self.padding_factor == 0 || self.padding_factor >= 100 {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "padding factor {} must be in 1..100 percent",
                    self.padding_factor
                ),
            });
        }
        if self.schedule_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::InvalidConfig {
                reason: "schedule interval must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// The id layout.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBitLayout`].
    pub fn bits_allocator(&self) -> Result<BitsAllocator> {
        BitsAllocator::new(self.timestamp_bits, self.worker_id_bits, self.sequence_bits)
    }

    /// Ring buffer size of a cached generator built from this config.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBitLayout`] or [`Error::InvalidConfig`].
    pub fn buffer_size(&self) -> Result<usize> {
        buffer_size_for(&self.bits_allocator()?, self.boost_power)
    }

    /// Builds a [`SynchronousIdGenerator`].
    ///
    /// # Errors
    ///
    /// See [`Self::validate`] and [`SynchronousIdGenerator::new`].
    pub fn build_synchronous<T>(
        &self,
        instance_id: u64,
        time: T,
    ) -> Result<SynchronousIdGenerator<T>>
    where
        T: TimeSource,
    {
        self.validate()?;
        SynchronousIdGenerator::new(self.bits_allocator()?, self.epoch, instance_id, time)
    }

    /// A [`CachedIdGeneratorBuilder`] with this config's buffer options, for
    /// callers that also want custom rejection policies.
    ///
    /// # Errors
    ///
    /// See [`Self::build_synchronous`].
    pub fn cached_builder<T>(
        &self,
        instance_id: u64,
        time: T,
    ) -> Result<CachedIdGeneratorBuilder<T>>
    where
        T: TimeSource + Send + Sync + 'static,
    {
        Ok(CachedIdGenerator::builder(self.build_synchronous(instance_id, time)?)
            .boost_power(self.boost_power)
            .padding_factor(self.padding_factor)
            .schedule_interval(self.schedule_interval))
    }

    /// Builds and starts a [`CachedIdGenerator`] with the default policies.
    ///
    /// # Errors
    ///
    /// See [`CachedIdGeneratorBuilder::build`].
    pub fn build_cached<T>(&self, instance_id: u64, time: T) -> Result<CachedIdGenerator<T>>
    where
        T: TimeSource + Send + Sync + 'static,
    {
        self.cached_builder(instance_id, time)?.build()
    }
}

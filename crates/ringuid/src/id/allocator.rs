use crate::{Error, Result};

/// The three fields packed into a unique id.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UidParts {
    /// Seconds elapsed since the configured epoch.
    pub delta_seconds: u64,
    /// Worker (instance) id of the process that minted the id.
    pub worker_id: u64,
    /// Per-second counter.
    pub sequence: u64,
}

/// Allocates the bits of a 64-bit unique id.
///
/// The most significant bit is a reserved sign bit and always zero, so every
/// id is a non-negative 63-bit integer. The remaining 63 bits are split
/// between the timestamp, the worker id and the sequence:
///
/// ```text
///  Bit Index:  63          63 62        W+S W+S-1       S S-1           0
///              +-------------+------------+---------------+--------------+
///  Field:      | sign (1)    | delta secs | worker id     | sequence     |
///              +-------------+------------+---------------+--------------+
///              |<----------- MSB ------- 64 bits ------- LSB ----------->|
/// ```
///
/// The allocator is an immutable value created once at boot.
///
/// # Example
///
/// ```
/// use ringuid::BitsAllocator;
///
/// let bits = BitsAllocator::new(28, 22, 13).unwrap();
/// let uid = bits.allocate(100, 5, 1);
/// let parts = bits.parse(uid);
/// assert_eq!(parts.delta_seconds, 100);
/// assert_eq!(parts.worker_id, 5);
/// assert_eq!(parts.sequence, 1);
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitsAllocator {
    timestamp_bits: u32,
    worker_id_bits: u32,
    sequence_bits: u32,
    max_delta_seconds: u64,
    max_worker_id: u64,
    max_sequence: u64,
    timestamp_shift: u32,
    worker_id_shift: u32,
}

impl BitsAllocator {
    /// Total width of an id.
    pub const TOTAL_BITS: u32 = 64;

    /// Width of the reserved sign bit.
    pub const SIGN_BITS: u32 = 1;

    /// Creates an allocator for the given field widths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBitLayout`] if any width is zero or the widths
    /// plus the sign bit do not add up to [`Self::TOTAL_BITS`].
    pub fn new(timestamp_bits: u32, worker_id_bits: u32, sequence_bits: u32) -> Result<Self> {
        let allocated = Self::SIGN_BITS
            .checked_add(timestamp_bits)
            .and_then(|n| n.checked_add(worker_id_bits))
            .and_then(|n| n.checked_add(sequence_bits));

        if timestamp_bits == 0
            || worker_id_bits == 0
            || sequence_bits == 0
            || allocated != Some(Self::TOTAL_BITS)
        {
            return Err(Error::InvalidBitLayout {
                timestamp_bits,
                worker_id_bits,
                sequence_bits,
            });
        }

        Ok(Self {
            timestamp_bits,
            worker_id_bits,
            sequence_bits,
            max_delta_seconds: mask(timestamp_bits),
            max_worker_id: mask(worker_id_bits),
            max_sequence: mask(sequence_bits),
            timestamp_shift: worker_id_bits + sequence_bits,
            worker_id_shift: sequence_bits,
        })
    }

    /// Packs the fields into an id.
    ///
    /// Callers are responsible for keeping each field within its maximum;
    /// out-of-range values are masked rather than allowed to bleed into
    /// neighbouring fields.
    pub const fn allocate(&self, delta_seconds: u64, worker_id: u64, sequence: u64) -> u64 {
        debug_assert!(delta_seconds <= self.max_delta_seconds);
        debug_assert!(worker_id <= self.max_worker_id);
        debug_assert!(sequence <= self.max_sequence);

        ((delta_seconds & self.max_delta_seconds) << self.timestamp_shift)
            | ((worker_id & self.max_worker_id) << self.worker_id_shift)
            | (sequence & self.max_sequence)
    }

    /// Splits an id back into its fields.
    pub const fn parse(&self, uid: u64) -> UidParts {
        UidParts {
            delta_seconds: (uid >> self.timestamp_shift) & self.max_delta_seconds,
            worker_id: (uid >> self.worker_id_shift) & self.max_worker_id,
            sequence: uid & self.max_sequence,
        }
    }

    /// Width of the timestamp field.
    pub const fn timestamp_bits(&self) -> u32 {
        self.timestamp_bits
    }

    /// Width of the worker id field.
    pub const fn worker_id_bits(&self) -> u32 {
        self.worker_id_bits
    }

    /// Width of the sequence field.
    pub const fn sequence_bits(&self) -> u32 {
        self.sequence_bits
    }

    /// Largest encodable number of seconds since the epoch.
    pub const fn max_delta_seconds(&self) -> u64 {
        self.max_delta_seconds
    }

    /// Largest encodable worker id.
    pub const fn max_worker_id(&self) -> u64 {
        self.max_worker_id
    }

    /// Largest encodable sequence.
    pub const fn max_sequence(&self) -> u64 {
        self.max_sequence
    }

    /// Number of distinct ids one worker can mint per second.
    pub const fn ids_per_second(&self) -> u64 {
        self.max_sequence + 1
    }

    /// Shift applied to the timestamp field.
    pub const fn timestamp_shift(&self) -> u32 {
        self.timestamp_shift
    }

    /// Shift applied to the worker id field.
    pub const fn worker_id_shift(&self) -> u32 {
        self.worker_id_shift
    }
}

const fn mask(bits: u32) -> u64 {
    (1 << bits) - 1
}

use crate::{ParsedUid, Result};

/// A minimal interface for generating unique ids.
pub trait UidGenerator {
    /// Returns the next unique id.
    ///
    /// # Errors
    ///
    /// Fails on clock rollback, timestamp exhaustion, or (for cached
    /// generators) when no precomputed id is available under the configured
    /// policy.
    fn get_uid(&self) -> Result<u64>;

    /// Decodes an id minted with this generator's layout and epoch.
    fn parse_uid(&self, uid: u64) -> ParsedUid;
}

/// Supplies every id of one second at once.
///
/// The padding executor asks for whole seconds ahead of demand and pushes the
/// returned ids into the ring buffer in order. Implementations must return
/// distinct ids for distinct seconds.
pub trait UidProvider: Send + Sync {
    /// Returns all ids for the absolute `second` (seconds since the UNIX
    /// epoch), in ascending sequence order.
    ///
    /// # Errors
    ///
    /// May fail if the second cannot be encoded by the layout.
    fn provide(&self, second: u64) -> Result<Vec<u64>>;
}

impl<F> UidProvider for F
where
    F: Fn(u64) -> Result<Vec<u64>> + Send + Sync,
{
    fn provide(&self, second: u64) -> Result<Vec<u64>> {
        self(second)
    }
}

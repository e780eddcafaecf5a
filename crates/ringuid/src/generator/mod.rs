mod cached;
mod interface;
mod synchronous;

pub use cached::*;
pub use interface::*;
pub use synchronous::*;

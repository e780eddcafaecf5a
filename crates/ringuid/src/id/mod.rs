mod allocator;
mod parsed;

pub use allocator::*;
pub use parsed::*;

mod interface;
mod retry;

pub use interface::*;
pub use retry::*;

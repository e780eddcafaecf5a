mod handler;
mod padding;
mod ring;
#[cfg(test)]
mod tests;

pub use handler::*;
pub use padding::*;
pub use ring::*;

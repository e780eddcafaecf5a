#![doc = include_str!("../README.md")]

mod assigner;
mod buffer;
mod config;
mod error;
mod generator;
mod id;
mod mutex;
mod time;

pub use crate::assigner::*;
pub use crate::buffer::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::id::*;
pub use crate::time::*;

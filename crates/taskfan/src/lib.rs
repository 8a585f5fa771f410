#![doc = include_str!("../README.md")]

mod config;
mod error;
mod pool;
mod tasks;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::pool::*;
pub use crate::tasks::*;

//! Configuration types shared between cel crates.

#[cfg(feature = "burn")]
pub use burn::config::Config;

mod types;

pub use types::*;

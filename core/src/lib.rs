#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::default_trait_access,
    //
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
)]

//! cel core
//!
//! This crate provides:
//! - Backend type aliases shared by the cel crates
//! - The unfused reference cross-entropy used to validate the fused engine
//! - Test utilities

pub mod config;
pub mod reference;
pub mod test_utils;

pub use config::{CpuAutodiffBackend, CpuBackend};
#[cfg(any(feature = "wgpu", feature = "cuda"))]
pub use config::{GpuAutodiffBackend, GpuBackend};
pub use reference::cross_entropy;

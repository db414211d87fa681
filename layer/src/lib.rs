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

//! cel layer
//!
//! Model-facing integration of the fused chunked cross-entropy: next-token
//! label shifting and the loss head that dispatches between the fused and
//! unfused paths based on the caller's [`cel_config::FusedCelConfig`].

pub mod lm;

pub use lm::{LmHeadLoss, perplexity, shift_labels_padded, shift_trimmed};

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

//! cel fused
//!
//! Chunked fused cross-entropy for the LM head: loss and gradients of
//! `features @ weight^T` against target labels, computed chunk by chunk so
//! the full (tokens, vocab) logits tensor never exists. Forward and
//! backward of the softmax cross-entropy share one pass; the gradient
//! overwrites each chunk's logits in place.
//!
//! Entry points:
//! - [`fused_cel_loss`] — differentiable scalar loss on any
//!   [`FusedCelBackend`], including `Autodiff<B>`
//! - [`chunked_forward`] — the underlying engine, for callers that manage
//!   gradients themselves

use burn::tensor::{
    Tensor, TensorPrimitive,
    backend::Backend,
    ops::{FloatTensor, IntTensor},
};
use cel_config::{DEFAULT_IGNORE_INDEX, FusedCelConfig, Reduction};

pub mod api;
pub mod autodiff;
pub mod chunk;
pub mod kernel;

pub use api::{CelError, fused_cel_loss};
pub use autodiff::SavedGrads;
pub use chunk::{CelGrads, ChunkedCelOutput, GradRequest, chunked_forward};

// ============================================================================
// Options
// ============================================================================

/// Runtime options for one fused loss computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CelOptions {
    /// Number of sequential chunks; the token count must divide evenly.
    pub chunk_count: usize,
    /// Label value excluded from loss and gradients.
    pub ignore_index: i64,
    pub reduction: Reduction,
}

impl Default for CelOptions {
    fn default() -> Self {
        Self {
            chunk_count: 1,
            ignore_index: DEFAULT_IGNORE_INDEX,
            reduction: Reduction::Mean,
        }
    }
}

impl CelOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_chunk_count(mut self, chunk_count: usize) -> Self {
        self.chunk_count = chunk_count;
        self
    }

    #[must_use]
    pub fn with_ignore_index(mut self, ignore_index: i64) -> Self {
        self.ignore_index = ignore_index;
        self
    }

    #[must_use]
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }
}

impl From<&FusedCelConfig> for CelOptions {
    fn from(config: &FusedCelConfig) -> Self {
        Self {
            chunk_count: config.chunk_count,
            ignore_index: config.ignore_index,
            reduction: config.reduction,
        }
    }
}

// ============================================================================
// Backend trait
// ============================================================================

/// Backend trait for the fused chunked cross-entropy operation.
///
/// Base backends compute the loss alone; `Autodiff<B>` additionally runs
/// the engine with gradient accumulation and registers a backward node.
pub trait FusedCelBackend: Backend {
    /// Scalar loss for flattened features (tokens, hidden) projected
    /// through weight (vocab, hidden) against targets (tokens).
    fn fused_cel(
        features: FloatTensor<Self>,
        weight: FloatTensor<Self>,
        targets: IntTensor<Self>,
        options: &CelOptions,
    ) -> FloatTensor<Self>;
}

/// Loss-only dispatch shared by the non-autodiff backends.
fn loss_only<B: Backend>(
    features: FloatTensor<B>,
    weight: FloatTensor<B>,
    targets: IntTensor<B>,
    options: &CelOptions,
) -> FloatTensor<B> {
    let out = chunk::chunked_forward::<B>(
        Tensor::from_primitive(TensorPrimitive::Float(features)),
        Tensor::from_primitive(TensorPrimitive::Float(weight)),
        Tensor::from_primitive(targets),
        options,
        chunk::GradRequest::NONE,
    );
    out.loss.into_primitive().tensor()
}

impl FusedCelBackend for burn::backend::NdArray {
    fn fused_cel(
        features: FloatTensor<Self>,
        weight: FloatTensor<Self>,
        targets: IntTensor<Self>,
        options: &CelOptions,
    ) -> FloatTensor<Self> {
        loss_only::<Self>(features, weight, targets, options)
    }
}

#[cfg(feature = "wgpu")]
impl FusedCelBackend for burn::backend::Wgpu {
    fn fused_cel(
        features: FloatTensor<Self>,
        weight: FloatTensor<Self>,
        targets: IntTensor<Self>,
        options: &CelOptions,
    ) -> FloatTensor<Self> {
        loss_only::<Self>(features, weight, targets, options)
    }
}

#[cfg(feature = "cuda")]
impl FusedCelBackend for burn::backend::Cuda {
    fn fused_cel(
        features: FloatTensor<Self>,
        weight: FloatTensor<Self>,
        targets: IntTensor<Self>,
        options: &CelOptions,
    ) -> FloatTensor<Self> {
        loss_only::<Self>(features, weight, targets, options)
    }
}

//! Public entry point and input validation.

use burn::tensor::{Int, Tensor, TensorPrimitive};
use thiserror::Error;

use crate::{CelOptions, FusedCelBackend};

/// Rejected input or configuration. Every check runs before any chunk is
/// dispatched, so a failed call performs no partial computation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CelError {
    #[error("chunk count must be positive")]
    ZeroChunkCount,
    #[error("token count {n_tokens} is not divisible by chunk count {chunk_count}")]
    UnevenChunks { n_tokens: usize, chunk_count: usize },
    #[error("feature token count {features} does not match label token count {labels}")]
    TokenCountMismatch { features: usize, labels: usize },
}

/// Cross-entropy of `features @ weight^T` against `labels`, computed over
/// `options.chunk_count` sequential chunks without materializing the full
/// (tokens, vocab) logits tensor.
///
/// Returns a differentiable scalar; on autodiff backends its backward
/// populates gradients on `features` and/or `weight` as required. Labels
/// equal to `options.ignore_index` contribute neither loss nor gradient.
pub fn fused_cel_loss<B: FusedCelBackend>(
    features: Tensor<B, 3>,
    weight: Tensor<B, 2>,
    labels: Tensor<B, 2, Int>,
    options: &CelOptions,
) -> Result<Tensor<B, 1>, CelError> {
    let [batch, seq_len, hidden] = features.dims();
    let [label_batch, label_seq] = labels.dims();
    let n_tokens = batch * seq_len;
    let n_labels = label_batch * label_seq;

    if n_labels != n_tokens {
        return Err(CelError::TokenCountMismatch {
            features: n_tokens,
            labels: n_labels,
        });
    }
    if options.chunk_count == 0 {
        return Err(CelError::ZeroChunkCount);
    }
    if n_tokens % options.chunk_count != 0 {
        return Err(CelError::UnevenChunks {
            n_tokens,
            chunk_count: options.chunk_count,
        });
    }

    let features = features.reshape([n_tokens, hidden]);
    let targets = labels.reshape([n_tokens]);

    let loss = B::fused_cel(
        features.into_primitive().tensor(),
        weight.into_primitive().tensor(),
        targets.into_primitive(),
        options,
    );
    Ok(Tensor::from_primitive(TensorPrimitive::Float(loss)))
}

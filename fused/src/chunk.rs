//! Chunked driver: logit projection, kernel dispatch, gradient assembly.

use burn::tensor::{FloatDType, Int, Tensor, backend::Backend};
use cel_config::Reduction;
use tracing::trace;

use crate::{CelOptions, kernel::row_loss_grad};

/// Which inputs need gradient accumulators this run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GradRequest {
    pub features: bool,
    pub weight: bool,
}

impl GradRequest {
    pub const NONE: Self = Self {
        features: false,
        weight: false,
    };
    pub const BOTH: Self = Self {
        features: true,
        weight: true,
    };

    #[must_use]
    pub fn any(self) -> bool {
        self.features || self.weight
    }
}

/// Gradient accumulators produced alongside the loss. Each slot is `Some`
/// exactly when it was requested.
pub struct CelGrads<B: Backend> {
    /// Gradient w.r.t. the flattened features, shaped (tokens, hidden).
    pub features: Option<Tensor<B, 2>>,
    /// Gradient w.r.t. the projection weight, shaped (vocab, hidden).
    pub weight: Option<Tensor<B, 2>>,
}

pub struct ChunkedCelOutput<B: Backend> {
    /// Scalar loss.
    pub loss: Tensor<B, 1>,
    pub grads: CelGrads<B>,
}

/// Loss and gradients in one pass over `chunk_count` sequential chunks.
///
/// Peak memory holds a single (chunk, vocab) buffer: each chunk's logits
/// are replaced by their gradient and folded into the accumulators before
/// the next chunk starts, which is why chunks must run strictly in order.
///
/// Preconditions (checked at the public entry point): `chunk_count` is
/// positive and divides the token count evenly, and the targets hold one
/// class index per feature row.
pub fn chunked_forward<B: Backend>(
    features: Tensor<B, 2>,
    weight: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    options: &CelOptions,
    wants: GradRequest,
) -> ChunkedCelOutput<B> {
    let [n_tokens, hidden] = features.dims();
    let chunk_size = n_tokens / options.chunk_count;
    let device = features.device();

    trace!(
        "fused cel: {n_tokens} tokens in {} chunks of {chunk_size}, grads: features={} weight={}",
        options.chunk_count, wants.features, wants.weight
    );

    // Non-ignored token count for mean reduction, 1 for sum. Computed once
    // in f32, clamped so an all-ignored batch divides by one, not zero.
    let divisor = match options.reduction {
        Reduction::Mean => targets
            .clone()
            .not_equal_elem(options.ignore_index)
            .float()
            .sum()
            .cast(FloatDType::F32)
            .clamp_min(1.0),
        Reduction::Sum => Tensor::<B, 1>::ones([1], &device).cast(FloatDType::F32),
    };

    // The weight is cast to the compute precision and transposed once;
    // every chunk reuses both.
    let compute_dtype: FloatDType = features.dtype().into();
    let weight_cast = weight.cast(compute_dtype);
    let weight_t = weight_cast.clone().transpose();

    let mut loss_buffer: Tensor<B, 1> = Tensor::<B, 1>::zeros([n_tokens], &device).cast(FloatDType::F32);
    let mut grad_features = wants.features.then(|| features.zeros_like());
    let mut grad_weight = wants.weight.then(|| weight_cast.zeros_like());

    for chunk_idx in 0..options.chunk_count {
        let start = chunk_idx * chunk_size;
        let end = start + chunk_size;

        let hidden_chunk = features.clone().slice([start..end, 0..hidden]);
        let target_chunk = targets.clone().slice([start..end]);

        // Project this chunk, then run the row kernel in f32. The kernel
        // output reuses the logits buffer as the gradient buffer.
        let logits = hidden_chunk
            .clone()
            .matmul(weight_t.clone())
            .cast(FloatDType::F32);
        let out = row_loss_grad(logits, target_chunk, divisor.clone(), options.ignore_index);

        loss_buffer = loss_buffer.slice_assign([start..end], out.loss);

        if wants.any() {
            let grad_logits = out.grad.cast(compute_dtype);
            if let Some(acc) = grad_features.take() {
                let chunk = grad_logits.clone().matmul(weight_cast.clone());
                grad_features = Some(acc.slice_assign([start..end, 0..hidden], chunk));
            }
            if let Some(acc) = grad_weight.take() {
                grad_weight = Some(acc + grad_logits.transpose().matmul(hidden_chunk));
            }
        }
    }

    ChunkedCelOutput {
        loss: loss_buffer.sum(),
        grads: CelGrads {
            features: grad_features,
            weight: grad_weight,
        },
    }
}

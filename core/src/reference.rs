//! Unfused cross-entropy over materialized logits.
//!
//! This is the reference the fused chunked engine is validated against, and
//! the fallback path of the loss head when the fused engine is disabled. It
//! is built from ordinary differentiable tensor ops, so burn's stock
//! autodiff produces reference gradients for it.

use burn::tensor::{Int, Tensor, backend::Backend};
use cel_config::Reduction;

/// Cross-entropy `logsumexp(row) - row[target]` per token, reduced.
///
/// Rows whose target equals `ignore_index` contribute nothing to the loss
/// or the non-ignored token count. The row maximum is subtracted before
/// exponentiation so large logits do not overflow.
pub fn cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    ignore_index: i64,
    reduction: Reduction,
) -> Tensor<B, 1> {
    let valid = targets.clone().not_equal_elem(ignore_index);
    let valid_rows = valid.clone().float();
    // Clamp the sentinel to a real class index; ignored rows are zeroed below.
    let safe_targets = targets.mask_fill(valid.bool_not(), 0);

    let row_max = logits.clone().max_dim(1);
    let shifted = logits - row_max;
    let log_sum_exp = shifted.clone().exp().sum_dim(1).log();
    let target_logit = shifted.gather(1, safe_targets.unsqueeze_dim::<2>(1));

    let per_token = (log_sum_exp - target_logit).squeeze_dim::<1>(1) * valid_rows.clone();

    match reduction {
        Reduction::Mean => per_token.sum() / valid_rows.sum().clamp_min(1.0),
        Reduction::Sum => per_token.sum(),
    }
}

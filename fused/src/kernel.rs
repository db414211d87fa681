//! Fused per-row loss and logit-gradient computation.
//!
//! One kernel invocation replaces two full-vocabulary passes: the forward
//! softmax cross-entropy and the backward softmax gradient. The gradient
//! takes over the storage that held the logits, so only one (rows, classes)
//! buffer exists per chunk.

use burn::tensor::{FloatDType, Int, Tensor, backend::Backend};

pub(crate) struct RowLossGrad<B: Backend> {
    /// Per-row loss, f32, shaped (rows).
    pub loss: Tensor<B, 1>,
    /// Gradient w.r.t. the logits, f32, shaped (rows, classes).
    pub grad: Tensor<B, 2>,
}

/// Loss and logit-gradient for every row of one chunk.
///
/// Rows are independent; each step below is a single batched operation over
/// all rows. Per row with target `t`:
///
/// ```text
/// shifted = row - max(row)
/// loss    = (log(sum(exp(shifted))) - shifted[t]) / divisor
/// grad    = (exp(shifted) / sum(exp(shifted)) - one_hot(t)) / divisor
/// ```
///
/// Rows whose target equals `ignore_index` produce a zero loss and a zero
/// gradient row. `divisor` is pre-divided here so the chunk results can be
/// summed directly afterwards.
pub(crate) fn row_loss_grad<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    divisor: Tensor<B, 1>,
    ignore_index: i64,
) -> RowLossGrad<B> {
    let valid = targets.clone().not_equal_elem(ignore_index);
    let valid_rows = valid.clone().float().cast(FloatDType::F32);
    // Clamp the sentinel to a real class index so the gather below never
    // sees a negative value; the mask zeroes those rows afterwards.
    let safe_targets = targets.mask_fill(valid.bool_not(), 0);
    let target_idx = safe_targets.unsqueeze_dim::<2>(1);

    // Subtracting the row max keeps exp() from overflowing for large logits.
    let row_max = logits.clone().max_dim(1);
    let shifted = logits - row_max;
    let exp_row = shifted.clone().exp();
    let sum_exp = exp_row.clone().sum_dim(1);
    let log_sum_exp = sum_exp.clone().log();
    let target_logit = shifted.gather(1, target_idx.clone());

    let loss = (log_sum_exp - target_logit).squeeze_dim::<1>(1) / divisor.clone()
        * valid_rows.clone();

    // Scattering the valid mask doubles as the one-hot: ignored rows get an
    // all-zero one-hot and are zeroed entirely by the trailing multiply.
    let one_hot = exp_row.zeros_like().scatter(
        1,
        target_idx,
        valid_rows.clone().unsqueeze_dim::<2>(1),
    );
    let grad = (exp_row / sum_exp - one_hot) / divisor.unsqueeze::<2>()
        * valid_rows.unsqueeze_dim::<2>(1);

    RowLossGrad { loss, grad }
}

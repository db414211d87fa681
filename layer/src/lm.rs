//! LM-head loss: next-token label shifting and fused/unfused dispatch.

use burn::tensor::{Int, Tensor, backend::Backend};
use cel_config::FusedCelConfig;
use cel_fused::{CelError, CelOptions, FusedCelBackend, fused_cel_loss};
use tracing::debug;

/// Shift labels one position left and pad the tail with `ignore_index`.
///
/// The feature row count stays untouched, so the original token count (not
/// the count minus one) is what has to divide the chunk count. Used on the
/// chunked path.
pub fn shift_labels_padded<B: Backend>(
    labels: Tensor<B, 2, Int>,
    ignore_index: i64,
) -> Tensor<B, 2, Int> {
    let [batch, seq_len] = labels.dims();
    let device = labels.device();
    let shifted = labels.slice([0..batch, 1..seq_len]);
    let pad = Tensor::full([batch, 1], ignore_index, &device);
    Tensor::cat(vec![shifted, pad], 1)
}

/// Drop the last feature row and the first label so that row i predicts the
/// label originally at position i + 1. Used on the unchunked path.
pub fn shift_trimmed<B: Backend>(
    features: Tensor<B, 3>,
    labels: Tensor<B, 2, Int>,
) -> (Tensor<B, 3>, Tensor<B, 2, Int>) {
    let [batch, seq_len, hidden] = features.dims();
    (
        features.slice([0..batch, 0..seq_len - 1, 0..hidden]),
        labels.slice([0..batch, 1..seq_len]),
    )
}

/// Next-token loss head over the output projection weight.
///
/// Owns no parameters; the projection weight is the model's and is only
/// read here.
#[derive(Clone, Debug)]
pub struct LmHeadLoss {
    pub config: FusedCelConfig,
}

impl LmHeadLoss {
    #[must_use]
    pub fn new(config: FusedCelConfig) -> Self {
        Self { config }
    }

    /// Next-token cross-entropy of hidden states against labels. Shifting
    /// happens internally; callers pass model outputs and labels as-is.
    ///
    /// Takes the fused chunked path when the configuration enables it,
    /// otherwise materializes full logits and runs the unfused
    /// implementation.
    pub fn forward<B: FusedCelBackend>(
        &self,
        hidden_states: Tensor<B, 3>,
        weight: Tensor<B, 2>,
        labels: Tensor<B, 2, Int>,
    ) -> Result<Tensor<B, 1>, CelError> {
        let options = CelOptions::from(&self.config);

        if !self.config.enabled {
            let (hidden_states, labels) = shift_trimmed(hidden_states, labels);
            return Ok(unfused_loss(hidden_states, weight, labels, &options));
        }

        debug!("lm head loss: fused path, {} chunks", self.config.chunk_count);
        if self.config.chunk_count > 1 {
            let labels = shift_labels_padded(labels, self.config.ignore_index);
            fused_cel_loss(hidden_states, weight, labels, &options)
        } else {
            let (hidden_states, labels) = shift_trimmed(hidden_states, labels);
            fused_cel_loss(hidden_states, weight, labels, &options)
        }
    }
}

/// Unfused fallback: full logits, then the reference cross-entropy.
fn unfused_loss<B: Backend>(
    hidden_states: Tensor<B, 3>,
    weight: Tensor<B, 2>,
    labels: Tensor<B, 2, Int>,
    options: &CelOptions,
) -> Tensor<B, 1> {
    let [batch, seq_len, _hidden] = hidden_states.dims();
    let [vocab, _] = weight.dims();
    let weight_t = weight.unsqueeze_dim::<3>(0).transpose();
    let logits = hidden_states.matmul(weight_t);
    cel_core::cross_entropy(
        logits.reshape([batch * seq_len, vocab]),
        labels.reshape([batch * seq_len]),
        options.ignore_index,
        options.reduction,
    )
}

/// e^loss, the standard language-modeling metric companion.
pub fn perplexity<B: Backend>(loss: Tensor<B, 1>) -> Tensor<B, 1> {
    loss.exp()
}

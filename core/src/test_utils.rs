//! Shared test utilities for the cel crates.

use burn::tensor::{Distribution, Int, Tensor, TensorData, backend::Backend};

/// Assert two f32 slices are close within relative and absolute tolerance.
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_data_close(a: &[f32], b: &[f32], rtol: f32, atol: f32, name: &str) {
    assert_eq!(
        a.len(),
        b.len(),
        "{name}: Data sizes don't match: {} vs {}",
        a.len(),
        b.len()
    );

    let mut max_diff = 0.0f32;
    let mut max_idx = 0;
    let mut max_av = 0.0f32;
    let mut max_bv = 0.0f32;

    for (i, (&av, &bv)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (av - bv).abs();
        if diff > max_diff {
            max_diff = diff;
            max_idx = i;
            max_av = av;
            max_bv = bv;
        }
    }

    let tolerance = atol + rtol * max_bv.abs();
    assert!(
        max_diff <= tolerance,
        "{name}: max_diff={max_diff:.6} exceeds tolerance={tolerance:.6} at idx {max_idx}: tested={max_av:.6} ref={max_bv:.6}",
    );
}

/// Random hidden states, shaped (tokens, hidden).
pub fn random_features<B: Backend>(
    n_tokens: usize,
    hidden: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::random([n_tokens, hidden], Distribution::Normal(0.0, 1.0), device)
}

/// Random projection weight, shaped (vocab, hidden).
pub fn random_weight<B: Backend>(
    vocab: usize,
    hidden: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::random([vocab, hidden], Distribution::Normal(0.0, 0.1), device)
}

/// Deterministic labels cycling through the vocabulary, with every
/// `ignore_every`-th position replaced by `ignore_index` (0 disables).
pub fn cycling_labels<B: Backend>(
    n_tokens: usize,
    vocab: usize,
    ignore_every: usize,
    ignore_index: i64,
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    let values: Vec<i64> = (0..n_tokens)
        .map(|i| {
            if ignore_every > 0 && i % ignore_every == 0 {
                ignore_index
            } else {
                (i * 7 % vocab) as i64
            }
        })
        .collect();
    Tensor::from_data(TensorData::new(values, [n_tokens]), device)
}

/// Extract a tensor as a flat f32 vector.
pub fn to_vec_f32<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.to_data().convert::<f32>().to_vec().unwrap()
}

//! Autodiff integration: the fused loss as a single backward node.
//!
//! The forward runs the chunked engine on the inner backend, computing
//! gradients for whichever inputs are tracked, and saves those gradients as
//! the node state. The backward only scales them by the upstream scalar and
//! registers them, so the (tokens, vocab) logits never outlive their chunk.

use burn::{
    backend::autodiff::{
        Autodiff, NodeId,
        checkpoint::{base::Checkpointer, strategy::CheckpointStrategy},
        grads::Gradients,
        ops::{Backward, Ops, OpsKind},
    },
    tensor::{
        FloatDType, Tensor, TensorPrimitive,
        backend::Backend,
        ops::{FloatTensor, IntTensor},
    },
};

use crate::{
    CelOptions, FusedCelBackend,
    chunk::{GradRequest, chunked_forward},
};

/// Gradients saved at forward time for the two differentiable inputs.
/// A slot is present exactly when that input was tracked.
pub struct SavedGrads<B: Backend> {
    pub features: Option<FloatTensor<B>>,
    pub weight: Option<FloatTensor<B>>,
}

impl<B: Backend> Clone for SavedGrads<B> {
    fn clone(&self) -> Self {
        Self {
            features: self.features.clone(),
            weight: self.weight.clone(),
        }
    }
}

impl<B: Backend> core::fmt::Debug for SavedGrads<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SavedGrads")
            .field("features", &self.features.is_some())
            .field("weight", &self.weight.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct CelBackward;

impl<B: Backend> Backward<B, 2> for CelBackward {
    type State = (SavedGrads<B>, [Option<NodeId>; 2]);

    fn backward(
        self,
        ops: Ops<Self::State, 2>,
        grads: &mut Gradients,
        _checkpointer: &mut Checkpointer,
    ) {
        let upstream = grads.consume::<B>(&ops.node);
        let upstream = Tensor::<B, 1>::from_primitive(TensorPrimitive::Float(upstream));
        let (saved, [features_id, weight_id]) = ops.state;

        if let (Some(id), Some(grad)) = (features_id, saved.features) {
            grads.register::<B>(id, scale::<B>(grad, upstream.clone()));
        }
        if let (Some(id), Some(grad)) = (weight_id, saved.weight) {
            grads.register::<B>(id, scale::<B>(grad, upstream));
        }
    }
}

/// Multiply a saved gradient by the upstream scalar. Gradients stored in a
/// 16-bit float format are scaled in f32 and converted back, so the loss
/// scaling of mixed-precision training loops does not round through the
/// 16-bit format.
fn scale<B: Backend>(grad: FloatTensor<B>, upstream: Tensor<B, 1>) -> FloatTensor<B> {
    let grad = Tensor::<B, 2>::from_primitive(TensorPrimitive::Float(grad));
    let dtype: FloatDType = grad.dtype().into();
    let upstream = upstream.unsqueeze::<2>();
    let scaled = match dtype {
        FloatDType::F16 | FloatDType::BF16 => {
            (grad.cast(FloatDType::F32) * upstream).cast(dtype)
        }
        _ => grad * upstream,
    };
    scaled.into_primitive().tensor()
}

impl<B: FusedCelBackend, C: CheckpointStrategy> FusedCelBackend for Autodiff<B, C> {
    fn fused_cel(
        features: FloatTensor<Self>,
        weight: FloatTensor<Self>,
        targets: IntTensor<Self>,
        options: &CelOptions,
    ) -> FloatTensor<Self> {
        let wants = GradRequest {
            features: !features.node.requirement.is_none(),
            weight: !weight.node.requirement.is_none(),
        };
        let node_ids = [
            wants.features.then_some(features.node.id),
            wants.weight.then_some(weight.node.id),
        ];
        let nodes = [features.node.clone(), weight.node.clone()];

        let out = chunked_forward::<B>(
            Tensor::from_primitive(TensorPrimitive::Float(features.primitive.clone())),
            Tensor::from_primitive(TensorPrimitive::Float(weight.primitive.clone())),
            Tensor::from_primitive(targets),
            options,
            wants,
        );
        let loss = out.loss.into_primitive().tensor();
        let saved = SavedGrads::<B> {
            features: out.grads.features.map(|t| t.into_primitive().tensor()),
            weight: out.grads.weight.map(|t| t.into_primitive().tensor()),
        };

        match CelBackward.prepare::<C>(nodes).compute_bound().stateful() {
            OpsKind::Tracked(prep) => prep.finish((saved, node_ids), loss),
            OpsKind::UnTracked(prep) => prep.finish(loss),
        }
    }
}

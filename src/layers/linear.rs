//! Fully-connected (linear) layer.

use ndarray::{ArrayD, Ix1, Ix2, IxDyn};

use super::{Layer, LayerKind};
use crate::error::{NeuralError, Result};

/// Linear transform `y = x W^T + b` over `[batch, in_features]` inputs.
pub struct Linear {
    /// `[out_features, in_features]`
    weight: ArrayD<f32>,
    /// `[out_features]`
    bias: ArrayD<f32>,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a linear layer with zeroed parameters; the initialization pass
    /// fills them after assembly.
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self {
            weight: ArrayD::zeros(IxDyn(&[out_features, in_features])),
            bias: ArrayD::zeros(IxDyn(&[out_features])),
            in_features,
            out_features,
        }
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl Layer for Linear {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = input.view().into_dimensionality::<Ix2>().map_err(|_| {
            NeuralError::shape_mismatch(format!(
                "Linear expects 2D input [batch, features], got {}D",
                input.ndim()
            ))
        })?;
        if x.shape()[1] != self.in_features {
            return Err(NeuralError::shape_mismatch(format!(
                "Linear expects {} input features, got {}",
                self.in_features,
                x.shape()[1]
            )));
        }

        let w = self
            .weight
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| NeuralError::shape_mismatch("Linear weight must be 2D"))?;
        let b = self
            .bias
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|_| NeuralError::shape_mismatch("Linear bias must be 1D"))?;

        let out = x.dot(&w.t()) + &b;
        Ok(out.into_dyn())
    }

    fn kind(&self) -> LayerKind {
        LayerKind::Linear
    }

    fn weight_mut(&mut self) -> Option<&mut ArrayD<f32>> {
        Some(&mut self.weight)
    }

    fn bias_mut(&mut self) -> Option<&mut ArrayD<f32>> {
        Some(&mut self.bias)
    }

    fn parameters(&self) -> Vec<&ArrayD<f32>> {
        vec![&self.weight, &self.bias]
    }
}

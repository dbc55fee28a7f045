//! Elementwise nonlinearities.

use ndarray::ArrayD;

use super::{Layer, LayerKind};
use crate::error::Result;

/// Leaky rectifier: `x` for positive inputs, `slope * x` otherwise.
pub struct LeakyReLU {
    negative_slope: f32,
}

impl LeakyReLU {
    pub fn new(negative_slope: f32) -> Self {
        Self { negative_slope }
    }

    pub fn negative_slope(&self) -> f32 {
        self.negative_slope
    }
}

impl Layer for LeakyReLU {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let slope = self.negative_slope;
        Ok(input.mapv(|v| if v >= 0.0 { v } else { slope * v }))
    }

    fn kind(&self) -> LayerKind {
        LayerKind::LeakyReLU
    }
}

/// Plain rectifier.
pub struct ReLU;

impl Layer for ReLU {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        Ok(input.mapv(|v| v.max(0.0)))
    }

    fn kind(&self) -> LayerKind {
        LayerKind::ReLU
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn leaky_relu_scales_negatives() {
        let act = LeakyReLU::new(0.2);
        let out = act.forward(&array![[-1.0f32, 2.0]].into_dyn()).unwrap();
        assert_eq!(out[[0, 0]], -0.2);
        assert_eq!(out[[0, 1]], 2.0);
    }

    #[test]
    fn relu_clamps_negatives() {
        let out = ReLU.forward(&array![[-3.0f32, 4.0]].into_dyn()).unwrap();
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[0, 1]], 4.0);
    }
}

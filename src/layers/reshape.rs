//! Stateless reshape glue used inside sequential stacks.

use ndarray::{ArrayD, Axis, IxDyn};

use super::{Layer, LayerKind};
use crate::error::{NeuralError, Result};

/// Collapse all non-batch dimensions: `[N, ...] -> [N, prod(...)]`.
pub struct Flatten;

impl Layer for Flatten {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        if input.ndim() < 1 {
            return Err(NeuralError::shape_mismatch("Flatten expects a batched input"));
        }
        let batch = input.shape()[0];
        let rest: usize = input.shape()[1..].iter().product();
        let data: Vec<f32> = input.iter().copied().collect();
        ArrayD::from_shape_vec(IxDyn(&[batch, rest]), data)
            .map_err(|e| NeuralError::shape_mismatch(e.to_string()))
    }

    fn kind(&self) -> LayerKind {
        LayerKind::Flatten
    }
}

/// Insert a singleton dimension at a fixed axis.
pub struct Unsqueeze {
    axis: usize,
}

impl Unsqueeze {
    pub fn new(axis: usize) -> Self {
        Self { axis }
    }
}

impl Layer for Unsqueeze {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        if self.axis > input.ndim() {
            return Err(NeuralError::shape_mismatch(format!(
                "cannot insert axis {} into a {}D tensor",
                self.axis,
                input.ndim()
            )));
        }
        Ok(input.clone().insert_axis(Axis(self.axis)))
    }

    fn kind(&self) -> LayerKind {
        LayerKind::Unsqueeze
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_collapses_trailing_dims() {
        let input = ArrayD::<f32>::zeros(IxDyn(&[2, 3, 4, 5]));
        let out = Flatten.forward(&input).unwrap();
        assert_eq!(out.shape(), &[2, 60]);
    }

    #[test]
    fn unsqueeze_inserts_singleton() {
        let input = ArrayD::<f32>::zeros(IxDyn(&[2, 8]));
        let out = Unsqueeze::new(2).forward(&input).unwrap();
        assert_eq!(out.shape(), &[2, 8, 1]);

        let out = Unsqueeze::new(2).forward(&out).unwrap();
        assert_eq!(out.shape(), &[2, 8, 1, 1]);
    }

    #[test]
    fn unsqueeze_rejects_out_of_range_axis() {
        let input = ArrayD::<f32>::zeros(IxDyn(&[2, 8]));
        assert!(Unsqueeze::new(5).forward(&input).is_err());
    }
}

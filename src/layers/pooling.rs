//! Spatial pooling layers.

use ndarray::{Array5, ArrayD, Ix5};

use super::{Layer, LayerKind};
use crate::error::{NeuralError, Result};

/// 3D max pooling over `[batch, channels, depth, height, width]` inputs.
pub struct MaxPool3d {
    kernel_size: usize,
    stride: usize,
}

impl MaxPool3d {
    pub fn new(kernel_size: usize, stride: usize) -> Self {
        Self {
            kernel_size,
            stride,
        }
    }
}

impl Layer for MaxPool3d {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = input.view().into_dimensionality::<Ix5>().map_err(|_| {
            NeuralError::shape_mismatch(format!(
                "MaxPool3d expects 5D input [batch, channels, depth, height, width], got {}D",
                input.ndim()
            ))
        })?;
        let (batch, channels, depth, height, width) = x.dim();
        let k = self.kernel_size;
        if depth < k || height < k || width < k {
            return Err(NeuralError::shape_mismatch(format!(
                "MaxPool3d kernel {k} exceeds input extent {depth}x{height}x{width}"
            )));
        }

        let out_d = (depth - k) / self.stride + 1;
        let out_h = (height - k) / self.stride + 1;
        let out_w = (width - k) / self.stride + 1;
        let mut out = Array5::<f32>::zeros((batch, channels, out_d, out_h, out_w));

        for n in 0..batch {
            for c in 0..channels {
                for od in 0..out_d {
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let mut best = f32::NEG_INFINITY;
                            for kd in 0..k {
                                for kh in 0..k {
                                    for kw in 0..k {
                                        let v = x[[
                                            n,
                                            c,
                                            od * self.stride + kd,
                                            oh * self.stride + kh,
                                            ow * self.stride + kw,
                                        ]];
                                        if v > best {
                                            best = v;
                                        }
                                    }
                                }
                            }
                            out[[n, c, od, oh, ow]] = best;
                        }
                    }
                }
            }
        }

        Ok(out.into_dyn())
    }

    fn kind(&self) -> LayerKind {
        LayerKind::MaxPool3d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn halves_each_spatial_axis() {
        let pool = MaxPool3d::new(2, 2);
        let input = ArrayD::zeros(IxDyn(&[1, 3, 4, 4, 4]));
        let out = pool.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 3, 2, 2, 2]);
    }

    #[test]
    fn picks_the_window_maximum() {
        let pool = MaxPool3d::new(2, 2);
        let mut input = ArrayD::zeros(IxDyn(&[1, 1, 2, 2, 2]));
        input[[0, 0, 1, 0, 1]] = 7.0;
        let out = pool.forward(&input).unwrap();
        assert_eq!(out[[0, 0, 0, 0, 0]], 7.0);
    }
}

//! Transposed convolution (deconvolution) layers for spatial upsampling.
//!
//! Weight layout is `[in_channels, out_channels, kernel...]`, the transpose of
//! the regular convolution layout. Output spatial size is
//! `(in - 1) * stride + kernel - 2 * padding` per axis.

use ndarray::{Array4, Array5, ArrayD, Ix1, Ix4, Ix5, IxDyn};

use super::{Layer, LayerKind};
use crate::error::{NeuralError, Result};

fn out_extent(input: usize, kernel: usize, stride: usize, padding: usize) -> Result<usize> {
    let unpadded = (input - 1) * stride + kernel;
    if unpadded <= 2 * padding {
        return Err(NeuralError::shape_mismatch(format!(
            "transposed conv over extent {input} collapses to nothing \
             (kernel {kernel}, stride {stride}, padding {padding})"
        )));
    }
    Ok(unpadded - 2 * padding)
}

/// Transposed 2D convolution over `[batch, channels, height, width]` inputs.
pub struct ConvTranspose2d {
    /// `[in_channels, out_channels, kernel, kernel]`
    weight: ArrayD<f32>,
    /// `[out_channels]`
    bias: ArrayD<f32>,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl ConvTranspose2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        Self {
            weight: ArrayD::zeros(IxDyn(&[
                in_channels,
                out_channels,
                kernel_size,
                kernel_size,
            ])),
            bias: ArrayD::zeros(IxDyn(&[out_channels])),
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
        }
    }
}

impl Layer for ConvTranspose2d {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = input.view().into_dimensionality::<Ix4>().map_err(|_| {
            NeuralError::shape_mismatch(format!(
                "ConvTranspose2d expects 4D input [batch, channels, height, width], got {}D",
                input.ndim()
            ))
        })?;
        let (batch, channels, height, width) = x.dim();
        if channels != self.in_channels {
            return Err(NeuralError::shape_mismatch(format!(
                "ConvTranspose2d expects {} input channels, got {channels}",
                self.in_channels
            )));
        }

        let w = self
            .weight
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| NeuralError::shape_mismatch("ConvTranspose2d weight must be 4D"))?;
        let b = self
            .bias
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|_| NeuralError::shape_mismatch("ConvTranspose2d bias must be 1D"))?;

        let k = self.kernel_size;
        let out_h = out_extent(height, k, self.stride, self.padding)?;
        let out_w = out_extent(width, k, self.stride, self.padding)?;
        let mut out = Array4::<f32>::zeros((batch, self.out_channels, out_h, out_w));

        // Scatter each input position through the kernel.
        for n in 0..batch {
            for ic in 0..channels {
                for ih in 0..height {
                    for iw in 0..width {
                        let v = x[[n, ic, ih, iw]];
                        for oc in 0..self.out_channels {
                            for kh in 0..k {
                                for kw in 0..k {
                                    let oh_raw = ih * self.stride + kh;
                                    let ow_raw = iw * self.stride + kw;
                                    if oh_raw >= self.padding && ow_raw >= self.padding {
                                        let oh = oh_raw - self.padding;
                                        let ow = ow_raw - self.padding;
                                        if oh < out_h && ow < out_w {
                                            out[[n, oc, oh, ow]] += v * w[[ic, oc, kh, kw]];
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        for n in 0..batch {
            for oc in 0..self.out_channels {
                let bias = b[oc];
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        out[[n, oc, oh, ow]] += bias;
                    }
                }
            }
        }

        Ok(out.into_dyn())
    }

    fn kind(&self) -> LayerKind {
        LayerKind::ConvTranspose2d
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

/// Transposed 3D convolution over `[batch, channels, depth, height, width]` inputs.
pub struct ConvTranspose3d {
    /// `[in_channels, out_channels, kernel, kernel, kernel]`
    weight: ArrayD<f32>,
    /// `[out_channels]`
    bias: ArrayD<f32>,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl ConvTranspose3d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        Self {
            weight: ArrayD::zeros(IxDyn(&[
                in_channels,
                out_channels,
                kernel_size,
                kernel_size,
                kernel_size,
            ])),
            bias: ArrayD::zeros(IxDyn(&[out_channels])),
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
        }
    }
}

impl Layer for ConvTranspose3d {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = input.view().into_dimensionality::<Ix5>().map_err(|_| {
            NeuralError::shape_mismatch(format!(
                "ConvTranspose3d expects 5D input [batch, channels, depth, height, width], got {}D",
                input.ndim()
            ))
        })?;
        let (batch, channels, depth, height, width) = x.dim();
        if channels != self.in_channels {
            return Err(NeuralError::shape_mismatch(format!(
                "ConvTranspose3d expects {} input channels, got {channels}",
                self.in_channels
            )));
        }

        let w = self
            .weight
            .view()
            .into_dimensionality::<Ix5>()
            .map_err(|_| NeuralError::shape_mismatch("ConvTranspose3d weight must be 5D"))?;
        let b = self
            .bias
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|_| NeuralError::shape_mismatch("ConvTranspose3d bias must be 1D"))?;

        let k = self.kernel_size;
        let out_d = out_extent(depth, k, self.stride, self.padding)?;
        let out_h = out_extent(height, k, self.stride, self.padding)?;
        let out_w = out_extent(width, k, self.stride, self.padding)?;
        let mut out = Array5::<f32>::zeros((batch, self.out_channels, out_d, out_h, out_w));

        for n in 0..batch {
            for ic in 0..channels {
                for id in 0..depth {
                    for ih in 0..height {
                        for iw in 0..width {
                            let v = x[[n, ic, id, ih, iw]];
                            for oc in 0..self.out_channels {
                                for kd in 0..k {
                                    for kh in 0..k {
                                        for kw in 0..k {
                                            let od_raw = id * self.stride + kd;
                                            let oh_raw = ih * self.stride + kh;
                                            let ow_raw = iw * self.stride + kw;
                                            if od_raw >= self.padding
                                                && oh_raw >= self.padding
                                                && ow_raw >= self.padding
                                            {
                                                let od = od_raw - self.padding;
                                                let oh = oh_raw - self.padding;
                                                let ow = ow_raw - self.padding;
                                                if od < out_d && oh < out_h && ow < out_w {
                                                    out[[n, oc, od, oh, ow]] +=
                                                        v * w[[ic, oc, kd, kh, kw]];
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        for n in 0..batch {
            for oc in 0..self.out_channels {
                let bias = b[oc];
                for od in 0..out_d {
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            out[[n, oc, od, oh, ow]] += bias;
                        }
                    }
                }
            }
        }

        Ok(out.into_dyn())
    }

    fn kind(&self) -> LayerKind {
        LayerKind::ConvTranspose3d
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose2d_doubles_spatial_size() {
        let deconv = ConvTranspose2d::new(3, 2, 4, 2, 1);
        let input = ArrayD::zeros(IxDyn(&[1, 3, 5, 5]));
        let out = deconv.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 2, 10, 10]);
    }

    #[test]
    fn transpose3d_doubles_spatial_size_from_singleton() {
        let deconv = ConvTranspose3d::new(4, 2, 4, 2, 1);
        let input = ArrayD::zeros(IxDyn(&[1, 4, 1, 1, 1]));
        let out = deconv.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 2, 2, 2, 2]);
    }

    #[test]
    fn transpose2d_sums_overlapping_contributions() {
        let mut deconv = ConvTranspose2d::new(1, 1, 4, 2, 1);
        deconv.weight_mut().unwrap().fill(1.0);
        let mut input = ArrayD::zeros(IxDyn(&[1, 1, 2, 2]));
        input.fill(1.0);
        let out = deconv.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 1, 4, 4]);
        // Interior positions receive overlap from all four input cells.
        assert_eq!(out[[0, 0, 1, 1]], 4.0);
    }
}

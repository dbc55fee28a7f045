//! 2D and 3D convolution layers.
//!
//! Direct (non-FFT) implementations; output spatial size is
//! `(in + 2*padding - kernel) / stride + 1` per axis.

use ndarray::{Array4, Array5, ArrayD, Ix1, Ix4, Ix5, IxDyn};

use super::{Layer, LayerKind};
use crate::error::{NeuralError, Result};

fn out_extent(input: usize, kernel: usize, stride: usize, padding: usize) -> Result<usize> {
    let padded = input + 2 * padding;
    if padded < kernel {
        return Err(NeuralError::shape_mismatch(format!(
            "spatial extent {input} with padding {padding} is smaller than kernel {kernel}"
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

/// 2D convolution over `[batch, channels, height, width]` inputs.
pub struct Conv2d {
    /// `[out_channels, in_channels, kernel, kernel]`
    weight: ArrayD<f32>,
    /// `[out_channels]`
    bias: ArrayD<f32>,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        Self {
            weight: ArrayD::zeros(IxDyn(&[
                out_channels,
                in_channels,
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

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl Layer for Conv2d {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = input.view().into_dimensionality::<Ix4>().map_err(|_| {
            NeuralError::shape_mismatch(format!(
                "Conv2d expects 4D input [batch, channels, height, width], got {}D",
                input.ndim()
            ))
        })?;
        let (batch, channels, height, width) = x.dim();
        if channels != self.in_channels {
            return Err(NeuralError::shape_mismatch(format!(
                "Conv2d expects {} input channels, got {channels}",
                self.in_channels
            )));
        }

        let w = self
            .weight
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| NeuralError::shape_mismatch("Conv2d weight must be 4D"))?;
        let b = self
            .bias
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|_| NeuralError::shape_mismatch("Conv2d bias must be 1D"))?;

        let k = self.kernel_size;
        let out_h = out_extent(height, k, self.stride, self.padding)?;
        let out_w = out_extent(width, k, self.stride, self.padding)?;
        let mut out = Array4::<f32>::zeros((batch, self.out_channels, out_h, out_w));

        let pad = self.padding as isize;
        for n in 0..batch {
            for oc in 0..self.out_channels {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let mut sum = b[oc];
                        for ic in 0..channels {
                            for kh in 0..k {
                                for kw in 0..k {
                                    let ih = (oh * self.stride + kh) as isize - pad;
                                    let iw = (ow * self.stride + kw) as isize - pad;
                                    if ih >= 0
                                        && iw >= 0
                                        && (ih as usize) < height
                                        && (iw as usize) < width
                                    {
                                        sum += x[[n, ic, ih as usize, iw as usize]]
                                            * w[[oc, ic, kh, kw]];
                                    }
                                }
                            }
                        }
                        out[[n, oc, oh, ow]] = sum;
                    }
                }
            }
        }

        Ok(out.into_dyn())
    }

    fn kind(&self) -> LayerKind {
        LayerKind::Conv2d
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

/// 3D convolution over `[batch, channels, depth, height, width]` inputs.
pub struct Conv3d {
    /// `[out_channels, in_channels, kernel, kernel, kernel]`
    weight: ArrayD<f32>,
    /// `[out_channels]`
    bias: ArrayD<f32>,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl Conv3d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        Self {
            weight: ArrayD::zeros(IxDyn(&[
                out_channels,
                in_channels,
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

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl Layer for Conv3d {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = input.view().into_dimensionality::<Ix5>().map_err(|_| {
            NeuralError::shape_mismatch(format!(
                "Conv3d expects 5D input [batch, channels, depth, height, width], got {}D",
                input.ndim()
            ))
        })?;
        let (batch, channels, depth, height, width) = x.dim();
        if channels != self.in_channels {
            return Err(NeuralError::shape_mismatch(format!(
                "Conv3d expects {} input channels, got {channels}",
                self.in_channels
            )));
        }

        let w = self
            .weight
            .view()
            .into_dimensionality::<Ix5>()
            .map_err(|_| NeuralError::shape_mismatch("Conv3d weight must be 5D"))?;
        let b = self
            .bias
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|_| NeuralError::shape_mismatch("Conv3d bias must be 1D"))?;

        let k = self.kernel_size;
        let out_d = out_extent(depth, k, self.stride, self.padding)?;
        let out_h = out_extent(height, k, self.stride, self.padding)?;
        let out_w = out_extent(width, k, self.stride, self.padding)?;
        let mut out = Array5::<f32>::zeros((batch, self.out_channels, out_d, out_h, out_w));

        let pad = self.padding as isize;
        for n in 0..batch {
            for oc in 0..self.out_channels {
                for od in 0..out_d {
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let mut sum = b[oc];
                            for ic in 0..channels {
                                for kd in 0..k {
                                    for kh in 0..k {
                                        for kw in 0..k {
                                            let id = (od * self.stride + kd) as isize - pad;
                                            let ih = (oh * self.stride + kh) as isize - pad;
                                            let iw = (ow * self.stride + kw) as isize - pad;
                                            if id >= 0
                                                && ih >= 0
                                                && iw >= 0
                                                && (id as usize) < depth
                                                && (ih as usize) < height
                                                && (iw as usize) < width
                                            {
                                                sum += x[[
                                                    n,
                                                    ic,
                                                    id as usize,
                                                    ih as usize,
                                                    iw as usize,
                                                ]] * w[[oc, ic, kd, kh, kw]];
                                            }
                                        }
                                    }
                                }
                            }
                            out[[n, oc, od, oh, ow]] = sum;
                        }
                    }
                }
            }
        }

        Ok(out.into_dyn())
    }

    fn kind(&self) -> LayerKind {
        LayerKind::Conv3d
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
    use ndarray::array;

    #[test]
    fn conv2d_same_padding_keeps_spatial_size() {
        let conv = Conv2d::new(1, 2, 3, 1, 1);
        let input = ArrayD::zeros(IxDyn(&[1, 1, 5, 5]));
        let out = conv.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 2, 5, 5]);
    }

    #[test]
    fn conv2d_identity_kernel() {
        let mut conv = Conv2d::new(1, 1, 1, 1, 0);
        conv.weight_mut().unwrap()[[0, 0, 0, 0]] = 2.0;
        let input = array![[[1.0f32, 2.0], [3.0, 4.0]]]
            .insert_axis(ndarray::Axis(0))
            .into_dyn();
        let out = conv.forward(&input).unwrap();
        assert_eq!(out[[0, 0, 1, 1]], 8.0);
    }

    #[test]
    fn conv3d_output_shape() {
        let conv = Conv3d::new(2, 4, 3, 1, 1);
        let input = ArrayD::zeros(IxDyn(&[1, 2, 4, 4, 4]));
        let out = conv.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 4, 4, 4, 4]);
    }

    #[test]
    fn conv3d_rejects_channel_mismatch() {
        let conv = Conv3d::new(3, 4, 3, 1, 1);
        let input = ArrayD::zeros(IxDyn(&[1, 2, 4, 4, 4]));
        assert!(conv.forward(&input).is_err());
    }
}

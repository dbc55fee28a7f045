//! Batch and group normalization layers.
//!
//! Both layers treat axis 1 as the channel axis and normalize over
//! `[batch, channels, ...]` tensors of any rank, which covers the 1D (fully
//! connected), 2D and 3D convolutional cases with a single implementation.

use std::cell::RefCell;

use ndarray::{ArrayD, IxDyn};

use super::{Layer, LayerKind};
use crate::error::{NeuralError, Result};

const EPSILON: f32 = 1e-5;

fn flat_view<'a>(input: &'a ArrayD<f32>, name: &str) -> Result<(&'a [f32], usize, usize, usize)> {
    if input.ndim() < 2 {
        return Err(NeuralError::shape_mismatch(format!(
            "{name} expects at least 2D input [batch, channels, ...], got {}D",
            input.ndim()
        )));
    }
    let data = input.as_slice().ok_or_else(|| {
        NeuralError::shape_mismatch(format!("{name} requires a contiguous input tensor"))
    })?;
    let batch = input.shape()[0];
    let channels = input.shape()[1];
    let spatial: usize = input.shape()[2..].iter().product();
    Ok((data, batch, channels, spatial))
}

/// Batch normalization with learnable scale/shift and running statistics.
///
/// Training mode normalizes with per-channel batch statistics and updates the
/// running estimates; evaluation mode normalizes with the running estimates.
pub struct BatchNorm {
    num_features: usize,
    /// `[num_features]` scale (gamma)
    gamma: ArrayD<f32>,
    /// `[num_features]` shift (beta)
    beta: ArrayD<f32>,
    running_mean: RefCell<Vec<f32>>,
    running_var: RefCell<Vec<f32>>,
    momentum: f32,
    training: bool,
}

impl BatchNorm {
    pub fn new(num_features: usize) -> Self {
        Self {
            num_features,
            gamma: ArrayD::ones(IxDyn(&[num_features])),
            beta: ArrayD::zeros(IxDyn(&[num_features])),
            running_mean: RefCell::new(vec![0.0; num_features]),
            running_var: RefCell::new(vec![1.0; num_features]),
            momentum: 0.1,
            training: true,
        }
    }
}

impl Layer for BatchNorm {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let (data, batch, channels, spatial) = flat_view(input, "BatchNorm")?;
        if channels != self.num_features {
            return Err(NeuralError::shape_mismatch(format!(
                "BatchNorm expects {} channels, got {channels}",
                self.num_features
            )));
        }

        let gamma = self.gamma.as_slice().ok_or_else(|| {
            NeuralError::shape_mismatch("BatchNorm gamma must be contiguous")
        })?;
        let beta = self.beta.as_slice().ok_or_else(|| {
            NeuralError::shape_mismatch("BatchNorm beta must be contiguous")
        })?;

        let (mean, var) = if self.training {
            let count = (batch * spatial) as f32;
            let mut mean = vec![0.0f32; channels];
            let mut var = vec![0.0f32; channels];
            for n in 0..batch {
                for c in 0..channels {
                    let base = (n * channels + c) * spatial;
                    for s in 0..spatial {
                        mean[c] += data[base + s];
                    }
                }
            }
            for m in &mut mean {
                *m /= count;
            }
            for n in 0..batch {
                for c in 0..channels {
                    let base = (n * channels + c) * spatial;
                    for s in 0..spatial {
                        let d = data[base + s] - mean[c];
                        var[c] += d * d;
                    }
                }
            }
            for v in &mut var {
                *v /= count;
            }

            {
                let mut running_mean = self.running_mean.borrow_mut();
                let mut running_var = self.running_var.borrow_mut();
                for c in 0..channels {
                    running_mean[c] =
                        (1.0 - self.momentum) * running_mean[c] + self.momentum * mean[c];
                    running_var[c] =
                        (1.0 - self.momentum) * running_var[c] + self.momentum * var[c];
                }
            }

            (mean, var)
        } else {
            (
                self.running_mean.borrow().clone(),
                self.running_var.borrow().clone(),
            )
        };

        let mut out = vec![0.0f32; data.len()];
        for n in 0..batch {
            for c in 0..channels {
                let inv_std = 1.0 / (var[c] + EPSILON).sqrt();
                let base = (n * channels + c) * spatial;
                for s in 0..spatial {
                    out[base + s] = (data[base + s] - mean[c]) * inv_std * gamma[c] + beta[c];
                }
            }
        }

        ArrayD::from_shape_vec(input.raw_dim(), out)
            .map_err(|e| NeuralError::shape_mismatch(e.to_string()))
    }

    fn kind(&self) -> LayerKind {
        LayerKind::BatchNorm
    }

    fn weight_mut(&mut self) -> Option<&mut ArrayD<f32>> {
        Some(&mut self.gamma)
    }

    fn bias_mut(&mut self) -> Option<&mut ArrayD<f32>> {
        Some(&mut self.beta)
    }

    fn parameters(&self) -> Vec<&ArrayD<f32>> {
        vec![&self.gamma, &self.beta]
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

/// Group normalization: channels are split into groups and each group is
/// normalized over its channels and spatial extent, independently per sample.
pub struct GroupNorm {
    num_groups: usize,
    num_channels: usize,
    /// `[num_channels]` scale (gamma)
    gamma: ArrayD<f32>,
    /// `[num_channels]` shift (beta)
    beta: ArrayD<f32>,
}

impl GroupNorm {
    /// Fails at construction time when the group count cannot partition the
    /// channel width.
    pub fn new(num_groups: usize, num_channels: usize) -> Result<Self> {
        if num_groups == 0 {
            return Err(NeuralError::invalid_configuration(
                "GroupNorm requires at least one group",
            ));
        }
        if num_channels % num_groups != 0 {
            return Err(NeuralError::shape_mismatch(format!(
                "{num_channels} channels cannot be split into {num_groups} groups"
            )));
        }
        Ok(Self {
            num_groups,
            num_channels,
            gamma: ArrayD::ones(IxDyn(&[num_channels])),
            beta: ArrayD::zeros(IxDyn(&[num_channels])),
        })
    }
}

impl Layer for GroupNorm {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let (data, batch, channels, spatial) = flat_view(input, "GroupNorm")?;
        if channels != self.num_channels {
            return Err(NeuralError::shape_mismatch(format!(
                "GroupNorm expects {} channels, got {channels}",
                self.num_channels
            )));
        }

        let gamma = self.gamma.as_slice().ok_or_else(|| {
            NeuralError::shape_mismatch("GroupNorm gamma must be contiguous")
        })?;
        let beta = self.beta.as_slice().ok_or_else(|| {
            NeuralError::shape_mismatch("GroupNorm beta must be contiguous")
        })?;

        let channels_per_group = channels / self.num_groups;
        let group_len = (channels_per_group * spatial) as f32;
        let mut out = vec![0.0f32; data.len()];

        for n in 0..batch {
            for g in 0..self.num_groups {
                let c0 = g * channels_per_group;

                let mut mean = 0.0f32;
                for c in c0..c0 + channels_per_group {
                    let base = (n * channels + c) * spatial;
                    for s in 0..spatial {
                        mean += data[base + s];
                    }
                }
                mean /= group_len;

                let mut var = 0.0f32;
                for c in c0..c0 + channels_per_group {
                    let base = (n * channels + c) * spatial;
                    for s in 0..spatial {
                        let d = data[base + s] - mean;
                        var += d * d;
                    }
                }
                var /= group_len;

                let inv_std = 1.0 / (var + EPSILON).sqrt();
                for c in c0..c0 + channels_per_group {
                    let base = (n * channels + c) * spatial;
                    for s in 0..spatial {
                        out[base + s] =
                            (data[base + s] - mean) * inv_std * gamma[c] + beta[c];
                    }
                }
            }
        }

        ArrayD::from_shape_vec(input.raw_dim(), out)
            .map_err(|e| NeuralError::shape_mismatch(e.to_string()))
    }

    fn kind(&self) -> LayerKind {
        LayerKind::GroupNorm
    }

    fn weight_mut(&mut self) -> Option<&mut ArrayD<f32>> {
        Some(&mut self.gamma)
    }

    fn bias_mut(&mut self) -> Option<&mut ArrayD<f32>> {
        Some(&mut self.beta)
    }

    fn parameters(&self) -> Vec<&ArrayD<f32>> {
        vec![&self.gamma, &self.beta]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn batch_norm_normalizes_per_channel() {
        let bn = BatchNorm::new(2);
        let input = array![[1.0f32, 10.0], [3.0, 30.0]].into_dyn();
        let out = bn.forward(&input).unwrap();
        // Per channel, the two samples normalize to +-1 (up to epsilon).
        assert_relative_eq!(out[[0, 0]], -1.0, epsilon = 1e-2);
        assert_relative_eq!(out[[1, 0]], 1.0, epsilon = 1e-2);
        assert_relative_eq!(out[[0, 1]], -1.0, epsilon = 1e-2);
    }

    #[test]
    fn batch_norm_eval_uses_running_stats() {
        let mut bn = BatchNorm::new(1);
        bn.set_training(false);
        // Fresh running stats are mean 0, var 1: eval is near-identity.
        let input = array![[2.0f32], [4.0]].into_dyn();
        let out = bn.forward(&input).unwrap();
        assert_relative_eq!(out[[0, 0]], 2.0, epsilon = 1e-4);
        assert_relative_eq!(out[[1, 0]], 4.0, epsilon = 1e-4);
    }

    #[test]
    fn group_norm_rejects_indivisible_channels() {
        assert!(GroupNorm::new(3, 8).is_err());
        assert!(GroupNorm::new(0, 8).is_err());
        assert!(GroupNorm::new(2, 8).is_ok());
    }

    #[test]
    fn group_norm_normalizes_within_groups() {
        let gn = GroupNorm::new(2, 4).unwrap();
        let input = ArrayD::from_shape_vec(
            IxDyn(&[1, 4, 2]),
            vec![1.0, 3.0, 1.0, 3.0, 10.0, 30.0, 10.0, 30.0],
        )
        .unwrap();
        let out = gn.forward(&input).unwrap();
        // Each group of two channels normalizes to zero mean.
        let first_group: f32 = (0..2).map(|c| out[[0, c, 0]] + out[[0, c, 1]]).sum();
        assert_relative_eq!(first_group, 0.0, epsilon = 1e-4);
    }
}

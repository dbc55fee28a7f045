//! Primitive layer implementations.
//!
//! Every layer operates on channels-first `ArrayD<f32>` tensors
//! (`[batch, channels, ...]`) and exposes its learnable parameters for the
//! initialization pass through [`Layer::weight_mut`] and [`Layer::bias_mut`].

pub mod activation;
pub mod conv;
pub mod conv_transpose;
pub mod dropout;
pub mod linear;
pub mod normalization;
pub mod pooling;
pub mod resample;
pub mod reshape;

pub use activation::{LeakyReLU, ReLU};
pub use conv::{Conv2d, Conv3d};
pub use conv_transpose::{ConvTranspose2d, ConvTranspose3d};
pub use dropout::Dropout;
pub use linear::Linear;
pub use normalization::{BatchNorm, GroupNorm};
pub use pooling::MaxPool3d;
pub use resample::{ReflectionPad2d, Upsample2d, UpsampleMode};
pub use reshape::{Flatten, Unsqueeze};

use ndarray::ArrayD;

use crate::error::Result;

/// Identifies the kind of a layer as a closed set of variants.
///
/// The initialization pass switches on this tag instead of inspecting layer
/// runtime types, so every layer carries its kind from construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Linear,
    Conv2d,
    Conv3d,
    ConvTranspose2d,
    ConvTranspose3d,
    BatchNorm,
    GroupNorm,
    MaxPool3d,
    Upsample2d,
    ReflectionPad2d,
    LeakyReLU,
    ReLU,
    Dropout,
    Flatten,
    Unsqueeze,
}

/// A single network layer: a callable transform plus parameter access.
pub trait Layer {
    /// Apply the layer to an input tensor.
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// The kind tag this layer was constructed with.
    fn kind(&self) -> LayerKind;

    /// Mutable access to the primary learnable tensor (weight, or gamma for
    /// normalization layers). `None` for parameter-free layers.
    fn weight_mut(&mut self) -> Option<&mut ArrayD<f32>> {
        None
    }

    /// Mutable access to the bias tensor (beta for normalization layers).
    fn bias_mut(&mut self) -> Option<&mut ArrayD<f32>> {
        None
    }

    /// All learnable parameters of this layer, weight first.
    fn parameters(&self) -> Vec<&ArrayD<f32>> {
        vec![]
    }

    /// Toggle training-time behavior (dropout masks, batch statistics).
    fn set_training(&mut self, _training: bool) {}
}

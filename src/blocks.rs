//! Block factories: small fixed templates of layers (transform + optional
//! normalization + nonlinearity) that the stack builders compose.
//!
//! Each factory returns the block as a flat list of boxed layers so builders
//! can splice it into a single [`crate::model::Sequential`].

use tracing::debug;

use crate::error::Result;
use crate::layers::{
    BatchNorm, Conv2d, Conv3d, ConvTranspose2d, ConvTranspose3d, GroupNorm, Layer, LeakyReLU,
    Linear, ReflectionPad2d, Upsample2d, UpsampleMode,
};

/// Negative slope of the leaky rectifier following normalized transforms.
const NORMALIZED_SLOPE: f32 = 0.2;
/// Negative slope of the leaky rectifier in the plain fully-connected variant.
const PLAIN_FC_SLOPE: f32 = 0.1;

/// Which normalization layer, if any, follows a transform inside a block.
///
/// For [`Norm::Group`] the group count must evenly divide the channel width;
/// an indivisible pair fails when the block is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Norm {
    /// No normalization.
    None,
    /// Batch normalization over the channel axis.
    Batch,
    /// Group normalization with the given group count.
    Group { groups: usize },
}

/// Kernel and stride of a convolution block.
#[derive(Debug, Clone, Copy)]
pub struct ConvBlockConfig {
    /// Square kernel size; padding is `(kernel_size - 1) / 2`, which preserves
    /// spatial size for odd kernels at stride 1.
    pub kernel_size: usize,
    pub stride: usize,
}

impl Default for ConvBlockConfig {
    /// 3x3(x3) kernel at stride 1.
    fn default() -> Self {
        Self {
            kernel_size: 3,
            stride: 1,
        }
    }
}

pub type Block = Vec<Box<dyn Layer>>;

/// Fully-connected unit: linear, optional batch normalization, leaky
/// rectifier.
///
/// Only the batch mode normalizes here; the group and plain modes share the
/// original plain variant with its gentler 0.1 slope.
pub fn fc_block(norm: Norm, in_features: usize, out_features: usize) -> Result<Block> {
    let linear = Box::new(Linear::new(in_features, out_features));
    let block: Block = match norm {
        Norm::Batch => vec![
            linear,
            Box::new(BatchNorm::new(out_features)),
            Box::new(LeakyReLU::new(NORMALIZED_SLOPE)),
        ],
        Norm::None | Norm::Group { .. } => {
            vec![linear, Box::new(LeakyReLU::new(PLAIN_FC_SLOPE))]
        }
    };
    Ok(block)
}

fn norm_layer(norm: Norm, channels: usize) -> Result<Option<Box<dyn Layer>>> {
    match norm {
        Norm::None => Ok(None),
        Norm::Batch => Ok(Some(Box::new(BatchNorm::new(channels)))),
        Norm::Group { groups } => Ok(Some(Box::new(GroupNorm::new(groups, channels)?))),
    }
}

/// 2D convolution unit: same-size conv, optional normalization, leaky
/// rectifier.
pub fn conv2d_block(
    norm: Norm,
    in_channels: usize,
    out_channels: usize,
    config: ConvBlockConfig,
) -> Result<Block> {
    let padding = (config.kernel_size - 1) / 2;
    let mut block: Block = vec![Box::new(Conv2d::new(
        in_channels,
        out_channels,
        config.kernel_size,
        config.stride,
        padding,
    ))];
    if let Some(layer) = norm_layer(norm, out_channels)? {
        block.push(layer);
    }
    block.push(Box::new(LeakyReLU::new(NORMALIZED_SLOPE)));
    Ok(block)
}

/// 3D convolution unit: same-size conv, optional normalization, leaky
/// rectifier.
pub fn conv3d_block(
    norm: Norm,
    in_channels: usize,
    out_channels: usize,
    config: ConvBlockConfig,
) -> Result<Block> {
    let padding = (config.kernel_size - 1) / 2;
    let mut block: Block = vec![Box::new(Conv3d::new(
        in_channels,
        out_channels,
        config.kernel_size,
        config.stride,
        padding,
    ))];
    if let Some(layer) = norm_layer(norm, out_channels)? {
        block.push(layer);
    }
    block.push(Box::new(LeakyReLU::new(NORMALIZED_SLOPE)));
    Ok(block)
}

/// 2D transposed-convolution unit performing exact 2x spatial upsampling
/// (kernel 4, stride 2, padding 1). No normalization variant exists for this
/// block.
pub fn deconv2d_block(in_channels: usize, out_channels: usize) -> Result<Block> {
    Ok(vec![
        Box::new(ConvTranspose2d::new(in_channels, out_channels, 4, 2, 1)),
        Box::new(LeakyReLU::new(NORMALIZED_SLOPE)),
    ])
}

/// 3D transposed-convolution unit performing exact 2x spatial upsampling
/// (kernel 4, stride 2, padding 1), optional normalization, leaky rectifier.
pub fn deconv3d_block(norm: Norm, in_channels: usize, out_channels: usize) -> Result<Block> {
    let mut block: Block = vec![Box::new(ConvTranspose3d::new(
        in_channels,
        out_channels,
        4,
        2,
        1,
    ))];
    if let Some(layer) = norm_layer(norm, out_channels)? {
        block.push(layer);
    }
    block.push(Box::new(LeakyReLU::new(NORMALIZED_SLOPE)));
    Ok(block)
}

/// 2D upsample-then-conv unit: interpolated 2x upsampling, one-pixel
/// reflective padding, a 3x3 convolution with no zero padding, leaky
/// rectifier. The default upsampling path of [`crate::builders::decoder2d`].
pub fn upconv2d_block(
    in_channels: usize,
    out_channels: usize,
    mode: UpsampleMode,
) -> Result<Block> {
    if mode == UpsampleMode::Nearest {
        debug!("upconv2d block using nearest-neighbor upsampling");
    }
    Ok(vec![
        Box::new(Upsample2d::new(2, mode)),
        Box::new(ReflectionPad2d::new(1)),
        Box::new(Conv2d::new(in_channels, out_channels, 3, 1, 0)),
        Box::new(LeakyReLU::new(NORMALIZED_SLOPE)),
    ])
}

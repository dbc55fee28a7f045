//! Stack builders: assemble complete encoder and decoder networks from the
//! block factories and width schedules, then run the initialization pass.
//!
//! Every builder returns a flat [`Sequential`] whose layer list is the
//! concatenation of its blocks, ready for training.

use tracing::debug;

use crate::blocks::{
    conv2d_block, conv3d_block, deconv2d_block, deconv3d_block, fc_block, upconv2d_block, Block,
    ConvBlockConfig, Norm,
};
use crate::error::Result;
use crate::init::{initialize, xavier_normal};
use crate::layers::{
    Conv2d, Conv3d, Dropout, Flatten, Layer, LayerKind, Linear, MaxPool3d, ReLU, Unsqueeze,
    UpsampleMode,
};
use crate::model::Sequential;
use crate::schedule;

/// Hidden width of both intermediate layers in [`fc_stack_dropout`].
const FC_DROPOUT_HIDDEN: usize = 1024;
/// Drop probability in [`fc_stack_dropout`].
const FC_DROPOUT_RATE: f32 = 0.5;

/// Configuration of a [`encoder3d`] stack.
#[derive(Debug, Clone, Copy)]
pub struct Encoder3dConfig {
    /// Number of conv-conv-pool stages; each halves every spatial axis.
    pub nlayers: usize,
    pub norm: Norm,
    /// Channels of the input volume.
    pub in_channels: usize,
    /// Width ceiling of the growing schedule.
    pub max_channels: usize,
    /// Width of the first stage.
    pub first_channels: usize,
    /// Double the width every `step` stages.
    pub step: usize,
    /// Size of the bottleneck feature.
    pub bottleneck: usize,
}

impl Encoder3dConfig {
    pub fn new(nlayers: usize) -> Self {
        Self {
            nlayers,
            norm: Norm::Batch,
            in_channels: 1,
            max_channels: 128,
            first_channels: 8,
            step: 1,
            bottleneck: 20,
        }
    }
}

/// Configuration of a [`decoder3d`] stack.
#[derive(Debug, Clone, Copy)]
pub struct Decoder3dConfig {
    /// Number of deconv-conv stages; each doubles every spatial axis.
    pub nlayers: usize,
    /// Size of the bottleneck feature the decoder starts from.
    pub bottleneck: usize,
    /// Channel width upconvolution starts from.
    pub start_channels: usize,
    pub norm: Norm,
    /// Channels of the output volume.
    pub final_channels: usize,
    /// Width floor of the shrinking schedule.
    pub min_channels: usize,
    /// Halve the width every `step` stages.
    pub step: usize,
    /// When set, the bottleneck is not spatial: a fully-connected block and
    /// three unsqueezes lift it to a `1x1x1` volume first.
    pub init_fc: bool,
}

impl Decoder3dConfig {
    pub fn new(nlayers: usize, bottleneck: usize, start_channels: usize) -> Self {
        Self {
            nlayers,
            bottleneck,
            start_channels,
            norm: Norm::Batch,
            final_channels: 1,
            min_channels: 8,
            step: 1,
            init_fc: true,
        }
    }
}

/// Configuration of a [`decoder2d`] stack.
#[derive(Debug, Clone, Copy)]
pub struct Decoder2dConfig {
    pub nlayers: usize,
    pub bottleneck: usize,
    pub start_channels: usize,
    pub norm: Norm,
    pub final_channels: usize,
    pub min_channels: usize,
    pub step: usize,
    /// Lift the bottleneck through a fully-connected block first, as in
    /// [`Decoder3dConfig::init_fc`] but to a `1x1` image.
    pub init_fc: bool,
    /// Upsample with transposed convolutions instead of the default
    /// interpolate-then-convolve path.
    pub use_deconv: bool,
    pub upsample_mode: UpsampleMode,
}

impl Decoder2dConfig {
    pub fn new(nlayers: usize, bottleneck: usize, start_channels: usize) -> Self {
        Self {
            nlayers,
            bottleneck,
            start_channels,
            norm: Norm::Batch,
            final_channels: 1,
            min_channels: 8,
            step: 1,
            init_fc: true,
            use_deconv: false,
            upsample_mode: UpsampleMode::Bilinear,
        }
    }
}

/// The refinement convolutions of a 2D decoder run at half the group count of
/// the rest of the stack.
fn halve_groups(norm: Norm) -> Norm {
    match norm {
        Norm::Group { groups } => Norm::Group { groups: groups / 2 },
        other => other,
    }
}

/// Volumetric encoder: `nlayers` stages of two same-size 3D convolutions and
/// a 2x max pool, then a flatten and two fully-connected blocks down to the
/// bottleneck.
///
/// Returns the stack together with the channel width of the last stage, which
/// a paired decoder typically uses as its `start_channels`.
///
/// The flatten feeds the first fully-connected block with exactly the final
/// stage width, so the input volume extent must reduce to `1x1x1` after
/// `nlayers` halvings.
pub fn encoder3d(config: &Encoder3dConfig) -> Result<(Sequential, usize)> {
    let widths = schedule::growing(
        config.nlayers,
        config.first_channels,
        config.step,
        config.max_channels,
    )?;
    let final_width = widths.last().copied().unwrap_or(config.first_channels);

    let mut layers: Block = Vec::new();
    let mut in_channels = config.in_channels;
    for &out_channels in &widths {
        layers.extend(conv3d_block(
            config.norm,
            in_channels,
            out_channels,
            ConvBlockConfig::default(),
        )?);
        layers.extend(conv3d_block(
            config.norm,
            out_channels,
            out_channels,
            ConvBlockConfig::default(),
        )?);
        layers.push(Box::new(MaxPool3d::new(2, 2)));
        in_channels = out_channels;
    }
    layers.push(Box::new(Flatten));
    layers.extend(fc_block(config.norm, final_width, config.bottleneck)?);
    layers.extend(fc_block(config.norm, config.bottleneck, config.bottleneck)?);

    let mut encoder = Sequential::new(layers);
    initialize(&mut encoder);
    Ok((encoder, final_width))
}

/// Volumetric decoder: an optional bottleneck-lifting fully-connected block,
/// `nlayers` stages of a 2x transposed convolution and a same-size refinement
/// convolution, then a plain read-out convolution to `final_channels`.
pub fn decoder3d(config: &Decoder3dConfig) -> Result<Sequential> {
    let mut layers: Block = Vec::new();
    if config.init_fc {
        // The lifting block always batch-normalizes, whatever the stack norm.
        layers.extend(fc_block(Norm::Batch, config.bottleneck, config.start_channels)?);
        for _ in 0..3 {
            layers.push(Box::new(Unsqueeze::new(2)));
        }
    }

    let widths = schedule::shrinking(
        config.nlayers,
        config.start_channels,
        config.step,
        config.min_channels,
    )?;
    let mut in_channels = config.start_channels;
    let mut out_channels = config.start_channels;
    for &width in &widths {
        layers.extend(deconv3d_block(config.norm, in_channels, width)?);
        layers.extend(conv3d_block(
            config.norm,
            width,
            width,
            ConvBlockConfig::default(),
        )?);
        in_channels = width;
        out_channels = width;
    }
    layers.push(Box::new(Conv3d::new(
        out_channels,
        config.final_channels,
        3,
        1,
        1,
    )));

    let mut decoder = Sequential::new(layers);
    initialize(&mut decoder);
    Ok(decoder)
}

/// Planar decoder: like [`decoder3d`] but in 2D, upsampling by default with
/// interpolate-pad-convolve blocks. Transposed-convolution upsampling is an
/// opt-in, in which case initialization seeds those kernels as bilinear
/// upsamplers.
pub fn decoder2d(config: &Decoder2dConfig) -> Result<Sequential> {
    let mut layers: Block = Vec::new();
    if config.init_fc {
        layers.extend(fc_block(Norm::Batch, config.bottleneck, config.start_channels)?);
        for _ in 0..2 {
            layers.push(Box::new(Unsqueeze::new(2)));
        }
    }

    if config.use_deconv {
        debug!("decoder2d upsampling with transposed convolutions");
    }
    let widths = schedule::shrinking(
        config.nlayers,
        config.start_channels,
        config.step,
        config.min_channels,
    )?;
    let refinement_norm = halve_groups(config.norm);
    let mut in_channels = config.start_channels;
    let mut out_channels = config.start_channels;
    for &width in &widths {
        if config.use_deconv {
            layers.extend(deconv2d_block(in_channels, width)?);
        } else {
            layers.extend(upconv2d_block(in_channels, width, config.upsample_mode)?);
        }
        layers.extend(conv2d_block(
            refinement_norm,
            width,
            width,
            ConvBlockConfig::default(),
        )?);
        in_channels = width;
        out_channels = width;
    }
    layers.push(Box::new(Conv2d::new(
        out_channels,
        config.final_channels,
        3,
        1,
        1,
    )));

    let mut decoder = Sequential::new(layers);
    initialize(&mut decoder);
    Ok(decoder)
}

/// Chain of `nlayers` fully-connected blocks. The first maps `in_features` to
/// `out_features`, the rest keep `out_features`.
pub fn fc_stack(
    in_features: usize,
    out_features: usize,
    nlayers: usize,
    norm: Norm,
) -> Result<Sequential> {
    let mut layers: Block = Vec::new();
    let mut width = in_features;
    for _ in 0..nlayers {
        layers.extend(fc_block(norm, width, out_features)?);
        width = out_features;
    }
    let mut stack = Sequential::new(layers);
    initialize(&mut stack);
    Ok(stack)
}

/// Fixed three-linear regression head with rectifiers and dropout between the
/// layers.
///
/// After the standard pass, every linear weight is re-drawn Xavier-normal;
/// the `quiet_layer`-th linear (counting from 1) uses gain 0.01 so the head
/// starts with near-zero output, the rest gain 1.
pub fn fc_stack_dropout(
    in_features: usize,
    out_features: usize,
    quiet_layer: usize,
) -> Result<Sequential> {
    let layers: Block = vec![
        Box::new(Linear::new(in_features, FC_DROPOUT_HIDDEN)),
        Box::new(ReLU),
        Box::new(Dropout::new(FC_DROPOUT_RATE)?),
        Box::new(Linear::new(FC_DROPOUT_HIDDEN, FC_DROPOUT_HIDDEN)),
        Box::new(ReLU),
        Box::new(Dropout::new(FC_DROPOUT_RATE)?),
        Box::new(Linear::new(FC_DROPOUT_HIDDEN, out_features)),
    ];
    let mut stack = Sequential::new(layers);
    initialize(&mut stack);

    let mut rng = rand::thread_rng();
    let mut nl = 1;
    for layer in stack.layers_mut() {
        if layer.kind() == LayerKind::Linear {
            let gain = if nl == quiet_layer { 0.01 } else { 1.0 };
            if let Some(weight) = layer.weight_mut() {
                xavier_normal(weight, gain, &mut rng);
            }
            if let Some(bias) = layer.bias_mut() {
                bias.fill(0.0);
            }
            nl += 1;
        }
    }
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(stack: &Sequential) -> Vec<LayerKind> {
        stack.layers().iter().map(|layer| layer.kind()).collect()
    }

    #[test]
    fn encoder3d_reports_final_width() {
        let (encoder, width) = encoder3d(&Encoder3dConfig::new(3)).unwrap();
        // Widths 8, 16, 32 with the default schedule.
        assert_eq!(width, 32);
        assert!(!encoder.is_empty());
    }

    #[test]
    fn encoder3d_stage_layout() {
        let (encoder, _) = encoder3d(&Encoder3dConfig::new(1)).unwrap();
        assert_eq!(
            kinds(&encoder),
            vec![
                LayerKind::Conv3d,
                LayerKind::BatchNorm,
                LayerKind::LeakyReLU,
                LayerKind::Conv3d,
                LayerKind::BatchNorm,
                LayerKind::LeakyReLU,
                LayerKind::MaxPool3d,
                LayerKind::Flatten,
                LayerKind::Linear,
                LayerKind::BatchNorm,
                LayerKind::LeakyReLU,
                LayerKind::Linear,
                LayerKind::BatchNorm,
                LayerKind::LeakyReLU,
            ]
        );
    }

    #[test]
    fn decoder3d_starts_with_lifting_fc_and_ends_with_readout() {
        let decoder = decoder3d(&Decoder3dConfig::new(2, 20, 64)).unwrap();
        let kinds = kinds(&decoder);
        assert_eq!(kinds[0], LayerKind::Linear);
        assert_eq!(
            &kinds[3..6],
            &[LayerKind::Unsqueeze, LayerKind::Unsqueeze, LayerKind::Unsqueeze]
        );
        assert_eq!(kinds.last(), Some(&LayerKind::Conv3d));
    }

    #[test]
    fn decoder3d_without_init_fc_has_no_linear() {
        let mut config = Decoder3dConfig::new(2, 20, 64);
        config.init_fc = false;
        let decoder = decoder3d(&config).unwrap();
        assert!(kinds(&decoder)
            .iter()
            .all(|&k| k != LayerKind::Linear && k != LayerKind::Unsqueeze));
    }

    #[test]
    fn decoder2d_defaults_to_upsample_blocks() {
        let decoder = decoder2d(&Decoder2dConfig::new(3, 20, 64)).unwrap();
        let kinds = kinds(&decoder);
        assert!(kinds.contains(&LayerKind::Upsample2d));
        assert!(!kinds.contains(&LayerKind::ConvTranspose2d));
    }

    #[test]
    fn decoder2d_deconv_opt_in() {
        let mut config = Decoder2dConfig::new(3, 20, 64);
        config.use_deconv = true;
        let decoder = decoder2d(&config).unwrap();
        let kinds = kinds(&decoder);
        assert!(kinds.contains(&LayerKind::ConvTranspose2d));
        assert!(!kinds.contains(&LayerKind::Upsample2d));
    }

    #[test]
    fn decoder2d_halves_refinement_groups() {
        // Group count 4 in the stack means 2 in the refinement convolutions;
        // widths bottom out at 8 which both divide.
        let mut config = Decoder2dConfig::new(2, 20, 32);
        config.norm = Norm::Group { groups: 4 };
        assert!(decoder2d(&config).is_ok());

        // Halving a group count of 1 reaches zero and is rejected.
        config.norm = Norm::Group { groups: 1 };
        assert!(decoder2d(&config).is_err());
    }

    #[test]
    fn fc_stack_chains_blocks() {
        let stack = fc_stack(100, 32, 3, Norm::Batch).unwrap();
        // Three blocks of linear + batch norm + leaky rectifier.
        assert_eq!(stack.len(), 9);
        let out = stack
            .forward(&ndarray::ArrayD::zeros(ndarray::IxDyn(&[4, 100])))
            .unwrap();
        assert_eq!(out.shape(), &[4, 32]);
    }

    #[test]
    fn fc_stack_dropout_topology() {
        let stack = fc_stack_dropout(256, 10, 3).unwrap();
        assert_eq!(
            kinds(&stack),
            vec![
                LayerKind::Linear,
                LayerKind::ReLU,
                LayerKind::Dropout,
                LayerKind::Linear,
                LayerKind::ReLU,
                LayerKind::Dropout,
                LayerKind::Linear,
            ]
        );
    }

    #[test]
    fn zero_step_is_rejected() {
        let mut config = Encoder3dConfig::new(2);
        config.step = 0;
        assert!(encoder3d(&config).is_err());
    }
}

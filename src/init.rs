//! Weight initialization pass.
//!
//! Applied once after a stack is assembled: every layer's learnable
//! parameters are overwritten according to its [`LayerKind`]. Linear and
//! convolution weights draw from N(0, 0.02) with zero bias; batch
//! normalization resets to scale 1 / shift 0; 2D transposed convolutions
//! receive a closed-form bilinear-upsampling kernel replicated across every
//! channel pair, so an initialized 2D deconvolution starts as a faithful 2x
//! bilinear upsampler. 3D transposed convolutions keep the Gaussian rule.

use ndarray::{Array2, ArrayD};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::layers::LayerKind;
use crate::model::Sequential;

/// Standard deviation of the Gaussian weight rule.
const WEIGHT_STD: f32 = 0.02;

fn gaussian_fill<R: Rng + ?Sized>(tensor: &mut ArrayD<f32>, std: f32, rng: &mut R) {
    for v in tensor.iter_mut() {
        let z: f32 = rng.sample(StandardNormal);
        *v = z * std;
    }
}

/// Xavier-normal fill with a gain factor, reading fan-in/fan-out from a
/// `[out_features, in_features]` weight.
pub(crate) fn xavier_normal<R: Rng + ?Sized>(weight: &mut ArrayD<f32>, gain: f32, rng: &mut R) {
    let fan_out = weight.shape()[0];
    let fan_in: usize = weight.shape()[1..].iter().product();
    let std = gain * (2.0 / (fan_in + fan_out) as f32).sqrt();
    gaussian_fill(weight, std, rng);
}

/// Closed-form bilinear-upsampling kernel of size `k x k`, following Caffe's
/// BilinearUpsamplingFiller.
pub fn bilinear_kernel(kernel_size: usize) -> Array2<f32> {
    let f = (kernel_size + 1) / 2;
    let center = (2 * f - 1 - f % 2) as f32 / (2 * f) as f32;
    let f = f as f32;
    Array2::from_shape_fn((kernel_size, kernel_size), |(y, x)| {
        (1.0 - (x as f32 / f - center).abs()) * (1.0 - (y as f32 / f - center).abs())
    })
}

/// Initialize a stack in place using a thread-local RNG.
pub fn initialize(stack: &mut Sequential) {
    initialize_with(stack, &mut rand::thread_rng());
}

/// Initialize a stack in place with a caller-supplied RNG.
///
/// The read-out convolution at the end of a decoder is an ordinary
/// convolution and receives the same Gaussian rule as interior layers.
pub fn initialize_with<R: Rng + ?Sized>(stack: &mut Sequential, rng: &mut R) {
    for layer in stack.layers_mut() {
        match layer.kind() {
            LayerKind::Linear
            | LayerKind::Conv2d
            | LayerKind::Conv3d
            | LayerKind::ConvTranspose3d => {
                if let Some(weight) = layer.weight_mut() {
                    gaussian_fill(weight, WEIGHT_STD, rng);
                }
                if let Some(bias) = layer.bias_mut() {
                    bias.fill(0.0);
                }
            }
            LayerKind::ConvTranspose2d => {
                if let Some(weight) = layer.weight_mut() {
                    // Weight layout [in_channels, out_channels, k, k]: the same
                    // spatial kernel is broadcast to every channel pair.
                    let kernel = bilinear_kernel(weight.shape()[3]);
                    let (in_channels, out_channels) = (weight.shape()[0], weight.shape()[1]);
                    for i in 0..in_channels {
                        for o in 0..out_channels {
                            for ((y, x), &v) in kernel.indexed_iter() {
                                weight[[i, o, y, x]] = v;
                            }
                        }
                    }
                }
                if let Some(bias) = layer.bias_mut() {
                    bias.fill(0.0);
                }
            }
            LayerKind::BatchNorm => {
                if let Some(gamma) = layer.weight_mut() {
                    gamma.fill(1.0);
                }
                if let Some(beta) = layer.bias_mut() {
                    beta.fill(0.0);
                }
            }
            // Group normalization keeps its construction defaults (scale 1,
            // shift 0); only the batch variant is reset here.
            LayerKind::GroupNorm => {}
            LayerKind::MaxPool3d
            | LayerKind::Upsample2d
            | LayerKind::ReflectionPad2d
            | LayerKind::LeakyReLU
            | LayerKind::ReLU
            | LayerKind::Dropout
            | LayerKind::Flatten
            | LayerKind::Unsqueeze => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{BatchNorm, ConvTranspose2d, Layer, Linear};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn bilinear_kernel_is_flip_symmetric() {
        let k = bilinear_kernel(4);
        assert_eq!(k.dim(), (4, 4));
        for y in 0..4 {
            for x in 0..4 {
                assert!(k[[y, x]] >= 0.0 && k[[y, x]] <= 1.0);
                assert_relative_eq!(k[[y, x]], k[[y, 3 - x]]);
                assert_relative_eq!(k[[y, x]], k[[3 - y, x]]);
            }
        }
    }

    #[test]
    fn bilinear_kernel_known_values() {
        // f = 2, center = 0.75: the 1D profile is [0.25, 0.75, 0.75, 0.25].
        let k = bilinear_kernel(4);
        assert_relative_eq!(k[[0, 0]], 0.0625);
        assert_relative_eq!(k[[1, 1]], 0.5625);
        assert_relative_eq!(k[[1, 2]], 0.5625);
    }

    #[test]
    fn gaussian_rule_has_expected_moments() {
        let mut stack = Sequential::new(vec![Box::new(Linear::new(256, 256))]);
        let mut rng = StdRng::seed_from_u64(7);
        initialize_with(&mut stack, &mut rng);

        let weight = stack.get_layer(0).unwrap().parameters()[0];
        let n = weight.len() as f32;
        let mean: f32 = weight.iter().sum::<f32>() / n;
        let std: f32 =
            (weight.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n).sqrt();
        assert!(mean.abs() < 0.002, "mean {mean} too far from 0");
        assert!((std - 0.02).abs() < 0.002, "std {std} too far from 0.02");

        let bias = stack.get_layer(0).unwrap().parameters()[1];
        assert!(bias.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn transpose2d_gets_the_bilinear_kernel_in_every_channel_pair() {
        let mut stack = Sequential::new(vec![Box::new(ConvTranspose2d::new(3, 2, 4, 2, 1))]);
        let mut rng = StdRng::seed_from_u64(7);
        initialize_with(&mut stack, &mut rng);

        let weight = stack.get_layer(0).unwrap().parameters()[0];
        let kernel = bilinear_kernel(4);
        for i in 0..3 {
            for o in 0..2 {
                for y in 0..4 {
                    for x in 0..4 {
                        assert_relative_eq!(weight[[i, o, y, x]], kernel[[y, x]]);
                    }
                }
            }
        }
    }

    #[test]
    fn batch_norm_resets_to_identity_affine() {
        let mut stack = Sequential::new(vec![Box::new(BatchNorm::new(8))]);
        initialize(&mut stack);
        let params = stack.get_layer(0).unwrap().parameters();
        assert!(params[0].iter().all(|&v| v == 1.0));
        assert!(params[1].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn xavier_gain_scales_the_spread() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut wide = Linear::new(1024, 1024);
        let mut narrow = Linear::new(1024, 1024);
        xavier_normal(wide.weight_mut().unwrap(), 1.0, &mut rng);
        xavier_normal(narrow.weight_mut().unwrap(), 0.01, &mut rng);

        let spread = |layer: &Linear| {
            let w = layer.parameters()[0];
            (w.iter().map(|v| v * v).sum::<f32>() / w.len() as f32).sqrt()
        };
        assert!(spread(&narrow) < 0.1 * spread(&wide));
    }
}

//! Spatial resampling: interpolated upsampling and reflective padding.

use ndarray::{Array4, ArrayD, Ix4};

use super::{Layer, LayerKind};
use crate::error::{NeuralError, Result};

/// Interpolation mode for [`Upsample2d`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsampleMode {
    /// Bilinear interpolation with corner alignment.
    Bilinear,
    /// Nearest-neighbor replication.
    Nearest,
}

/// Integer-factor 2D upsampling over `[batch, channels, height, width]` inputs.
pub struct Upsample2d {
    scale: usize,
    mode: UpsampleMode,
}

impl Upsample2d {
    pub fn new(scale: usize, mode: UpsampleMode) -> Self {
        Self { scale, mode }
    }

    pub fn mode(&self) -> UpsampleMode {
        self.mode
    }
}

impl Layer for Upsample2d {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = input.view().into_dimensionality::<Ix4>().map_err(|_| {
            NeuralError::shape_mismatch(format!(
                "Upsample2d expects 4D input [batch, channels, height, width], got {}D",
                input.ndim()
            ))
        })?;
        let (batch, channels, height, width) = x.dim();
        let out_h = height * self.scale;
        let out_w = width * self.scale;
        let mut out = Array4::<f32>::zeros((batch, channels, out_h, out_w));

        match self.mode {
            UpsampleMode::Nearest => {
                for n in 0..batch {
                    for c in 0..channels {
                        for oh in 0..out_h {
                            for ow in 0..out_w {
                                out[[n, c, oh, ow]] =
                                    x[[n, c, oh / self.scale, ow / self.scale]];
                            }
                        }
                    }
                }
            }
            UpsampleMode::Bilinear => {
                // Corner-aligned source coordinates.
                let scale_h = if out_h > 1 {
                    (height - 1) as f32 / (out_h - 1) as f32
                } else {
                    0.0
                };
                let scale_w = if out_w > 1 {
                    (width - 1) as f32 / (out_w - 1) as f32
                } else {
                    0.0
                };
                for n in 0..batch {
                    for c in 0..channels {
                        for oh in 0..out_h {
                            let sy = oh as f32 * scale_h;
                            let y0 = sy.floor() as usize;
                            let y1 = (y0 + 1).min(height - 1);
                            let fy = sy - y0 as f32;
                            for ow in 0..out_w {
                                let sx = ow as f32 * scale_w;
                                let x0 = sx.floor() as usize;
                                let x1 = (x0 + 1).min(width - 1);
                                let fx = sx - x0 as f32;

                                let top = x[[n, c, y0, x0]] * (1.0 - fx)
                                    + x[[n, c, y0, x1]] * fx;
                                let bottom = x[[n, c, y1, x0]] * (1.0 - fx)
                                    + x[[n, c, y1, x1]] * fx;
                                out[[n, c, oh, ow]] = top * (1.0 - fy) + bottom * fy;
                            }
                        }
                    }
                }
            }
        }

        Ok(out.into_dyn())
    }

    fn kind(&self) -> LayerKind {
        LayerKind::Upsample2d
    }
}

/// Reflective 2D padding (edge pixels are not repeated).
pub struct ReflectionPad2d {
    pad: usize,
}

impl ReflectionPad2d {
    pub fn new(pad: usize) -> Self {
        Self { pad }
    }
}

fn reflect(idx: isize, len: usize) -> usize {
    let last = (len - 1) as isize;
    let mut i = idx;
    if i < 0 {
        i = -i;
    }
    if i > last {
        i = 2 * last - i;
    }
    i as usize
}

impl Layer for ReflectionPad2d {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = input.view().into_dimensionality::<Ix4>().map_err(|_| {
            NeuralError::shape_mismatch(format!(
                "ReflectionPad2d expects 4D input [batch, channels, height, width], got {}D",
                input.ndim()
            ))
        })?;
        let (batch, channels, height, width) = x.dim();
        if self.pad >= height || self.pad >= width {
            return Err(NeuralError::shape_mismatch(format!(
                "reflection padding {} requires spatial extent larger than the pad, got {height}x{width}",
                self.pad
            )));
        }

        let out_h = height + 2 * self.pad;
        let out_w = width + 2 * self.pad;
        let mut out = Array4::<f32>::zeros((batch, channels, out_h, out_w));
        let pad = self.pad as isize;

        for n in 0..batch {
            for c in 0..channels {
                for oh in 0..out_h {
                    let ih = reflect(oh as isize - pad, height);
                    for ow in 0..out_w {
                        let iw = reflect(ow as isize - pad, width);
                        out[[n, c, oh, ow]] = x[[n, c, ih, iw]];
                    }
                }
            }
        }

        Ok(out.into_dyn())
    }

    fn kind(&self) -> LayerKind {
        LayerKind::ReflectionPad2d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn nearest_doubles_by_replication() {
        let up = Upsample2d::new(2, UpsampleMode::Nearest);
        let input = array![[[1.0f32, 2.0], [3.0, 4.0]]]
            .insert_axis(ndarray::Axis(0))
            .into_dyn();
        let out = up.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 1, 4, 4]);
        assert_eq!(out[[0, 0, 0, 1]], 1.0);
        assert_eq!(out[[0, 0, 3, 3]], 4.0);
    }

    #[test]
    fn bilinear_interpolates_between_corners() {
        let up = Upsample2d::new(2, UpsampleMode::Bilinear);
        let input = array![[[0.0f32, 3.0], [6.0, 9.0]]]
            .insert_axis(ndarray::Axis(0))
            .into_dyn();
        let out = up.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 1, 4, 4]);
        // Corners are preserved under corner alignment.
        assert_relative_eq!(out[[0, 0, 0, 0]], 0.0);
        assert_relative_eq!(out[[0, 0, 0, 3]], 3.0);
        assert_relative_eq!(out[[0, 0, 3, 0]], 6.0);
        assert_relative_eq!(out[[0, 0, 3, 3]], 9.0);
        // Interior points interpolate linearly.
        assert_relative_eq!(out[[0, 0, 0, 1]], 1.0);
        assert_relative_eq!(out[[0, 0, 1, 0]], 2.0);
    }

    #[test]
    fn reflection_pad_mirrors_without_edge_repeat() {
        let pad = ReflectionPad2d::new(1);
        let input = array![[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]]
            .insert_axis(ndarray::Axis(0))
            .into_dyn();
        let out = pad.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 1, 5, 5]);
        // Corner reflects through both axes: row 1, col 1 of the source.
        assert_eq!(out[[0, 0, 0, 0]], 5.0);
        assert_eq!(out[[0, 0, 0, 1]], 4.0);
        assert_eq!(out[[0, 0, 1, 0]], 2.0);
        assert_eq!(out[[0, 0, 2, 2]], 5.0);
    }
}

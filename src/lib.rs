//! Network topology construction for volumetric shape reconstruction.
//!
//! The crate builds encoder and decoder stacks out of small reusable pieces:
//!
//! - [`layers`]: primitive layers over channels-first `ArrayD<f32>` tensors,
//!   behind the [`layers::Layer`] trait.
//! - [`model`]: the [`model::Sequential`] container the builders produce.
//! - [`schedule`]: growing and shrinking channel-width schedules.
//! - [`blocks`]: block factories (transform + normalization + nonlinearity).
//! - [`builders`]: full stack assemblers, 3D encoder/decoder and 2D decoder
//!   among them.
//! - [`init`]: the per-kind weight-initialization pass the builders apply.
//!
//! ```
//! use recon_neural::builders::{decoder3d, encoder3d, Decoder3dConfig, Encoder3dConfig};
//!
//! let (encoder, width) = encoder3d(&Encoder3dConfig::new(3))?;
//! let decoder = decoder3d(&Decoder3dConfig::new(3, 20, width))?;
//! assert!(encoder.len() > 0 && decoder.len() > 0);
//! # Ok::<(), recon_neural::NeuralError>(())
//! ```

pub mod blocks;
pub mod builders;
pub mod error;
pub mod init;
pub mod layers;
pub mod model;
pub mod schedule;

pub use error::{NeuralError, Result};
pub use layers::{Layer, LayerKind};
pub use model::Sequential;

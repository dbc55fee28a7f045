//! Dropout regularization.

use ndarray::ArrayD;
use rand::Rng;

use super::{Layer, LayerKind};
use crate::error::{NeuralError, Result};

/// Inverted dropout: during training each element is zeroed with probability
/// `rate` and survivors are scaled by `1 / (1 - rate)`; evaluation is the
/// identity.
pub struct Dropout {
    rate: f32,
    training: bool,
}

impl Dropout {
    pub fn new(rate: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(NeuralError::invalid_configuration(format!(
                "dropout rate must lie in [0, 1], got {rate}"
            )));
        }
        Ok(Self {
            rate,
            training: true,
        })
    }
}

impl Layer for Dropout {
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        if !self.training || self.rate == 0.0 {
            return Ok(input.clone());
        }
        if self.rate == 1.0 {
            return Ok(ArrayD::zeros(input.raw_dim()));
        }

        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let mut rng = rand::thread_rng();
        Ok(input.mapv(|v| {
            if rng.gen::<f32>() < self.rate {
                0.0
            } else {
                v * scale
            }
        }))
    }

    fn kind(&self) -> LayerKind {
        LayerKind::Dropout
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

//! Sequential model container.

use ndarray::ArrayD;

use crate::error::Result;
use crate::layers::Layer;

/// An ordered stack of layers applied in sequence.
///
/// Builders splice block factories flat into one `Sequential`, so iterating
/// [`Sequential::layers`] visits every leaf layer of the network. Once a
/// builder returns a stack it is owned exclusively by the caller and never
/// mutated by this crate again.
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
    training: bool,
}

impl Sequential {
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Self {
        Self {
            layers,
            training: true,
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Append a layer to the end of the stack.
    pub fn add(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    pub fn get_layer(&self, index: usize) -> Option<&dyn Layer> {
        self.layers.get(index).map(|layer| layer.as_ref())
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Box<dyn Layer>] {
        &mut self.layers
    }

    /// Apply every layer in order.
    pub fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let mut output = input.clone();
        for layer in &self.layers {
            output = layer.forward(&output)?;
        }
        Ok(output)
    }

    /// All learnable parameters across the stack, in layer order.
    pub fn parameters(&self) -> Vec<&ArrayD<f32>> {
        self.layers
            .iter()
            .flat_map(|layer| layer.parameters())
            .collect()
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
        for layer in &mut self.layers {
            layer.set_training(training);
        }
    }

    /// Switch dropout and batch statistics to training behavior.
    pub fn train(&mut self) {
        self.set_training(true);
    }

    /// Switch dropout and batch statistics to inference behavior.
    pub fn eval(&mut self) {
        self.set_training(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{LeakyReLU, Linear};
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn forward_folds_through_layers() {
        let model = Sequential::new(vec![
            Box::new(Linear::new(4, 8)),
            Box::new(LeakyReLU::new(0.2)),
            Box::new(Linear::new(8, 2)),
        ]);
        let out = model.forward(&ArrayD::zeros(IxDyn(&[3, 4]))).unwrap();
        assert_eq!(out.shape(), &[3, 2]);
    }

    #[test]
    fn parameters_are_collected_in_layer_order() {
        let model = Sequential::new(vec![
            Box::new(Linear::new(4, 8)),
            Box::new(LeakyReLU::new(0.2)),
            Box::new(Linear::new(8, 2)),
        ]);
        // Two linears, each with weight and bias.
        assert_eq!(model.parameters().len(), 4);
        assert_eq!(model.len(), 3);
    }
}

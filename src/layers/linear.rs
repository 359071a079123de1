use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_distr::Uniform;
use ndarray_rand::RandomExt;

use crate::optimizers::Optimizer;

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array1<f64>,
}

/// A fully connected (linear/dense) layer
///
/// Performs the transformation: output = input * weight^T + bias
/// where input has shape (batch_size, input_size), weight has shape
/// (output_size, input_size) and bias has shape (output_size)
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub weight: Array2<f64>, // (output_size, input_size)
    pub bias: Array1<f64>,   // (output_size)
    pub input_size: usize,
    pub output_size: usize,
}

impl LinearLayer {
    /// Create a new linear layer with weights and bias drawn from
    /// U(-1/sqrt(input_size), 1/sqrt(input_size))
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (input_size as f64).sqrt();
        let dist = Uniform::new(-bound, bound);

        let weight = Array2::random_using((output_size, input_size), dist, rng);
        let bias = Array1::random_using(output_size, dist, rng);

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    pub fn from_weights(weight: Array2<f64>, bias: Array1<f64>) -> Self {
        let (output_size, input_size) = weight.dim();
        assert_eq!(bias.len(), output_size, "Bias length must be output_size");

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    /// Forward pass through the linear layer
    ///
    /// # Arguments
    /// * `input` - Input tensor of shape (batch_size, input_size)
    ///
    /// # Returns
    /// * Output tensor of shape (batch_size, output_size)
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        let (_batch_size, input_features) = input.dim();
        assert_eq!(input_features, self.input_size,
                  "Input size {} doesn't match layer input size {}",
                  input_features, self.input_size);

        // bias broadcasts over the batch axis
        input.dot(&self.weight.t()) + &self.bias
    }

    /// Backward pass through the linear layer
    ///
    /// # Arguments
    /// * `input` - The input given to `forward`, shape (batch_size, input_size)
    /// * `grad_output` - Gradient w.r.t. output of shape (batch_size, output_size)
    ///
    /// # Returns
    /// * Tuple of (gradients, gradient w.r.t. input of shape (batch_size, input_size))
    pub fn backward(&self, input: &Array2<f64>, grad_output: &Array2<f64>) -> (LinearGradients, Array2<f64>) {
        let (batch_size, output_features) = grad_output.dim();
        let (input_batch_size, input_features) = input.dim();

        assert_eq!(output_features, self.output_size, "Gradient output size mismatch");
        assert_eq!(input_features, self.input_size, "Input size mismatch");
        assert_eq!(batch_size, input_batch_size, "Batch size mismatch");

        // dW = grad_output^T @ input
        let weight_grad = grad_output.t().dot(input);
        let bias_grad = grad_output.sum_axis(Axis(0));
        // dX = grad_output @ W
        let input_grad = grad_output.dot(&self.weight);

        let gradients = LinearGradients {
            weight: weight_grad,
            bias: bias_grad,
        };

        (gradients, input_grad)
    }

    /// Update parameters using the provided optimizer
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &LinearGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_weight", prefix), self.weight.view_mut().into_dyn(), gradients.weight.view().into_dyn());
        optimizer.update(&format!("{}_bias", prefix), self.bias.view_mut().into_dyn(), gradients.bias.view().into_dyn());
    }

    /// Get the number of parameters in this layer
    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use crate::optimizers::Adam;

    #[test]
    fn test_linear_layer_creation() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = LinearLayer::new(10, 5, &mut rng);
        assert_eq!(layer.input_size, 10);
        assert_eq!(layer.output_size, 5);
        assert_eq!(layer.weight.shape(), &[5, 10]);
        assert_eq!(layer.bias.shape(), &[5]);

        assert_eq!(layer.num_parameters(), 10 * 5 + 5);

        let bound = 1.0 / 10f64.sqrt();
        assert!(layer.weight.iter().all(|w| w.abs() <= bound));
    }

    fn zeros(input_size: usize, output_size: usize) -> LinearLayer {
        LinearLayer::from_weights(Array2::zeros((output_size, input_size)), Array1::zeros(output_size))
    }

    #[test]
    fn test_linear_layer_forward() {
        let layer = LinearLayer::from_weights(arr2(&[[1.0, 0.0, 2.0], [0.0, 1.0, 0.0]]), arr1(&[0.5, -0.5]));
        let input = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]); // (batch 2, features 3)

        let output = layer.forward(&input);
        assert_eq!(output, arr2(&[[7.5, 1.5], [16.5, 4.5]]));
    }

    #[test]
    fn test_linear_layer_backward() {
        let layer = zeros(3, 2);
        let input = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let grad_output = arr2(&[[1.0, 1.0], [1.0, 1.0]]);

        let (gradients, input_grad) = layer.backward(&input, &grad_output);

        assert_eq!(gradients.weight, arr2(&[[5.0, 7.0, 9.0], [5.0, 7.0, 9.0]]));
        assert_eq!(gradients.bias, arr1(&[2.0, 2.0]));
        assert_eq!(input_grad.shape(), &[2, 3]);
    }

    #[test]
    fn test_linear_layer_with_optimizer() {
        let mut layer = zeros(2, 1);
        let mut optimizer = Adam::new(0.1);

        let input = arr2(&[[1.0, 2.0]]);
        let target = arr2(&[[3.0]]);

        let output = layer.forward(&input);
        let grad_output = &output - &target;
        let (gradients, _) = layer.backward(&input, &grad_output);
        layer.update_parameters(&gradients, &mut optimizer, "linear");

        assert!(layer.weight.iter().any(|&x| x != 0.0) || layer.bias.iter().any(|&x| x != 0.0));
    }
}

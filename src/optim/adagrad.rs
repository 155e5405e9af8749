//! Adagrad optimizer

use super::Optimizer;
use ndarray::Array2;

/// Adagrad: accumulated squared gradients shrink the effective step size
/// for frequently updated parameters
pub struct Adagrad {
    lr: f32,
    epsilon: f32,
    accum: Vec<Array2<f32>>,
}

impl Adagrad {
    pub fn new(lr: f32, epsilon: f32) -> Self {
        Self {
            lr,
            epsilon,
            accum: Vec::new(),
        }
    }

    /// Create Adagrad with default parameters
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 1e-10)
    }

    fn ensure_state(&mut self, params: &[Array2<f32>]) {
        if self.accum.is_empty() {
            self.accum = params.iter().map(|p| Array2::zeros(p.raw_dim())).collect();
        }
    }
}

impl Optimizer for Adagrad {
    fn step(&mut self, params: &mut [Array2<f32>], grads: &[Array2<f32>]) {
        self.ensure_state(params);

        for (i, (param, grad)) in params.iter_mut().zip(grads).enumerate() {
            // G += g²
            self.accum[i] = &self.accum[i] + &(grad * grad);

            // θ -= lr * g / (√G + ε)
            let update = grad / &(self.accum[i].mapv(f32::sqrt) + self.epsilon) * self.lr;
            *param -= &update;
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adagrad_quadratic_convergence() {
        let mut params = vec![Array2::from_shape_vec((1, 2), vec![3.0, -2.0]).unwrap()];
        let mut optimizer = Adagrad::default_params(0.5);

        for _ in 0..300 {
            let grads = vec![params[0].mapv(|x| 2.0 * x)];
            optimizer.step(&mut params, &grads);
        }

        assert!(params[0].iter().all(|v| v.abs() < 0.3));
    }
}

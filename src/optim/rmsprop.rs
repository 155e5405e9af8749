//! RMSProp optimizer

use super::Optimizer;
use ndarray::Array2;

/// RMSProp: per-parameter learning rates from a decaying squared-gradient
/// average
pub struct RmsProp {
    lr: f32,
    decay: f32,
    epsilon: f32,
    sq_avg: Vec<Array2<f32>>,
}

impl RmsProp {
    pub fn new(lr: f32, decay: f32, epsilon: f32) -> Self {
        Self {
            lr,
            decay,
            epsilon,
            sq_avg: Vec::new(),
        }
    }

    /// Create RMSProp with default parameters
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.99, 1e-8)
    }

    fn ensure_state(&mut self, params: &[Array2<f32>]) {
        if self.sq_avg.is_empty() {
            self.sq_avg = params.iter().map(|p| Array2::zeros(p.raw_dim())).collect();
        }
    }
}

impl Optimizer for RmsProp {
    fn step(&mut self, params: &mut [Array2<f32>], grads: &[Array2<f32>]) {
        self.ensure_state(params);

        for (i, (param, grad)) in params.iter_mut().zip(grads).enumerate() {
            // s = decay * s + (1 - decay) * g²
            self.sq_avg[i] = &self.sq_avg[i] * self.decay + &(grad * grad) * (1.0 - self.decay);

            // θ -= lr * g / (√s + ε)
            let update = grad / &(self.sq_avg[i].mapv(f32::sqrt) + self.epsilon) * self.lr;
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
    fn test_rmsprop_quadratic_convergence() {
        let mut params = vec![Array2::from_shape_vec((1, 2), vec![3.0, -2.0]).unwrap()];
        let mut optimizer = RmsProp::default_params(0.05);

        for _ in 0..300 {
            let grads = vec![params[0].mapv(|x| 2.0 * x)];
            optimizer.step(&mut params, &grads);
        }

        assert!(params[0].iter().all(|v| v.abs() < 0.3));
    }
}

//! Stochastic Gradient Descent optimizer

use super::Optimizer;
use ndarray::Array2;

/// SGD optimizer with optional momentum
pub struct Sgd {
    lr: f32,
    momentum: f32,
    velocities: Vec<Array2<f32>>,
}

impl Sgd {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            velocities: Vec::new(),
        }
    }

    /// Initialize velocities if needed
    fn ensure_velocities(&mut self, params: &[Array2<f32>]) {
        if self.velocities.is_empty() {
            self.velocities = params.iter().map(|p| Array2::zeros(p.raw_dim())).collect();
        }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [Array2<f32>], grads: &[Array2<f32>]) {
        self.ensure_velocities(params);

        for (i, (param, grad)) in params.iter_mut().zip(grads).enumerate() {
            if self.momentum > 0.0 {
                // v = momentum * v - lr * grad
                self.velocities[i] = &self.velocities[i] * self.momentum - grad * self.lr;
                *param += &self.velocities[i];
            } else {
                // Simple SGD: param -= lr * grad
                *param -= &(grad * self.lr);
            }
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
    fn test_sgd_descends_quadratic() {
        let mut params = vec![Array2::from_elem((1, 2), 4.0)];
        let mut optimizer = Sgd::new(0.1, 0.0);

        for _ in 0..200 {
            let grads = vec![params[0].mapv(|x| 2.0 * x)];
            optimizer.step(&mut params, &grads);
        }

        assert!(params[0].iter().all(|v| v.abs() < 0.01));
    }

    #[test]
    fn test_sgd_momentum_descends() {
        let mut params = vec![Array2::from_elem((1, 2), 4.0)];
        let mut optimizer = Sgd::new(0.05, 0.9);

        for _ in 0..200 {
            let grads = vec![params[0].mapv(|x| 2.0 * x)];
            optimizer.step(&mut params, &grads);
        }

        assert!(params[0].iter().all(|v| v.abs() < 0.1));
    }
}

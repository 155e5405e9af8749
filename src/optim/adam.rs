//! Adam optimizer

use super::Optimizer;
use ndarray::Array2;

/// Adam optimizer (Adaptive Moment Estimation)
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<Array2<f32>>, // First moment
    v: Vec<Array2<f32>>, // Second moment
}

impl Adam {
    /// Create a new Adam optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Create Adam with default parameters
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    /// Initialize moments if needed
    fn ensure_moments(&mut self, params: &[Array2<f32>]) {
        if self.m.is_empty() {
            self.m = params.iter().map(|p| Array2::zeros(p.raw_dim())).collect();
            self.v = params.iter().map(|p| Array2::zeros(p.raw_dim())).collect();
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [Array2<f32>], grads: &[Array2<f32>]) {
        self.ensure_moments(params);
        self.t += 1;

        // Bias correction factors
        let lr_t = self.lr
            * ((1.0 - self.beta2.powi(self.t as i32)).sqrt()
                / (1.0 - self.beta1.powi(self.t as i32)));

        for (i, (param, grad)) in params.iter_mut().zip(grads).enumerate() {
            // m_t = β1 * m_{t-1} + (1 - β1) * g
            self.m[i] = &self.m[i] * self.beta1 + grad * (1.0 - self.beta1);

            // v_t = β2 * v_{t-1} + (1 - β2) * g²
            self.v[i] = &self.v[i] * self.beta2 + &(grad * grad) * (1.0 - self.beta2);

            // θ_t = θ_{t-1} - lr_t * m_t / (√v_t + ε)
            let update = &self.m[i] / &(self.v[i].mapv(f32::sqrt) + self.epsilon) * lr_t;
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
    fn test_adam_quadratic_convergence() {
        // Test convergence on f(x) = x²
        let mut params = vec![Array2::from_shape_vec((1, 3), vec![5.0, -3.0, 2.0]).unwrap()];
        let mut optimizer = Adam::default_params(0.1);

        for _ in 0..100 {
            // ∇(x²) = 2x
            let grads = vec![params[0].mapv(|x| 2.0 * x)];
            optimizer.step(&mut params, &grads);
        }

        for &val in params[0].iter() {
            assert!(val.abs() < 0.5, "Value {} did not converge", val);
        }
    }

    #[test]
    fn test_adam_set_lr() {
        let mut optimizer = Adam::default_params(0.1);
        optimizer.set_lr(0.01);
        assert_eq!(optimizer.lr(), 0.01);
    }
}

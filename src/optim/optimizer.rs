//! Optimizer trait

use ndarray::Array2;

/// Trait for optimization algorithms
///
/// `params` and `grads` are parallel slices; implementations lazily size
/// their per-parameter state on the first step.
pub trait Optimizer: Send {
    /// Apply one update step
    fn step(&mut self, params: &mut [Array2<f32>], grads: &[Array2<f32>]);

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}

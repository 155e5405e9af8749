//! Loss functions for training
//!
//! Both losses return the scalar batch loss together with the gradient
//! with respect to the network output, already averaged over the batch.

use ndarray::{Array2, Axis};
use serde::Serialize;

/// Loss paired with a compiled model by task kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    CrossEntropyLogits,
    MeanSquaredError,
}

/// Row-wise softmax with max subtraction for numeric stability
pub fn softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

/// Cross-entropy over logits
///
/// L = mean_i( logsumexp(z_i) - z_i[y_i] ); gradient is
/// (softmax(z) - onehot(y)) / batch. Softmax is applied exactly once, here.
pub fn cross_entropy_logits(logits: &Array2<f32>, targets: &[usize]) -> (f32, Array2<f32>) {
    assert_eq!(
        logits.nrows(),
        targets.len(),
        "logits and targets must have the same batch size"
    );
    let batch = logits.nrows() as f32;

    let mut total = 0.0;
    for (row, &target) in logits.rows().into_iter().zip(targets) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let lse = max + row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln();
        total += lse - row[target];
    }

    let mut grad = softmax(logits);
    for (mut row, &target) in grad.rows_mut().into_iter().zip(targets) {
        row[target] -= 1.0;
    }
    grad.mapv_inplace(|v| v / batch);

    (total / batch, grad)
}

/// Mean squared error over a single-column prediction
///
/// L = mean((pred - target)²); gradient is 2 * (pred - target) / batch.
pub fn mean_squared_error(preds: &Array2<f32>, targets: &[f32]) -> (f32, Array2<f32>) {
    assert_eq!(
        preds.nrows(),
        targets.len(),
        "predictions and targets must have the same batch size"
    );
    let batch = preds.nrows() as f32;

    let mut total = 0.0;
    let mut grad = Array2::zeros(preds.raw_dim());
    for (i, &target) in targets.iter().enumerate() {
        let diff = preds[[i, 0]] - target;
        total += diff * diff;
        grad[[i, 0]] = 2.0 * diff / batch;
    }
    (total / batch, grad)
}

/// Top-1 accuracy of logits against class targets
pub fn accuracy(logits: &Array2<f32>, targets: &[usize]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let correct = logits
        .axis_iter(Axis(0))
        .zip(targets)
        .filter(|(row, &target)| argmax(row.iter().copied()) == target)
        .count();
    correct as f64 / targets.len() as f64
}

pub(crate) fn argmax(values: impl Iterator<Item = f32>) -> usize {
    let mut best = f32::NEG_INFINITY;
    let mut best_idx = 0;
    for (i, v) in values.enumerate() {
        if v > best {
            best = v;
            best_idx = i;
        }
    }
    best_idx
}

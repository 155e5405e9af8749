//! Builtin dataset providers
//!
//! Five curated datasets cover both task kinds and both input shapes:
//! `iris` (embedded table), `xor` and `spiral` (synthetic 2-D
//! classification), `ridge` (synthetic regression), and `blocks`
//! (synthetic 8×8 single-channel images for spatial layers). Synthetic
//! generators draw from a fixed seed so every load sees the same data.

use super::iris_data::IRIS_ROWS;
use super::{
    split_and_scale, DatasetProvider, DatasetSpec, Hyperparameters, Split, TaskKind, Targets,
};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

const GEN_SEED: u64 = 42;

/// The classic 150-sample, 3-class flower table
pub struct IrisDataset {
    spec: DatasetSpec,
}

impl IrisDataset {
    pub fn new() -> Self {
        Self {
            spec: DatasetSpec {
                id: "iris".to_string(),
                name: "Iris".to_string(),
                description: "3-class classification on flower measurements (4 features)."
                    .to_string(),
                task: TaskKind::Classification,
                input_shape: vec![4],
                output_arity: 3,
                num_samples: IRIS_ROWS.len(),
                recommended: Hyperparameters::new(50, 0.01, 16),
            },
        }
    }
}

impl Default for IrisDataset {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetProvider for IrisDataset {
    fn spec(&self) -> &DatasetSpec {
        &self.spec
    }

    fn load(&self, max_samples: Option<usize>) -> Split {
        let mut x = Array2::zeros((IRIS_ROWS.len(), 4));
        let mut classes = Vec::with_capacity(IRIS_ROWS.len());
        for (i, row) in IRIS_ROWS.iter().enumerate() {
            for j in 0..4 {
                x[[i, j]] = row[j];
            }
            classes.push(row[4] as usize);
        }
        split_and_scale(x, Targets::Classes(classes), max_samples)
    }
}

/// Noisy XOR quadrants: 2 features, 2 classes
pub struct XorDataset {
    spec: DatasetSpec,
}

impl XorDataset {
    pub fn new() -> Self {
        Self {
            spec: DatasetSpec {
                id: "xor".to_string(),
                name: "XOR".to_string(),
                description: "Synthetic XOR quadrants: non-linearly separable 2-D points."
                    .to_string(),
                task: TaskKind::Classification,
                input_shape: vec![2],
                output_arity: 2,
                num_samples: 1000,
                recommended: Hyperparameters::new(100, 0.01, 64),
            },
        }
    }
}

impl Default for XorDataset {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetProvider for XorDataset {
    fn spec(&self) -> &DatasetSpec {
        &self.spec
    }

    fn load(&self, max_samples: Option<usize>) -> Split {
        let n = self.spec.num_samples;
        let mut rng = StdRng::seed_from_u64(GEN_SEED);
        let mut x = Array2::zeros((n, 2));
        let mut classes = Vec::with_capacity(n);
        for i in 0..n {
            let a: f32 = rng.gen_range(-1.0..1.0);
            let b: f32 = rng.gen_range(-1.0..1.0);
            x[[i, 0]] = a;
            x[[i, 1]] = b;
            classes.push(usize::from((a > 0.0) != (b > 0.0)));
        }
        split_and_scale(x, Targets::Classes(classes), max_samples)
    }
}

/// Two interleaved spiral arms: 2 features, 2 classes
pub struct SpiralDataset {
    spec: DatasetSpec,
}

impl SpiralDataset {
    pub fn new() -> Self {
        Self {
            spec: DatasetSpec {
                id: "spiral".to_string(),
                name: "Spiral".to_string(),
                description: "Two interleaved spiral arms with Gaussian jitter.".to_string(),
                task: TaskKind::Classification,
                input_shape: vec![2],
                output_arity: 2,
                num_samples: 1000,
                recommended: Hyperparameters::new(150, 0.01, 64),
            },
        }
    }
}

impl Default for SpiralDataset {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetProvider for SpiralDataset {
    fn spec(&self) -> &DatasetSpec {
        &self.spec
    }

    fn load(&self, max_samples: Option<usize>) -> Split {
        let n = self.spec.num_samples;
        let per_arm = n / 2;
        let mut rng = StdRng::seed_from_u64(GEN_SEED);
        let mut x = Array2::zeros((per_arm * 2, 2));
        let mut classes = Vec::with_capacity(per_arm * 2);
        for arm in 0..2 {
            let phase = arm as f32 * PI;
            for i in 0..per_arm {
                let r = i as f32 / per_arm as f32;
                let theta = 4.0 * PI * r + phase;
                let row = arm * per_arm + i;
                x[[row, 0]] = r * theta.cos() + 0.05 * gaussian(&mut rng);
                x[[row, 1]] = r * theta.sin() + 0.05 * gaussian(&mut rng);
                classes.push(arm);
            }
        }
        split_and_scale(x, Targets::Classes(classes), max_samples)
    }
}

/// Synthetic regression: 8 features, linear + sinusoidal signal with noise
pub struct RidgeDataset {
    spec: DatasetSpec,
}

impl RidgeDataset {
    pub fn new() -> Self {
        Self {
            spec: DatasetSpec {
                id: "ridge".to_string(),
                name: "Ridge".to_string(),
                description: "Synthetic regression over 8 features with mild non-linearity."
                    .to_string(),
                task: TaskKind::Regression,
                input_shape: vec![8],
                output_arity: 1,
                num_samples: 2000,
                recommended: Hyperparameters::new(80, 0.005, 32),
            },
        }
    }
}

impl Default for RidgeDataset {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetProvider for RidgeDataset {
    fn spec(&self) -> &DatasetSpec {
        &self.spec
    }

    fn load(&self, max_samples: Option<usize>) -> Split {
        const WEIGHTS: [f32; 8] = [1.5, -2.0, 0.7, 0.0, 3.1, -0.4, 1.2, 0.9];
        let n = self.spec.num_samples;
        let mut rng = StdRng::seed_from_u64(GEN_SEED);
        let mut x = Array2::zeros((n, 8));
        let mut values = Vec::with_capacity(n);
        for i in 0..n {
            let mut y = 0.0;
            for j in 0..8 {
                let v: f32 = rng.gen_range(-1.0..1.0);
                x[[i, j]] = v;
                y += WEIGHTS[j] * v;
            }
            y += (2.0 * x[[i, 0]]).sin() + 0.1 * gaussian(&mut rng);
            values.push(y);
        }
        split_and_scale(x, Targets::Values(values), max_samples)
    }
}

/// Synthetic 8×8 single-channel images in four pattern classes
///
/// Classes: 0 horizontal stripes, 1 vertical stripes, 2 diagonal,
/// 3 checkerboard. Pixel noise keeps the task non-trivial.
pub struct BlocksDataset {
    spec: DatasetSpec,
}

const BLOCK_SIDE: usize = 8;

impl BlocksDataset {
    pub fn new() -> Self {
        Self {
            spec: DatasetSpec {
                id: "blocks".to_string(),
                name: "Blocks".to_string(),
                description: "Synthetic 8x8 grayscale patterns in 4 classes; supports conv2d/maxpool2d layers."
                    .to_string(),
                task: TaskKind::Classification,
                input_shape: vec![BLOCK_SIDE, BLOCK_SIDE],
                output_arity: 4,
                num_samples: 800,
                recommended: Hyperparameters::new(30, 0.005, 32),
            },
        }
    }

    fn pattern_pixel(class: usize, r: usize, c: usize) -> f32 {
        let on = match class {
            0 => r % 2 == 0,
            1 => c % 2 == 0,
            2 => (r + c) % 4 < 2,
            _ => (r / 2 + c / 2) % 2 == 0,
        };
        if on {
            1.0
        } else {
            0.0
        }
    }
}

impl Default for BlocksDataset {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetProvider for BlocksDataset {
    fn spec(&self) -> &DatasetSpec {
        &self.spec
    }

    fn load(&self, max_samples: Option<usize>) -> Split {
        let n = self.spec.num_samples;
        let pixels = BLOCK_SIDE * BLOCK_SIDE;
        let mut rng = StdRng::seed_from_u64(GEN_SEED);
        let mut x = Array2::zeros((n, pixels));
        let mut classes = Vec::with_capacity(n);
        for i in 0..n {
            let class = i % 4;
            for r in 0..BLOCK_SIDE {
                for c in 0..BLOCK_SIDE {
                    let noise = 0.15 * gaussian(&mut rng);
                    x[[i, r * BLOCK_SIDE + c]] = Self::pattern_pixel(class, r, c) + noise;
                }
            }
            classes.push(class);
        }
        split_and_scale(x, Targets::Classes(classes), max_samples)
    }
}

/// Standard normal sample via Box-Muller
fn gaussian(rng: &mut StdRng) -> f32 {
    let u1: f32 = rng.gen_range(1e-6..1.0);
    let u2: f32 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iris_shapes() {
        let ds = IrisDataset::new();
        let split = ds.load(None);
        assert_eq!(split.x_train.nrows() + split.x_test.nrows(), 150);
        assert_eq!(split.x_train.ncols(), 4);
    }

    #[test]
    fn test_iris_classes_in_range() {
        let split = IrisDataset::new().load(None);
        match split.y_train {
            Targets::Classes(classes) => assert!(classes.iter().all(|&c| c < 3)),
            _ => panic!("iris targets must be classes"),
        }
    }

    #[test]
    fn test_xor_loads_deterministically() {
        let ds = XorDataset::new();
        let a = ds.load(Some(64));
        let b = ds.load(Some(64));
        assert_eq!(a.x_train, b.x_train);
        assert_eq!(a.x_train.nrows(), 64);
    }

    #[test]
    fn test_spiral_balanced_arms() {
        let split = SpiralDataset::new().load(None);
        if let Targets::Classes(classes) = &split.y_train {
            let ones = classes.iter().filter(|&&c| c == 1).count();
            let ratio = ones as f64 / classes.len() as f64;
            assert!(ratio > 0.4 && ratio < 0.6);
        }
    }

    #[test]
    fn test_ridge_is_regression() {
        let split = RidgeDataset::new().load(Some(100));
        assert!(matches!(split.y_train, Targets::Values(_)));
        assert!(split.x_train.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_blocks_image_shape() {
        let ds = BlocksDataset::new();
        assert!(ds.spec().is_image());
        assert_eq!(ds.spec().num_features(), 64);
        let split = ds.load(Some(32));
        assert_eq!(split.x_train.ncols(), 64);
    }
}

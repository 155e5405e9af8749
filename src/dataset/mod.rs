//! Dataset registry and providers
//!
//! Each provider yields preprocessed train/test arrays plus a `DatasetSpec`
//! describing the input shape, output arity, task kind, and recommended
//! hyperparameters. Providers are self-contained: data is embedded or
//! generated from a fixed seed, and preprocessing (standardization) is
//! fitted on the training slice only so it can be reused at prediction time.

mod builtin;
mod iris_data;

pub use builtin::{BlocksDataset, IrisDataset, RidgeDataset, SpiralDataset, XorDataset};

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Fixed seed for deterministic shuffles and synthetic generation
const SPLIT_SEED: u64 = 42;

/// Fraction of samples held out for the test slice
const TEST_FRACTION: f64 = 0.2;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset '{0}' not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, DatasetError>;

/// Kind of learning task a dataset poses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Classification,
    Regression,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Classification => write!(f, "classification"),
            TaskKind::Regression => write!(f, "regression"),
        }
    }
}

/// Recommended training hyperparameters, tuned per dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub epochs: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub optimizer: String,
}

impl Hyperparameters {
    pub fn new(epochs: usize, learning_rate: f32, batch_size: usize) -> Self {
        Self {
            epochs,
            learning_rate,
            batch_size,
            optimizer: "adam".to_string(),
        }
    }
}

/// Immutable dataset descriptor
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub task: TaskKind,
    /// `[features]` for tabular data, `[height, width]` for images
    pub input_shape: Vec<usize>,
    /// Number of classes for classification, 1 for regression
    pub output_arity: usize,
    pub num_samples: usize,
    pub recommended: Hyperparameters,
}

impl DatasetSpec {
    /// Flat input width (product of the shape dimensions)
    pub fn num_features(&self) -> usize {
        self.input_shape.iter().product()
    }

    /// Whether the inputs are spatial (conv/pool layers are permitted)
    pub fn is_image(&self) -> bool {
        self.input_shape.len() >= 2
    }
}

/// Training targets: class indices or scalar values
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    Classes(Vec<usize>),
    Values(Vec<f32>),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Classes(v) => v.len(),
            Targets::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, indices: &[usize]) -> Targets {
        match self {
            Targets::Classes(v) => Targets::Classes(indices.iter().map(|&i| v[i]).collect()),
            Targets::Values(v) => Targets::Values(indices.iter().map(|&i| v[i]).collect()),
        }
    }
}

/// Per-feature standardizer fitted on the training slice
#[derive(Debug, Clone)]
pub struct Scaler {
    mean: Array1<f32>,
    std: Array1<f32>,
}

impl Scaler {
    pub fn fit(x: &Array2<f32>) -> Self {
        let mean = x.mean_axis(Axis(0)).expect("non-empty training slice");
        let std = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-8 { s } else { 1.0 });
        Self { mean, std }
    }

    pub fn transform(&self, x: &mut Array2<f32>) {
        for mut row in x.rows_mut() {
            row -= &self.mean;
            row /= &self.std;
        }
    }
}

/// Preprocessed train/test split plus the scaler that produced it
#[derive(Debug, Clone)]
pub struct Split {
    pub x_train: Array2<f32>,
    pub y_train: Targets,
    pub x_test: Array2<f32>,
    pub y_test: Targets,
    pub scaler: Scaler,
}

/// A source of one dataset
pub trait DatasetProvider: Send + Sync {
    fn spec(&self) -> &DatasetSpec;

    /// Load, split, and standardize. `max_samples` caps the training slice
    /// only; the test slice keeps the native fraction of the full data.
    fn load(&self, max_samples: Option<usize>) -> Split;
}

/// Shuffle, split, cap the training slice, and standardize both slices
/// with statistics from the (capped) training slice.
pub(crate) fn split_and_scale(
    x: Array2<f32>,
    y: Targets,
    max_samples: Option<usize>,
) -> Split {
    let n = x.nrows();
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(SPLIT_SEED);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64) * TEST_FRACTION).round().max(1.0) as usize;
    let (test_idx, train_idx) = indices.split_at(n_test.min(n.saturating_sub(1)));

    let mut train_idx = train_idx.to_vec();
    if let Some(cap) = max_samples {
        train_idx.truncate(cap.max(1));
    }

    let take = |idx: &[usize]| -> Array2<f32> {
        let mut out = Array2::zeros((idx.len(), x.ncols()));
        for (row, &i) in idx.iter().enumerate() {
            out.row_mut(row).assign(&x.row(i));
        }
        out
    };

    let mut x_train = take(&train_idx);
    let mut x_test = take(test_idx);
    let y_train = y.select(&train_idx);
    let y_test = y.select(test_idx);

    let scaler = Scaler::fit(&x_train);
    scaler.transform(&mut x_train);
    scaler.transform(&mut x_test);

    Split {
        x_train,
        y_train,
        x_test,
        y_test,
        scaler,
    }
}

/// Name → provider table
///
/// Registered specs are immutable; lookups hand out shared provider handles.
pub struct DatasetRegistry {
    providers: BTreeMap<String, Arc<dyn DatasetProvider>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    /// Registry with all builtin datasets
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(IrisDataset::new()));
        registry.register(Arc::new(XorDataset::new()));
        registry.register(Arc::new(SpiralDataset::new()));
        registry.register(Arc::new(RidgeDataset::new()));
        registry.register(Arc::new(BlocksDataset::new()));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn DatasetProvider>) {
        self.providers
            .insert(provider.spec().id.clone(), provider);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn DatasetProvider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| DatasetError::NotFound(id.to_string()))
    }

    /// All registered providers, ordered by id
    pub fn list(&self) -> Vec<Arc<dyn DatasetProvider>> {
        self.providers.values().cloned().collect()
    }
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

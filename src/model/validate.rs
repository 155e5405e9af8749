//! Architecture validation and canonicalization
//!
//! `validate` checks a client-submitted layer list against a dataset
//! descriptor and returns the canonical ordered form the compiler consumes.
//! It is pure and deterministic: the same input always produces the same
//! canonical list or the same error.

use crate::dataset::{DatasetSpec, TaskKind};
use crate::model::layer::{Activation, LayerSpec};
use serde::Serialize;
use thiserror::Error;

/// Validation failures, surfaced to clients as 400s with these messages
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("EmptyArchitecture: provide at least input and output layers")]
    EmptyArchitecture,

    #[error("MissingInputOrOutput: {0}")]
    MissingInputOrOutput(String),

    #[error("PositionGap: layer positions must be contiguous starting at 0 (got {0:?})")]
    PositionGap(Vec<usize>),

    #[error("ActivationOnInput: input layers cannot define an activation (got '{0}')")]
    ActivationOnInput(String),

    #[error("SpatialOnNonImageDataset: {kind} layers require an image dataset, but '{dataset}' is tabular")]
    SpatialOnNonImageDataset {
        kind: &'static str,
        dataset: String,
    },

    #[error("SpatialAfterFlatten: {0} layers must precede the flatten/dense stage")]
    SpatialAfterFlatten(&'static str),

    #[error("DenseAfterSpatialWithoutFlatten: insert a flatten layer between spatial and dense layers")]
    DenseAfterSpatialWithoutFlatten,

    #[error("InputWidthMismatch: input layer declares {declared} units but dataset '{dataset}' has {expected} features")]
    InputWidthMismatch {
        declared: usize,
        expected: usize,
        dataset: String,
    },

    #[error("OutputArityMismatch: output layer declares {declared} units but dataset '{dataset}' expects {expected}")]
    OutputArityMismatch {
        declared: usize,
        expected: usize,
        dataset: String,
    },

    #[error("InvalidOutputActivation: {task} output must use {allowed}, got '{got}'")]
    InvalidOutputActivation {
        task: TaskKind,
        allowed: &'static str,
        got: String,
    },

    #[error("UnknownActivation: '{0}' is not recognized (expected one of {1})")]
    UnknownActivation(String, String),

    #[error("InvalidHyperparameter: {0}")]
    InvalidHyperparameter(String),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// A validated, ordered layer ready for compilation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalLayer {
    Input { shape: Vec<usize> },
    Hidden { neurons: usize, activation: Activation },
    Output { neurons: usize, activation: Activation },
    Dropout { rate: f32 },
    Conv2d { filters: usize, kernel: usize, activation: Activation },
    Maxpool2d { pool: usize },
    Flatten,
}

fn parse_activation(name: &str) -> Result<Activation> {
    name.parse::<Activation>().map_err(|bad| {
        ValidationError::UnknownActivation(bad, Activation::NAMES.join(", "))
    })
}

/// Validate a layer list against a dataset and return its canonical form
///
/// Canonicalization: layers are reordered by their position hints (or kept
/// in submission order when no hints are given), activations are
/// lower-cased, the input width is inferred from the dataset when omitted,
/// and the output width is filled from the dataset's output arity when
/// omitted. Explicit widths that disagree with the dataset are errors, not
/// silently rewritten.
pub fn validate(layers: &[LayerSpec], spec: &DatasetSpec) -> Result<Vec<CanonicalLayer>> {
    if layers.is_empty() {
        return Err(ValidationError::EmptyArchitecture);
    }

    let ordered = order_by_position(layers)?;

    match ordered.first() {
        Some(LayerSpec::Input { .. }) => {}
        _ => {
            return Err(ValidationError::MissingInputOrOutput(
                "first layer must be an input layer".to_string(),
            ))
        }
    }
    match ordered.last() {
        Some(LayerSpec::Output { .. }) => {}
        _ => {
            return Err(ValidationError::MissingInputOrOutput(
                "last layer must be an output layer".to_string(),
            ))
        }
    }
    for layer in &ordered[1..ordered.len() - 1] {
        match layer {
            LayerSpec::Input { .. } => {
                return Err(ValidationError::MissingInputOrOutput(
                    "models require exactly one input layer, at position 0".to_string(),
                ))
            }
            LayerSpec::Output { .. } => {
                return Err(ValidationError::MissingInputOrOutput(
                    "models require exactly one output layer, at the final position".to_string(),
                ))
            }
            _ => {}
        }
    }

    let mut canonical = Vec::with_capacity(ordered.len());

    // Spatial bookkeeping: Some((channels, h, w)) while inside the
    // conv/pool prefix, None once flat.
    let mut spatial: Option<(usize, usize, usize)> = None;
    let mut flattened = false;

    for layer in &ordered {
        match layer {
            LayerSpec::Input {
                neurons,
                activation,
                ..
            } => {
                if let Some(act) = activation {
                    let parsed = parse_activation(act)?;
                    if parsed != Activation::Linear {
                        return Err(ValidationError::ActivationOnInput(act.clone()));
                    }
                }
                let expected = spec.num_features();
                if let Some(declared) = neurons {
                    if *declared != expected {
                        return Err(ValidationError::InputWidthMismatch {
                            declared: *declared,
                            expected,
                            dataset: spec.id.clone(),
                        });
                    }
                }
                if spec.is_image() {
                    spatial = Some((1, spec.input_shape[0], spec.input_shape[1]));
                }
                canonical.push(CanonicalLayer::Input {
                    shape: spec.input_shape.clone(),
                });
            }

            LayerSpec::Hidden {
                neurons,
                activation,
                ..
            } => {
                if *neurons == 0 {
                    return Err(ValidationError::InvalidHyperparameter(
                        "hidden layer neurons must be > 0".to_string(),
                    ));
                }
                if spatial.is_some() && !flattened {
                    // Spatial prefix entered only by conv/pool layers; a
                    // plain image input feeds dense layers as a flat vector.
                    if canonical.iter().any(is_spatial_op) {
                        return Err(ValidationError::DenseAfterSpatialWithoutFlatten);
                    }
                    spatial = None;
                }
                canonical.push(CanonicalLayer::Hidden {
                    neurons: *neurons,
                    activation: parse_activation(activation)?,
                });
            }

            LayerSpec::Output {
                neurons,
                activation,
                ..
            } => {
                if spatial.is_some() && !flattened && canonical.iter().any(is_spatial_op) {
                    return Err(ValidationError::DenseAfterSpatialWithoutFlatten);
                }
                let expected = spec.output_arity;
                if let Some(declared) = neurons {
                    if *declared != expected {
                        return Err(ValidationError::OutputArityMismatch {
                            declared: *declared,
                            expected,
                            dataset: spec.id.clone(),
                        });
                    }
                }
                let act = match activation {
                    Some(name) => parse_activation(name)?,
                    None => match spec.task {
                        TaskKind::Classification => Activation::Softmax,
                        TaskKind::Regression => Activation::Linear,
                    },
                };
                match spec.task {
                    TaskKind::Classification => {
                        if !matches!(act, Activation::Softmax | Activation::Linear) {
                            return Err(ValidationError::InvalidOutputActivation {
                                task: spec.task,
                                allowed: "softmax or linear logits",
                                got: act.to_string(),
                            });
                        }
                    }
                    TaskKind::Regression => {
                        if act != Activation::Linear {
                            return Err(ValidationError::InvalidOutputActivation {
                                task: spec.task,
                                allowed: "linear",
                                got: act.to_string(),
                            });
                        }
                    }
                }
                canonical.push(CanonicalLayer::Output {
                    neurons: expected,
                    activation: act,
                });
            }

            LayerSpec::Dropout { rate, .. } => {
                if !(*rate >= 0.0 && *rate < 1.0) {
                    return Err(ValidationError::InvalidHyperparameter(format!(
                        "dropout rate must be in [0, 1), got {rate}"
                    )));
                }
                canonical.push(CanonicalLayer::Dropout { rate: *rate });
            }

            LayerSpec::Conv2d {
                filters,
                kernel,
                activation,
                ..
            } => {
                if !spec.is_image() {
                    return Err(ValidationError::SpatialOnNonImageDataset {
                        kind: "conv2d",
                        dataset: spec.id.clone(),
                    });
                }
                if flattened {
                    return Err(ValidationError::SpatialAfterFlatten("conv2d"));
                }
                let (_, h, w) =
                    spatial.ok_or(ValidationError::SpatialAfterFlatten("conv2d"))?;
                if *filters == 0 {
                    return Err(ValidationError::InvalidHyperparameter(
                        "conv2d filters must be > 0".to_string(),
                    ));
                }
                if *kernel == 0 || *kernel > h.min(w) {
                    return Err(ValidationError::InvalidHyperparameter(format!(
                        "conv2d kernel must be in 1..={}, got {kernel}",
                        h.min(w)
                    )));
                }
                spatial = Some((*filters, h - kernel + 1, w - kernel + 1));
                canonical.push(CanonicalLayer::Conv2d {
                    filters: *filters,
                    kernel: *kernel,
                    activation: parse_activation(activation)?,
                });
            }

            LayerSpec::Maxpool2d { pool, .. } => {
                if !spec.is_image() {
                    return Err(ValidationError::SpatialOnNonImageDataset {
                        kind: "maxpool2d",
                        dataset: spec.id.clone(),
                    });
                }
                if flattened {
                    return Err(ValidationError::SpatialAfterFlatten("maxpool2d"));
                }
                let (channels, h, w) =
                    spatial.ok_or(ValidationError::SpatialAfterFlatten("maxpool2d"))?;
                if *pool == 0 {
                    return Err(ValidationError::InvalidHyperparameter(
                        "maxpool2d pool size must be > 0".to_string(),
                    ));
                }
                let (oh, ow) = (h / pool, w / pool);
                if oh == 0 || ow == 0 {
                    return Err(ValidationError::InvalidHyperparameter(format!(
                        "maxpool2d pool {pool} exceeds the {h}x{w} feature map"
                    )));
                }
                spatial = Some((channels, oh, ow));
                canonical.push(CanonicalLayer::Maxpool2d { pool: *pool });
            }

            LayerSpec::Flatten { .. } => {
                flattened = true;
                canonical.push(CanonicalLayer::Flatten);
            }
        }
    }

    Ok(canonical)
}

fn is_spatial_op(layer: &CanonicalLayer) -> bool {
    matches!(
        layer,
        CanonicalLayer::Conv2d { .. } | CanonicalLayer::Maxpool2d { .. }
    )
}

/// Reorder by the client's position hints
///
/// All-`None` positions keep submission order; otherwise every layer must
/// carry a hint and the hints must form `0..N-1`.
fn order_by_position(layers: &[LayerSpec]) -> Result<Vec<LayerSpec>> {
    let positions: Vec<Option<usize>> = layers.iter().map(LayerSpec::position).collect();
    if positions.iter().all(Option::is_none) {
        return Ok(layers.to_vec());
    }
    let mut given: Vec<usize> = Vec::with_capacity(layers.len());
    for p in &positions {
        match p {
            Some(p) => given.push(*p),
            None => {
                return Err(ValidationError::PositionGap(
                    positions.iter().flatten().copied().collect(),
                ))
            }
        }
    }
    let mut ordered: Vec<LayerSpec> = layers.to_vec();
    ordered.sort_by_key(|l| l.position().unwrap_or(usize::MAX));
    let sorted: Vec<usize> = ordered.iter().filter_map(LayerSpec::position).collect();
    if sorted != (0..layers.len()).collect::<Vec<_>>() {
        return Err(ValidationError::PositionGap(sorted));
    }
    Ok(ordered)
}

/// Check training-request hyperparameter overrides
pub fn validate_hyperparameters(
    epochs: Option<usize>,
    learning_rate: Option<f32>,
    batch_size: Option<usize>,
    optimizer: Option<&str>,
    max_samples: Option<usize>,
) -> Result<()> {
    if let Some(0) = epochs {
        return Err(ValidationError::InvalidHyperparameter(
            "epochs must be >= 1".to_string(),
        ));
    }
    if let Some(lr) = learning_rate {
        if !(lr > 0.0) || !lr.is_finite() {
            return Err(ValidationError::InvalidHyperparameter(format!(
                "learning_rate must be a positive finite number, got {lr}"
            )));
        }
    }
    if let Some(0) = batch_size {
        return Err(ValidationError::InvalidHyperparameter(
            "batch_size must be >= 1".to_string(),
        ));
    }
    if let Some(name) = optimizer {
        if !crate::optim::is_known_optimizer(name) {
            return Err(ValidationError::InvalidHyperparameter(format!(
                "unknown optimizer '{name}' (expected adam, sgd, rmsprop, or adagrad)"
            )));
        }
    }
    if let Some(0) = max_samples {
        return Err(ValidationError::InvalidHyperparameter(
            "max_samples must be >= 1".to_string(),
        ));
    }
    Ok(())
}

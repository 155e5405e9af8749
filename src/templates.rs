//! Prebuilt architectures for the builtin datasets
//!
//! Each template is a complete, validating layer list a client can train
//! as-is or use as a starting point. The model store seeds itself from
//! these so template ids double as trainable model ids.

use crate::model::LayerSpec;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: String,
    pub dataset_id: String,
    pub layers: Vec<LayerSpec>,
}

fn input(neurons: usize, position: usize) -> LayerSpec {
    LayerSpec::Input {
        neurons: Some(neurons),
        activation: None,
        position: Some(position),
    }
}

fn hidden(neurons: usize, activation: &str, position: usize) -> LayerSpec {
    LayerSpec::Hidden {
        neurons,
        activation: activation.to_string(),
        position: Some(position),
    }
}

fn output(neurons: usize, activation: &str, position: usize) -> LayerSpec {
    LayerSpec::Output {
        neurons: Some(neurons),
        activation: Some(activation.to_string()),
        position: Some(position),
    }
}

/// All builtin templates, ordered by id
pub fn builtin_templates() -> Vec<Template> {
    vec![
        Template {
            id: "blocks_conv".to_string(),
            name: "Blocks ConvNet".to_string(),
            description: "Small convolutional stack for the 8x8 pattern images".to_string(),
            dataset_id: "blocks".to_string(),
            layers: vec![
                input(64, 0),
                LayerSpec::Conv2d {
                    filters: 4,
                    kernel: 3,
                    activation: "relu".to_string(),
                    position: Some(1),
                },
                LayerSpec::Maxpool2d {
                    pool: 2,
                    position: Some(2),
                },
                LayerSpec::Flatten { position: Some(3) },
                hidden(32, "relu", 4),
                output(4, "softmax", 5),
            ],
        },
        Template {
            id: "blocks_simple".to_string(),
            name: "Blocks Simple MLP".to_string(),
            description: "Dense baseline for the 8x8 pattern images".to_string(),
            dataset_id: "blocks".to_string(),
            layers: vec![input(64, 0), hidden(32, "relu", 1), output(4, "softmax", 2)],
        },
        Template {
            id: "iris_deep".to_string(),
            name: "Iris Deep MLP".to_string(),
            description: "Two hidden layers for iris classification".to_string(),
            dataset_id: "iris".to_string(),
            layers: vec![
                input(4, 0),
                hidden(32, "relu", 1),
                hidden(16, "relu", 2),
                output(3, "softmax", 3),
            ],
        },
        Template {
            id: "iris_simple".to_string(),
            name: "Iris Simple MLP".to_string(),
            description: "Single hidden layer for iris classification".to_string(),
            dataset_id: "iris".to_string(),
            layers: vec![input(4, 0), hidden(16, "relu", 1), output(3, "softmax", 2)],
        },
        Template {
            id: "ridge_deep".to_string(),
            name: "Ridge Deep MLP".to_string(),
            description: "Two hidden layers with dropout for ridge regression".to_string(),
            dataset_id: "ridge".to_string(),
            layers: vec![
                input(8, 0),
                hidden(64, "relu", 1),
                LayerSpec::Dropout {
                    rate: 0.2,
                    position: Some(2),
                },
                hidden(32, "relu", 3),
                output(1, "linear", 4),
            ],
        },
        Template {
            id: "ridge_simple".to_string(),
            name: "Ridge Simple MLP".to_string(),
            description: "Single hidden layer for ridge regression".to_string(),
            dataset_id: "ridge".to_string(),
            layers: vec![input(8, 0), hidden(32, "relu", 1), output(1, "linear", 2)],
        },
        Template {
            id: "spiral_deep".to_string(),
            name: "Spiral Deep MLP".to_string(),
            description: "Two tanh hidden layers for the spiral arms".to_string(),
            dataset_id: "spiral".to_string(),
            layers: vec![
                input(2, 0),
                hidden(32, "tanh", 1),
                hidden(16, "tanh", 2),
                output(2, "softmax", 3),
            ],
        },
        Template {
            id: "xor_simple".to_string(),
            name: "XOR Simple MLP".to_string(),
            description: "Single hidden layer for the XOR quadrants".to_string(),
            dataset_id: "xor".to_string(),
            layers: vec![input(2, 0), hidden(16, "relu", 1), output(2, "softmax", 2)],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetProvider, DatasetRegistry};
    use crate::model::validate;

    #[test]
    fn test_every_template_validates_against_its_dataset() {
        let registry = DatasetRegistry::with_builtins();
        for template in builtin_templates() {
            let provider = registry
                .get(&template.dataset_id)
                .unwrap_or_else(|_| panic!("unknown dataset in template {}", template.id));
            validate(&template.layers, provider.spec())
                .unwrap_or_else(|e| panic!("template {} invalid: {e}", template.id));
        }
    }

    #[test]
    fn test_templates_sorted_by_id() {
        let ids: Vec<String> = builtin_templates().iter().map(|t| t.id.clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}

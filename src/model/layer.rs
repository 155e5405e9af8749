//! Layer specifications and activation functions
//!
//! A model architecture is an ordered list of `LayerSpec`s as submitted by
//! the client. Unknown kinds and activations are rejected during
//! deserialization or validation rather than passed through.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Activation functions recognized on hidden and spatial layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
    Linear,
    Elu,
    Selu,
    Softplus,
    Gelu,
    LeakyRelu,
}

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_LAMBDA: f32 = 1.050_701;
const LEAKY_SLOPE: f32 = 0.01;

impl Activation {
    /// All recognized names, for error messages
    pub const NAMES: [&'static str; 10] = [
        "relu",
        "sigmoid",
        "tanh",
        "softmax",
        "linear",
        "elu",
        "selu",
        "softplus",
        "gelu",
        "leaky_relu",
    ];

    /// Whether weights feeding this activation use He initialization
    /// (relu family) rather than Glorot
    pub fn is_relu_family(self) -> bool {
        matches!(
            self,
            Activation::Relu
                | Activation::LeakyRelu
                | Activation::Elu
                | Activation::Selu
                | Activation::Gelu
                | Activation::Softplus
        )
    }

    /// Apply the activation elementwise in place (softmax is row-wise)
    pub fn apply(self, z: &mut Array2<f32>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv_inplace(sigmoid),
            Activation::Tanh => z.mapv_inplace(|v| v.tanh()),
            Activation::Elu => z.mapv_inplace(|v| if v > 0.0 { v } else { v.exp_m1() }),
            Activation::Selu => z.mapv_inplace(|v| {
                if v > 0.0 {
                    SELU_LAMBDA * v
                } else {
                    SELU_LAMBDA * SELU_ALPHA * v.exp_m1()
                }
            }),
            Activation::Softplus => z.mapv_inplace(|v| v.exp().ln_1p()),
            Activation::Gelu => z.mapv_inplace(gelu),
            Activation::LeakyRelu => {
                z.mapv_inplace(|v| if v > 0.0 { v } else { LEAKY_SLOPE * v })
            }
            Activation::Softmax => {
                for mut row in z.rows_mut() {
                    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|v| v / sum);
                }
            }
        }
    }

    /// Gradient of the loss w.r.t. the pre-activation, given the
    /// pre-activation `z`, the post-activation output `a`, and the incoming
    /// gradient `grad`
    pub fn backward(self, z: &Array2<f32>, a: &Array2<f32>, grad: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Linear => grad.clone(),
            Activation::Relu => grad * &z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => grad * &a.mapv(|s| s * (1.0 - s)),
            Activation::Tanh => grad * &a.mapv(|t| 1.0 - t * t),
            Activation::Elu => grad * &z.mapv(|v| if v > 0.0 { 1.0 } else { v.exp() }),
            Activation::Selu => grad
                * &z.mapv(|v| {
                    if v > 0.0 {
                        SELU_LAMBDA
                    } else {
                        SELU_LAMBDA * SELU_ALPHA * v.exp()
                    }
                }),
            Activation::Softplus => grad * &z.mapv(sigmoid),
            Activation::Gelu => grad * &z.mapv(gelu_prime),
            Activation::LeakyRelu => {
                grad * &z.mapv(|v| if v > 0.0 { 1.0 } else { LEAKY_SLOPE })
            }
            Activation::Softmax => {
                // Row-wise Jacobian product: dz = s * (g - (g . s))
                let mut out = grad.clone();
                for (mut row, s) in out.rows_mut().into_iter().zip(a.rows()) {
                    let dot: f32 = row.iter().zip(s.iter()).map(|(g, p)| g * p).sum();
                    for (g, p) in row.iter_mut().zip(s.iter()) {
                        *g = p * (*g - dot);
                    }
                }
                out
            }
        }
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

// tanh approximation of GELU
fn gelu(v: f32) -> f32 {
    const C: f32 = 0.797_884_6; // sqrt(2/pi)
    0.5 * v * (1.0 + (C * (v + 0.044_715 * v * v * v)).tanh())
}

fn gelu_prime(v: f32) -> f32 {
    const C: f32 = 0.797_884_6;
    let inner = C * (v + 0.044_715 * v * v * v);
    let t = inner.tanh();
    let sech2 = 1.0 - t * t;
    0.5 * (1.0 + t) + 0.5 * v * sech2 * C * (1.0 + 3.0 * 0.044_715 * v * v)
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Softmax => "softmax",
            Activation::Linear => "linear",
            Activation::Elu => "elu",
            Activation::Selu => "selu",
            Activation::Softplus => "softplus",
            Activation::Gelu => "gelu",
            Activation::LeakyRelu => "leaky_relu",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "softmax" => Ok(Activation::Softmax),
            "linear" => Ok(Activation::Linear),
            "elu" => Ok(Activation::Elu),
            "selu" => Ok(Activation::Selu),
            "softplus" => Ok(Activation::Softplus),
            "gelu" => Ok(Activation::Gelu),
            "leaky_relu" => Ok(Activation::LeakyRelu),
            other => Err(other.to_string()),
        }
    }
}

/// One layer as submitted by the client
///
/// Mirrors the visual-builder payload: a `type` discriminant plus the fields
/// that kind requires. `position` is an ordering hint; the validator rewrites
/// positions into canonical `0..N-1` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Input {
        #[serde(skip_serializing_if = "Option::is_none")]
        neurons: Option<usize>,
        /// Rejected by the validator unless null or "linear"
        #[serde(skip_serializing_if = "Option::is_none")]
        activation: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
    Hidden {
        neurons: usize,
        activation: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
    Output {
        #[serde(skip_serializing_if = "Option::is_none")]
        neurons: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        activation: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
    Dropout {
        rate: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
    Conv2d {
        filters: usize,
        kernel: usize,
        activation: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
    Maxpool2d {
        pool: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
    Flatten {
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
}

impl LayerSpec {
    /// The ordering hint, if the client supplied one
    pub fn position(&self) -> Option<usize> {
        match self {
            LayerSpec::Input { position, .. }
            | LayerSpec::Hidden { position, .. }
            | LayerSpec::Output { position, .. }
            | LayerSpec::Dropout { position, .. }
            | LayerSpec::Conv2d { position, .. }
            | LayerSpec::Maxpool2d { position, .. }
            | LayerSpec::Flatten { position } => *position,
        }
    }

    /// Kind name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            LayerSpec::Input { .. } => "input",
            LayerSpec::Hidden { .. } => "hidden",
            LayerSpec::Output { .. } => "output",
            LayerSpec::Dropout { .. } => "dropout",
            LayerSpec::Conv2d { .. } => "conv2d",
            LayerSpec::Maxpool2d { .. } => "maxpool2d",
            LayerSpec::Flatten { .. } => "flatten",
        }
    }

    /// Whether this kind produces a spatial (channels × h × w) output
    pub fn is_spatial(&self) -> bool {
        matches!(self, LayerSpec::Conv2d { .. } | LayerSpec::Maxpool2d { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_activation_from_str() {
        assert_eq!("ReLU".parse::<Activation>().unwrap(), Activation::Relu);
        assert_eq!(
            " leaky_relu ".parse::<Activation>().unwrap(),
            Activation::LeakyRelu
        );
        assert!("swish".parse::<Activation>().is_err());
    }

    #[test]
    fn test_relu_apply_and_backward() {
        let mut z = array![[-1.0, 0.5], [2.0, -3.0]];
        let pre = z.clone();
        Activation::Relu.apply(&mut z);
        assert_eq!(z, array![[0.0, 0.5], [2.0, 0.0]]);

        let grad = array![[1.0, 1.0], [1.0, 1.0]];
        let back = Activation::Relu.backward(&pre, &z, &grad);
        assert_eq!(back, array![[0.0, 1.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let mut z = array![[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]];
        Activation::Softmax.apply(&mut z);
        for row in z.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-5);
        }
        assert_relative_eq!(z[[1, 0]], 1.0 / 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_sigmoid_backward_matches_finite_difference() {
        let z = array![[0.3, -0.7]];
        let mut a = z.clone();
        Activation::Sigmoid.apply(&mut a);
        let grad = array![[1.0, 1.0]];
        let back = Activation::Sigmoid.backward(&z, &a, &grad);

        let eps = 1e-3_f32;
        for j in 0..2 {
            let mut hi = z.clone();
            hi[[0, j]] += eps;
            let mut lo = z.clone();
            lo[[0, j]] -= eps;
            Activation::Sigmoid.apply(&mut hi);
            Activation::Sigmoid.apply(&mut lo);
            let fd = (hi[[0, j]] - lo[[0, j]]) / (2.0 * eps);
            assert_relative_eq!(back[[0, j]], fd, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_gelu_prime_matches_finite_difference() {
        let eps = 1e-3_f32;
        for &v in &[-2.0_f32, -0.5, 0.0, 0.5, 2.0] {
            let fd = (gelu(v + eps) - gelu(v - eps)) / (2.0 * eps);
            assert_relative_eq!(gelu_prime(v), fd, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_layer_spec_json_round_trip() {
        let json = r#"{"type":"hidden","neurons":16,"activation":"relu","position":1}"#;
        let layer: LayerSpec = serde_json::from_str(json).unwrap();
        assert_eq!(layer.kind(), "hidden");
        assert_eq!(layer.position(), Some(1));
    }

    #[test]
    fn test_unknown_layer_kind_rejected() {
        let json = r#"{"type":"attention","heads":8}"#;
        assert!(serde_json::from_str::<LayerSpec>(json).is_err());
    }
}

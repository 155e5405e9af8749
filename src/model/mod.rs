//! Architecture specification, validation, and compilation
//!
//! - **layer**: `LayerSpec` payloads and the `Activation` enum
//! - **validate**: structural checks + canonicalization against a dataset
//! - **compile**: canonical layers → executable `CompiledModel`

mod compile;
mod layer;
mod validate;

pub use compile::{compile, CompileError, CompiledModel};
pub use layer::{Activation, LayerSpec};
pub use validate::{
    validate, validate_hyperparameters, CanonicalLayer, ValidationError,
};

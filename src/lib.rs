//! # Adiestra: Training Session Orchestrator
//!
//! Adiestra accepts declarative neural-network architectures over HTTP,
//! compiles them against a registered dataset, runs the resulting training
//! job on a background worker pool, and exposes progress, controls, and an
//! inference endpoint through a polled REST interface.
//!
//! ## Architecture
//!
//! - **dataset**: name→provider registry with curated builtin datasets
//! - **model**: layer specs, validation/canonicalization, and compilation
//!   into an executable forward graph
//! - **optim**: optimizers (Adam, SGD, RMSProp, Adagrad)
//! - **train**: the resumable epoch loop, session records, and the
//!   pause/resume/stop control handle
//! - **manager**: process-wide session registry, bounded worker pool, and
//!   optional persistence
//! - **server**: axum routes over the manager; all state injected
//! - **templates**: prebuilt architectures per dataset

pub mod dataset;
pub mod manager;
pub mod model;
pub mod optim;
pub mod server;
pub mod templates;
pub mod train;

// Re-export commonly used types
pub use manager::{ManagerConfig, ManagerError, SessionManager, TrainRequest};
pub use train::{SessionStatus, TrainingMetric, TrainingSession};

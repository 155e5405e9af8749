//! Training loop, session records, and control signaling
//!
//! - **loss**: softmax cross-entropy over logits, MSE, top-1 accuracy
//! - **session**: `TrainingSession` / `TrainingMetric` / `SessionStatus`
//! - **control**: the pause/resume/stop handle the manager owns
//! - **engine**: the resumable epoch loop

mod control;
mod engine;
pub mod loss;
mod session;

pub use control::ControlHandle;
pub use engine::{EngineConfig, EngineError, Prediction, TrainingEngine};
pub use session::{
    SessionObserver, SessionStatus, TrainingMetric, TrainingSession, POLL_INTERVAL_ACTIVE,
    POLL_INTERVAL_TERMINAL,
};

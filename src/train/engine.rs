//! Training engine
//!
//! Owns one compiled model, one dataset split, and one live
//! `TrainingSession`. The epoch loop shuffles with a session-seeded RNG,
//! steps the optimizer per mini-batch, appends one metric per epoch under
//! the session lock, and honors pause/resume/stop at epoch boundaries.
//! Runtime failures never escape as panics or results to the HTTP layer;
//! they are captured into the session record.

use crate::dataset::{Split, Targets, TaskKind};
use crate::model::CompiledModel;
use crate::optim::make_optimizer;
use crate::train::control::ControlHandle;
use crate::train::loss::{accuracy, argmax, cross_entropy_logits, mean_squared_error, softmax};
use crate::train::session::{SessionObserver, SessionStatus, TrainingMetric, TrainingSession};
use chrono::Utc;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

/// Loss above this is treated as divergence
const DIVERGENCE_THRESHOLD: f32 = 1e6;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("training has not completed (status: {0})")]
    NotCompleted(SessionStatus),

    #[error("prediction expects {expected} input features, got {got}")]
    InputWidth { expected: usize, got: usize },
}

/// Resolved training configuration for one session
///
/// Overrides replace the dataset's recommended values only where they
/// differ; otherwise the recommendation stands.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub epochs: u32,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub optimizer: String,
}

impl EngineConfig {
    pub fn resolve(
        recommended: &crate::dataset::Hyperparameters,
        epochs: Option<usize>,
        learning_rate: Option<f32>,
        batch_size: Option<usize>,
        optimizer: Option<String>,
    ) -> Self {
        Self {
            epochs: epochs.unwrap_or(recommended.epochs) as u32,
            learning_rate: learning_rate.unwrap_or(recommended.learning_rate),
            batch_size: batch_size.unwrap_or(recommended.batch_size).max(1),
            optimizer: optimizer.unwrap_or_else(|| recommended.optimizer.clone()),
        }
    }
}

/// Task-dependent prediction payload
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Classification {
        prediction: usize,
        probabilities: Vec<f64>,
        confidence: f64,
    },
    Regression {
        prediction: f64,
    },
}

/// One session's training executor
///
/// `run` must be called exactly once, on the worker thread the pool
/// assigns; `snapshot` and (after completion) `predict` may be called
/// concurrently from any thread.
pub struct TrainingEngine {
    model: RwLock<CompiledModel>,
    split: Split,
    config: EngineConfig,
    session: Mutex<TrainingSession>,
    seed: u64,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl TrainingEngine {
    pub fn new(
        model: CompiledModel,
        split: Split,
        config: EngineConfig,
        session: TrainingSession,
        seed: u64,
    ) -> Self {
        Self {
            model: RwLock::new(model),
            split,
            config,
            session: Mutex::new(session),
            seed,
            observer: None,
        }
    }

    /// Attach a write-through observer (e.g. a persistence backend)
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Push the current snapshot to the observer, outside any lock
    fn notify(&self) {
        if let Some(observer) = &self.observer {
            observer.on_update(&self.snapshot(0));
        }
    }

    /// Read-only snapshot with metrics filtered to `epoch > since_epoch`
    pub fn snapshot(&self, since_epoch: u32) -> TrainingSession {
        self.session
            .lock()
            .expect("session lock")
            .snapshot_since(since_epoch)
    }

    pub fn status(&self) -> SessionStatus {
        self.session.lock().expect("session lock").status
    }

    /// Apply a terminal transition, notify the observer, return the snapshot
    fn terminal(&self, status: SessionStatus, error_message: Option<&str>) -> TrainingSession {
        let snapshot = {
            let mut session = self.session.lock().expect("session lock");
            finish(&mut session, status, error_message)
        };
        self.notify();
        snapshot
    }

    /// Execute the training loop to a terminal state
    pub fn run(&self, control: &ControlHandle) -> TrainingSession {
        if control.stop_requested() {
            return self.terminal(SessionStatus::Stopped, Some("Training stopped by user"));
        }
        let session_id = {
            let mut session = self.session.lock().expect("session lock");
            session.status = SessionStatus::Running;
            session.session_id.clone()
        };
        self.notify();
        tracing::info!(
            session = %session_id,
            epochs = self.config.epochs,
            lr = self.config.learning_rate,
            batch_size = self.config.batch_size,
            optimizer = %self.config.optimizer,
            "training started"
        );

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut optimizer = make_optimizer(&self.config.optimizer, self.config.learning_rate);
        let n_train = self.split.x_train.nrows();
        let mut indices: Vec<usize> = (0..n_train).collect();

        for epoch in 1..=self.config.epochs {
            // Epoch boundary: control signals are honored here, never
            // mid-batch.
            if control.stop_requested() {
                return self.terminal(SessionStatus::Stopped, Some("Training stopped by user"));
            }
            if control.pause_requested() {
                self.set_status(SessionStatus::Paused);
                self.notify();
                tracing::info!(session = %session_id, epoch, "training paused");
                let stopped = control.wait_while_paused();
                if stopped {
                    return self.terminal(SessionStatus::Stopped, Some("Training stopped by user"));
                }
                self.set_status(SessionStatus::Running);
                self.notify();
                tracing::info!(session = %session_id, epoch, "training resumed");
            }

            self.session.lock().expect("session lock").current_epoch = epoch;

            indices.shuffle(&mut rng);
            let (avg_loss, test_accuracy) = self.train_one_epoch(&indices, &mut *optimizer, &mut rng);

            // Metric appends under the session lock so pollers see each
            // epoch atomically; the failing epoch still gets its metric.
            let failure = {
                let mut session = self.session.lock().expect("session lock");
                session.metrics.push(TrainingMetric {
                    epoch,
                    loss: avg_loss as f64,
                    accuracy: test_accuracy,
                    timestamp: Utc::now(),
                });
                if !avg_loss.is_finite() {
                    Some(format!("NumericNaN: non-finite training loss at epoch {epoch}"))
                } else if avg_loss > DIVERGENCE_THRESHOLD {
                    Some(format!(
                        "Diverged: loss {avg_loss:.3e} exceeded {DIVERGENCE_THRESHOLD:.0e} at epoch {epoch}"
                    ))
                } else {
                    None
                }
            };
            self.notify();

            if let Some(message) = failure {
                tracing::warn!(session = %session_id, epoch, %message, "numeric failure");
                return self.terminal(SessionStatus::Failed, Some(&message));
            }
        }

        let result = self.terminal(SessionStatus::Completed, None);
        tracing::info!(session = %session_id, "training completed");
        result
    }

    fn train_one_epoch(
        &self,
        indices: &[usize],
        optimizer: &mut dyn crate::optim::Optimizer,
        rng: &mut StdRng,
    ) -> (f32, Option<f64>) {
        let mut model = self.model.write().expect("model lock");
        let n_train = indices.len();
        let mut running_loss = 0.0;

        for batch in indices.chunks(self.config.batch_size) {
            let xb = gather_rows(&self.split.x_train, batch);
            let (output, caches) = model.forward_train(&xb, rng);

            let (loss, grad_out) = match &self.split.y_train {
                Targets::Classes(classes) => {
                    let yb: Vec<usize> = batch.iter().map(|&i| classes[i]).collect();
                    cross_entropy_logits(&output, &yb)
                }
                Targets::Values(values) => {
                    let yb: Vec<f32> = batch.iter().map(|&i| values[i]).collect();
                    mean_squared_error(&output, &yb)
                }
            };

            let grads = model.backward(&caches, grad_out);
            optimizer.step(model.params_mut(), &grads);
            running_loss += loss * batch.len() as f32;
        }

        let avg_loss = running_loss / n_train as f32;

        // Classification accuracy is measured on the held-out test slice.
        let test_accuracy = match (&self.split.y_test, model.task()) {
            (Targets::Classes(classes), TaskKind::Classification) if avg_loss.is_finite() => {
                let logits = model.forward(&self.split.x_test);
                Some(accuracy(&logits, classes))
            }
            _ => None,
        };

        (avg_loss, test_accuracy)
    }

    /// Run inference against the trained model
    ///
    /// Only valid once the session has completed; inputs pass through the
    /// dataset's fitted scaler, mirroring training preprocessing.
    pub fn predict(&self, inputs: &[f32]) -> Result<Prediction, EngineError> {
        let status = self.status();
        if status != SessionStatus::Completed {
            return Err(EngineError::NotCompleted(status));
        }

        let expected = self.split.x_train.ncols();
        if inputs.len() != expected {
            return Err(EngineError::InputWidth {
                expected,
                got: inputs.len(),
            });
        }

        let mut x = Array2::from_shape_vec((1, expected), inputs.to_vec())
            .expect("shape checked above");
        self.split.scaler.transform(&mut x);

        let model = self.model.read().expect("model lock");
        let output = model.forward(&x);

        Ok(match model.task() {
            TaskKind::Classification => {
                let probs = softmax(&output);
                let prediction = argmax(probs.row(0).iter().copied());
                let probabilities: Vec<f64> =
                    probs.row(0).iter().map(|&p| p as f64).collect();
                let confidence = probabilities[prediction];
                Prediction::Classification {
                    prediction,
                    probabilities,
                    confidence,
                }
            }
            TaskKind::Regression => Prediction::Regression {
                prediction: output[[0, 0]] as f64,
            },
        })
    }

    fn set_status(&self, status: SessionStatus) {
        self.session.lock().expect("session lock").status = status;
    }
}

/// Apply a terminal transition and return the final snapshot
fn finish(
    session: &mut TrainingSession,
    status: SessionStatus,
    error_message: Option<&str>,
) -> TrainingSession {
    session.status = status;
    session.end_time = Some(Utc::now());
    if let Some(message) = error_message {
        session.error_message = Some(message.to_string());
    }
    session.clone()
}

fn gather_rows(x: &Array2<f32>, indices: &[usize]) -> Array2<f32> {
    let mut out = Array2::zeros((indices.len(), x.ncols()));
    for (row, &i) in indices.iter().enumerate() {
        out.row_mut(row).assign(&x.row(i));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetProvider, DatasetRegistry, Hyperparameters};
    use crate::model::{compile, validate, LayerSpec};

    fn iris_engine(epochs: u32, learning_rate: f32) -> TrainingEngine {
        let registry = DatasetRegistry::with_builtins();
        let provider = registry.get("iris").unwrap();
        let spec = provider.spec().clone();
        let layers = vec![
            LayerSpec::Input {
                neurons: None,
                activation: None,
                position: None,
            },
            LayerSpec::Hidden {
                neurons: 16,
                activation: "relu".to_string(),
                position: None,
            },
            LayerSpec::Output {
                neurons: None,
                activation: None,
                position: None,
            },
        ];
        let canonical = validate(&layers, &spec).unwrap();
        let model = compile(&canonical, &spec, 42).unwrap();
        let split = provider.load(None);
        let config = EngineConfig::resolve(
            &spec.recommended,
            Some(epochs as usize),
            Some(learning_rate),
            Some(16),
            Some("adam".to_string()),
        );
        let session = TrainingSession::new("sess-test", "model-test", "iris", epochs);
        TrainingEngine::new(model, split, config, session, 42)
    }

    #[test]
    fn test_engine_completes_with_monotone_metrics() {
        let engine = iris_engine(5, 0.01);
        let final_session = engine.run(&ControlHandle::new());

        assert_eq!(final_session.status, SessionStatus::Completed);
        assert_eq!(final_session.metrics.len(), 5);
        assert!(final_session.end_time.is_some());
        let epochs: Vec<u32> = final_session.metrics.iter().map(|m| m.epoch).collect();
        assert_eq!(epochs, vec![1, 2, 3, 4, 5]);
        for metric in &final_session.metrics {
            let acc = metric.accuracy.expect("classification accuracy");
            assert!((0.0..=1.0).contains(&acc));
        }
    }

    #[test]
    fn test_engine_learns_iris() {
        let engine = iris_engine(20, 0.01);
        let final_session = engine.run(&ControlHandle::new());
        let last = final_session.metrics.last().unwrap();
        assert!(
            last.accuracy.unwrap() >= 0.7,
            "iris accuracy {:?} below 0.7",
            last.accuracy
        );
    }

    #[test]
    fn test_engine_diverges_with_huge_lr() {
        let engine = iris_engine(30, 1e6);
        let final_session = engine.run(&ControlHandle::new());

        assert_eq!(final_session.status, SessionStatus::Failed);
        assert!(!final_session.metrics.is_empty());
        let message = final_session.error_message.unwrap();
        assert!(
            message.contains("Diverged") || message.contains("NumericNaN"),
            "unexpected failure message: {message}"
        );
    }

    #[test]
    fn test_stop_before_start() {
        let engine = iris_engine(5, 0.01);
        let control = ControlHandle::new();
        control.request_stop();
        let final_session = engine.run(&control);
        assert_eq!(final_session.status, SessionStatus::Stopped);
        assert!(final_session.metrics.is_empty());
    }

    #[test]
    fn test_predict_rejected_before_completion() {
        let engine = iris_engine(5, 0.01);
        let err = engine.predict(&[5.1, 3.5, 1.4, 0.2]).unwrap_err();
        assert!(matches!(err, EngineError::NotCompleted(SessionStatus::Pending)));
    }

    #[test]
    fn test_predict_classification_payload() {
        let engine = iris_engine(10, 0.01);
        engine.run(&ControlHandle::new());

        let prediction = engine.predict(&[5.1, 3.5, 1.4, 0.2]).unwrap();
        match prediction {
            Prediction::Classification {
                prediction,
                probabilities,
                confidence,
            } => {
                assert!(prediction < 3);
                assert_eq!(probabilities.len(), 3);
                let sum: f64 = probabilities.iter().sum();
                assert!((sum - 1.0).abs() < 1e-4);
                assert!((0.0..=1.0).contains(&confidence));
            }
            other => panic!("expected classification payload, got {other:?}"),
        }
    }

    #[test]
    fn test_predict_is_reproducible() {
        let engine = iris_engine(5, 0.01);
        engine.run(&ControlHandle::new());
        let a = engine.predict(&[6.0, 2.8, 4.5, 1.3]).unwrap();
        let b = engine.predict(&[6.0, 2.8, 4.5, 1.3]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let engine = iris_engine(3, 0.01);
        engine.run(&ControlHandle::new());
        assert!(matches!(
            engine.predict(&[1.0, 2.0]),
            Err(EngineError::InputWidth { expected: 4, got: 2 })
        ));
    }

    #[test]
    fn test_regression_metrics_have_no_accuracy() {
        let registry = DatasetRegistry::with_builtins();
        let provider = registry.get("ridge").unwrap();
        let spec = provider.spec().clone();
        let layers = vec![
            LayerSpec::Input {
                neurons: None,
                activation: None,
                position: None,
            },
            LayerSpec::Hidden {
                neurons: 16,
                activation: "relu".to_string(),
                position: None,
            },
            LayerSpec::Output {
                neurons: None,
                activation: None,
                position: None,
            },
        ];
        let canonical = validate(&layers, &spec).unwrap();
        let model = compile(&canonical, &spec, 1).unwrap();
        let split = provider.load(Some(200));
        let config = EngineConfig::resolve(
            &Hyperparameters::new(3, 0.005, 32),
            None,
            None,
            None,
            None,
        );
        let session = TrainingSession::new("sess-r", "model-r", "ridge", 3);
        let engine = TrainingEngine::new(model, split, config, session, 7);

        let final_session = engine.run(&ControlHandle::new());
        assert_eq!(final_session.status, SessionStatus::Completed);
        assert!(final_session.metrics.iter().all(|m| m.accuracy.is_none()));

        let prediction = engine.predict(&[0.0; 8]).unwrap();
        assert!(matches!(prediction, Prediction::Regression { .. }));
    }
}

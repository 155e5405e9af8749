//! Session manager
//!
//! Process-wide owner of training sessions: admits and compiles training
//! requests, enforces one active session per model, schedules engines onto
//! the bounded worker pool, forwards control signals, and serves snapshot
//! reads to pollers. HTTP handlers receive a shared manager by dependency
//! injection; nothing here is a global.

mod pool;
mod store;

pub use pool::WorkerPool;
pub use store::{InMemorySessionStore, SessionStore, StoreError, StoredModelConfig};

use crate::dataset::{DatasetProvider, DatasetRegistry};
use crate::model::{
    compile, validate, validate_hyperparameters, CompileError, LayerSpec, ValidationError,
};
use crate::train::{
    ControlHandle, EngineConfig, EngineError, Prediction, SessionStatus, TrainingEngine,
    TrainingSession,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Dataset '{0}' not found")]
    DatasetNotFound(String),

    #[error("Training session '{0}' not found")]
    SessionNotFound(String),

    #[error("Model '{model_id}' is already running session '{session_id}'")]
    ActiveSessionExists {
        model_id: String,
        session_id: String,
    },

    #[error("IllegalTransition: cannot {action} a {status} session")]
    IllegalTransition {
        action: &'static str,
        status: SessionStatus,
    },

    #[error("SessionNotReady: session '{0}' has status '{1}'; prediction requires a completed session")]
    SessionNotReady(String, SessionStatus),

    #[error("{0}")]
    PredictionInput(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

pub type Result<T> = std::result::Result<T, ManagerError>;

/// Manager-level training request, already resolved to concrete layers
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub model_id: String,
    pub dataset_id: String,
    pub layers: Vec<LayerSpec>,
    pub epochs: Option<usize>,
    pub learning_rate: Option<f32>,
    pub batch_size: Option<usize>,
    pub optimizer: Option<String>,
    pub max_samples: Option<usize>,
}

/// Manager tuning knobs
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Worker pool parallelism
    pub workers: usize,
    /// Terminal sessions kept resident before LRU eviction
    pub retention: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            retention: 64,
        }
    }
}

struct SessionEntry {
    engine: Arc<TrainingEngine>,
    control: ControlHandle,
}

#[derive(Default)]
struct ManagerState {
    sessions: HashMap<String, SessionEntry>,
    /// Insertion order, for oldest-first eviction
    order: Vec<String>,
    /// model_id → most recent session_id
    model_sessions: HashMap<String, String>,
    counter: u64,
}

pub struct SessionManager {
    registry: Arc<DatasetRegistry>,
    state: RwLock<ManagerState>,
    pool: WorkerPool,
    retention: usize,
    store: Option<Arc<dyn SessionStore>>,
}

impl SessionManager {
    pub fn new(registry: Arc<DatasetRegistry>, config: ManagerConfig) -> Self {
        Self {
            registry,
            state: RwLock::new(ManagerState::default()),
            pool: WorkerPool::new(config.workers),
            retention: config.retention,
            store: None,
        }
    }

    /// Attach a persistence backend; sessions write through on creation,
    /// metric appends, and status transitions.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(&self) -> &Arc<DatasetRegistry> {
        &self.registry
    }

    /// Validate, compile, and schedule a training session
    ///
    /// Returns immediately with the `pending` snapshot; the worker pool
    /// transitions the session to `running` when a worker picks it up.
    pub fn start_training(&self, request: TrainRequest) -> Result<TrainingSession> {
        let provider = self
            .registry
            .get(&request.dataset_id)
            .map_err(|_| ManagerError::DatasetNotFound(request.dataset_id.clone()))?;
        let spec = provider.spec().clone();

        validate_hyperparameters(
            request.epochs,
            request.learning_rate,
            request.batch_size,
            request.optimizer.as_deref(),
            request.max_samples,
        )?;
        let canonical = validate(&request.layers, &spec)?;
        let split = provider.load(request.max_samples);
        let config = EngineConfig::resolve(
            &spec.recommended,
            request.epochs,
            request.learning_rate,
            request.batch_size,
            request.optimizer.clone(),
        );

        // The exclusive lock is the arbiter for concurrent starts on the
        // same model: at most one of them gets past this check.
        let (engine, control, snapshot) = {
            let mut state = self.state.write().expect("session map lock");

            if let Some(active_id) = state.model_sessions.get(&request.model_id) {
                if let Some(entry) = state.sessions.get(active_id) {
                    if !entry.engine.status().is_terminal() {
                        return Err(ManagerError::ActiveSessionExists {
                            model_id: request.model_id.clone(),
                            session_id: active_id.clone(),
                        });
                    }
                }
            }

            state.counter += 1;
            let session_id = format!("sess-{:08x}", state.counter);
            let seed = seed_from_id(&session_id);

            let model = compile(&canonical, &spec, seed)?;
            let session = TrainingSession::new(
                &session_id,
                &request.model_id,
                &request.dataset_id,
                config.epochs,
            );

            let mut engine = TrainingEngine::new(model, split, config, session, seed);
            if let Some(backing) = &self.store {
                engine = engine.with_observer(Arc::new(store::StoreObserver(backing.clone())));
            }
            let engine = Arc::new(engine);
            let control = ControlHandle::new();

            state.sessions.insert(
                session_id.clone(),
                SessionEntry {
                    engine: Arc::clone(&engine),
                    control: control.clone(),
                },
            );
            state.order.push(session_id.clone());
            state
                .model_sessions
                .insert(request.model_id.clone(), session_id);
            evict_terminal(&mut state, self.retention);

            let snapshot = engine.snapshot(0);
            (engine, control, snapshot)
        };

        if let Some(backing) = &self.store {
            if let Err(error) = backing.upsert_session(&snapshot) {
                tracing::warn!(session = %snapshot.session_id, %error, "initial write-through failed");
            }
        }

        tracing::info!(
            session = %snapshot.session_id,
            model = %request.model_id,
            dataset = %request.dataset_id,
            total_epochs = snapshot.total_epochs,
            "session scheduled"
        );

        self.pool.submit(move || {
            engine.run(&control);
        });

        Ok(snapshot)
    }

    fn entry(&self, session_id: &str) -> Result<(Arc<TrainingEngine>, ControlHandle)> {
        let state = self.state.read().expect("session map lock");
        state
            .sessions
            .get(session_id)
            .map(|entry| (Arc::clone(&entry.engine), entry.control.clone()))
            .ok_or_else(|| ManagerError::SessionNotFound(session_id.to_string()))
    }

    /// Read-only snapshot; metrics filtered to `epoch > since_epoch`
    ///
    /// Two-tier read path: the live engine serves resident sessions; a
    /// terminal session already evicted from the map is answered from the
    /// persistence backend, when one is configured.
    pub fn get_session(&self, session_id: &str, since_epoch: u32) -> Result<TrainingSession> {
        match self.entry(session_id) {
            Ok((engine, _)) => Ok(engine.snapshot(since_epoch)),
            Err(missing) => {
                if let Some(backing) = &self.store {
                    if let Ok(Some(persisted)) = backing.get_session(session_id) {
                        return Ok(persisted.snapshot_since(since_epoch));
                    }
                }
                Err(missing)
            }
        }
    }

    /// Request a stop; honored no later than the end of the epoch in
    /// progress. No-op on already-terminal sessions.
    pub fn stop(&self, session_id: &str) -> Result<TrainingSession> {
        let (engine, control) = self.entry(session_id)?;
        if !engine.status().is_terminal() {
            control.request_stop();
            tracing::info!(session = %session_id, "stop requested");
        }
        Ok(engine.snapshot(0))
    }

    /// Request a pause at the next epoch boundary. No-op when already
    /// paused; illegal on terminal sessions.
    pub fn pause(&self, session_id: &str) -> Result<TrainingSession> {
        let (engine, control) = self.entry(session_id)?;
        let status = engine.status();
        if status.is_terminal() {
            return Err(ManagerError::IllegalTransition {
                action: "pause",
                status,
            });
        }
        if status != SessionStatus::Paused {
            control.request_pause();
            tracing::info!(session = %session_id, "pause requested");
        }
        Ok(engine.snapshot(0))
    }

    /// Release a paused session (or cancel a not-yet-honored pause).
    /// No-op on running or pending sessions; illegal on terminal ones.
    pub fn resume(&self, session_id: &str) -> Result<TrainingSession> {
        let (engine, control) = self.entry(session_id)?;
        let status = engine.status();
        if status.is_terminal() {
            return Err(ManagerError::IllegalTransition {
                action: "resume",
                status,
            });
        }
        control.resume();
        Ok(engine.snapshot(0))
    }

    /// Proxy a prediction to the engine; requires `completed` status
    pub fn predict(&self, session_id: &str, inputs: &[f32]) -> Result<Prediction> {
        let (engine, _) = self.entry(session_id)?;
        let status = engine.status();
        if status != SessionStatus::Completed {
            return Err(ManagerError::SessionNotReady(
                session_id.to_string(),
                status,
            ));
        }
        engine.predict(inputs).map_err(|error| match error {
            EngineError::NotCompleted(status) => {
                ManagerError::SessionNotReady(session_id.to_string(), status)
            }
            EngineError::InputWidth { .. } => ManagerError::PredictionInput(error.to_string()),
        })
    }

    /// Best-effort stop signal to every active session; engines honor it
    /// at their next epoch boundary.
    pub fn shutdown(&self) {
        let state = self.state.read().expect("session map lock");
        for entry in state.sessions.values() {
            if !entry.engine.status().is_terminal() {
                entry.control.request_stop();
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
        // WorkerPool::drop joins the workers, giving in-flight engines
        // their epoch-boundary grace period.
    }
}

/// Deterministic RNG seed from an opaque id
fn seed_from_id(id: &str) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

/// Evict the oldest terminal sessions beyond the retention cap. Active
/// sessions are never evicted.
fn evict_terminal(state: &mut ManagerState, retention: usize) {
    loop {
        let terminal: Vec<String> = state
            .order
            .iter()
            .filter(|id| {
                state
                    .sessions
                    .get(*id)
                    .map(|entry| entry.engine.status().is_terminal())
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if terminal.len() <= retention {
            break;
        }
        let oldest = &terminal[0];
        state.sessions.remove(oldest);
        state.order.retain(|id| id != oldest);
        state.model_sessions.retain(|_, sid| sid != oldest);
        tracing::debug!(session = %oldest, "evicted terminal session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(DatasetRegistry::with_builtins()),
            ManagerConfig::default(),
        )
    }

    fn iris_layers() -> Vec<LayerSpec> {
        vec![
            LayerSpec::Input {
                neurons: Some(4),
                activation: None,
                position: Some(0),
            },
            LayerSpec::Hidden {
                neurons: 16,
                activation: "relu".to_string(),
                position: Some(1),
            },
            LayerSpec::Output {
                neurons: Some(3),
                activation: Some("softmax".to_string()),
                position: Some(2),
            },
        ]
    }

    fn iris_request(model_id: &str, epochs: usize) -> TrainRequest {
        TrainRequest {
            model_id: model_id.to_string(),
            dataset_id: "iris".to_string(),
            layers: iris_layers(),
            epochs: Some(epochs),
            learning_rate: Some(0.01),
            batch_size: Some(16),
            optimizer: Some("adam".to_string()),
            max_samples: Some(100),
        }
    }

    fn wait_terminal(manager: &SessionManager, session_id: &str) -> TrainingSession {
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            let snapshot = manager.get_session(session_id, 0).unwrap();
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "session did not terminate in time");
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_start_training_returns_immediately() {
        let manager = manager();
        let session = manager.start_training(iris_request("model-a", 3)).unwrap();
        assert!(matches!(
            session.status,
            SessionStatus::Pending | SessionStatus::Running
        ));
        assert_eq!(session.total_epochs, 3);
        wait_terminal(&manager, &session.session_id);
    }

    #[test]
    fn test_unknown_dataset() {
        let manager = manager();
        let mut request = iris_request("model-a", 3);
        request.dataset_id = "imagenet".to_string();
        assert!(matches!(
            manager.start_training(request),
            Err(ManagerError::DatasetNotFound(_))
        ));
    }

    #[test]
    fn test_validation_error_surfaces() {
        let manager = manager();
        let mut request = iris_request("model-a", 3);
        if let LayerSpec::Output { neurons, .. } = &mut request.layers[2] {
            *neurons = Some(5);
        }
        assert!(matches!(
            manager.start_training(request),
            Err(ManagerError::Validation(
                ValidationError::OutputArityMismatch { .. }
            ))
        ));
    }

    #[test]
    fn test_single_active_session_per_model() {
        let manager = manager();
        let first = manager.start_training(iris_request("model-a", 20_000)).unwrap();
        let second = manager.start_training(iris_request("model-a", 5));
        assert!(matches!(
            second,
            Err(ManagerError::ActiveSessionExists { .. })
        ));

        // A different model is unaffected
        manager.start_training(iris_request("model-b", 2)).unwrap();

        manager.stop(&first.session_id).unwrap();
        wait_terminal(&manager, &first.session_id);

        // After the first session terminates the model is free again
        manager.start_training(iris_request("model-a", 2)).unwrap();
    }

    #[test]
    fn test_concurrent_double_start_one_wins() {
        let manager = Arc::new(manager());
        let a = Arc::clone(&manager);
        let b = Arc::clone(&manager);
        let ja = thread::spawn(move || a.start_training(iris_request("model-x", 20_000)));
        let jb = thread::spawn(move || b.start_training(iris_request("model-x", 20_000)));
        let results = [ja.join().unwrap(), jb.join().unwrap()];
        let oks = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(oks, 1, "exactly one concurrent start must win");
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ManagerError::ActiveSessionExists { .. }))));
        manager.shutdown();
    }

    #[test]
    fn test_get_session_since_epoch_filters() {
        let manager = manager();
        let session = manager.start_training(iris_request("model-a", 4)).unwrap();
        let done = wait_terminal(&manager, &session.session_id);
        assert_eq!(done.metrics.len(), 4);

        let tail = manager.get_session(&session.session_id, 2).unwrap();
        let epochs: Vec<u32> = tail.metrics.iter().map(|m| m.epoch).collect();
        assert_eq!(epochs, vec![3, 4]);
        assert_eq!(tail.current_epoch, 4);
    }

    #[test]
    fn test_unknown_session() {
        let manager = manager();
        assert!(matches!(
            manager.get_session("sess-missing", 0),
            Err(ManagerError::SessionNotFound(_))
        ));
        assert!(matches!(
            manager.stop("sess-missing"),
            Err(ManagerError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_stop_is_idempotent_on_terminal() {
        let manager = manager();
        let session = manager.start_training(iris_request("model-a", 2)).unwrap();
        wait_terminal(&manager, &session.session_id);

        let snapshot = manager.stop(&session.session_id).unwrap();
        assert_eq!(snapshot.status, SessionStatus::Completed);
    }

    #[test]
    fn test_pause_on_terminal_is_illegal() {
        let manager = manager();
        let session = manager.start_training(iris_request("model-a", 2)).unwrap();
        wait_terminal(&manager, &session.session_id);

        assert!(matches!(
            manager.pause(&session.session_id),
            Err(ManagerError::IllegalTransition { action: "pause", .. })
        ));
        assert!(matches!(
            manager.resume(&session.session_id),
            Err(ManagerError::IllegalTransition { action: "resume", .. })
        ));
    }

    #[test]
    fn test_pause_resume_cycle() {
        let manager = manager();
        let session = manager.start_training(iris_request("model-a", 20_000)).unwrap();
        let id = session.session_id.clone();

        // Wait until at least one epoch has been recorded
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            let snapshot = manager.get_session(&id, 0).unwrap();
            if snapshot.current_epoch >= 1 {
                break;
            }
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(10));
        }

        manager.pause(&id).unwrap();
        // Wait for the pause to be honored at the epoch boundary
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            if manager.get_session(&id, 0).unwrap().status == SessionStatus::Paused {
                break;
            }
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(10));
        }

        // Paused sessions do not advance
        let frozen = manager.get_session(&id, 0).unwrap().current_epoch;
        thread::sleep(Duration::from_millis(120));
        assert_eq!(manager.get_session(&id, 0).unwrap().current_epoch, frozen);

        // Pause again is a no-op success
        manager.pause(&id).unwrap();

        manager.resume(&id).unwrap();
        manager.stop(&id).unwrap();
        let done = wait_terminal(&manager, &id);
        assert_eq!(done.status, SessionStatus::Stopped);
    }

    #[test]
    fn test_predict_gated_on_completion() {
        let manager = manager();
        let session = manager.start_training(iris_request("model-a", 20_000)).unwrap();
        let id = session.session_id.clone();

        let err = manager.predict(&id, &[5.1, 3.5, 1.4, 0.2]).unwrap_err();
        assert!(matches!(err, ManagerError::SessionNotReady(_, _)));

        manager.stop(&id).unwrap();
        wait_terminal(&manager, &id);
        // Stopped (not completed) sessions still refuse predictions
        assert!(matches!(
            manager.predict(&id, &[5.1, 3.5, 1.4, 0.2]),
            Err(ManagerError::SessionNotReady(_, _))
        ));
    }

    #[test]
    fn test_predict_after_completion() {
        let manager = manager();
        let session = manager.start_training(iris_request("model-a", 5)).unwrap();
        wait_terminal(&manager, &session.session_id);

        let prediction = manager
            .predict(&session.session_id, &[5.1, 3.5, 1.4, 0.2])
            .unwrap();
        assert!(matches!(prediction, Prediction::Classification { .. }));

        assert!(matches!(
            manager.predict(&session.session_id, &[1.0]),
            Err(ManagerError::PredictionInput(_))
        ));
    }

    #[test]
    fn test_eviction_keeps_recent_terminals() {
        let manager = SessionManager::new(
            Arc::new(DatasetRegistry::with_builtins()),
            ManagerConfig {
                workers: 1,
                retention: 2,
            },
        );
        let mut ids = Vec::new();
        for i in 0..4 {
            let session = manager
                .start_training(iris_request(&format!("model-{i}"), 1))
                .unwrap();
            wait_terminal(&manager, &session.session_id);
            ids.push(session.session_id);
        }
        // The two oldest terminal sessions are gone; the two newest remain
        assert!(matches!(
            manager.get_session(&ids[0], 0),
            Err(ManagerError::SessionNotFound(_))
        ));
        assert!(manager.get_session(&ids[3], 0).is_ok());
    }

    #[test]
    fn test_store_write_through() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = SessionManager::new(
            Arc::new(DatasetRegistry::with_builtins()),
            ManagerConfig::default(),
        )
        .with_store(Arc::clone(&store) as Arc<dyn SessionStore>);

        let session = manager.start_training(iris_request("model-a", 2)).unwrap();
        wait_terminal(&manager, &session.session_id);

        let persisted = store.load_sessions().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].status, SessionStatus::Completed);
        assert_eq!(persisted[0].metrics.len(), 2);
    }

    #[test]
    fn test_evicted_terminal_session_served_from_store() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = SessionManager::new(
            Arc::new(DatasetRegistry::with_builtins()),
            ManagerConfig {
                workers: 1,
                retention: 0,
            },
        )
        .with_store(Arc::clone(&store) as Arc<dyn SessionStore>);

        let first = manager.start_training(iris_request("model-a", 1)).unwrap();
        wait_terminal(&manager, &first.session_id);

        // The next admission evicts the terminal session from the live map
        let second = manager.start_training(iris_request("model-b", 1)).unwrap();
        wait_terminal(&manager, &second.session_id);

        // ... but the persisted snapshot still answers polls
        let restored = manager.get_session(&first.session_id, 0).unwrap();
        assert_eq!(restored.status, SessionStatus::Completed);
        assert_eq!(restored.metrics.len(), 1);
    }

    #[test]
    fn test_seed_from_id_is_stable() {
        assert_eq!(seed_from_id("sess-1"), seed_from_id("sess-1"));
        assert_ne!(seed_from_id("sess-1"), seed_from_id("sess-2"));
    }
}

//! Optional durable persistence for sessions and model configs
//!
//! The live `TrainingSession` held by its engine remains the source of
//! truth; a `SessionStore` receives write-through copies on creation, on
//! each metric append, and on every status transition. Live engine
//! references are never persisted: after a restart, `recover` marks
//! sessions left non-terminal by the previous process as failed.

use crate::train::{SessionObserver, SessionStatus, TrainingSession};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persisted model configuration row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredModelConfig {
    pub id: String,
    pub name: String,
    pub dataset_id: String,
    pub description: Option<String>,
    pub layers_json: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Trait for session persistence backends
///
/// Implementations must be `Send + Sync`; the manager calls them from
/// worker and request threads concurrently.
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session record (metrics included)
    fn upsert_session(&self, session: &TrainingSession) -> Result<()>;

    /// Insert or replace a model configuration
    fn save_model_config(&self, config: &StoredModelConfig) -> Result<()>;

    /// One persisted session, if present
    fn get_session(&self, session_id: &str) -> Result<Option<TrainingSession>>;

    /// All persisted sessions, in unspecified order
    fn load_sessions(&self) -> Result<Vec<TrainingSession>>;

    /// Mark sessions left non-terminal by a dead process as failed.
    /// Returns the number of sessions repaired.
    fn recover(&self) -> Result<usize>;
}

/// In-memory backend, also used when no `DATABASE_URL` is configured
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, TrainingSession>>,
    model_configs: RwLock<HashMap<String, StoredModelConfig>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn model_config_count(&self) -> usize {
        self.model_configs.read().map(|m| m.len()).unwrap_or(0)
    }
}

impl SessionStore for InMemorySessionStore {
    fn upsert_session(&self, session: &TrainingSession) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn save_model_config(&self, config: &StoredModelConfig) -> Result<()> {
        let mut configs = self
            .model_configs
            .write()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;
        configs.insert(config.id.clone(), config.clone());
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<TrainingSession>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;
        Ok(sessions.get(session_id).cloned())
    }

    fn load_sessions(&self) -> Result<Vec<TrainingSession>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;
        Ok(sessions.values().cloned().collect())
    }

    fn recover(&self) -> Result<usize> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;
        let mut repaired = 0;
        for session in sessions.values_mut() {
            if !session.status.is_terminal() {
                session.status = SessionStatus::Failed;
                session.error_message = Some("process restart".to_string());
                session.end_time = Some(Utc::now());
                repaired += 1;
            }
        }
        Ok(repaired)
    }
}

/// Adapter feeding engine updates into a store
pub(crate) struct StoreObserver(pub Arc<dyn SessionStore>);

impl SessionObserver for StoreObserver {
    fn on_update(&self, session: &TrainingSession) {
        if let Err(error) = self.0.upsert_session(session) {
            tracing::warn!(session = %session.session_id, %error, "session write-through failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, status: SessionStatus) -> TrainingSession {
        let mut s = TrainingSession::new(id, "model-1", "iris", 5);
        s.status = status;
        s
    }

    #[test]
    fn test_upsert_and_load() {
        let store = InMemorySessionStore::new();
        store
            .upsert_session(&session("sess-1", SessionStatus::Running))
            .unwrap();
        store
            .upsert_session(&session("sess-2", SessionStatus::Completed))
            .unwrap();
        assert_eq!(store.session_count(), 2);
        assert_eq!(store.load_sessions().unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_replaces() {
        let store = InMemorySessionStore::new();
        store
            .upsert_session(&session("sess-1", SessionStatus::Running))
            .unwrap();
        store
            .upsert_session(&session("sess-1", SessionStatus::Completed))
            .unwrap();
        assert_eq!(store.session_count(), 1);
        assert_eq!(
            store.load_sessions().unwrap()[0].status,
            SessionStatus::Completed
        );
    }

    #[test]
    fn test_recover_marks_non_terminal_failed() {
        let store = InMemorySessionStore::new();
        store
            .upsert_session(&session("sess-1", SessionStatus::Running))
            .unwrap();
        store
            .upsert_session(&session("sess-2", SessionStatus::Completed))
            .unwrap();
        store
            .upsert_session(&session("sess-3", SessionStatus::Paused))
            .unwrap();

        assert_eq!(store.recover().unwrap(), 2);

        for restored in store.load_sessions().unwrap() {
            assert!(restored.status.is_terminal());
            if restored.session_id != "sess-2" {
                assert_eq!(restored.status, SessionStatus::Failed);
                assert_eq!(restored.error_message.as_deref(), Some("process restart"));
            }
        }
    }

    #[test]
    fn test_save_model_config() {
        let store = InMemorySessionStore::new();
        store
            .save_model_config(&StoredModelConfig {
                id: "model-1".to_string(),
                name: "iris mlp".to_string(),
                dataset_id: "iris".to_string(),
                description: None,
                layers_json: "[]".to_string(),
                status: "created".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(store.model_config_count(), 1);
    }
}

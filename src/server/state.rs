//! Server application state
//!
//! Shared state for the orchestrator server: the session manager, the
//! dataset registry behind it, the model configuration store, and the
//! template catalog. Cloned per handler invocation; all fields are shared
//! handles.

use crate::manager::{SessionManager, SessionStore, StoredModelConfig};
use crate::model::LayerSpec;
use crate::templates::{builtin_templates, Template};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A stored model configuration
#[derive(Debug, Clone, Serialize)]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    pub dataset_id: String,
    pub description: Option<String>,
    pub layers: Vec<LayerSpec>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory store for model configurations
///
/// Seeded from the template catalog so template ids are trainable model
/// ids out of the box.
#[derive(Default)]
pub struct ModelStore {
    models: RwLock<HashMap<String, ModelRecord>>,
    counter: RwLock<u64>,
    backing: Option<Arc<dyn SessionStore>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a persistence backend for write-through of model configs
    pub fn with_backing(mut self, backing: Arc<dyn SessionStore>) -> Self {
        self.backing = Some(backing);
        self
    }

    /// Generate a unique id
    pub fn generate_id(&self, prefix: &str) -> String {
        let mut counter = self.counter.write().expect("model store lock");
        *counter += 1;
        format!("{}-{:08x}", prefix, *counter)
    }

    /// Create and store a model configuration
    pub fn create(
        &self,
        name: Option<String>,
        description: Option<String>,
        dataset_id: &str,
        layers: Vec<LayerSpec>,
    ) -> ModelRecord {
        let id = self.generate_id("model");
        let record = ModelRecord {
            id: id.clone(),
            name: name.unwrap_or_else(|| format!("{dataset_id}_model")),
            dataset_id: dataset_id.to_string(),
            description,
            layers,
            status: "created".to_string(),
            created_at: Utc::now(),
        };
        self.insert(record.clone());
        record
    }

    /// Register a model under a fixed id (used for template seeding)
    pub fn insert(&self, record: ModelRecord) {
        if let Some(backing) = &self.backing {
            let layers_json =
                serde_json::to_string(&record.layers).unwrap_or_else(|_| "[]".to_string());
            let stored = StoredModelConfig {
                id: record.id.clone(),
                name: record.name.clone(),
                dataset_id: record.dataset_id.clone(),
                description: record.description.clone(),
                layers_json,
                status: record.status.clone(),
                created_at: record.created_at,
            };
            if let Err(error) = backing.save_model_config(&stored) {
                tracing::warn!(model = %record.id, %error, "model config write-through failed");
            }
        }
        self.models
            .write()
            .expect("model store lock")
            .insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<ModelRecord> {
        self.models.read().expect("model store lock").get(id).cloned()
    }

    pub fn count(&self) -> usize {
        self.models.read().expect("model store lock").len()
    }

    /// Register every builtin template as a stored model
    pub fn seed_from_templates(&self, templates: &[Template]) {
        for template in templates {
            self.insert(ModelRecord {
                id: template.id.clone(),
                name: template.name.clone(),
                dataset_id: template.dataset_id.clone(),
                description: Some(template.description.clone()),
                layers: template.layers.clone(),
                status: "created".to_string(),
                created_at: Utc::now(),
            });
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub models: Arc<ModelStore>,
    pub templates: Arc<Vec<Template>>,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let templates = Arc::new(builtin_templates());
        let models = ModelStore::new();
        models.seed_from_templates(&templates);
        Self {
            manager,
            models: Arc::new(models),
            templates,
        }
    }

    /// State with model-config write-through to a persistence backend
    pub fn with_store(manager: Arc<SessionManager>, backing: Arc<dyn SessionStore>) -> Self {
        let templates = Arc::new(builtin_templates());
        let models = ModelStore::new().with_backing(backing);
        models.seed_from_templates(&templates);
        Self {
            manager,
            models: Arc::new(models),
            templates,
        }
    }
}

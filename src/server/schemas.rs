//! Request and response payloads
//!
//! Wire shapes mirror the visual-builder frontend contract: datasets carry
//! their recommended hyperparameters, training status responses carry the
//! metric tail since the client's last poll, and every error body is
//! `{"detail": ...}` (see `ApiError`).

use crate::dataset::{DatasetSpec, Hyperparameters, TaskKind};
use crate::model::LayerSpec;
use crate::train::{Prediction, SessionStatus, TrainingMetric, TrainingSession};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Dataset list entry
#[derive(Debug, Serialize)]
pub struct DatasetSummary {
    pub id: String,
    pub name: String,
    pub task_type: TaskKind,
    pub description: String,
    pub num_samples: usize,
    pub num_features: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_classes: Option<usize>,
    pub hyperparameters: Hyperparameters,
}

impl From<&DatasetSpec> for DatasetSummary {
    fn from(spec: &DatasetSpec) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            task_type: spec.task,
            description: spec.description.clone(),
            num_samples: spec.num_samples,
            num_features: spec.num_features(),
            num_classes: match spec.task {
                TaskKind::Classification => Some(spec.output_arity),
                TaskKind::Regression => None,
            },
            hyperparameters: spec.recommended.clone(),
        }
    }
}

/// Dataset detail, adds the shapes the builder needs
#[derive(Debug, Serialize)]
pub struct DatasetDetail {
    #[serde(flatten)]
    pub summary: DatasetSummary,
    pub input_shape: Vec<usize>,
    pub output_shape: usize,
}

impl From<&DatasetSpec> for DatasetDetail {
    fn from(spec: &DatasetSpec) -> Self {
        Self {
            summary: spec.into(),
            input_shape: spec.input_shape.clone(),
            output_shape: spec.output_arity,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub num_samples: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub features: Vec<Vec<f32>>,
    pub labels: Vec<serde_json::Value>,
    pub num_samples_shown: usize,
}

#[derive(Debug, Deserialize)]
pub struct TemplateQuery {
    pub dataset_id: Option<String>,
}

/// Incoming payload for POST /api/models
#[derive(Debug, Deserialize)]
pub struct ModelCreateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub dataset_id: String,
    pub layers: Vec<LayerSpec>,
}

/// Incoming payload for POST /api/models/{id}/train
#[derive(Debug, Deserialize, Default)]
pub struct TrainStartRequest {
    pub dataset_id: Option<String>,
    pub layers: Option<Vec<LayerSpec>>,
    pub epochs: Option<usize>,
    pub learning_rate: Option<f32>,
    pub batch_size: Option<usize>,
    pub optimizer: Option<String>,
    pub max_samples: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TrainStartResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub total_epochs: u32,
    pub poll_interval_seconds: f64,
}

impl From<&TrainingSession> for TrainStartResponse {
    fn from(session: &TrainingSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            status: session.status,
            total_epochs: session.total_epochs,
            poll_interval_seconds: session.poll_interval_seconds(),
        }
    }
}

/// Full session snapshot served by the status endpoint
#[derive(Debug, Serialize)]
pub struct TrainingStatusResponse {
    pub session_id: String,
    pub model_id: String,
    pub dataset_id: String,
    pub status: SessionStatus,
    pub current_epoch: u32,
    pub total_epochs: u32,
    pub progress: f64,
    pub metrics: Vec<TrainingMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub poll_interval_seconds: f64,
}

impl From<TrainingSession> for TrainingStatusResponse {
    fn from(session: TrainingSession) -> Self {
        Self {
            progress: session.progress(),
            poll_interval_seconds: session.poll_interval_seconds(),
            session_id: session.session_id,
            model_id: session.model_id,
            dataset_id: session.dataset_id,
            status: session.status,
            current_epoch: session.current_epoch,
            total_epochs: session.total_epochs,
            metrics: session.metrics,
            error_message: session.error_message,
            started_at: session.start_time,
            completed_at: session.end_time,
        }
    }
}

/// Response for pause/resume/stop: the updated snapshot plus a summary line
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub message: String,
    #[serde(flatten)]
    pub session: TrainingStatusResponse,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub since_epoch: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub inputs: Vec<f32>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub prediction: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl From<Prediction> for PredictResponse {
    fn from(prediction: Prediction) -> Self {
        match prediction {
            Prediction::Classification {
                prediction,
                probabilities,
                confidence,
            } => Self {
                prediction: serde_json::json!(prediction),
                probabilities: Some(probabilities),
                confidence: Some(confidence),
            },
            Prediction::Regression { prediction } => Self {
                prediction: serde_json::json!(prediction),
                probabilities: None,
                confidence: None,
            },
        }
    }
}

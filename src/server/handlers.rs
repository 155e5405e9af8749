//! Route handlers
//!
//! Thin adapters from HTTP onto `SessionManager`, the dataset registry,
//! and the model store. Handlers hold no state of their own and recover
//! every domain error into a structured `{"detail": ...}` response.

use crate::dataset::{DatasetProvider, Targets};
use crate::manager::TrainRequest;
use crate::server::schemas::*;
use crate::server::{ApiError, AppState};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// -----------------------------------------------------------------------------
// Datasets
// -----------------------------------------------------------------------------

pub async fn list_datasets(State(state): State<AppState>) -> Json<Vec<DatasetSummary>> {
    let summaries = state
        .manager
        .registry()
        .list()
        .iter()
        .map(|provider| DatasetSummary::from(provider.spec()))
        .collect();
    Json(summaries)
}

pub async fn get_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DatasetDetail>, ApiError> {
    let provider = state.manager.registry().get(&id)?;
    Ok(Json(DatasetDetail::from(provider.spec())))
}

pub async fn preview_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let num_samples = query.num_samples.unwrap_or(10);
    if !(1..=100).contains(&num_samples) {
        return Err(ApiError::bad_request(
            "num_samples must be between 1 and 100",
        ));
    }

    let provider: Arc<dyn DatasetProvider> = state.manager.registry().get(&id)?;
    let split = provider.load(Some((num_samples * 10).min(500)));

    let take = num_samples.min(split.x_train.nrows());
    let features: Vec<Vec<f32>> = split
        .x_train
        .rows()
        .into_iter()
        .take(take)
        .map(|row| row.to_vec())
        .collect();
    let labels: Vec<serde_json::Value> = match &split.y_train {
        Targets::Classes(classes) => classes
            .iter()
            .take(take)
            .map(|&c| serde_json::json!(c))
            .collect(),
        Targets::Values(values) => values
            .iter()
            .take(take)
            .map(|&v| serde_json::json!(v))
            .collect(),
    };

    Ok(Json(PreviewResponse {
        num_samples_shown: features.len(),
        features,
        labels,
    }))
}

// -----------------------------------------------------------------------------
// Templates
// -----------------------------------------------------------------------------

pub async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<TemplateQuery>,
) -> Json<Vec<crate::templates::Template>> {
    let templates = state
        .templates
        .iter()
        .filter(|t| {
            query
                .dataset_id
                .as_ref()
                .is_none_or(|wanted| &t.dataset_id == wanted)
        })
        .cloned()
        .collect();
    Json(templates)
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::templates::Template>, ApiError> {
    state
        .templates
        .iter()
        .find(|t| t.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Template '{id}' not found")))
}

// -----------------------------------------------------------------------------
// Models
// -----------------------------------------------------------------------------

pub async fn create_model(
    State(state): State<AppState>,
    Json(payload): Json<ModelCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let provider = state.manager.registry().get(&payload.dataset_id)?;

    // Validate up front so unusable architectures are never stored
    crate::model::validate(&payload.layers, provider.spec())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let record = state.models.create(
        payload.name,
        payload.description,
        &payload.dataset_id,
        payload.layers,
    );
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::server::ModelRecord>, ApiError> {
    state
        .models
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Model '{id}' not found")))
}

// -----------------------------------------------------------------------------
// Training
// -----------------------------------------------------------------------------

pub async fn start_training(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
    Json(payload): Json<TrainStartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (actual_model_id, dataset_id, layers) = if model_id == "new" {
        let dataset_id = payload.dataset_id.clone().ok_or_else(|| {
            ApiError::bad_request("Dataset ID and layers are required for new models")
        })?;
        let layers = payload.layers.clone().ok_or_else(|| {
            ApiError::bad_request("Dataset ID and layers are required for new models")
        })?;
        // Ad-hoc models get a unique id so concurrent "new" runs never
        // collide on the single-active-session rule.
        (state.models.generate_id("temp"), dataset_id, layers)
    } else {
        let record = state
            .models
            .get(&model_id)
            .ok_or_else(|| ApiError::not_found(format!("Model '{model_id}' not found")))?;
        let dataset_id = payload.dataset_id.clone().unwrap_or(record.dataset_id);
        let layers = payload.layers.clone().unwrap_or(record.layers);
        (model_id, dataset_id, layers)
    };

    let session = state.manager.start_training(TrainRequest {
        model_id: actual_model_id,
        dataset_id,
        layers,
        epochs: payload.epochs,
        learning_rate: payload.learning_rate,
        batch_size: payload.batch_size,
        optimizer: payload.optimizer,
        max_samples: payload.max_samples,
    })?;

    Ok((StatusCode::ACCEPTED, Json(TrainStartResponse::from(&session))))
}

pub async fn training_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let since_epoch = query.since_epoch.unwrap_or(0);
    let session = state.manager.get_session(&session_id, since_epoch)?;
    // Snapshots must never be served from a cache
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(TrainingStatusResponse::from(session)),
    ))
}

pub async fn pause_training(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    let session = state.manager.pause(&session_id)?;
    let message = if session.status == crate::train::SessionStatus::Paused {
        "Training paused".to_string()
    } else {
        "Pause requested; takes effect at the next epoch boundary".to_string()
    };
    Ok(Json(ControlResponse {
        message,
        session: TrainingStatusResponse::from(session),
    }))
}

pub async fn resume_training(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    let session = state.manager.resume(&session_id)?;
    Ok(Json(ControlResponse {
        message: "Training resumed".to_string(),
        session: TrainingStatusResponse::from(session),
    }))
}

pub async fn stop_training(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    let session = state.manager.stop(&session_id)?;
    let message = if session.status.is_terminal() {
        format!("Training already {}", session.status)
    } else {
        "Stop request sent. Training will stop after the current epoch.".to_string()
    };
    Ok(Json(ControlResponse {
        message,
        session: TrainingStatusResponse::from(session),
    }))
}

pub async fn predict(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let prediction = state.manager.predict(&session_id, &payload.inputs)?;
    Ok(Json(PredictResponse::from(prediction)))
}

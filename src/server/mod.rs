//! HTTP surface
//!
//! A thin, stateless adapter from REST routes onto the session manager and
//! model compiler. All state lives in `AppState`; handlers receive it by
//! dependency injection so tests can instantiate fresh servers.

mod api;
mod handlers;
mod schemas;
mod state;

pub use api::ApiServer;
pub use schemas::*;
pub use state::{AppState, ModelRecord, ModelStore};

use crate::dataset::DatasetError;
use crate::manager::ManagerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::net::SocketAddr;

/// Server configuration, sourced from the environment with builder-style
/// overrides
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Worker pool parallelism (`WORKER_POOL_SIZE`, default 1)
    pub workers: usize,
    /// Terminal sessions retained before eviction (`SESSION_RETENTION`, default 64)
    pub retention: usize,
    /// Allowed CORS origins (`ALLOWED_ORIGINS`, comma-separated).
    /// Empty means permissive, the development default.
    pub allowed_origins: Vec<String>,
    /// Consumed only by the optional session store (`DATABASE_URL`)
    pub database_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            workers: 1,
            retention: 64,
            allowed_origins: Vec::new(),
            database_url: None,
        }
    }
}

impl ServerConfig {
    /// Read recognized environment variables over the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("WORKER_POOL_SIZE") {
            if let Ok(workers) = value.parse::<usize>() {
                config.workers = workers.max(1);
            }
        }
        if let Ok(value) = std::env::var("SESSION_RETENTION") {
            if let Ok(retention) = value.parse::<usize>() {
                config.retention = retention;
            }
        }
        if let Ok(value) = std::env::var("ALLOWED_ORIGINS") {
            config.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(value) = std::env::var("DATABASE_URL") {
            if !value.is_empty() {
                config.database_url = Some(value);
            }
        }
        config
    }

    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// Error envelope: every failure serializes as `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<ManagerError> for ApiError {
    fn from(error: ManagerError) -> Self {
        let status = match &error {
            ManagerError::DatasetNotFound(_) | ManagerError::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ManagerError::ActiveSessionExists { .. }
            | ManagerError::IllegalTransition { .. }
            | ManagerError::SessionNotReady(_, _) => StatusCode::CONFLICT,
            ManagerError::Validation(_)
            | ManagerError::Compile(_)
            | ManagerError::PredictionInput(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, error.to_string())
    }
}

impl From<DatasetError> for ApiError {
    fn from(error: DatasetError) -> Self {
        Self::not_found(error.to_string())
    }
}

//! API router and server setup
//!
//! Configures axum routes and runs the HTTP server.

use crate::dataset::DatasetRegistry;
use crate::manager::{InMemorySessionStore, ManagerConfig, SessionManager, SessionStore};
use crate::server::{
    handlers::{
        create_model, get_dataset, get_model, get_template, health_check, list_datasets,
        list_templates, pause_training, predict, preview_dataset, resume_training,
        start_training, stop_training, training_status,
    },
    AppState, ServerConfig,
};
use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Training orchestrator server
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a server with its own manager, registry, and model store
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(DatasetRegistry::with_builtins());
        let manager_config = ManagerConfig {
            workers: config.workers,
            retention: config.retention,
        };

        // DATABASE_URL opts into persistence; the in-memory backend is the
        // only one shipped, so any URL selects it.
        let state = if config.database_url.is_some() {
            let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
            let manager = Arc::new(
                SessionManager::new(registry, manager_config).with_store(Arc::clone(&store)),
            );
            AppState::with_store(manager, store)
        } else {
            let manager = Arc::new(SessionManager::new(registry, manager_config));
            AppState::new(manager)
        };

        Self { config, state }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let cors = if self.config.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = self
                .config
                .allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            // Health check
            .route("/health", get(health_check))
            // Datasets
            .route("/api/datasets", get(list_datasets))
            .route("/api/datasets/{id}", get(get_dataset))
            .route("/api/datasets/{id}/preview", get(preview_dataset))
            // Templates
            .route("/api/templates", get(list_templates))
            .route("/api/templates/{id}", get(get_template))
            // Models
            .route("/api/models", post(create_model))
            .route("/api/models/{id}", get(get_model))
            .route("/api/models/{id}/train", post(start_training))
            // Training sessions
            .route("/api/training/{id}/status", get(training_status))
            .route("/api/training/{id}/pause", post(pause_training))
            .route("/api/training/{id}/resume", post(resume_training))
            .route("/api/training/{id}/stop", post(stop_training))
            .route("/api/training/{id}/predict", post(predict))
            // State
            .with_state(self.state.clone())
            // Tracing
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Run the server until the listener fails or the process exits
    pub async fn run(&self) -> std::io::Result<()> {
        let addr = self.config.address;
        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!(%addr, workers = self.config.workers, "adiestra server listening");

        axum::serve(listener, self.router()).await?;

        // Give in-flight engines their epoch-boundary grace period
        self.state.manager.shutdown();
        Ok(())
    }

    /// Get the configured address
    pub fn address(&self) -> SocketAddr {
        self.config.address
    }

    /// Get the current state (for testing)
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_server() -> ApiServer {
        ApiServer::new(ServerConfig::default())
    }

    #[tokio::test]
    async fn test_server_default_address() {
        let server = test_server();
        assert_eq!(server.address().port(), 8000);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_server().router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_datasets_endpoint() {
        let app = test_server().router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/datasets")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_dataset_is_404() {
        let app = test_server().router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/datasets/imagenet")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_templates_endpoint() {
        let app = test_server().router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/templates?dataset_id=iris")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_permissive_by_default() {
        let server = test_server();
        assert!(server.config.allowed_origins.is_empty());
        let _app = server.router();
        // Router builds successfully with permissive CORS
    }

    #[tokio::test]
    async fn test_cors_with_origin_list() {
        let config = ServerConfig {
            allowed_origins: vec!["http://localhost:5173".to_string()],
            ..ServerConfig::default()
        };
        let server = ApiServer::new(config);
        let _app = server.router();
        // Router builds successfully with a restricted origin list
    }
}

//! HTTP admin surface and composition root of the identity core.
//!
//! Wires the backend, the command service, the read models and their
//! projection processor together, and serves organizations, users and
//! the raw event log over REST with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use commands::Commands;
use event_store::EventBackend;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{ProjectionProcessor, PublicKeyCache, Queries, ReadModels};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub commands: Commands<dyn EventBackend>,
    pub store: Arc<dyn EventBackend>,
    pub processor: Arc<ProjectionProcessor<dyn EventBackend>>,
    pub public_keys: PublicKeyCache,
}

impl AppState {
    /// Builds the command service and the read models over `store`.
    pub fn new(store: Arc<dyn EventBackend>, config: &Config) -> Self {
        let models = ReadModels::new();
        let processor = ProjectionProcessor::new(Arc::clone(&store), config.processor_config())
            .with_projections(models.projections());
        let public_keys = PublicKeyCache::new(models.keys.clone(), config.public_key_cache_max_age);
        let commands = Commands::new(
            Arc::clone(&store),
            Queries::new(models),
            config.commands_config(),
        );
        Self {
            commands,
            store,
            processor: Arc::new(processor),
            public_keys,
        }
    }

    pub fn queries(&self) -> &Queries {
        self.commands.queries()
    }

    /// Brings the read models up to the end of the log, so a request reads
    /// its own writes.
    pub async fn catch_up(&self) -> Result<(), ApiError> {
        self.processor.run_catch_up().await?;
        Ok(())
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orgs", post(routes::orgs::create).get(routes::orgs::list))
        .route(
            "/orgs/{id}",
            get(routes::orgs::get)
                .put(routes::orgs::rename)
                .delete(routes::orgs::remove),
        )
        .route("/orgs/{id}/deactivate", post(routes::orgs::deactivate))
        .route("/orgs/{id}/reactivate", post(routes::orgs::reactivate))
        .route("/orgs/{id}/users", post(routes::users::create))
        .route("/users", get(routes::users::list))
        .route("/users/{id}", get(routes::users::get))
        .route("/keys/{id}", get(routes::keys::get))
        .route("/events", get(routes::events::list))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

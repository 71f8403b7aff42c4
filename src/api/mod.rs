use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::clients::{MedlinePlusClient, UpstreamClient};
use crate::config::Config;
use crate::services::{ResultCache, SearchService};

mod error;
mod observability;
mod search;
mod system;
mod types;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    pub cache: Arc<ResultCache>,

    pub search_service: Arc<SearchService>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn search_service(&self) -> &Arc<SearchService> {
        &self.search_service
    }
}

/// Builds the application state with the real MedlinePlus client.
pub fn create_app_state(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let upstream: Arc<dyn UpstreamClient> =
        Arc::new(MedlinePlusClient::from_config(&config.upstream)?);
    Ok(create_app_state_with_upstream(
        config,
        upstream,
        prometheus_handle,
    ))
}

#[must_use]
pub fn create_app_state_with_upstream(
    config: Config,
    upstream: Arc<dyn UpstreamClient>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    let cache = Arc::new(ResultCache::new());
    let search_service = Arc::new(SearchService::new(upstream, Arc::clone(&cache), &config));

    Arc::new(AppState {
        config: Arc::new(config),
        cache,
        search_service,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = &state.config.server.cors_allowed_origins;

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    let api_router = Router::new()
        .route("/search", post(search::search_symptoms))
        .route("/health", get(system::get_health))
        .route("/metrics", get(observability::get_metrics))
        .with_state(state);

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

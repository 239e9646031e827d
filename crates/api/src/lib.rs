//! HTTP API server for the order processing engine.
//!
//! Exposes order placement, buyer-scoped reads, cancellation and the
//! operator status endpoint, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use engine::{EngineConfig, OrderAssembler, OrderLifecycleService, OrderQueries};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::{AppState, SharedStore};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create).get(routes::orders::list),
        )
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route(
            "/internal/orders/{id}/status",
            post(routes::orders::update_status),
        )
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

/// Wires the engine services over one store.
pub fn create_state(
    store: SharedStore,
    backend: &'static str,
    config: EngineConfig,
) -> Arc<AppState> {
    Arc::new(AppState {
        assembler: OrderAssembler::new(store.clone()).with_config(config),
        queries: OrderQueries::new(store.clone()).with_config(config),
        lifecycle: OrderLifecycleService::new(store).with_config(config),
        backend,
    })
}

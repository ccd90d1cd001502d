pub mod config;
pub mod db;
pub mod domain;
pub mod services;
pub mod state;
pub mod web;

use crate::services::LifecycleService;
use crate::state::{AppState, SharedState};
use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn shared_state(lifecycle: LifecycleService) -> SharedState {
    Arc::new(AppState {
        lifecycle: Arc::new(lifecycle),
    })
}

/// Full HTTP application: routes plus tracing and CORS layers.
pub fn app(state: SharedState) -> Router {
    Router::new()
        .merge(web::routes(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub mod error;
pub mod evaluations;
pub mod feedback;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api(state))
}

fn api(state: SharedState) -> Router {
    Router::new()
        .nest("/evaluations", evaluations::router(state.clone()))
        .nest("/feedback", feedback::router(state))
}

use crate::domain::models::Feedback;
use crate::domain::validation::SubmitFeedbackRequest;
use crate::state::SharedState;
use crate::web::error::ApiError;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(submit_feedback))
        .route("/:id", get(get_feedback))
        .with_state(state)
}

async fn submit_feedback(
    State(state): State<SharedState>,
    payload: Result<Json<SubmitFeedbackRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Feedback>), ApiError> {
    let Json(req) = payload?;
    let feedback = state.lifecycle.submit_feedback(req).await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

async fn get_feedback(
    State(state): State<SharedState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Feedback>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.lifecycle.get_feedback(id).await?))
}

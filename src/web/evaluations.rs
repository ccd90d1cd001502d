use crate::domain::models::{Evaluation, EvaluationDetails, FinalizedEvaluation};
use crate::domain::validation::{CreateEvaluationRequest, UpdateEvaluationRequest};
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
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
pub struct FinalizeResponse {
    pub message: String,
    #[serde(flatten)]
    pub result: FinalizedEvaluation,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(create_evaluation))
        .route("/:id", get(get_evaluation).put(update_evaluation))
        .route("/:id/finalize", post(finalize_evaluation))
        .route("/employee/:id", get(list_by_employee))
        .route("/evaluator/:id", get(list_by_evaluator))
        .with_state(state)
}

async fn create_evaluation(
    State(state): State<SharedState>,
    payload: Result<Json<CreateEvaluationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Evaluation>), ApiError> {
    let Json(req) = payload?;
    let evaluation = state.lifecycle.create_evaluation(req).await?;
    Ok((StatusCode::CREATED, Json(evaluation)))
}

async fn get_evaluation(
    State(state): State<SharedState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<EvaluationDetails>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.lifecycle.get_evaluation(id).await?))
}

async fn update_evaluation(
    State(state): State<SharedState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateEvaluationRequest>, JsonRejection>,
) -> Result<Json<Evaluation>, ApiError> {
    let Path(id) = id?;
    let Json(req) = payload?;
    Ok(Json(state.lifecycle.update_evaluation(id, req).await?))
}

async fn list_by_employee(
    State(state): State<SharedState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<Evaluation>>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.lifecycle.list_by_employee(id).await?))
}

async fn list_by_evaluator(
    State(state): State<SharedState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<Evaluation>>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.lifecycle.list_by_evaluator(id).await?))
}

async fn finalize_evaluation(
    State(state): State<SharedState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<FinalizeResponse>, ApiError> {
    let Path(id) = id?;
    let result = state.lifecycle.finalize_evaluation(id).await?;
    Ok(Json(FinalizeResponse {
        message: "Evaluation finalized".to_string(),
        result,
    }))
}

use crate::db::StorageError;
use crate::domain::validation::FieldError;
use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by the evaluation lifecycle.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("validation failed ({} field errors)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("feedback already submitted by evaluator {evaluator_id} for evaluation {evaluation_id}")]
    AlreadySubmitted {
        evaluator_id: Uuid,
        evaluation_id: Uuid,
    },

    #[error("{0}")]
    InvalidStateTransition(String),

    #[error("feedback incomplete: {submitted} of {expected} evaluators have submitted")]
    IncompleteFeedback { submitted: usize, expected: usize },

    #[error(transparent)]
    Storage(StorageError),
}

impl LifecycleError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn evaluation_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "evaluation",
            id,
        }
    }
}

impl From<Vec<FieldError>> for LifecycleError {
    fn from(errors: Vec<FieldError>) -> Self {
        Self::Validation(errors)
    }
}

impl From<StorageError> for LifecycleError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateSubmission {
                evaluator_id,
                evaluation_id,
            } => Self::AlreadySubmitted {
                evaluator_id,
                evaluation_id,
            },
            err @ StorageError::EvaluatorNotAssigned { .. } => {
                Self::field("evaluator_id", err.to_string())
            }
            StorageError::EvaluationClosed { evaluation_id } => Self::InvalidStateTransition(
                format!("evaluation {evaluation_id} no longer accepts feedback"),
            ),
            StorageError::EvaluationNotFound { evaluation_id } => {
                Self::evaluation_not_found(evaluation_id)
            }
            other => Self::Storage(other),
        }
    }
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A replied feedback already exists for this evaluator and evaluation.
    #[error("evaluator {evaluator_id} already submitted feedback for evaluation {evaluation_id}")]
    DuplicateSubmission {
        evaluator_id: Uuid,
        evaluation_id: Uuid,
    },

    /// The evaluator is not in the evaluation's evaluator list.
    #[error("employee {evaluator_id} is not an evaluator of evaluation {evaluation_id}")]
    EvaluatorNotAssigned {
        evaluator_id: Uuid,
        evaluation_id: Uuid,
    },

    /// The evaluation is completed or already holds one feedback per evaluator.
    #[error("evaluation {evaluation_id} no longer accepts feedback")]
    EvaluationClosed { evaluation_id: Uuid },

    #[error("evaluation {evaluation_id} not found")]
    EvaluationNotFound { evaluation_id: Uuid },

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

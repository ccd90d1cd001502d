//! Storage capabilities used by the evaluation lifecycle.
//!
//! - `EvaluationStore`: evaluation aggregates, with conditional writes for
//!   updates and completion.
//! - `FeedbackStore`: feedback records; `submit` also attaches the new
//!   record to its evaluation.
//! - `EmployeeDirectory`: read-only identity lookups.
//!
//! `PgStore` is the production backend, `MemoryStore` the in-process one used
//! by tests and by `STORAGE_BACKEND=memory`.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod seed;

use crate::domain::models::{
    CompetencyAverages, Employee, Evaluation, EvaluationChanges, Feedback, NewEvaluation,
};
use async_trait::async_trait;
use uuid::Uuid;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result of a guarded evaluation write.
#[derive(Debug)]
pub enum WriteOutcome {
    Applied(Evaluation),
    NotFound,
    /// The guard did not hold; carries the evaluation as currently stored.
    Rejected(Evaluation),
}

#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Persist a new evaluation with `status = pending` and no feedback.
    async fn create(&self, new: NewEvaluation) -> StorageResult<Evaluation>;

    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Evaluation>>;

    /// Replace the mutable fields. Rejected if the evaluation is completed or
    /// if the new evaluator list leaves out the author of attached feedback.
    async fn update(&self, id: Uuid, changes: EvaluationChanges) -> StorageResult<WriteOutcome>;

    /// Evaluations created by `employee_id`, oldest first.
    async fn find_by_employee(&self, employee_id: Uuid) -> StorageResult<Vec<Evaluation>>;

    /// Evaluations whose evaluator list contains `evaluator_id`, oldest first.
    async fn find_by_evaluator(&self, evaluator_id: Uuid) -> StorageResult<Vec<Evaluation>>;

    /// Mark the evaluation completed and store its averages. Applied only if
    /// it is not completed yet and every evaluator has a feedback reference.
    async fn complete(&self, id: Uuid, averages: &CompetencyAverages) -> StorageResult<WriteOutcome>;
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Feedback>>;

    async fn find_by_evaluator_and_evaluation(
        &self,
        evaluator_id: Uuid,
        evaluation_id: Uuid,
    ) -> StorageResult<Option<Feedback>>;

    /// Records in the same order as `ids`; unknown ids are skipped.
    async fn find_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Feedback>>;

    /// Persist `feedback` and append its id to the owning evaluation, as one
    /// unit.
    ///
    /// Fails with `EvaluatorNotAssigned` if the evaluator is not listed on the
    /// evaluation, with `DuplicateSubmission` if a replied record exists for
    /// the same evaluator and evaluation, and with `EvaluationClosed` if the
    /// evaluation is completed or already full. A non-replied record for the
    /// pair is replaced, reference included.
    async fn submit(&self, feedback: Feedback) -> StorageResult<Feedback>;
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Employee>>;
}

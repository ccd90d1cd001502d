//! Evaluation lifecycle: create, assign, collect feedback, finalize.
//!
//! The service owns every business rule; stores only provide the atomic
//! primitives (`submit`, conditional `update` and `complete`) that keep the
//! rules intact when requests race.

use crate::db::{EmployeeDirectory, EvaluationStore, FeedbackStore, WriteOutcome};
use crate::domain::aggregation::average_competency_scores;
use crate::domain::error::{LifecycleError, LifecycleResult};
use crate::domain::models::{
    Employee, EmployeeRef, Evaluation, EvaluationDetails, Feedback, FeedbackSummary,
    FinalizedEvaluation,
};
use crate::domain::validation::{
    validate_create_evaluation, validate_submit_feedback, validate_update_evaluation,
    CreateEvaluationRequest, SubmitFeedbackRequest, UpdateEvaluationRequest,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

pub struct LifecycleService {
    evaluations: Arc<dyn EvaluationStore>,
    feedback: Arc<dyn FeedbackStore>,
    employees: Arc<dyn EmployeeDirectory>,
}

impl LifecycleService {
    pub fn new(
        evaluations: Arc<dyn EvaluationStore>,
        feedback: Arc<dyn FeedbackStore>,
        employees: Arc<dyn EmployeeDirectory>,
    ) -> Self {
        Self {
            evaluations,
            feedback,
            employees,
        }
    }

    /// Uses one backend for all three capabilities.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: EvaluationStore + FeedbackStore + EmployeeDirectory + 'static,
    {
        Self::new(store.clone(), store.clone(), store)
    }

    pub async fn create_evaluation(&self, req: CreateEvaluationRequest) -> LifecycleResult<Evaluation> {
        let result: LifecycleResult<Evaluation> = async {
            let new = validate_create_evaluation(&req)?;

            let mut referenced = vec![new.employee_id, new.evaluated_id];
            referenced.extend(&new.evaluator_ids);
            self.ensure_employees_exist(&referenced).await?;

            let evaluation = self.evaluations.create(new).await?;
            tracing::info!(
                "Created evaluation {} for employee {} with {} evaluators",
                evaluation.id,
                evaluation.evaluated_id,
                evaluation.evaluator_ids.len()
            );
            Ok(evaluation)
        }
        .await;
        result.inspect_err(|e| log_rejection("create evaluation", e))
    }

    /// Evaluation with creator, evaluated employee, evaluators and feedback
    /// authors resolved. Unknown employees are returned as bare ids.
    pub async fn get_evaluation(&self, id: Uuid) -> LifecycleResult<EvaluationDetails> {
        let evaluation = self.load_evaluation(id).await?;

        let mut referenced = vec![evaluation.employee_id, evaluation.evaluated_id];
        referenced.extend(&evaluation.evaluator_ids);

        let (employees, feedback) = futures::try_join!(
            self.employees.find_by_ids(&referenced),
            self.feedback.find_by_ids(&evaluation.feedback_ids),
        )?;

        Ok(join_details(evaluation, &employees, feedback))
    }

    pub async fn list_by_employee(&self, employee_id: Uuid) -> LifecycleResult<Vec<Evaluation>> {
        Ok(self.evaluations.find_by_employee(employee_id).await?)
    }

    pub async fn list_by_evaluator(&self, evaluator_id: Uuid) -> LifecycleResult<Vec<Evaluation>> {
        Ok(self.evaluations.find_by_evaluator(evaluator_id).await?)
    }

    pub async fn update_evaluation(
        &self,
        id: Uuid,
        req: UpdateEvaluationRequest,
    ) -> LifecycleResult<Evaluation> {
        let result: LifecycleResult<Evaluation> = async {
            let changes = validate_update_evaluation(&req)?;
            let current = self.load_evaluation(id).await?;

            if current.is_completed() {
                return Err(completed_error(id));
            }
            if !current.status.can_update_to(changes.status) {
                return Err(LifecycleError::InvalidStateTransition(format!(
                    "evaluation {} cannot move from {} to {}",
                    id, current.status, changes.status
                )));
            }

            self.ensure_employees_exist(&changes.evaluator_ids).await?;

            let kept: HashSet<Uuid> = changes.evaluator_ids.iter().copied().collect();
            match self.evaluations.update(id, changes).await? {
                WriteOutcome::Applied(evaluation) => {
                    tracing::info!("Updated evaluation {} (status {})", id, evaluation.status);
                    Ok(evaluation)
                }
                WriteOutcome::NotFound => Err(LifecycleError::evaluation_not_found(id)),
                WriteOutcome::Rejected(current) if current.is_completed() => {
                    Err(completed_error(id))
                }
                WriteOutcome::Rejected(current) => {
                    let submitted = self.feedback.find_by_ids(&current.feedback_ids).await?;
                    let dropped = submitted
                        .iter()
                        .map(|fb| fb.evaluator_id)
                        .find(|author| !kept.contains(author));
                    Err(LifecycleError::field(
                        "evaluator_ids",
                        match dropped {
                            Some(author) => format!(
                                "evaluator {author} has already submitted feedback and cannot be removed"
                            ),
                            None => "evaluators who already submitted feedback cannot be removed"
                                .to_string(),
                        },
                    ))
                }
            }
        }
        .await;
        result.inspect_err(|e| log_rejection("update evaluation", e))
    }

    /// Records one evaluator's final feedback and attaches it to the
    /// evaluation. Each evaluator may submit once per evaluation.
    pub async fn submit_feedback(&self, req: SubmitFeedbackRequest) -> LifecycleResult<Feedback> {
        let result: LifecycleResult<Feedback> = async {
            let new = validate_submit_feedback(&req)?;
            let evaluation = self.load_evaluation(new.evaluation_id).await?;

            if evaluation.is_completed() {
                return Err(completed_error(evaluation.id));
            }
            if !evaluation.has_evaluator(new.evaluator_id) {
                return Err(LifecycleError::field(
                    "evaluator_id",
                    format!(
                        "employee {} is not an evaluator of evaluation {}",
                        new.evaluator_id, evaluation.id
                    ),
                ));
            }

            let existing = self
                .feedback
                .find_by_evaluator_and_evaluation(new.evaluator_id, new.evaluation_id)
                .await?;
            if existing.is_some_and(|fb| fb.replied) {
                return Err(LifecycleError::AlreadySubmitted {
                    evaluator_id: new.evaluator_id,
                    evaluation_id: new.evaluation_id,
                });
            }

            // The store re-checks assignment, duplicates and capacity atomically.
            let feedback = self.feedback.submit(new.into_feedback(true)).await?;
            tracing::info!(
                "Evaluator {} submitted feedback {} for evaluation {}",
                feedback.evaluator_id,
                feedback.id,
                feedback.evaluation_id
            );
            Ok(feedback)
        }
        .await;
        result.inspect_err(|e| log_rejection("submit feedback", e))
    }

    pub async fn get_feedback(&self, id: Uuid) -> LifecycleResult<Feedback> {
        self.feedback
            .get_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound {
                entity: "feedback",
                id,
            })
    }

    /// Closes a fully fed-back evaluation and stores its per-competency
    /// averages. Only one finalization of an evaluation can succeed.
    pub async fn finalize_evaluation(&self, id: Uuid) -> LifecycleResult<FinalizedEvaluation> {
        let result: LifecycleResult<FinalizedEvaluation> = async {
            let evaluation = self.load_evaluation(id).await?;

            if evaluation.is_completed() {
                return Err(completed_error(id));
            }
            if !evaluation.all_feedback_received() {
                return Err(incomplete(&evaluation));
            }

            let feedback = self.feedback.find_by_ids(&evaluation.feedback_ids).await?;
            let averages = average_competency_scores(&feedback);

            match self.evaluations.complete(id, &averages).await? {
                WriteOutcome::Applied(_) => {
                    tracing::info!(
                        "Finalized evaluation {} from {} feedback: {:?}",
                        id,
                        feedback.len(),
                        averages
                    );
                    Ok(FinalizedEvaluation {
                        evaluation_id: id,
                        competency_averages: averages,
                    })
                }
                WriteOutcome::NotFound => Err(LifecycleError::evaluation_not_found(id)),
                WriteOutcome::Rejected(current) if current.is_completed() => {
                    Err(completed_error(id))
                }
                WriteOutcome::Rejected(current) => Err(incomplete(&current)),
            }
        }
        .await;
        result.inspect_err(|e| log_rejection("finalize evaluation", e))
    }

    async fn load_evaluation(&self, id: Uuid) -> LifecycleResult<Evaluation> {
        self.evaluations
            .get_by_id(id)
            .await?
            .ok_or_else(|| LifecycleError::evaluation_not_found(id))
    }

    async fn ensure_employees_exist(&self, ids: &[Uuid]) -> LifecycleResult<()> {
        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        let found: HashSet<Uuid> = self
            .employees
            .find_by_ids(&unique)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();
        match unique.into_iter().find(|id| !found.contains(id)) {
            Some(id) => Err(LifecycleError::NotFound {
                entity: "employee",
                id,
            }),
            None => Ok(()),
        }
    }
}

fn completed_error(id: Uuid) -> LifecycleError {
    LifecycleError::InvalidStateTransition(format!("evaluation {id} is already completed"))
}

fn incomplete(evaluation: &Evaluation) -> LifecycleError {
    LifecycleError::IncompleteFeedback {
        submitted: evaluation.feedback_ids.len(),
        expected: evaluation.evaluator_ids.len(),
    }
}

fn log_rejection(operation: &str, err: &LifecycleError) {
    if !matches!(err, LifecycleError::Storage(_)) {
        tracing::warn!("Rejected {}: {}", operation, err);
    }
}

fn join_details(
    evaluation: Evaluation,
    employees: &[Employee],
    feedback: Vec<Feedback>,
) -> EvaluationDetails {
    let by_id: HashMap<Uuid, &Employee> = employees.iter().map(|e| (e.id, e)).collect();
    let resolve = |id: Uuid| {
        by_id
            .get(&id)
            .map(|e| EmployeeRef::from(*e))
            .unwrap_or_else(|| EmployeeRef::unresolved(id))
    };

    EvaluationDetails {
        id: evaluation.id,
        name: evaluation.name,
        description: evaluation.description,
        employee_id: resolve(evaluation.employee_id),
        evaluated_id: resolve(evaluation.evaluated_id),
        evaluator_ids: evaluation.evaluator_ids.iter().map(|id| resolve(*id)).collect(),
        start_date: evaluation.start_date,
        end_date: evaluation.end_date,
        status: evaluation.status,
        questions: evaluation.questions,
        feedback_ids: feedback
            .into_iter()
            .map(|fb| FeedbackSummary {
                id: fb.id,
                evaluator_id: resolve(fb.evaluator_id),
                comment: fb.comment,
                rating: fb.rating,
                competency_scores: fb.competency_scores,
                date: fb.date,
            })
            .collect(),
        competency_averages: evaluation.competency_averages,
        finalized_at: evaluation.finalized_at,
        created_at: evaluation.created_at,
        updated_at: evaluation.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{seed, MemoryStore, StorageResult};
    use crate::domain::models::{
        CompetencyAverages, EvaluationChanges, EvaluationStatus, NewEvaluation,
    };
    use crate::domain::validation::QuestionInput;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    /// Yields before every storage call, so operations joined in one task
    /// interleave between their reads and their writes.
    struct InterleavingStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl EvaluationStore for InterleavingStore {
        async fn create(&self, new: NewEvaluation) -> StorageResult<Evaluation> {
            tokio::task::yield_now().await;
            self.inner.create(new).await
        }

        async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Evaluation>> {
            tokio::task::yield_now().await;
            EvaluationStore::get_by_id(&self.inner, id).await
        }

        async fn update(&self, id: Uuid, changes: EvaluationChanges) -> StorageResult<WriteOutcome> {
            tokio::task::yield_now().await;
            self.inner.update(id, changes).await
        }

        async fn find_by_employee(&self, employee_id: Uuid) -> StorageResult<Vec<Evaluation>> {
            tokio::task::yield_now().await;
            self.inner.find_by_employee(employee_id).await
        }

        async fn find_by_evaluator(&self, evaluator_id: Uuid) -> StorageResult<Vec<Evaluation>> {
            tokio::task::yield_now().await;
            self.inner.find_by_evaluator(evaluator_id).await
        }

        async fn complete(&self, id: Uuid, averages: &CompetencyAverages) -> StorageResult<WriteOutcome> {
            tokio::task::yield_now().await;
            self.inner.complete(id, averages).await
        }
    }

    #[async_trait]
    impl FeedbackStore for InterleavingStore {
        async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Feedback>> {
            tokio::task::yield_now().await;
            FeedbackStore::get_by_id(&self.inner, id).await
        }

        async fn find_by_evaluator_and_evaluation(
            &self,
            evaluator_id: Uuid,
            evaluation_id: Uuid,
        ) -> StorageResult<Option<Feedback>> {
            tokio::task::yield_now().await;
            self.inner
                .find_by_evaluator_and_evaluation(evaluator_id, evaluation_id)
                .await
        }

        async fn find_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Feedback>> {
            tokio::task::yield_now().await;
            FeedbackStore::find_by_ids(&self.inner, ids).await
        }

        async fn submit(&self, feedback: Feedback) -> StorageResult<Feedback> {
            tokio::task::yield_now().await;
            self.inner.submit(feedback).await
        }
    }

    #[async_trait]
    impl EmployeeDirectory for InterleavingStore {
        async fn find_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Employee>> {
            tokio::task::yield_now().await;
            EmployeeDirectory::find_by_ids(&self.inner, ids).await
        }
    }

    struct Fixture {
        service: LifecycleService,
        owner: Uuid,
        evaluated: Uuid,
        evaluators: Vec<Uuid>,
        outsider: Uuid,
    }

    fn fixture() -> Fixture {
        let employees = seed::demo_employees().unwrap();
        let ids: Vec<Uuid> = employees.iter().map(|e| e.id).collect();
        let store = Arc::new(InterleavingStore {
            inner: MemoryStore::with_employees(employees),
        });
        Fixture {
            service: LifecycleService::from_store(store),
            owner: ids[0],
            evaluated: ids[1],
            evaluators: vec![ids[2], ids[3]],
            outsider: ids[4],
        }
    }

    fn questions() -> Vec<QuestionInput> {
        vec![
            QuestionInput {
                kind: Some("scale".to_string()),
                text: Some("How clearly are decisions communicated?".to_string()),
                competency: Some("Communication".to_string()),
            },
            QuestionInput {
                kind: Some("open".to_string()),
                text: Some("What should continue?".to_string()),
                competency: None,
            },
        ]
    }

    impl Fixture {
        fn create_request(&self) -> CreateEvaluationRequest {
            CreateEvaluationRequest {
                name: Some("Q3 review".to_string()),
                description: Some("Quarterly 360 review".to_string()),
                employee_id: Some(self.owner.to_string()),
                evaluated_id: Some(self.evaluated.to_string()),
                evaluator_ids: Some(self.evaluators.iter().map(Uuid::to_string).collect()),
                start_date: Some("2025-07-01".to_string()),
                end_date: Some("2025-07-15T17:00:00Z".to_string()),
                questions: Some(questions()),
            }
        }

        fn update_request(&self, status: &str, evaluators: &[Uuid]) -> UpdateEvaluationRequest {
            UpdateEvaluationRequest {
                name: Some("Q3 review (extended)".to_string()),
                description: Some("Quarterly 360 review".to_string()),
                evaluator_ids: Some(evaluators.iter().map(Uuid::to_string).collect()),
                start_date: Some("2025-07-01".to_string()),
                end_date: Some("2025-07-31".to_string()),
                status: Some(status.to_string()),
                questions: Some(questions()),
            }
        }

        async fn create(&self) -> Evaluation {
            self.service
                .create_evaluation(self.create_request())
                .await
                .unwrap()
        }

        async fn submit(&self, evaluation: Uuid, evaluator: Uuid, scores: &[(&str, f64)]) -> LifecycleResult<Feedback> {
            self.service
                .submit_feedback(feedback_request(evaluation, evaluator, scores))
                .await
        }

        async fn submit_all(&self, evaluation: Uuid) {
            for evaluator in &self.evaluators {
                self.submit(evaluation, *evaluator, &[("Communication", 4.0)])
                    .await
                    .unwrap();
            }
        }
    }

    fn feedback_request(evaluation: Uuid, evaluator: Uuid, scores: &[(&str, f64)]) -> SubmitFeedbackRequest {
        SubmitFeedbackRequest {
            evaluator_id: Some(evaluator.to_string()),
            evaluation_id: Some(evaluation.to_string()),
            comment: Some("Consistently helpful in reviews".to_string()),
            rating: Some(4.0),
            competency_scores: Some(
                scores
                    .iter()
                    .map(|(k, v)| (k.to_string(), *v))
                    .collect::<BTreeMap<_, _>>(),
            ),
        }
    }

    #[tokio::test]
    async fn create_starts_pending_without_feedback() {
        let fx = fixture();
        let evaluation = fx.create().await;

        assert_eq!(evaluation.status, EvaluationStatus::Pending);
        assert!(evaluation.feedback_ids.is_empty());
        assert_eq!(evaluation.evaluator_ids, fx.evaluators);
        assert_eq!(evaluation.questions.len(), 2);
        assert_eq!(evaluation.questions[1].competency, None);
    }

    #[tokio::test]
    async fn create_rejects_start_not_before_end() {
        let fx = fixture();
        let mut req = fx.create_request();
        req.start_date = Some("2025-07-15".to_string());
        req.end_date = Some("2025-07-15".to_string());

        let err = fx.service.create_evaluation(req).await.unwrap_err();
        match err {
            LifecycleError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.field == "end_date"))
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(fx.service.list_by_employee(fx.owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_scale_question_without_competency() {
        let fx = fixture();
        let mut req = fx.create_request();
        req.questions = Some(vec![QuestionInput {
            kind: Some("scale".to_string()),
            text: Some("Rate collaboration".to_string()),
            competency: Some("  ".to_string()),
        }]);

        let err = fx.service.create_evaluation(req).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation(ref errors) if errors[0].field == "questions[0].competency"
        ));
    }

    #[tokio::test]
    async fn create_rejects_unknown_employee() {
        let fx = fixture();
        let stranger = Uuid::new_v4();
        let mut req = fx.create_request();
        req.evaluator_ids = Some(vec![fx.evaluators[0].to_string(), stranger.to_string()]);

        let err = fx.service.create_evaluation(req).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::NotFound { entity: "employee", id } if id == stranger
        ));
    }

    #[tokio::test]
    async fn missing_evaluation_is_not_found() {
        let fx = fixture();
        let err = fx.service.get_evaluation(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { entity: "evaluation", .. }));

        let err = fx.service.get_feedback(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { entity: "feedback", .. }));
    }

    #[tokio::test]
    async fn details_resolve_employee_names() {
        let fx = fixture();
        let evaluation = fx.create().await;
        let fb = fx
            .submit(evaluation.id, fx.evaluators[0], &[("Communication", 5.0)])
            .await
            .unwrap();

        let details = fx.service.get_evaluation(evaluation.id).await.unwrap();
        assert_eq!(details.employee_id.id, fx.owner);
        assert!(details.employee_id.first_name.is_some());
        assert_eq!(details.evaluator_ids.len(), 2);
        assert!(details.evaluator_ids.iter().all(|r| r.last_name.is_some()));
        assert_eq!(details.feedback_ids.len(), 1);
        assert_eq!(details.feedback_ids[0].id, fb.id);
        assert_eq!(details.feedback_ids[0].evaluator_id.id, fx.evaluators[0]);
        assert!(details.feedback_ids[0].evaluator_id.first_name.is_some());
    }

    #[tokio::test]
    async fn second_submission_is_already_submitted() {
        let fx = fixture();
        let evaluation = fx.create().await;
        let first = fx
            .submit(evaluation.id, fx.evaluators[0], &[("Communication", 4.0)])
            .await
            .unwrap();
        assert!(first.replied);

        let err = fx
            .submit(evaluation.id, fx.evaluators[0], &[("Communication", 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadySubmitted { .. }));

        let stored = fx.service.get_evaluation(evaluation.id).await.unwrap();
        assert_eq!(stored.feedback_ids.len(), 1);
    }

    #[tokio::test]
    async fn feedback_for_missing_evaluation_is_not_found() {
        let fx = fixture();
        let err = fx
            .submit(Uuid::new_v4(), fx.evaluators[0], &[("Communication", 4.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { entity: "evaluation", .. }));
    }

    #[tokio::test]
    async fn feedback_from_unassigned_employee_is_rejected() {
        let fx = fixture();
        let evaluation = fx.create().await;
        let err = fx
            .submit(evaluation.id, fx.outsider, &[("Communication", 4.0)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation(ref errors) if errors[0].field == "evaluator_id"
        ));
    }

    #[tokio::test]
    async fn racing_duplicate_submissions_admit_one() {
        let fx = fixture();
        let evaluation = fx.create().await;
        let evaluator = fx.evaluators[0];

        let (a, b) = tokio::join!(
            fx.submit(evaluation.id, evaluator, &[("Communication", 4.0)]),
            fx.submit(evaluation.id, evaluator, &[("Communication", 2.0)]),
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(LifecycleError::AlreadySubmitted { .. }))));

        let stored = fx.service.get_evaluation(evaluation.id).await.unwrap();
        assert_eq!(stored.feedback_ids.len(), 1);
    }

    #[tokio::test]
    async fn feedback_count_never_exceeds_evaluators() {
        let fx = fixture();
        let evaluation = fx.create().await;
        let (e0, e1) = (fx.evaluators[0], fx.evaluators[1]);

        let _ = tokio::join!(
            fx.submit(evaluation.id, e0, &[("Teamwork", 3.0)]),
            fx.submit(evaluation.id, e1, &[("Teamwork", 3.0)]),
            fx.submit(evaluation.id, e0, &[("Teamwork", 5.0)]),
            fx.submit(evaluation.id, e1, &[("Teamwork", 5.0)]),
        );

        let stored = fx.service.get_evaluation(evaluation.id).await.unwrap();
        assert_eq!(stored.feedback_ids.len(), stored.evaluator_ids.len());
    }

    #[tokio::test]
    async fn finalize_with_missing_feedback_leaves_status() {
        let fx = fixture();
        let evaluation = fx.create().await;
        fx.submit(evaluation.id, fx.evaluators[0], &[("Communication", 4.0)])
            .await
            .unwrap();

        let err = fx.service.finalize_evaluation(evaluation.id).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::IncompleteFeedback {
                submitted: 1,
                expected: 2
            }
        ));

        let stored = fx.service.get_evaluation(evaluation.id).await.unwrap();
        assert_eq!(stored.status, EvaluationStatus::Pending);
        assert!(stored.competency_averages.is_none());
    }

    #[tokio::test]
    async fn finalize_averages_shared_competency() {
        let fx = fixture();
        let evaluation = fx.create().await;
        fx.submit(evaluation.id, fx.evaluators[0], &[("Communication", 4.0)])
            .await
            .unwrap();
        fx.submit(evaluation.id, fx.evaluators[1], &[("Communication", 2.0)])
            .await
            .unwrap();

        let result = fx.service.finalize_evaluation(evaluation.id).await.unwrap();
        assert_eq!(result.evaluation_id, evaluation.id);
        assert_eq!(result.competency_averages["Communication"], 3.0);

        let stored = fx.service.get_evaluation(evaluation.id).await.unwrap();
        assert_eq!(stored.status, EvaluationStatus::Completed);
        assert_eq!(stored.competency_averages, Some(result.competency_averages));
        assert!(stored.finalized_at.is_some());
    }

    #[tokio::test]
    async fn finalize_keeps_distinct_competencies_apart() {
        let fx = fixture();
        let evaluation = fx.create().await;
        fx.submit(evaluation.id, fx.evaluators[0], &[("Teamwork", 5.0)])
            .await
            .unwrap();
        fx.submit(evaluation.id, fx.evaluators[1], &[("Leadership", 3.0)])
            .await
            .unwrap();

        let result = fx.service.finalize_evaluation(evaluation.id).await.unwrap();
        assert_eq!(result.competency_averages.len(), 2);
        assert_eq!(result.competency_averages["Teamwork"], 5.0);
        assert_eq!(result.competency_averages["Leadership"], 3.0);
    }

    #[tokio::test]
    async fn second_finalize_fails_without_touching_results() {
        let fx = fixture();
        let evaluation = fx.create().await;
        fx.submit_all(evaluation.id).await;
        fx.service.finalize_evaluation(evaluation.id).await.unwrap();
        let before = fx.service.get_evaluation(evaluation.id).await.unwrap();

        let err = fx.service.finalize_evaluation(evaluation.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidStateTransition(_)));

        let after = fx.service.get_evaluation(evaluation.id).await.unwrap();
        assert_eq!(after.finalized_at, before.finalized_at);
        assert_eq!(after.competency_averages, before.competency_averages);
    }

    #[tokio::test]
    async fn racing_finalizations_admit_one() {
        let fx = fixture();
        let evaluation = fx.create().await;
        fx.submit_all(evaluation.id).await;

        let (a, b) = tokio::join!(
            fx.service.finalize_evaluation(evaluation.id),
            fx.service.finalize_evaluation(evaluation.id),
        );
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(LifecycleError::InvalidStateTransition(_)))));

        let stored = fx.service.get_evaluation(evaluation.id).await.unwrap();
        assert_eq!(stored.status, EvaluationStatus::Completed);
    }

    #[tokio::test]
    async fn completed_evaluation_is_immutable() {
        let fx = fixture();
        let evaluation = fx.create().await;
        fx.submit_all(evaluation.id).await;
        fx.service.finalize_evaluation(evaluation.id).await.unwrap();

        let err = fx
            .service
            .update_evaluation(evaluation.id, fx.update_request("in_progress", &fx.evaluators))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidStateTransition(_)));

        let stored = fx.service.get_evaluation(evaluation.id).await.unwrap();
        assert_eq!(stored.name, "Q3 review");
        assert_eq!(stored.status, EvaluationStatus::Completed);
    }

    #[tokio::test]
    async fn update_follows_status_rules() {
        let fx = fixture();
        let evaluation = fx.create().await;

        let updated = fx
            .service
            .update_evaluation(evaluation.id, fx.update_request("in_progress", &fx.evaluators))
            .await
            .unwrap();
        assert_eq!(updated.status, EvaluationStatus::InProgress);
        assert_eq!(updated.name, "Q3 review (extended)");

        for status in ["pending", "completed"] {
            let err = fx
                .service
                .update_evaluation(evaluation.id, fx.update_request(status, &fx.evaluators))
                .await
                .unwrap_err();
            assert!(matches!(err, LifecycleError::InvalidStateTransition(_)));
        }

        let err = fx
            .service
            .update_evaluation(evaluation.id, fx.update_request("cancelled", &fx.evaluators))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }

    #[tokio::test]
    async fn update_missing_evaluation_is_not_found() {
        let fx = fixture();
        let err = fx
            .service
            .update_evaluation(Uuid::new_v4(), fx.update_request("pending", &fx.evaluators))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { entity: "evaluation", .. }));
    }

    #[tokio::test]
    async fn update_keeps_evaluators_who_submitted() {
        let fx = fixture();
        let evaluation = fx.create().await;
        fx.submit(evaluation.id, fx.evaluators[0], &[("Communication", 4.0)])
            .await
            .unwrap();

        let err = fx
            .service
            .update_evaluation(evaluation.id, fx.update_request("pending", &[fx.evaluators[1]]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation(ref errors) if errors[0].field == "evaluator_ids"
        ));

        let swapped = fx
            .service
            .update_evaluation(
                evaluation.id,
                fx.update_request("pending", &[fx.evaluators[0], fx.outsider]),
            )
            .await
            .unwrap();
        assert_eq!(swapped.evaluator_ids, vec![fx.evaluators[0], fx.outsider]);
    }

    #[tokio::test]
    async fn racing_update_and_submission_keep_authors_assigned() {
        let fx = fixture();
        let evaluation = fx.create().await;
        let (kept, dropped) = (fx.evaluators[0], fx.evaluators[1]);
        fx.submit(evaluation.id, kept, &[("Communication", 4.0)])
            .await
            .unwrap();

        let (updated, submitted) = tokio::join!(
            fx.service
                .update_evaluation(evaluation.id, fx.update_request("pending", &[kept])),
            fx.submit(evaluation.id, dropped, &[("Communication", 2.0)]),
        );
        assert_ne!(updated.is_ok(), submitted.is_ok());
        match (&updated, &submitted) {
            (Ok(_), Err(LifecycleError::Validation(errors))) => {
                assert_eq!(errors[0].field, "evaluator_id")
            }
            (Err(LifecycleError::Validation(errors)), Ok(_)) => {
                assert_eq!(errors[0].field, "evaluator_ids")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let stored = fx.service.get_evaluation(evaluation.id).await.unwrap();
        assert!(stored.feedback_ids.len() <= stored.evaluator_ids.len());
        assert!(stored
            .feedback_ids
            .iter()
            .all(|f| stored.evaluator_ids.iter().any(|e| e.id == f.evaluator_id.id)));
        fx.service.finalize_evaluation(evaluation.id).await.unwrap();
    }

    #[tokio::test]
    async fn feedback_on_completed_evaluation_is_rejected() {
        let fx = fixture();
        let mut req = fx.create_request();
        req.evaluator_ids = Some(vec![fx.evaluators[0].to_string()]);
        let evaluation = fx.service.create_evaluation(req).await.unwrap();
        fx.submit(evaluation.id, fx.evaluators[0], &[("Communication", 4.0)])
            .await
            .unwrap();
        fx.service.finalize_evaluation(evaluation.id).await.unwrap();

        let err = fx
            .submit(evaluation.id, fx.evaluators[0], &[("Communication", 4.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidStateTransition(_)));
    }

    #[tokio::test]
    async fn lists_by_creator_and_by_evaluator() {
        let fx = fixture();
        let first = fx.create().await;
        let mut req = fx.create_request();
        req.name = Some("Q4 review".to_string());
        req.evaluator_ids = Some(vec![fx.evaluators[1].to_string()]);
        let second = fx.service.create_evaluation(req).await.unwrap();

        let created: Vec<Uuid> = fx
            .service
            .list_by_employee(fx.owner)
            .await
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(created, vec![first.id, second.id]);

        let assigned = fx.service.list_by_evaluator(fx.evaluators[0]).await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, first.id);
        assert!(fx.service.list_by_employee(fx.outsider).await.unwrap().is_empty());
    }
}

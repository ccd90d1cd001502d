//! In-memory backend for all three storage capabilities.
//!
//! One mutex guards employees, evaluations and feedback together, so every
//! trait method is a single atomic step. Insertion order is kept for list
//! queries.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::db::{
    EmployeeDirectory, EvaluationStore, FeedbackStore, StorageError, StorageResult, WriteOutcome,
};
use crate::domain::models::{
    CompetencyAverages, Employee, Evaluation, EvaluationChanges, EvaluationStatus, Feedback,
    NewEvaluation,
};

#[derive(Debug, Default)]
struct Inner {
    employees: HashMap<Uuid, Employee>,
    evaluations: Vec<Evaluation>,
    feedback: Vec<Feedback>,
}

impl Inner {
    fn evaluation_mut(&mut self, id: Uuid) -> Option<&mut Evaluation> {
        self.evaluations.iter_mut().find(|e| e.id == id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_employees(employees: impl IntoIterator<Item = Employee>) -> Self {
        let store = Self::new();
        for employee in employees {
            store.insert_employee(employee);
        }
        store
    }

    pub fn insert_employee(&self, employee: Employee) {
        self.lock().employees.insert(employee.id, employee);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EvaluationStore for MemoryStore {
    async fn create(&self, new: NewEvaluation) -> StorageResult<Evaluation> {
        let now = Utc::now();
        let evaluation = Evaluation {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
            employee_id: new.employee_id,
            evaluated_id: new.evaluated_id,
            evaluator_ids: new.evaluator_ids,
            start_date: new.start_date,
            end_date: new.end_date,
            status: EvaluationStatus::Pending,
            questions: new.questions,
            feedback_ids: Vec::new(),
            competency_averages: None,
            finalized_at: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().evaluations.push(evaluation.clone());
        Ok(evaluation)
    }

    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Evaluation>> {
        Ok(self.lock().evaluations.iter().find(|e| e.id == id).cloned())
    }

    async fn update(&self, id: Uuid, changes: EvaluationChanges) -> StorageResult<WriteOutcome> {
        let mut inner = self.lock();
        let Inner {
            evaluations,
            feedback: records,
            ..
        } = &mut *inner;

        let Some(evaluation) = evaluations.iter_mut().find(|e| e.id == id) else {
            return Ok(WriteOutcome::NotFound);
        };
        let drops_author = records.iter().any(|f| {
            evaluation.feedback_ids.contains(&f.id) && !changes.evaluator_ids.contains(&f.evaluator_id)
        });
        if evaluation.is_completed() || drops_author {
            return Ok(WriteOutcome::Rejected(evaluation.clone()));
        }
        evaluation.name = changes.name;
        evaluation.description = changes.description;
        evaluation.evaluator_ids = changes.evaluator_ids;
        evaluation.start_date = changes.start_date;
        evaluation.end_date = changes.end_date;
        evaluation.status = changes.status;
        evaluation.questions = changes.questions;
        evaluation.updated_at = Utc::now();
        Ok(WriteOutcome::Applied(evaluation.clone()))
    }

    async fn find_by_employee(&self, employee_id: Uuid) -> StorageResult<Vec<Evaluation>> {
        Ok(self
            .lock()
            .evaluations
            .iter()
            .filter(|e| e.employee_id == employee_id)
            .cloned()
            .collect())
    }

    async fn find_by_evaluator(&self, evaluator_id: Uuid) -> StorageResult<Vec<Evaluation>> {
        Ok(self
            .lock()
            .evaluations
            .iter()
            .filter(|e| e.has_evaluator(evaluator_id))
            .cloned()
            .collect())
    }

    async fn complete(&self, id: Uuid, averages: &CompetencyAverages) -> StorageResult<WriteOutcome> {
        let mut inner = self.lock();
        let Some(evaluation) = inner.evaluation_mut(id) else {
            return Ok(WriteOutcome::NotFound);
        };
        if evaluation.is_completed() || !evaluation.all_feedback_received() {
            return Ok(WriteOutcome::Rejected(evaluation.clone()));
        }
        let now = Utc::now();
        evaluation.status = EvaluationStatus::Completed;
        evaluation.competency_averages = Some(averages.clone());
        evaluation.finalized_at = Some(now);
        evaluation.updated_at = now;
        Ok(WriteOutcome::Applied(evaluation.clone()))
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Feedback>> {
        Ok(self.lock().feedback.iter().find(|f| f.id == id).cloned())
    }

    async fn find_by_evaluator_and_evaluation(
        &self,
        evaluator_id: Uuid,
        evaluation_id: Uuid,
    ) -> StorageResult<Option<Feedback>> {
        Ok(self
            .lock()
            .feedback
            .iter()
            .find(|f| f.evaluator_id == evaluator_id && f.evaluation_id == evaluation_id)
            .cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Feedback>> {
        let inner = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| inner.feedback.iter().find(|f| f.id == *id).cloned())
            .collect())
    }

    async fn submit(&self, feedback: Feedback) -> StorageResult<Feedback> {
        let mut inner = self.lock();
        let Inner {
            evaluations,
            feedback: records,
            ..
        } = &mut *inner;

        let evaluation = evaluations
            .iter_mut()
            .find(|e| e.id == feedback.evaluation_id)
            .ok_or(StorageError::EvaluationNotFound {
                evaluation_id: feedback.evaluation_id,
            })?;
        if !evaluation.has_evaluator(feedback.evaluator_id) {
            return Err(StorageError::EvaluatorNotAssigned {
                evaluator_id: feedback.evaluator_id,
                evaluation_id: feedback.evaluation_id,
            });
        }

        let existing = records
            .iter()
            .position(|f| {
                f.evaluator_id == feedback.evaluator_id && f.evaluation_id == feedback.evaluation_id
            });
        if let Some(idx) = existing {
            if records[idx].replied {
                return Err(StorageError::DuplicateSubmission {
                    evaluator_id: feedback.evaluator_id,
                    evaluation_id: feedback.evaluation_id,
                });
            }
        }

        let superseded = existing.map(|idx| records[idx].id);
        let refs_after = evaluation
            .feedback_ids
            .iter()
            .filter(|id| Some(**id) != superseded)
            .count()
            + 1;
        if evaluation.is_completed() || refs_after > evaluation.evaluator_ids.len() {
            return Err(StorageError::EvaluationClosed {
                evaluation_id: evaluation.id,
            });
        }

        if let Some(old_id) = superseded {
            records.retain(|f| f.id != old_id);
            evaluation.feedback_ids.retain(|id| *id != old_id);
        }
        records.push(feedback.clone());
        evaluation.feedback_ids.push(feedback.id);
        evaluation.updated_at = Utc::now();
        Ok(feedback)
    }
}

#[async_trait]
impl EmployeeDirectory for MemoryStore {
    async fn find_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Employee>> {
        let inner = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| inner.employees.get(id).cloned())
            .collect())
    }
}

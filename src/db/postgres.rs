use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool, Row};
use uuid::Uuid;

use crate::db::{
    EmployeeDirectory, EvaluationStore, FeedbackStore, StorageError, StorageResult, WriteOutcome,
};
use crate::domain::models::{
    CompetencyAverages, CompetencyScores, Employee, Evaluation, EvaluationChanges,
    EvaluationStatus, Feedback, NewEvaluation, Question,
};

const EVALUATION_COLUMNS: &str = r#"
    id, name, description, employee_id, evaluated_id, evaluator_ids,
    start_date, end_date, status, questions, feedback_ids,
    competency_averages, finalized_at, created_at, updated_at
"#;

const FEEDBACK_COLUMNS: &str = r#"
    id, evaluator_id, evaluation_id, comment, rating, competency_scores, date, replied
"#;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(FromRow)]
struct EvaluationRow {
    id: Uuid,
    name: String,
    description: String,
    employee_id: Uuid,
    evaluated_id: Uuid,
    evaluator_ids: Vec<Uuid>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    status: EvaluationStatus,
    questions: Json<Vec<Question>>,
    feedback_ids: Vec<Uuid>,
    competency_averages: Option<Json<CompetencyAverages>>,
    finalized_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EvaluationRow> for Evaluation {
    fn from(row: EvaluationRow) -> Self {
        Evaluation {
            id: row.id,
            name: row.name,
            description: row.description,
            employee_id: row.employee_id,
            evaluated_id: row.evaluated_id,
            evaluator_ids: row.evaluator_ids,
            start_date: row.start_date,
            end_date: row.end_date,
            status: row.status,
            questions: row.questions.0,
            feedback_ids: row.feedback_ids,
            competency_averages: row.competency_averages.map(|j| j.0),
            finalized_at: row.finalized_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct FeedbackRow {
    id: Uuid,
    evaluator_id: Uuid,
    evaluation_id: Uuid,
    comment: String,
    rating: i16,
    competency_scores: Json<CompetencyScores>,
    date: DateTime<Utc>,
    replied: bool,
}

impl From<FeedbackRow> for Feedback {
    fn from(row: FeedbackRow) -> Self {
        Feedback {
            id: row.id,
            evaluator_id: row.evaluator_id,
            evaluation_id: row.evaluation_id,
            comment: row.comment,
            rating: row.rating,
            competency_scores: row.competency_scores.0,
            date: row.date,
            replied: row.replied,
        }
    }
}

/// Postgres-backed store. Arrays hold evaluator and feedback references;
/// writes that touch them lock the evaluation row first.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_evaluation(&self, id: Uuid) -> StorageResult<Option<Evaluation>> {
        let sql = format!("SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE id = $1");
        let row = sqlx::query_as::<_, EvaluationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Evaluation::from))
    }

    /// Outcome for a guarded write that matched no row.
    async fn rejected_or_missing(&self, id: Uuid) -> StorageResult<WriteOutcome> {
        Ok(match self.fetch_evaluation(id).await? {
            Some(current) => WriteOutcome::Rejected(current),
            None => WriteOutcome::NotFound,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[async_trait]
impl EvaluationStore for PgStore {
    async fn create(&self, new: NewEvaluation) -> StorageResult<Evaluation> {
        let sql = format!(
            r#"
            INSERT INTO evaluations
                (id, name, description, employee_id, evaluated_id, evaluator_ids,
                 start_date, end_date, status, questions)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9)
            RETURNING {EVALUATION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, EvaluationRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.description)
            .bind(new.employee_id)
            .bind(new.evaluated_id)
            .bind(&new.evaluator_ids)
            .bind(new.start_date)
            .bind(new.end_date)
            .bind(Json(&new.questions))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Evaluation>> {
        self.fetch_evaluation(id).await
    }

    async fn update(&self, id: Uuid, changes: EvaluationChanges) -> StorageResult<WriteOutcome> {
        let mut tx = self.pool.begin().await?;

        // Same row lock as `submit`, so no feedback can attach mid-update.
        let locked: Option<(EvaluationStatus, Vec<Uuid>)> = sqlx::query_as(
            "SELECT status, feedback_ids FROM evaluations WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((status, feedback_ids)) = locked else {
            return Ok(WriteOutcome::NotFound);
        };

        let drops_author: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM feedback
                WHERE id = ANY($1)
                  AND NOT (evaluator_id = ANY($2))
            )
            "#,
        )
        .bind(&feedback_ids)
        .bind(&changes.evaluator_ids)
        .fetch_one(&mut *tx)
        .await?;

        if status == EvaluationStatus::Completed || drops_author {
            drop(tx);
            return self.rejected_or_missing(id).await;
        }

        let sql = format!(
            r#"
            UPDATE evaluations
            SET name = $2,
                description = $3,
                evaluator_ids = $4,
                start_date = $5,
                end_date = $6,
                status = $7,
                questions = $8,
                updated_at = now()
            WHERE id = $1
            RETURNING {EVALUATION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, EvaluationRow>(&sql)
            .bind(id)
            .bind(&changes.name)
            .bind(&changes.description)
            .bind(&changes.evaluator_ids)
            .bind(changes.start_date)
            .bind(changes.end_date)
            .bind(changes.status)
            .bind(Json(&changes.questions))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(WriteOutcome::Applied(row.into()))
    }

    async fn find_by_employee(&self, employee_id: Uuid) -> StorageResult<Vec<Evaluation>> {
        let sql = format!(
            "SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE employee_id = $1 ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, EvaluationRow>(&sql)
            .bind(employee_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Evaluation::from).collect())
    }

    async fn find_by_evaluator(&self, evaluator_id: Uuid) -> StorageResult<Vec<Evaluation>> {
        let sql = format!(
            "SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE $1 = ANY(evaluator_ids) ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, EvaluationRow>(&sql)
            .bind(evaluator_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Evaluation::from).collect())
    }

    async fn complete(&self, id: Uuid, averages: &CompetencyAverages) -> StorageResult<WriteOutcome> {
        let sql = format!(
            r#"
            UPDATE evaluations
            SET status = 'completed',
                competency_averages = $2,
                finalized_at = now(),
                updated_at = now()
            WHERE id = $1
              AND status <> 'completed'
              AND cardinality(feedback_ids) = cardinality(evaluator_ids)
            RETURNING {EVALUATION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, EvaluationRow>(&sql)
            .bind(id)
            .bind(Json(averages))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(WriteOutcome::Applied(row.into())),
            None => self.rejected_or_missing(id).await,
        }
    }
}

#[async_trait]
impl FeedbackStore for PgStore {
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Feedback>> {
        let sql = format!("SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE id = $1");
        let row = sqlx::query_as::<_, FeedbackRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Feedback::from))
    }

    async fn find_by_evaluator_and_evaluation(
        &self,
        evaluator_id: Uuid,
        evaluation_id: Uuid,
    ) -> StorageResult<Option<Feedback>> {
        let sql = format!(
            r#"
            SELECT {FEEDBACK_COLUMNS}
            FROM feedback
            WHERE evaluator_id = $1 AND evaluation_id = $2
            ORDER BY replied DESC, date DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, FeedbackRow>(&sql)
            .bind(evaluator_id)
            .bind(evaluation_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Feedback::from))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Feedback>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, FeedbackRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        let mut by_id: HashMap<Uuid, Feedback> = rows
            .into_iter()
            .map(|row| (row.id, Feedback::from(row)))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn submit(&self, feedback: Feedback) -> StorageResult<Feedback> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes submissions for the same evaluation.
        let locked = sqlx::query(
            r#"
            SELECT status,
                   cardinality(evaluator_ids) AS evaluators,
                   $2 = ANY(evaluator_ids) AS assigned,
                   feedback_ids
            FROM evaluations
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(feedback.evaluation_id)
        .bind(feedback.evaluator_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StorageError::EvaluationNotFound {
            evaluation_id: feedback.evaluation_id,
        })?;

        let status: EvaluationStatus = locked.try_get("status")?;
        let evaluators: i32 = locked.try_get("evaluators")?;
        let assigned: bool = locked.try_get("assigned")?;
        let feedback_ids: Vec<Uuid> = locked.try_get("feedback_ids")?;

        if !assigned {
            return Err(StorageError::EvaluatorNotAssigned {
                evaluator_id: feedback.evaluator_id,
                evaluation_id: feedback.evaluation_id,
            });
        }

        let existing: Option<(Uuid, bool)> = sqlx::query_as(
            r#"
            SELECT id, replied
            FROM feedback
            WHERE evaluator_id = $1 AND evaluation_id = $2
            ORDER BY replied DESC
            LIMIT 1
            "#,
        )
        .bind(feedback.evaluator_id)
        .bind(feedback.evaluation_id)
        .fetch_optional(&mut *tx)
        .await?;

        if matches!(existing, Some((_, true))) {
            return Err(StorageError::DuplicateSubmission {
                evaluator_id: feedback.evaluator_id,
                evaluation_id: feedback.evaluation_id,
            });
        }

        let superseded = existing.map(|(id, _)| id);
        let refs_after = feedback_ids
            .iter()
            .filter(|id| Some(**id) != superseded)
            .count()
            + 1;
        let capacity = usize::try_from(evaluators).map_err(|_| {
            StorageError::Corrupt(format!(
                "evaluation {} has evaluator count {}",
                feedback.evaluation_id, evaluators
            ))
        })?;
        if status == EvaluationStatus::Completed || refs_after > capacity {
            return Err(StorageError::EvaluationClosed {
                evaluation_id: feedback.evaluation_id,
            });
        }

        if let Some(old_id) = superseded {
            sqlx::query("DELETE FROM feedback WHERE id = $1")
                .bind(old_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE evaluations SET feedback_ids = array_remove(feedback_ids, $2) WHERE id = $1",
            )
            .bind(feedback.evaluation_id)
            .bind(old_id)
            .execute(&mut *tx)
            .await?;
            tracing::info!(
                "Superseded unreplied feedback {} for evaluation {}",
                old_id,
                feedback.evaluation_id
            );
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO feedback
                (id, evaluator_id, evaluation_id, comment, rating, competency_scores, date, replied)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(feedback.id)
        .bind(feedback.evaluator_id)
        .bind(feedback.evaluation_id)
        .bind(&feedback.comment)
        .bind(feedback.rating)
        .bind(Json(&feedback.competency_scores))
        .bind(feedback.date)
        .bind(feedback.replied)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(StorageError::DuplicateSubmission {
                    evaluator_id: feedback.evaluator_id,
                    evaluation_id: feedback.evaluation_id,
                });
            }
            return Err(err.into());
        }

        sqlx::query(
            r#"
            UPDATE evaluations
            SET feedback_ids = array_append(feedback_ids, $2),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(feedback.evaluation_id)
        .bind(feedback.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(feedback)
    }
}

#[async_trait]
impl EmployeeDirectory for PgStore {
    async fn find_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Employee>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let employees = sqlx::query_as::<_, Employee>(
            r#"
            SELECT
                id,
                first_name,
                last_name,
                email,
                role,
                active,
                hire_date,
                created_at,
                updated_at
            FROM employees
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(employees)
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-competency averages keyed by competency label.
pub type CompetencyAverages = BTreeMap<String, f64>;

/// Raw per-competency scores submitted by one evaluator.
pub type CompetencyScores = BTreeMap<String, f64>;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "employee_role")]
pub enum EmployeeRole {
    Admin,
    Manager,
    Employee,
}

/// Identity-store record. Read-only from the lifecycle's point of view.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Employee {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: EmployeeRole,
    pub active: bool,
    pub hire_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Open,
    Scale,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Open => "open",
            QuestionType::Scale => "scale",
        }
    }
}

impl TryFrom<&str> for QuestionType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "open" => Ok(QuestionType::Open),
            "scale" => Ok(QuestionType::Scale),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub text: String,
    /// Always present for scale questions, always absent for open ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competency: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "evaluation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pending,
    #[serde(alias = "in progress", alias = "in-progress")]
    InProgress,
    Completed,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Pending => "pending",
            EvaluationStatus::InProgress => "in_progress",
            EvaluationStatus::Completed => "completed",
        }
    }

    /// Whether an update call may move an evaluation from `self` to `next`.
    /// Completion is reserved for finalization and nothing leaves it.
    pub fn can_update_to(&self, next: EvaluationStatus) -> bool {
        matches!(
            (self, next),
            (EvaluationStatus::Pending, EvaluationStatus::Pending)
                | (EvaluationStatus::Pending, EvaluationStatus::InProgress)
                | (EvaluationStatus::InProgress, EvaluationStatus::InProgress)
        )
    }
}

impl TryFrom<&str> for EvaluationStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Ok(EvaluationStatus::Pending),
            "in_progress" | "in progress" | "in-progress" => Ok(EvaluationStatus::InProgress),
            "completed" => Ok(EvaluationStatus::Completed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One feedback cycle for an evaluated employee.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub employee_id: Uuid,
    pub evaluated_id: Uuid,
    pub evaluator_ids: Vec<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: EvaluationStatus,
    pub questions: Vec<Question>,
    pub feedback_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competency_averages: Option<CompetencyAverages>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn is_completed(&self) -> bool {
        self.status == EvaluationStatus::Completed
    }

    pub fn has_evaluator(&self, employee_id: Uuid) -> bool {
        self.evaluator_ids.contains(&employee_id)
    }

    /// Every assigned evaluator has a feedback reference.
    pub fn all_feedback_received(&self) -> bool {
        self.feedback_ids.len() == self.evaluator_ids.len()
    }
}

/// Validated input for a new evaluation.
#[derive(Clone, Debug)]
pub struct NewEvaluation {
    pub name: String,
    pub description: String,
    pub employee_id: Uuid,
    pub evaluated_id: Uuid,
    pub evaluator_ids: Vec<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub questions: Vec<Question>,
}

/// Validated full replacement of an evaluation's mutable fields.
#[derive(Clone, Debug)]
pub struct EvaluationChanges {
    pub name: String,
    pub description: String,
    pub evaluator_ids: Vec<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: EvaluationStatus,
    pub questions: Vec<Question>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub evaluator_id: Uuid,
    pub evaluation_id: Uuid,
    pub comment: String,
    pub rating: i16,
    pub competency_scores: CompetencyScores,
    pub date: DateTime<Utc>,
    /// Final and immutable once set.
    pub replied: bool,
}

/// Validated feedback submission, before an id and timestamp are assigned.
#[derive(Clone, Debug)]
pub struct NewFeedback {
    pub evaluator_id: Uuid,
    pub evaluation_id: Uuid,
    pub comment: String,
    pub rating: i16,
    pub competency_scores: CompetencyScores,
}

impl NewFeedback {
    pub fn into_feedback(self, replied: bool) -> Feedback {
        Feedback {
            id: Uuid::new_v4(),
            evaluator_id: self.evaluator_id,
            evaluation_id: self.evaluation_id,
            comment: self.comment,
            rating: self.rating,
            competency_scores: self.competency_scores,
            date: Utc::now(),
            replied,
        }
    }
}

/// Employee reference resolved at read time for display.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmployeeRef {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl EmployeeRef {
    pub fn unresolved(id: Uuid) -> Self {
        Self {
            id,
            first_name: None,
            last_name: None,
        }
    }
}

impl From<&Employee> for EmployeeRef {
    fn from(employee: &Employee) -> Self {
        Self {
            id: employee.id,
            first_name: Some(employee.first_name.clone()),
            last_name: Some(employee.last_name.clone()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub id: Uuid,
    pub evaluator_id: EmployeeRef,
    pub comment: String,
    pub rating: i16,
    pub competency_scores: CompetencyScores,
    pub date: DateTime<Utc>,
}

/// Evaluation with every employee and feedback reference joined in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationDetails {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub employee_id: EmployeeRef,
    pub evaluated_id: EmployeeRef,
    pub evaluator_ids: Vec<EmployeeRef>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: EvaluationStatus,
    pub questions: Vec<Question>,
    pub feedback_ids: Vec<FeedbackSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competency_averages: Option<CompetencyAverages>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinalizedEvaluation {
    pub evaluation_id: Uuid,
    pub competency_averages: CompetencyAverages,
}

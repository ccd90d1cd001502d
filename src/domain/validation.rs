//! Request shapes for the lifecycle operations and the pure validators that
//! turn them into typed domain input.
//!
//! Every validator collects all problems instead of stopping at the first one,
//! so a client gets one `{field, message}` entry per broken constraint.

use crate::domain::models::{
    CompetencyScores, EvaluationChanges, EvaluationStatus, NewEvaluation, NewFeedback, Question,
    QuestionType,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 5.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct QuestionInput {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
    pub competency: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreateEvaluationRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub employee_id: Option<String>,
    pub evaluated_id: Option<String>,
    pub evaluator_ids: Option<Vec<String>>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub questions: Option<Vec<QuestionInput>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateEvaluationRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub evaluator_ids: Option<Vec<String>>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub questions: Option<Vec<QuestionInput>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmitFeedbackRequest {
    pub evaluator_id: Option<String>,
    pub evaluation_id: Option<String>,
    pub comment: Option<String>,
    pub rating: Option<f64>,
    pub competency_scores: Option<BTreeMap<String, f64>>,
}

pub fn validate_create_evaluation(
    req: &CreateEvaluationRequest,
) -> Result<NewEvaluation, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name = required_text(&mut errors, "name", req.name.as_deref());
    let description = required_text(&mut errors, "description", req.description.as_deref());
    let employee_id = required_id(&mut errors, "employee_id", req.employee_id.as_deref());
    let evaluated_id = required_id(&mut errors, "evaluated_id", req.evaluated_id.as_deref());
    let evaluator_ids = evaluator_list(&mut errors, req.evaluator_ids.as_deref());
    let dates = date_range(&mut errors, req.start_date.as_deref(), req.end_date.as_deref());
    let questions = question_list(&mut errors, req.questions.as_deref());

    if !errors.is_empty() {
        return Err(errors);
    }

    match (name, description, employee_id, evaluated_id, evaluator_ids, dates, questions) {
        (
            Some(name),
            Some(description),
            Some(employee_id),
            Some(evaluated_id),
            Some(evaluator_ids),
            Some((start_date, end_date)),
            Some(questions),
        ) => Ok(NewEvaluation {
            name,
            description,
            employee_id,
            evaluated_id,
            evaluator_ids,
            start_date,
            end_date,
            questions,
        }),
        _ => Err(vec![FieldError::new("body", "incomplete evaluation")]),
    }
}

pub fn validate_update_evaluation(
    req: &UpdateEvaluationRequest,
) -> Result<EvaluationChanges, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name = required_text(&mut errors, "name", req.name.as_deref());
    let description = required_text(&mut errors, "description", req.description.as_deref());
    let evaluator_ids = evaluator_list(&mut errors, req.evaluator_ids.as_deref());
    let dates = date_range(&mut errors, req.start_date.as_deref(), req.end_date.as_deref());
    let status = status_value(&mut errors, req.status.as_deref());
    let questions = question_list(&mut errors, req.questions.as_deref());

    if !errors.is_empty() {
        return Err(errors);
    }

    match (name, description, evaluator_ids, dates, status, questions) {
        (
            Some(name),
            Some(description),
            Some(evaluator_ids),
            Some((start_date, end_date)),
            Some(status),
            Some(questions),
        ) => Ok(EvaluationChanges {
            name,
            description,
            evaluator_ids,
            start_date,
            end_date,
            status,
            questions,
        }),
        _ => Err(vec![FieldError::new("body", "incomplete evaluation")]),
    }
}

pub fn validate_submit_feedback(req: &SubmitFeedbackRequest) -> Result<NewFeedback, Vec<FieldError>> {
    let mut errors = Vec::new();

    let evaluator_id = required_id(&mut errors, "evaluator_id", req.evaluator_id.as_deref());
    let evaluation_id = required_id(&mut errors, "evaluation_id", req.evaluation_id.as_deref());
    let comment = required_text(&mut errors, "comment", req.comment.as_deref());

    let rating = match req.rating {
        None => {
            errors.push(FieldError::new("rating", "rating is required"));
            None
        }
        Some(value) if value.fract() != 0.0 || !(MIN_SCORE..=MAX_SCORE).contains(&value) => {
            errors.push(FieldError::new("rating", "rating must be an integer between 1 and 5"));
            None
        }
        Some(value) => Some(value as i16),
    };

    let competency_scores = match &req.competency_scores {
        None => {
            errors.push(FieldError::new(
                "competency_scores",
                "competency_scores is required",
            ));
            None
        }
        Some(scores) => score_map(&mut errors, scores),
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    match (evaluator_id, evaluation_id, comment, rating, competency_scores) {
        (
            Some(evaluator_id),
            Some(evaluation_id),
            Some(comment),
            Some(rating),
            Some(competency_scores),
        ) => Ok(NewFeedback {
            evaluator_id,
            evaluation_id,
            comment,
            rating,
            competency_scores,
        }),
        _ => Err(vec![FieldError::new("body", "incomplete feedback")]),
    }
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_wire_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn required_text(errors: &mut Vec<FieldError>, field: &str, value: Option<&str>) -> Option<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            errors.push(FieldError::new(field, format!("{field} must not be empty")));
            None
        }
    }
}

fn required_id(errors: &mut Vec<FieldError>, field: &str, value: Option<&str>) -> Option<Uuid> {
    let Some(raw) = value else {
        errors.push(FieldError::new(field, format!("{field} is required")));
        return None;
    };
    match Uuid::parse_str(raw.trim()) {
        Ok(id) => Some(id),
        Err(_) => {
            errors.push(FieldError::new(field, format!("{field} must be a valid id")));
            None
        }
    }
}

fn evaluator_list(errors: &mut Vec<FieldError>, value: Option<&[String]>) -> Option<Vec<Uuid>> {
    let raw = match value {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            errors.push(FieldError::new(
                "evaluator_ids",
                "at least one evaluator is required",
            ));
            return None;
        }
    };

    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(raw.len());
    let mut ok = true;
    for (idx, item) in raw.iter().enumerate() {
        match Uuid::parse_str(item.trim()) {
            Ok(id) if seen.insert(id) => ids.push(id),
            Ok(id) => {
                ok = false;
                errors.push(FieldError::new(
                    format!("evaluator_ids[{idx}]"),
                    format!("evaluator {id} is listed more than once"),
                ));
            }
            Err(_) => {
                ok = false;
                errors.push(FieldError::new(
                    format!("evaluator_ids[{idx}]"),
                    "evaluator id must be a valid id",
                ));
            }
        }
    }
    ok.then_some(ids)
}

fn date_range(
    errors: &mut Vec<FieldError>,
    start: Option<&str>,
    end: Option<&str>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = wire_date(errors, "start_date", start);
    let end = wire_date(errors, "end_date", end);
    let (start, end) = (start?, end?);
    if start >= end {
        errors.push(FieldError::new(
            "end_date",
            "end_date must be after start_date",
        ));
        return None;
    }
    Some((start, end))
}

fn wire_date(errors: &mut Vec<FieldError>, field: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
    let Some(raw) = value else {
        errors.push(FieldError::new(field, format!("{field} is required")));
        return None;
    };
    let parsed = parse_wire_date(raw);
    if parsed.is_none() {
        errors.push(FieldError::new(
            field,
            format!("{field} must be an ISO-8601 date"),
        ));
    }
    parsed
}

fn status_value(errors: &mut Vec<FieldError>, value: Option<&str>) -> Option<EvaluationStatus> {
    let Some(raw) = value else {
        errors.push(FieldError::new("status", "status is required"));
        return None;
    };
    match EvaluationStatus::try_from(raw) {
        Ok(status) => Some(status),
        Err(()) => {
            errors.push(FieldError::new(
                "status",
                "status must be one of pending, in_progress, completed",
            ));
            None
        }
    }
}

fn question_list(errors: &mut Vec<FieldError>, value: Option<&[QuestionInput]>) -> Option<Vec<Question>> {
    let raw = match value {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            errors.push(FieldError::new(
                "questions",
                "at least one question is required",
            ));
            return None;
        }
    };

    let before = errors.len();
    let mut questions = Vec::with_capacity(raw.len());
    for (idx, input) in raw.iter().enumerate() {
        if let Some(q) = question(errors, idx, input) {
            questions.push(q);
        }
    }
    (errors.len() == before).then_some(questions)
}

fn question(errors: &mut Vec<FieldError>, idx: usize, input: &QuestionInput) -> Option<Question> {
    let kind = match input.kind.as_deref().map(QuestionType::try_from) {
        Some(Ok(kind)) => Some(kind),
        _ => {
            errors.push(FieldError::new(
                format!("questions[{idx}].type"),
                "question type must be open or scale",
            ));
            None
        }
    };
    let text = required_text(errors, &format!("questions[{idx}].text"), input.text.as_deref());

    let competency = match kind {
        Some(QuestionType::Scale) => {
            let label = input.competency.as_deref().map(str::trim).unwrap_or("");
            if label.is_empty() {
                errors.push(FieldError::new(
                    format!("questions[{idx}].competency"),
                    "scale questions need a competency",
                ));
                return None;
            }
            Some(label.to_string())
        }
        // Competency on open questions carries no meaning and is dropped.
        _ => None,
    };

    Some(Question {
        kind: kind?,
        text: text?,
        competency,
    })
}

fn score_map(errors: &mut Vec<FieldError>, scores: &BTreeMap<String, f64>) -> Option<CompetencyScores> {
    let before = errors.len();
    let mut out = CompetencyScores::new();
    for (label, score) in scores {
        let key = label.trim();
        if key.is_empty() {
            errors.push(FieldError::new(
                "competency_scores",
                "competency names must not be empty",
            ));
            continue;
        }
        if !score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(score) {
            errors.push(FieldError::new(
                format!("competency_scores.{key}"),
                "score must be between 1 and 5",
            ));
            continue;
        }
        if out.insert(key.to_string(), *score).is_some() {
            errors.push(FieldError::new(
                format!("competency_scores.{key}"),
                "competency is listed more than once",
            ));
        }
    }
    (errors.len() == before).then_some(out)
}

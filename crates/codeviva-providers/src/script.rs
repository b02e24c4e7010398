//! Client for the spreadsheet-backed persistence script.
//!
//! Every call is a POST of `{"action": ..., ...payload}` to a single web
//! endpoint. The script answers `200` even for failures and reports them in
//! an `error` field, so both the status and the body are checked.

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use codeviva_core::model::{
    normalize_extension, CourseConfig, ExamResult, QuestionCounts, Weights, DEFAULT_DETAIL_LEVEL,
    DEFAULT_TIME_CODING_MIN, DEFAULT_TIME_ORAL_MIN,
};
use codeviva_core::report::ExamRecord;

use crate::error::PersistenceError;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A student/course pair whose stored total should be recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecalcTarget {
    pub nim: String,
    pub course_id: String,
}

impl RecalcTarget {
    pub fn new(nim: impl Into<String>, course_id: impl Into<String>) -> Self {
        Self {
            nim: nim.into(),
            course_id: course_id.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitPayload<'a> {
    nim: &'a str,
    course_code: &'a str,
    course: &'a str,
    team_id: &'a str,
    class_name: &'a str,
    results: &'a [ExamResult],
}

pub struct ScriptClient {
    url: String,
    client: reqwest::Client,
}

impl ScriptClient {
    pub fn new(url: impl Into<String>) -> Result<Self, PersistenceError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(PersistenceError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PersistenceError::Network(e.to_string()))?;
        Ok(Self { url, client })
    }

    /// Build a client from an optional configured URL.
    pub fn from_url(url: Option<&str>) -> Result<Self, PersistenceError> {
        url.map_or(Err(PersistenceError::NotConfigured), Self::new)
    }

    /// Fetch a course's exam settings by name or code.
    pub async fn course_config(&self, course_name: &str) -> Result<CourseConfig, PersistenceError> {
        let value = self
            .call("getCourseConfig", json!({ "courseName": course_name }))
            .await?;
        let row = value.as_object().ok_or_else(|| {
            PersistenceError::InvalidResponse("course config is not an object".into())
        })?;
        Ok(course_from_row(row))
    }

    /// Store a finished exam. The script recomputes the totals itself.
    pub async fn submit_exam(&self, record: &ExamRecord) -> Result<(), PersistenceError> {
        let payload = SubmitPayload {
            nim: &record.candidate.student_id,
            course_code: record.course_code.as_deref().unwrap_or(&record.course_name),
            course: &record.course_name,
            team_id: &record.candidate.team_id,
            class_name: &record.candidate.class_name,
            results: &record.results,
        };
        let payload = serde_json::to_value(&payload)
            .map_err(|e| PersistenceError::InvalidResponse(e.to_string()))?;
        self.call("submitExam", payload).await?;
        Ok(())
    }

    /// Ask the script to recompute stored totals with the current weights.
    ///
    /// Returns the number of rows the script updated.
    pub async fn recalculate_scores(&self, targets: &[RecalcTarget]) -> Result<u64, PersistenceError> {
        let value = self
            .call("recalculateScores", json!({ "targets": targets }))
            .await?;
        Ok(value.get("updatedCount").and_then(Value::as_u64).unwrap_or(0))
    }

    #[instrument(skip(self, payload))]
    async fn call(&self, action: &str, payload: Value) -> Result<Value, PersistenceError> {
        let mut body = Map::new();
        body.insert("action".into(), Value::String(action.to_string()));
        if let Value::Object(fields) = payload {
            body.extend(fields);
        }

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/plain;charset=utf-8")
            .body(Value::Object(body).to_string())
            .send()
            .await
            .map_err(|e| PersistenceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PersistenceError::Status(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| PersistenceError::Network(e.to_string()))?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| PersistenceError::InvalidResponse(e.to_string()))?;

        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(PersistenceError::Server(message));
        }

        debug!("{action} succeeded");
        Ok(value)
    }
}

/// Map a sheet row onto a course config, applying defaults for blank cells.
fn course_from_row(row: &Map<String, Value>) -> CourseConfig {
    let name = text(row, "name").unwrap_or_default();
    let mut course = CourseConfig::new(name);
    course.code = text(row, "code");
    course.language_priority = text(row, "lang_priority")
        .map(|s| {
            s.split(',')
                .map(normalize_extension)
                .filter(|lang| !lang.is_empty())
                .collect()
        })
        .unwrap_or_default();
    // The sheet has no separate upload filter; the priority list doubles as one.
    course.allowed_extensions = course.language_priority.clone();
    if let Some(project_type) = text(row, "project_type") {
        course.project_type = project_type;
    }
    if let Some(ui) = text(row, "ui_framework") {
        course.ui_framework = ui;
    }
    if let Some(app) = text(row, "app_framework") {
        course.app_framework = app;
    }
    course.oral = QuestionCounts {
        easy: count(row, "q_easy"),
        medium: count(row, "q_medium"),
        hard: count(row, "q_hard"),
    };
    course.coding = QuestionCounts {
        easy: count(row, "q_code_easy"),
        medium: count(row, "q_code_medium"),
        hard: count(row, "q_code_hard"),
    };
    course.time_oral_min = positive(row, "time_oral").unwrap_or(DEFAULT_TIME_ORAL_MIN);
    course.time_coding_min = positive(row, "time_code").unwrap_or(DEFAULT_TIME_CODING_MIN);
    let defaults = Weights::default();
    course.weights = Weights::new(
        number(row, "weight_oral").unwrap_or(defaults.oral),
        number(row, "weight_code").unwrap_or(defaults.coding),
    );
    course.instr_oral = text(row, "instr_oral");
    course.instr_code = text(row, "instr_code");
    course.ai_detail_level = number(row, "ai_detail_level")
        .map(|n| n as u8)
        .filter(|n| (1..=3).contains(n))
        .unwrap_or(DEFAULT_DETAIL_LEVEL);
    course
}

/// A non-empty cell rendered as text. Sheet cells may hold numbers.
fn text(row: &Map<String, Value>, key: &str) -> Option<String> {
    let s = match row.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// A numeric cell, accepted as a JSON number or a numeric string.
fn number(row: &Map<String, Value>, key: &str) -> Option<f64> {
    let n = match row.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite() && *n >= 0.0)
}

fn count(row: &Map<String, Value>, key: &str) -> u32 {
    number(row, key).map(|n| n as u32).unwrap_or(0)
}

fn positive(row: &Map<String, Value>, key: &str) -> Option<u32> {
    number(row, key).map(|n| n as u32).filter(|n| *n > 0)
}

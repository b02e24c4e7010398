//! Exam records with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Candidate, CourseConfig, ExamResult, Weights};
use crate::scoring::{aggregate, ScoreSummary};

/// The stored outcome of one finished exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub candidate: Candidate,
    pub course_name: String,
    #[serde(default)]
    pub course_code: Option<String>,
    /// Weights the summary was computed with.
    pub weights: Weights,
    pub results: Vec<ExamResult>,
    pub summary: ScoreSummary,
}

impl ExamRecord {
    pub fn new(candidate: Candidate, course: &CourseConfig, results: Vec<ExamResult>) -> Self {
        let summary = aggregate(&results, &course.weights);
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            candidate,
            course_name: course.name.clone(),
            course_code: course.code.clone(),
            weights: course.weights,
            results,
            summary,
        }
    }

    /// Recompute the summary after the course changed its weights.
    ///
    /// Returns the previous total.
    pub fn reweigh(&mut self, weights: Weights) -> u32 {
        let previous = self.summary.total;
        self.weights = weights;
        self.summary = aggregate(&self.results, &weights);
        if previous != self.summary.total {
            tracing::info!(
                "{}: total {} -> {}",
                self.candidate.student_id,
                previous,
                self.summary.total
            );
        }
        previous
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize exam record")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write exam record to {}", path.display()))?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read exam record from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse exam record JSON")
    }

    /// File name used when saving into an output directory.
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.json",
            self.candidate.student_id,
            self.course_code.as_deref().unwrap_or("exam"),
            self.created_at.format("%Y%m%dT%H%M%S")
        )
    }
}

/// Load a bare results list (as written by the exam command).
pub fn load_results(path: &Path) -> Result<Vec<ExamResult>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read results from {}", path.display()))?;
    serde_json::from_str(&content).context("failed to parse results JSON")
}

//! TOML course configuration parser.
//!
//! Loads a `[course]` table into a [`CourseConfig`] and checks it for the
//! mistakes lecturers usually make.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{normalize_extension, CourseConfig, QuestionType};

#[derive(Debug, Deserialize)]
struct TomlCourseFile {
    course: CourseConfig,
}

/// Parse a course config file.
pub fn parse_course_config(path: &Path) -> Result<CourseConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read course config: {}", path.display()))?;

    parse_course_config_str(&content, path)
}

/// Parse a course config from a TOML string (useful for testing).
pub fn parse_course_config_str(content: &str, source_path: &Path) -> Result<CourseConfig> {
    let parsed: TomlCourseFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let mut course = parsed.course;
    course.language_priority = course
        .language_priority
        .iter()
        .map(|l| normalize_extension(l))
        .filter(|l| !l.is_empty())
        .collect();
    course.allowed_extensions = course
        .allowed_extensions
        .iter()
        .map(|e| normalize_extension(e))
        .filter(|e| !e.is_empty())
        .collect();

    Ok(course)
}

/// A warning from course config validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The offending field (if applicable).
    pub field: Option<String>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn on(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }
}

/// Validate a course config for common issues.
pub fn validate_course_config(course: &CourseConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let weight_sum = course.weights.oral + course.weights.coding;
    if (weight_sum - 100.0).abs() > 1e-9 {
        warnings.push(ValidationWarning::on(
            "weights",
            format!("oral and coding weights sum to {weight_sum}, expected 100"),
        ));
    }
    if course.weights.oral < 0.0 || course.weights.coding < 0.0 {
        warnings.push(ValidationWarning::on("weights", "weights must not be negative"));
    }

    if course.total_questions() == 0 {
        warnings.push(ValidationWarning::on(
            "questions",
            "no questions configured, question generation will fail",
        ));
    }

    for kind in [QuestionType::Oral, QuestionType::Coding] {
        let weight = course.weights.of(kind);
        if course.counts(kind).total() == 0 && weight > 0.0 {
            warnings.push(ValidationWarning::on(
                "weights",
                format!(
                    "{kind} carries {weight}% of the total but has no questions, it will count as 0"
                ),
            ));
        }
    }

    if !(1..=3).contains(&course.ai_detail_level) {
        warnings.push(ValidationWarning::on(
            "ai_detail_level",
            format!(
                "ai_detail_level {} is outside 1..=3, standard strictness will be used",
                course.ai_detail_level
            ),
        ));
    }

    if course.language_priority.is_empty() {
        warnings.push(ValidationWarning::on(
            "language_priority",
            "language_priority is empty, files are sent in archive order",
        ));
    }

    if course.time_oral_min == 0 || course.time_coding_min == 0 {
        warnings.push(ValidationWarning::on(
            "time",
            "a time limit of 0 minutes falls back to the default",
        ));
    }

    warnings
}

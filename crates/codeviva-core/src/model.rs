//! Core data model types for codeviva.
//!
//! Questions and results serialize in camelCase so they can be handed to the
//! persistence script unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Answer recorded when the countdown expires before anything was typed.
pub const UNANSWERED_PLACEHOLDER: &str = "(no answer submitted before time expired)";

/// Feedback attached to the zero-score result used when evaluation fails.
pub const EVALUATION_FAILED_FEEDBACK: &str =
    "Evaluation unavailable: the AI evaluator did not respond.";

/// Extensions accepted from an upload when the course does not list its own.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "html", "css", "php", "js", "jsx", "ts", "tsx", "py", "java", "c", "cpp",
];

pub const DEFAULT_TIME_ORAL_MIN: u32 = 5;
pub const DEFAULT_TIME_CODING_MIN: u32 = 15;
pub const DEFAULT_DETAIL_LEVEL: u8 = 2;

/// The two question modalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuestionType {
    Oral,
    Coding,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::Oral => write!(f, "ORAL"),
            QuestionType::Coding => write!(f, "CODING"),
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oral" | "lisan" => Ok(QuestionType::Oral),
            "coding" | "code" => Ok(QuestionType::Coding),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// Question difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "mudah" => Ok(Difficulty::Easy),
            "medium" | "sedang" => Ok(Difficulty::Medium),
            "hard" | "sulit" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// A generated exam question. Immutable once a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// File the snippet was taken from.
    #[serde(default)]
    pub file_source: Option<String>,
    #[serde(default)]
    pub snippet: String,
    pub difficulty: Difficulty,
    /// The examiner's instruction, read aloud to the student.
    pub ai_prompt: String,
    #[serde(default = "default_detail_level")]
    pub ai_detail_level: u8,
}

/// The evaluated answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub question_id: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub student_answer: String,
    /// Score in `0.0..=100.0`.
    pub score: f64,
    pub feedback: String,
}

impl ExamResult {
    /// Zero-information result substituted when evaluation fails outright.
    pub fn evaluation_failed(question: &Question, answer: &str) -> Self {
        Self {
            question_id: question.id.clone(),
            kind: question.kind,
            student_answer: answer.to_string(),
            score: 0.0,
            feedback: EVALUATION_FAILED_FEEDBACK.to_string(),
        }
    }
}

/// A source file pulled out of an uploaded project archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFile {
    /// Path inside the archive.
    pub name: String,
    pub content: String,
    /// Lowercased file extension.
    pub language: String,
}

/// Number of questions to ask per difficulty for one modality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCounts {
    #[serde(default)]
    pub easy: u32,
    #[serde(default)]
    pub medium: u32,
    #[serde(default)]
    pub hard: u32,
}

impl QuestionCounts {
    pub fn total(&self) -> u32 {
        self.easy + self.medium + self.hard
    }
}

/// Percentage weights of the two modalities in the final total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    #[serde(default = "default_weight")]
    pub oral: f64,
    #[serde(default = "default_weight")]
    pub coding: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            oral: default_weight(),
            coding: default_weight(),
        }
    }
}

impl Weights {
    pub fn new(oral: f64, coding: f64) -> Self {
        Self { oral, coding }
    }

    pub fn of(&self, kind: QuestionType) -> f64 {
        match kind {
            QuestionType::Oral => self.oral,
            QuestionType::Coding => self.coding,
        }
    }
}

/// Per-course exam configuration, read-only during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseConfig {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    /// Languages (file extensions) to send to the generator first.
    #[serde(default)]
    pub language_priority: Vec<String>,
    /// Extensions accepted from an upload; empty means [`DEFAULT_EXTENSIONS`].
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_project_type")]
    pub project_type: String,
    #[serde(default = "default_framework")]
    pub ui_framework: String,
    #[serde(default = "default_framework")]
    pub app_framework: String,
    #[serde(default)]
    pub oral: QuestionCounts,
    #[serde(default)]
    pub coding: QuestionCounts,
    #[serde(default = "default_time_oral")]
    pub time_oral_min: u32,
    #[serde(default = "default_time_coding")]
    pub time_coding_min: u32,
    #[serde(default)]
    pub weights: Weights,
    /// Extra instructions for oral questions.
    #[serde(default)]
    pub instr_oral: Option<String>,
    /// Extra instructions for coding questions.
    #[serde(default)]
    pub instr_code: Option<String>,
    /// 1 basic, 2 standard, 3 expert.
    #[serde(default = "default_detail_level")]
    pub ai_detail_level: u8,
}

impl CourseConfig {
    /// A course with default settings and no questions configured.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: None,
            language_priority: Vec::new(),
            allowed_extensions: Vec::new(),
            project_type: default_project_type(),
            ui_framework: default_framework(),
            app_framework: default_framework(),
            oral: QuestionCounts::default(),
            coding: QuestionCounts::default(),
            time_oral_min: DEFAULT_TIME_ORAL_MIN,
            time_coding_min: DEFAULT_TIME_CODING_MIN,
            weights: Weights::default(),
            instr_oral: None,
            instr_code: None,
            ai_detail_level: DEFAULT_DETAIL_LEVEL,
        }
    }

    pub fn counts(&self, kind: QuestionType) -> QuestionCounts {
        match kind {
            QuestionType::Oral => self.oral,
            QuestionType::Coding => self.coding,
        }
    }

    pub fn total_questions(&self) -> u32 {
        self.oral.total() + self.coding.total()
    }

    /// Countdown length for one question of the given type.
    ///
    /// A zero minute setting falls back to the default for that modality.
    pub fn time_limit_secs(&self, kind: QuestionType) -> u64 {
        let minutes = match kind {
            QuestionType::Oral if self.time_oral_min > 0 => self.time_oral_min,
            QuestionType::Oral => DEFAULT_TIME_ORAL_MIN,
            QuestionType::Coding if self.time_coding_min > 0 => self.time_coding_min,
            QuestionType::Coding => DEFAULT_TIME_CODING_MIN,
        };
        u64::from(minutes) * 60
    }

    /// Allowed upload extensions, normalized (lowercase, no leading dot).
    pub fn extensions(&self) -> Vec<String> {
        let normalized: Vec<String> = self
            .allowed_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect();
        if normalized.is_empty() {
            DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
        } else {
            normalized
        }
    }
}

/// The student sitting an exam, as stored alongside their results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Student number.
    pub student_id: String,
    pub name: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub team_id: String,
}

/// Lowercase, trim, and strip a leading dot from an extension.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Cut `s` to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn default_weight() -> f64 {
    50.0
}

fn default_project_type() -> String {
    "WEB".to_string()
}

fn default_framework() -> String {
    "None".to_string()
}

fn default_time_oral() -> u32 {
    DEFAULT_TIME_ORAL_MIN
}

fn default_time_coding() -> u32 {
    DEFAULT_TIME_CODING_MIN
}

fn default_detail_level() -> u8 {
    DEFAULT_DETAIL_LEVEL
}

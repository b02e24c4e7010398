//! Answer evaluation.
//!
//! [`AiEvaluator`] asks the model for a score and feedback and races the call
//! against a fixed timeout. Anything short of a usable verdict falls back to
//! [`HeuristicEvaluator`], so evaluation always ends with a result.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{truncate_chars, ExamResult, Question, UNANSWERED_PLACEHOLDER};
use crate::traits::{parse_json_lenient, AnswerEvaluator, GenerateRequest, LlmProvider};

pub const DEFAULT_EVALUATION_TIMEOUT: Duration = Duration::from_secs(8);

/// Shorter AI feedback is treated as a failed evaluation.
pub const MIN_FEEDBACK_CHARS: usize = 10;

/// Snippet characters included in the evaluation prompt.
pub const MAX_SNIPPET_CHARS: usize = 500;

/// Words at which the length component of the heuristic saturates.
const FULL_LENGTH_WORDS: f64 = 40.0;

/// Scores answers with a generative model.
pub struct AiEvaluator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    timeout: Duration,
    fallback: HeuristicEvaluator,
}

impl AiEvaluator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout: DEFAULT_EVALUATION_TIMEOUT,
            fallback: HeuristicEvaluator,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn ask(&self, question: &Question, answer: &str) -> anyhow::Result<AiVerdict> {
        let request = GenerateRequest::new(
            self.model.clone(),
            build_evaluation_prompt(question, answer),
        )
        .with_temperature(0.3)
        .with_max_tokens(512)
        .json();

        let response = tokio::time::timeout(self.timeout, self.provider.generate(&request))
            .await
            .map_err(|_| anyhow::anyhow!("timed out after {}ms", self.timeout.as_millis()))??;

        let verdict: AiVerdict = parse_json_lenient(&response.content, '{', '}')
            .ok_or_else(|| anyhow::anyhow!("response is not a score object"))?;
        let feedback_len = verdict.feedback.trim().chars().count();
        if feedback_len < MIN_FEEDBACK_CHARS {
            anyhow::bail!("feedback too short ({feedback_len} chars)");
        }
        Ok(verdict)
    }
}

#[async_trait]
impl AnswerEvaluator for AiEvaluator {
    async fn evaluate(&self, question: &Question, answer: &str) -> anyhow::Result<ExamResult> {
        if is_unanswered(answer) {
            return self.fallback.evaluate(question, answer).await;
        }

        match self.ask(question, answer).await {
            Ok(verdict) => Ok(ExamResult {
                question_id: question.id.clone(),
                kind: question.kind,
                student_answer: answer.to_string(),
                score: round1(verdict.score.clamp(0.0, 100.0)),
                feedback: verdict.feedback.trim().to_string(),
            }),
            Err(e) => {
                tracing::warn!(
                    "AI evaluation of {} failed, using heuristic: {e:#}",
                    question.id
                );
                self.fallback.evaluate(question, answer).await
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct AiVerdict {
    #[serde(deserialize_with = "lenient_score")]
    score: f64,
    #[serde(default)]
    feedback: String,
}

/// Accept `85`, `"85"`, or `"85%"`. Models quote the score now and then.
fn lenient_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Score {
        Number(f64),
        Text(String),
    }

    let score = match Score::deserialize(deserializer)? {
        Score::Number(n) => n,
        Score::Text(s) => s
            .trim()
            .trim_end_matches('%')
            .trim_end()
            .parse::<f64>()
            .map_err(serde::de::Error::custom)?,
    };
    if score.is_finite() {
        Ok(score)
    } else {
        Err(serde::de::Error::custom("score is not a finite number"))
    }
}

/// Build the evaluation instruction for one answer.
pub fn build_evaluation_prompt(question: &Question, answer: &str) -> String {
    let mut prompt = format!(
        "Act as a senior IT examiner grading a student's answer.\n\n\
         QUESTION CONTEXT:\n\
         - Examiner question: \"{}\"\n\
         - Question type: {}, difficulty: {}, strictness level: {} of 3\n",
        question.ai_prompt, question.kind, question.difficulty, question.ai_detail_level
    );
    if !question.snippet.is_empty() {
        prompt.push_str(&format!(
            "- Code snippet:\n{}\n",
            truncate_chars(&question.snippet, MAX_SNIPPET_CHARS)
        ));
    }
    prompt.push_str(&format!(
        "\nSTUDENT ANSWER:\n\"{answer}\"\n\n\
         INSTRUCTIONS:\n\
         - Judge whether the answer is relevant to the code and the question.\n\
         - If the answer is wrong, correct it politely. If it is right, add a short technical insight.\n\
         - Do not mention the score inside the feedback. At most 3 sentences.\n\
         - Output a JSON object: {{\"score\": number from 0 to 100, \"feedback\": string}}\n"
    ));
    prompt
}

/// Deterministic local scorer.
///
/// Rewards answer length up to 40 words (40 points) and
/// reuse of the question's own vocabulary (60 points).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEvaluator;

#[async_trait]
impl AnswerEvaluator for HeuristicEvaluator {
    async fn evaluate(&self, question: &Question, answer: &str) -> anyhow::Result<ExamResult> {
        let score = heuristic_score(question, answer);
        Ok(ExamResult {
            question_id: question.id.clone(),
            kind: question.kind,
            student_answer: answer.to_string(),
            score,
            feedback: fallback_feedback(score).to_string(),
        })
    }
}

/// Score an answer without a model, in `0.0..=100.0` with one decimal.
pub fn heuristic_score(question: &Question, answer: &str) -> f64 {
    if is_unanswered(answer) {
        return 0.0;
    }

    let words = answer.split_whitespace().count() as f64;
    let length = (words / FULL_LENGTH_WORDS).min(1.0);

    let expected: BTreeSet<String> = terms(&question.ai_prompt)
        .chain(terms(&question.snippet))
        .collect();
    let coverage = if expected.is_empty() {
        0.0
    } else {
        let given: BTreeSet<String> = terms(answer).collect();
        expected.intersection(&given).count() as f64 / expected.len() as f64
    };

    round1(40.0 * length + 60.0 * coverage)
}

/// Fixed feedback for a heuristic score.
pub fn fallback_feedback(score: f64) -> &'static str {
    if score >= 75.0 {
        "Very good answer. The logic and the technical details match the code closely."
    } else if score >= 60.0 {
        "The answer is relevant, but the technical explanation could go into more detail."
    } else if score >= 40.0 {
        "The basic idea is there, but the answer does not yet address the core of the question."
    } else {
        "The answer misses the question. Study how the logic in this code flows."
    }
}

fn is_unanswered(answer: &str) -> bool {
    let trimmed = answer.trim();
    trimmed.is_empty() || trimmed == UNANSWERED_PLACEHOLDER
}

/// Lowercased identifier-like words of at least three characters.
fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.chars().count() >= 3)
        .filter(|w| w.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_'))
        .map(str::to_lowercase)
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

//! Exam session state machine.
//!
//! ```text
//! Presenting --submit / timer hits 0--> Evaluating
//! Evaluating --manual--> Feedback --acknowledge--> Presenting | Summary
//! Evaluating --auto------------------------------> Presenting | Summary
//! ```
//!
//! The machine is synchronous and owns no clock: the runner feeds it one
//! [`ExamSession::tick`] per second and reports evaluation outcomes back
//! through [`ExamSession::complete_evaluation`]. Ticks outside `Presenting`
//! are ignored, which is what pauses the countdown during evaluation.

use crate::error::ExamError;
use crate::model::{CourseConfig, ExamResult, Question, QuestionType, UNANSWERED_PLACEHOLDER};
use crate::scoring::{aggregate, ScoreSummary};

/// Remaining seconds at which the student is warned once.
pub const WARNING_THRESHOLD_SECS: u64 = 30;

/// Where the session currently is.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// A question is on screen and the countdown runs.
    Presenting,
    /// An answer is being scored. `auto` is set for timer-driven submissions.
    Evaluating { auto: bool },
    /// A manually submitted answer's result is shown until acknowledged.
    Feedback(ExamResult),
    /// Every question has a result.
    Summary,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Presenting => "presenting",
            Phase::Evaluating { .. } => "evaluating",
            Phase::Feedback(_) => "showing feedback",
            Phase::Summary => "finished",
        }
    }
}

/// An answer handed to the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub index: usize,
    pub question: Question,
    pub answer: String,
    /// Set when the countdown forced the submission.
    pub auto: bool,
}

/// Outcome of one countdown tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    Running { remaining: u64 },
    /// Fired once, when exactly [`WARNING_THRESHOLD_SECS`] remain.
    Warning { remaining: u64 },
    /// Time ran out; the answer was submitted on the student's behalf.
    Expired(Submission),
    /// Not presenting, the countdown is stopped.
    Paused,
}

/// Where the session went after a result was recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advance {
    Next { index: usize },
    Finished(ScoreSummary),
}

/// Answered/total counts per modality, for progress display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub oral_done: usize,
    pub oral_total: usize,
    pub coding_done: usize,
    pub coding_total: usize,
}

/// A single student's pass through a list of questions.
#[derive(Debug, Clone)]
pub struct ExamSession {
    questions: Vec<Question>,
    config: CourseConfig,
    index: usize,
    remaining_secs: u64,
    answer: String,
    results: Vec<ExamResult>,
    phase: Phase,
}

impl ExamSession {
    /// Start a session on the first question.
    ///
    /// # Errors
    ///
    /// Returns [`ExamError::NoQuestions`] for an empty question list.
    pub fn new(questions: Vec<Question>, config: CourseConfig) -> Result<Self, ExamError> {
        let first = questions.first().ok_or(ExamError::NoQuestions)?;
        let remaining_secs = config.time_limit_secs(first.kind);
        Ok(Self {
            questions,
            config,
            index: 0,
            remaining_secs,
            answer: String::new(),
            results: Vec::new(),
            phase: Phase::Presenting,
        })
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_presenting(&self) -> bool {
        self.phase == Phase::Presenting
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Summary
    }

    pub fn config(&self) -> &CourseConfig {
        &self.config
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    /// The question being asked, or `None` once the summary is reached.
    pub fn current_question(&self) -> Option<&Question> {
        if self.is_finished() {
            None
        } else {
            self.questions.get(self.index)
        }
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn results(&self) -> &[ExamResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ExamResult> {
        self.results
    }

    pub fn progress(&self) -> Progress {
        let done = |kind: QuestionType| self.results.iter().filter(|r| r.kind == kind).count();
        let total = |kind: QuestionType| self.questions.iter().filter(|q| q.kind == kind).count();
        Progress {
            oral_done: done(QuestionType::Oral),
            oral_total: total(QuestionType::Oral),
            coding_done: done(QuestionType::Coding),
            coding_total: total(QuestionType::Coding),
        }
    }

    /// Replace the draft answer.
    pub fn set_answer(&mut self, text: impl Into<String>) -> Result<(), ExamError> {
        self.require_presenting("edit the answer")?;
        self.answer = text.into();
        Ok(())
    }

    /// Append a recognized speech fragment to the draft answer.
    pub fn append_answer(&mut self, fragment: &str) -> Result<(), ExamError> {
        self.require_presenting("edit the answer")?;
        let joined = format!("{} {}", self.answer, fragment);
        self.answer = joined.trim().to_string();
        Ok(())
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> Tick {
        if !self.is_presenting() {
            return Tick::Paused;
        }

        if self.remaining_secs <= 1 {
            self.remaining_secs = 0;
            return Tick::Expired(self.auto_submit());
        }

        self.remaining_secs -= 1;
        if self.remaining_secs == WARNING_THRESHOLD_SECS {
            Tick::Warning {
                remaining: self.remaining_secs,
            }
        } else {
            Tick::Running {
                remaining: self.remaining_secs,
            }
        }
    }

    /// Submit the draft answer for evaluation.
    ///
    /// # Errors
    ///
    /// Fails outside `Presenting` or when the trimmed answer is empty.
    pub fn submit(&mut self) -> Result<Submission, ExamError> {
        self.require_presenting("submit")?;
        if self.answer.trim().is_empty() {
            return Err(ExamError::EmptyAnswer);
        }
        self.phase = Phase::Evaluating { auto: false };
        Ok(self.submission(false))
    }

    /// Record the evaluator's outcome for the pending submission.
    ///
    /// A failed evaluation becomes a zero-score result. Manual submissions
    /// move to `Feedback` and return `None`; automatic ones are recorded and
    /// advance immediately.
    pub fn complete_evaluation(
        &mut self,
        outcome: anyhow::Result<ExamResult>,
    ) -> Result<Option<Advance>, ExamError> {
        let Phase::Evaluating { auto } = self.phase else {
            return Err(self.invalid("complete an evaluation"));
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("evaluation failed for question {}: {e:#}", self.index + 1);
                let question = &self.questions[self.index];
                ExamResult::evaluation_failed(question, &self.answer)
            }
        };

        if auto {
            self.results.push(result);
            Ok(Some(self.advance()))
        } else {
            self.phase = Phase::Feedback(result);
            Ok(None)
        }
    }

    /// Dismiss the feedback screen, recording its result.
    pub fn acknowledge(&mut self) -> Result<Advance, ExamError> {
        let Phase::Feedback(result) = &self.phase else {
            return Err(self.invalid("acknowledge feedback"));
        };
        self.results.push(result.clone());
        Ok(self.advance())
    }

    /// Score summary, available once every question has a result.
    pub fn summary(&self) -> Option<ScoreSummary> {
        self.is_finished()
            .then(|| aggregate(&self.results, &self.config.weights))
    }

    fn auto_submit(&mut self) -> Submission {
        let trimmed = self.answer.trim();
        self.answer = if trimmed.is_empty() {
            UNANSWERED_PLACEHOLDER.to_string()
        } else {
            trimmed.to_string()
        };
        self.phase = Phase::Evaluating { auto: true };
        self.submission(true)
    }

    fn submission(&self, auto: bool) -> Submission {
        Submission {
            index: self.index,
            question: self.questions[self.index].clone(),
            answer: self.answer.clone(),
            auto,
        }
    }

    fn advance(&mut self) -> Advance {
        let next = self.index + 1;
        if next < self.questions.len() {
            self.index = next;
            self.remaining_secs = self.config.time_limit_secs(self.questions[next].kind);
            self.answer.clear();
            self.phase = Phase::Presenting;
            Advance::Next { index: next }
        } else {
            self.phase = Phase::Summary;
            Advance::Finished(aggregate(&self.results, &self.config.weights))
        }
    }

    fn require_presenting(&self, action: &'static str) -> Result<(), ExamError> {
        if self.is_presenting() {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> ExamError {
        ExamError::InvalidTransition {
            action,
            phase: self.phase.name(),
        }
    }
}

//! Progress callbacks for a running exam.

use codeviva_core::error::ExamError;
use codeviva_core::model::{ExamResult, Question};
use codeviva_core::scoring::ScoreSummary;
use codeviva_core::session::Submission;

/// Receives the runner's progress.
pub trait ExamObserver: Send + Sync {
    fn on_question(&self, index: usize, total: usize, question: &Question, time_limit_secs: u64);
    fn on_tick(&self, remaining_secs: u64);
    fn on_time_warning(&self, remaining_secs: u64);
    fn on_time_expired(&self, index: usize);
    fn on_evaluating(&self, submission: &Submission);
    /// A manually submitted answer was scored and awaits acknowledgement.
    fn on_feedback(&self, result: &ExamResult);
    fn on_action_rejected(&self, error: &ExamError);
    fn on_summary(&self, summary: &ScoreSummary);
}

/// No-op observer.
pub struct NoopObserver;

impl ExamObserver for NoopObserver {
    fn on_question(&self, _: usize, _: usize, _: &Question, _: u64) {}
    fn on_tick(&self, _: u64) {}
    fn on_time_warning(&self, _: u64) {}
    fn on_time_expired(&self, _: usize) {}
    fn on_evaluating(&self, _: &Submission) {}
    fn on_feedback(&self, _: &ExamResult) {}
    fn on_action_rejected(&self, _: &ExamError) {}
    fn on_summary(&self, _: &ScoreSummary) {}
}

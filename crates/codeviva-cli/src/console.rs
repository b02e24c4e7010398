//! Terminal front end for a running exam.
//!
//! Answers are typed line by line. A line holding only a command controls
//! the session:
//!
//! | line      | action                                   |
//! |-----------|------------------------------------------|
//! | `:submit` | submit the lines typed so far            |
//! | `:next`   | acknowledge feedback, go to the next one |
//! | `:clear`  | discard the draft                        |
//! | `:quit`   | abort the exam                           |

use std::io::BufRead;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use codeviva_core::audio::AudioClip;
use codeviva_core::error::ExamError;
use codeviva_core::model::{ExamResult, Question, QuestionType};
use codeviva_core::scoring::ScoreSummary;
use codeviva_core::session::Submission;
use codeviva_runner::{AudioSink, ExamObserver, StudentAction};

/// Prints exam progress to stdout.
pub struct ConsoleObserver;

impl ExamObserver for ConsoleObserver {
    fn on_question(&self, index: usize, total: usize, question: &Question, time_limit_secs: u64) {
        println!();
        println!(
            "=== Question {}/{} [{} / {}] ({} min) ===",
            index + 1,
            total,
            question.kind,
            question.difficulty,
            time_limit_secs / 60
        );
        if let Some(file) = &question.file_source {
            println!("File: {file}");
        }
        if !question.snippet.trim().is_empty() {
            println!("---\n{}\n---", question.snippet.trim_end());
        }
        println!("{}", question.ai_prompt);
        match question.kind {
            QuestionType::Oral => println!("(type your answer, then :submit)"),
            QuestionType::Coding => println!("(type your code, then :submit)"),
        }
    }

    fn on_tick(&self, remaining_secs: u64) {
        if remaining_secs > 0 && remaining_secs % 60 == 0 {
            println!("[{} min left]", remaining_secs / 60);
        }
    }

    fn on_time_warning(&self, remaining_secs: u64) {
        println!("[{remaining_secs}s left, your draft is submitted automatically at 0]");
    }

    fn on_time_expired(&self, index: usize) {
        println!("[time is up for question {}]", index + 1);
    }

    fn on_evaluating(&self, submission: &Submission) {
        let how = if submission.auto { "auto-submitted" } else { "submitted" };
        println!("Evaluating ({how})...");
    }

    fn on_feedback(&self, result: &ExamResult) {
        println!("Score: {:.1}", result.score);
        println!("Feedback: {}", result.feedback);
        println!("(:next to continue)");
    }

    fn on_action_rejected(&self, error: &ExamError) {
        println!("! {error}");
    }

    fn on_summary(&self, summary: &ScoreSummary) {
        println!();
        println!(
            "Exam finished: oral {:.1}, coding {:.1}, total {}",
            summary.avg_oral, summary.avg_coding, summary.total
        );
    }
}

/// Narration sink for a terminal without an audio device.
///
/// Synthesized clips are "played" by waiting out their duration so the
/// pacing matches real playback.
pub struct TerminalSink;

#[async_trait]
impl AudioSink for TerminalSink {
    async fn play(&self, clip: AudioClip) -> anyhow::Result<()> {
        let duration = clip.duration();
        tracing::debug!("narrating {:.1}s clip", duration.as_secs_f64());
        tokio::time::sleep(duration.min(Duration::from_secs(120))).await;
        Ok(())
    }

    async fn speak_text(&self, text: &str) -> anyhow::Result<()> {
        tracing::debug!("narration unavailable, text only: {text}");
        Ok(())
    }

    fn stop(&self) {}
}

/// Turn typed lines into student actions until input ends or the exam is over.
///
/// Blocks on `input`; run it on its own thread.
pub fn read_actions<R: BufRead>(input: R, actions: mpsc::Sender<StudentAction>) {
    let mut draft = String::new();

    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("failed to read input: {e}");
                break;
            }
        };

        let action = match line.trim() {
            ":submit" => StudentAction::Submit,
            ":next" => {
                draft.clear();
                StudentAction::Acknowledge
            }
            ":clear" => {
                draft.clear();
                StudentAction::Answer(String::new())
            }
            ":quit" => StudentAction::Abort,
            _ => {
                if !draft.is_empty() {
                    draft.push('\n');
                }
                draft.push_str(&line);
                StudentAction::Answer(draft.clone())
            }
        };

        let submitted = action == StudentAction::Submit;
        if actions.blocking_send(action).is_err() {
            break;
        }
        if submitted {
            draft.clear();
        }
    }
}

//! End-to-end pipeline tests with the mock provider.
//!
//! Archive files go through question generation, a timed session driven by
//! the runner, AI evaluation with its fallback, and finally the exam record.

use std::sync::Arc;

use tokio::sync::mpsc;

use codeviva_core::error::ExamError;
use codeviva_core::evaluation::{fallback_feedback, heuristic_score, AiEvaluator};
use codeviva_core::generation::{GenerationOptions, QuestionGenerator};
use codeviva_core::model::{
    Candidate, CodeFile, CourseConfig, ExamResult, Question, QuestionCounts, QuestionType,
    Weights, UNANSWERED_PLACEHOLDER,
};
use codeviva_core::report::ExamRecord;
use codeviva_core::scoring::ScoreSummary;
use codeviva_core::session::{ExamSession, Submission};
use codeviva_core::traits::{AnswerEvaluator, LlmProvider};
use codeviva_providers::mock::MockProvider;
use codeviva_runner::{ExamObserver, ExamRunner, StudentAction};

const QUESTIONS: &str = r#"```json
[
  {
    "type": "ORAL",
    "fileSource": "login.php",
    "snippet": "if (password_verify($pass, $row['hash'])) {\n  $_SESSION['uid'] = $row['id'];\n}",
    "difficulty": "Mudah",
    "aiPrompt": "Dewi, explain what happens when password_verify succeeds."
  },
  {
    "type": "CODING",
    "fileSource": "cart.js",
    "snippet": "function total(items) { return items.reduce((s, i) => s + i.price, 0); }",
    "difficulty": "easy",
    "aiPrompt": "Change total so it applies a quantity field to each item."
  }
]
```"#;

const VERDICT: &str = r#"{"score": 85, "feedback": "Clear explanation of how the session is populated."}"#;

fn course() -> CourseConfig {
    let mut course = CourseConfig::new("Web Programming");
    course.code = Some("IF-301".into());
    course.language_priority = vec!["php".into(), "js".into()];
    course.oral = QuestionCounts {
        easy: 1,
        medium: 0,
        hard: 0,
    };
    course.coding = QuestionCounts {
        easy: 1,
        medium: 0,
        hard: 0,
    };
    course.weights = Weights::new(40.0, 60.0);
    course
}

fn files() -> Vec<CodeFile> {
    vec![
        CodeFile {
            name: "cart.js".into(),
            content: "function total(items) { return items.reduce((s, i) => s + i.price, 0); }"
                .into(),
            language: "js".into(),
        },
        CodeFile {
            name: "login.php".into(),
            content: "<?php if (password_verify($pass, $row['hash'])) { $_SESSION['uid'] = $row['id']; }"
                .into(),
            language: "php".into(),
        },
    ]
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Question(usize),
    Expired(usize),
    Feedback(f64),
    Summary(u32),
}

struct ChannelObserver(mpsc::UnboundedSender<Event>);

impl ExamObserver for ChannelObserver {
    fn on_question(&self, index: usize, _: usize, _: &Question, _: u64) {
        let _ = self.0.send(Event::Question(index));
    }
    fn on_tick(&self, _: u64) {}
    fn on_time_warning(&self, _: u64) {}
    fn on_time_expired(&self, index: usize) {
        let _ = self.0.send(Event::Expired(index));
    }
    fn on_evaluating(&self, _: &Submission) {}
    fn on_feedback(&self, result: &ExamResult) {
        let _ = self.0.send(Event::Feedback(result.score));
    }
    fn on_action_rejected(&self, _: &ExamError) {}
    fn on_summary(&self, summary: &ScoreSummary) {
        let _ = self.0.send(Event::Summary(summary.total));
    }
}

async fn wait_for(events: &mut mpsc::UnboundedReceiver<Event>, wanted: Event) {
    while let Some(event) = events.recv().await {
        if event == wanted {
            return;
        }
    }
    panic!("event stream ended before {wanted:?}");
}

#[tokio::test(start_paused = true)]
async fn generate_sit_and_record_exam() {
    let provider = Arc::new(MockProvider::new(vec![
        ("EXACTLY".to_string(), QUESTIONS.to_string()),
        ("grading".to_string(), VERDICT.to_string()),
    ]));
    let course = course();

    let generator = QuestionGenerator::new(provider.clone(), GenerationOptions::default());
    let questions = generator
        .generate(&files(), "Dewi", &course, &[])
        .await
        .unwrap();
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0].kind, QuestionType::Oral);
    assert!(questions[0].snippet.contains('\n'));

    let generation_request = provider.last_request().unwrap();
    let sources = &generation_request.attachments[0];
    assert!(sources.find("login.php").unwrap() < sources.find("cart.js").unwrap());

    let session = ExamSession::new(questions, course.clone()).unwrap();
    let evaluator = Arc::new(AiEvaluator::new(provider.clone(), "mock-model"));
    let (tx, rx) = mpsc::channel(8);
    let (events_tx, mut events) = mpsc::unbounded_channel();

    let run = tokio::spawn(async move {
        let observer = ChannelObserver(events_tx);
        ExamRunner::new(evaluator).run(session, rx, &observer).await
    });

    wait_for(&mut events, Event::Question(0)).await;
    tx.send(StudentAction::Answer(
        "It stores the user id in the session so later pages know who is logged in.".into(),
    ))
    .await
    .unwrap();
    tx.send(StudentAction::Submit).await.unwrap();
    wait_for(&mut events, Event::Feedback(85.0)).await;
    tx.send(StudentAction::Acknowledge).await.unwrap();

    // The student walks away from the coding question.
    wait_for(&mut events, Event::Question(1)).await;
    drop(tx);
    wait_for(&mut events, Event::Expired(1)).await;
    wait_for(&mut events, Event::Summary(34)).await;

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[1].student_answer, UNANSWERED_PLACEHOLDER);
    assert_eq!(outcome.results[1].score, 0.0);
    // generation plus one evaluation; the unanswered question never reaches the model
    assert_eq!(provider.call_count(), 2);

    let candidate = Candidate {
        student_id: "2201001".into(),
        name: "Dewi".into(),
        class_name: "IF-A".into(),
        team_id: "IF-301|IF-A|3".into(),
    };
    let mut record = ExamRecord::new(candidate, &course, outcome.results);
    assert_eq!(record.summary.total, 34);
    assert_eq!(record.summary.avg_oral, 85.0);

    let previous = record.reweigh(Weights::new(50.0, 50.0));
    assert_eq!(previous, 34);
    assert_eq!(record.summary.total, 43);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(record.file_name());
    record.save_json(&path).unwrap();
    let loaded = ExamRecord::load_json(&path).unwrap();
    assert_eq!(loaded.summary, record.summary);
    assert_eq!(loaded.candidate.student_id, "2201001");
}

#[tokio::test]
async fn failing_evaluator_falls_back_to_heuristic() {
    let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider::failing(503));
    let question = Question {
        id: "q-1".into(),
        kind: QuestionType::Oral,
        file_source: Some("cart.js".into()),
        snippet: "function total(items) { return items.reduce((s, i) => s + i.price, 0); }"
            .into(),
        difficulty: codeviva_core::model::Difficulty::Easy,
        ai_prompt: "Explain how total computes the sum of prices.".into(),
        ai_detail_level: 2,
    };
    let answer = "total uses reduce over items and adds each price to the running sum";

    let result = AiEvaluator::new(provider, "mock-model")
        .evaluate(&question, answer)
        .await
        .unwrap();

    let expected = heuristic_score(&question, answer);
    assert_eq!(result.score, expected);
    assert_eq!(result.feedback, fallback_feedback(expected));
}

#[tokio::test]
async fn unusable_generation_blocks_the_exam() {
    let provider = Arc::new(MockProvider::with_fixed_response(
        r#"[{"type": "ESSAY", "aiPrompt": "Write an essay."}, {"type": "ORAL", "aiPrompt": ""}]"#,
    ));
    let generator = QuestionGenerator::new(provider, GenerationOptions::default());
    let err = generator
        .generate(&files(), "Dewi", &course(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ExamError::NoQuestions));

    assert!(matches!(
        ExamSession::new(Vec::new(), course()),
        Err(ExamError::NoQuestions)
    ));
}

//! codeviva-runner — Drives an exam session in real time.
//!
//! The runner owns one [`ExamSession`] and multiplexes three event sources
//! with `tokio::select!`: a one-second countdown tick, student actions from
//! a channel, and the completion of the in-flight evaluation task. Evaluation
//! and narration run as child tasks of the runner's cancellation token, so
//! aborting (or dropping) the run stops them too.

pub mod audio;
pub mod observer;

use std::sync::Arc;
use std::time::Duration;

use futures::future::OptionFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use codeviva_core::error::ExamError;
use codeviva_core::model::ExamResult;
use codeviva_core::scoring::ScoreSummary;
use codeviva_core::session::{Advance, ExamSession, Phase, Submission, Tick};
use codeviva_core::traits::AnswerEvaluator;

pub use audio::{AudioSession, AudioSink};
pub use observer::{ExamObserver, NoopObserver};

/// Something the student did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentAction {
    /// Replace the draft answer.
    Answer(String),
    Submit,
    /// Dismiss the feedback of a manual submission.
    Acknowledge,
    Abort,
}

/// A finished exam.
#[derive(Debug, Clone)]
pub struct ExamOutcome {
    pub results: Vec<ExamResult>,
    pub summary: ScoreSummary,
}

type EvaluationTask = JoinHandle<anyhow::Result<ExamResult>>;

pub struct ExamRunner {
    evaluator: Arc<dyn AnswerEvaluator>,
    audio: Option<AudioSession>,
    tick_interval: Duration,
    cancel: CancellationToken,
}

impl ExamRunner {
    pub fn new(evaluator: Arc<dyn AnswerEvaluator>) -> Self {
        Self {
            evaluator,
            audio: None,
            tick_interval: Duration::from_secs(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Narrate each question through `audio`.
    pub fn with_audio(mut self, audio: AudioSession) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Length of one countdown second. Only useful for demos and tests.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Token that aborts the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `session` to completion.
    ///
    /// A closed action channel only stops action delivery; pending feedback
    /// is dismissed and the countdown auto-submits the remaining questions.
    ///
    /// # Errors
    ///
    /// [`ExamError::Aborted`] when the student aborts or the token is
    /// cancelled. In-flight evaluation and narration are cancelled first.
    pub async fn run(
        mut self,
        mut session: ExamSession,
        mut actions: mpsc::Receiver<StudentAction>,
        observer: &dyn ExamObserver,
    ) -> Result<ExamOutcome, ExamError> {
        let _guard = self.cancel.clone().drop_guard();
        if let Some(audio) = self.audio.as_mut() {
            audio.start(&self.cancel);
        }

        let mut ticker = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending: Option<EvaluationTask> = None;
        let mut actions_open = true;

        self.present(&session, observer);

        loop {
            let advance = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    return Err(self.abort(&session));
                }

                Some(joined) = OptionFuture::from(pending.as_mut()) => {
                    pending = None;
                    let outcome = joined.unwrap_or_else(|e| {
                        Err(anyhow::anyhow!("evaluation task failed: {e}"))
                    });
                    let advance = session.complete_evaluation(outcome)?;
                    if advance.is_none() {
                        if let Phase::Feedback(result) = session.phase() {
                            observer.on_feedback(result);
                        }
                    }
                    advance
                }

                _ = ticker.tick(), if session.is_presenting() => {
                    match session.tick() {
                        Tick::Running { remaining } => observer.on_tick(remaining),
                        Tick::Warning { remaining } => observer.on_time_warning(remaining),
                        Tick::Expired(submission) => {
                            tracing::info!("time expired on question {}", submission.index + 1);
                            observer.on_time_expired(submission.index);
                            pending = Some(self.evaluate(submission, observer));
                        }
                        Tick::Paused => {}
                    }
                    None
                }

                action = actions.recv(), if actions_open => {
                    match action {
                        None => {
                            tracing::debug!("action channel closed");
                            actions_open = false;
                            None
                        }
                        Some(StudentAction::Abort) => {
                            return Err(self.abort(&session));
                        }
                        Some(action) => {
                            match self.apply(&mut session, action, &mut pending, observer) {
                                Ok(advance) => advance,
                                Err(e) => {
                                    tracing::debug!("rejected action: {e}");
                                    observer.on_action_rejected(&e);
                                    None
                                }
                            }
                        }
                    }
                }
            };

            // Nobody is left to dismiss feedback once the channel is closed.
            let advance = match advance {
                None if !actions_open && matches!(session.phase(), Phase::Feedback(_)) => {
                    tracing::debug!("acknowledging feedback on closed action channel");
                    Some(session.acknowledge()?)
                }
                advance => advance,
            };

            match advance {
                Some(Advance::Next { .. }) => {
                    ticker.reset();
                    self.present(&session, observer);
                }
                Some(Advance::Finished(summary)) => {
                    observer.on_summary(&summary);
                    if let Some(audio) = self.audio.as_mut() {
                        audio.stop();
                    }
                    return Ok(ExamOutcome {
                        results: session.into_results(),
                        summary,
                    });
                }
                None => {}
            }
        }
    }

    fn apply(
        &self,
        session: &mut ExamSession,
        action: StudentAction,
        pending: &mut Option<EvaluationTask>,
        observer: &dyn ExamObserver,
    ) -> Result<Option<Advance>, ExamError> {
        match action {
            StudentAction::Answer(text) => {
                session.set_answer(text)?;
                Ok(None)
            }
            StudentAction::Submit => {
                let submission = session.submit()?;
                *pending = Some(self.evaluate(submission, observer));
                Ok(None)
            }
            StudentAction::Acknowledge => session.acknowledge().map(Some),
            StudentAction::Abort => Err(ExamError::InvalidTransition {
                action: "abort",
                phase: session.phase().name(),
            }),
        }
    }

    fn present(&self, session: &ExamSession, observer: &dyn ExamObserver) {
        let Some(question) = session.current_question() else {
            return;
        };
        observer.on_question(
            session.current_index(),
            session.questions().len(),
            question,
            session.remaining_secs(),
        );
        if let Some(audio) = &self.audio {
            audio.speak(question.ai_prompt.clone());
        }
    }

    fn evaluate(&self, submission: Submission, observer: &dyn ExamObserver) -> EvaluationTask {
        observer.on_evaluating(&submission);
        if let Some(audio) = &self.audio {
            audio.interrupt();
        }
        let evaluator = Arc::clone(&self.evaluator);
        let token = self.cancel.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => Err(anyhow::anyhow!("evaluation cancelled")),
                result = evaluator.evaluate(&submission.question, &submission.answer) => result,
            }
        })
    }

    fn abort(&mut self, session: &ExamSession) -> ExamError {
        self.cancel.cancel();
        if let Some(audio) = self.audio.as_mut() {
            audio.stop();
        }
        let answered = session.results().len();
        tracing::warn!("exam aborted after {answered} answered questions");
        ExamError::Aborted { answered }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use codeviva_core::audio::AudioClip;
    use codeviva_core::evaluation::HeuristicEvaluator;
    use codeviva_core::traits::SpeechSynthesizer;
    use codeviva_core::model::{
        CourseConfig, Difficulty, Question, QuestionType, EVALUATION_FAILED_FEEDBACK,
        UNANSWERED_PLACEHOLDER,
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Question(usize),
        Warning(u64),
        Expired(usize),
        Evaluating { index: usize, auto: bool },
        Feedback(f64),
        Rejected,
        Summary(u32),
    }

    struct ChannelObserver(mpsc::UnboundedSender<Event>);

    impl ExamObserver for ChannelObserver {
        fn on_question(&self, index: usize, _: usize, _: &Question, _: u64) {
            let _ = self.0.send(Event::Question(index));
        }
        fn on_tick(&self, _: u64) {}
        fn on_time_warning(&self, remaining: u64) {
            let _ = self.0.send(Event::Warning(remaining));
        }
        fn on_time_expired(&self, index: usize) {
            let _ = self.0.send(Event::Expired(index));
        }
        fn on_evaluating(&self, submission: &Submission) {
            let _ = self.0.send(Event::Evaluating {
                index: submission.index,
                auto: submission.auto,
            });
        }
        fn on_feedback(&self, result: &ExamResult) {
            let _ = self.0.send(Event::Feedback(result.score));
        }
        fn on_action_rejected(&self, _: &ExamError) {
            let _ = self.0.send(Event::Rejected);
        }
        fn on_summary(&self, summary: &ScoreSummary) {
            let _ = self.0.send(Event::Summary(summary.total));
        }
    }

    /// Returns a fixed score, optionally after a delay or as an error.
    struct FixedEvaluator {
        score: Option<f64>,
        delay: Duration,
        seen: Mutex<Vec<String>>,
    }

    impl FixedEvaluator {
        fn scoring(score: f64) -> Arc<Self> {
            Arc::new(Self {
                score: Some(score),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AnswerEvaluator for FixedEvaluator {
        async fn evaluate(&self, question: &Question, answer: &str) -> anyhow::Result<ExamResult> {
            self.seen.lock().unwrap().push(answer.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let score = self.score.ok_or_else(|| anyhow::anyhow!("model unavailable"))?;
            Ok(ExamResult {
                question_id: question.id.clone(),
                kind: question.kind,
                student_answer: answer.to_string(),
                score,
                feedback: "Scored by the fixed evaluator.".into(),
            })
        }
    }

    #[derive(Default)]
    struct CountingSink {
        clips: AtomicUsize,
    }

    #[async_trait]
    impl AudioSink for CountingSink {
        async fn play(&self, _: AudioClip) -> anyhow::Result<()> {
            self.clips.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn speak_text(&self, _: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn stop(&self) {}
    }

    struct DelayedSpeech(Duration);

    #[async_trait]
    impl SpeechSynthesizer for DelayedSpeech {
        async fn synthesize(&self, text: &str) -> anyhow::Result<AudioClip> {
            tokio::time::sleep(self.0).await;
            Ok(AudioClip::from_pcm16_bytes(&vec![0u8; text.len() * 2], 24_000, 1))
        }
    }

    fn question(id: &str, kind: QuestionType) -> Question {
        Question {
            id: id.into(),
            kind,
            file_source: None,
            snippet: String::new(),
            difficulty: Difficulty::Easy,
            ai_prompt: format!("Explain {id}."),
            ai_detail_level: 2,
        }
    }

    fn session() -> ExamSession {
        let mut config = CourseConfig::new("Algorithms");
        config.time_oral_min = 1;
        config.time_coding_min = 2;
        ExamSession::new(
            vec![
                question("q-1", QuestionType::Oral),
                question("q-2", QuestionType::Coding),
            ],
            config,
        )
        .unwrap()
    }

    async fn next_event(
        events: &mut mpsc::UnboundedReceiver<Event>,
        wanted: fn(&Event) -> bool,
    ) -> Event {
        loop {
            let event = events.recv().await.expect("runner stopped early");
            if wanted(&event) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unattended_exam_auto_submits_everything() {
        let evaluator = Arc::new(HeuristicEvaluator);
        let (_tx, rx) = mpsc::channel(8);
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let started = Instant::now();

        let outcome = ExamRunner::new(evaluator)
            .run(session(), rx, &ChannelObserver(events_tx))
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert!(outcome
            .results
            .iter()
            .all(|r| r.score == 0.0 && r.student_answer == UNANSWERED_PLACEHOLDER));
        assert_eq!(outcome.summary.total, 0);
        assert!(started.elapsed() >= Duration::from_secs(180));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                Event::Question(0),
                Event::Warning(30),
                Event::Expired(0),
                Event::Evaluating { index: 0, auto: true },
                Event::Question(1),
                Event::Warning(30),
                Event::Expired(1),
                Event::Evaluating { index: 1, auto: true },
                Event::Summary(0),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_still_finishes() {
        let evaluator = FixedEvaluator::scoring(80.0);
        let (tx, rx) = mpsc::channel(8);
        tx.send(StudentAction::Answer("partial thoughts".into()))
            .await
            .unwrap();
        drop(tx);

        let outcome = ExamRunner::new(evaluator.clone())
            .run(session(), rx, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(
            *evaluator.seen.lock().unwrap(),
            vec!["partial thoughts".to_string(), UNANSWERED_PLACEHOLDER.to_string()]
        );
        assert_eq!(outcome.summary.total, 80);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_during_feedback_still_finishes() {
        let evaluator = FixedEvaluator::scoring(60.0);
        let (tx, rx) = mpsc::channel(8);
        tx.send(StudentAction::Answer("the loop sums".into()))
            .await
            .unwrap();
        tx.send(StudentAction::Submit).await.unwrap();
        drop(tx);

        let outcome = tokio::time::timeout(
            Duration::from_secs(24 * 3600),
            ExamRunner::new(evaluator.clone()).run(session(), rx, &NoopObserver),
        )
        .await
        .expect("runner stuck after the action channel closed")
        .unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].student_answer, "the loop sums");
        assert_eq!(outcome.results[1].student_answer, UNANSWERED_PLACEHOLDER);
        assert_eq!(outcome.summary.total, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_closing_mid_evaluation_still_finishes() {
        let evaluator = Arc::new(FixedEvaluator {
            score: Some(40.0),
            delay: Duration::from_secs(5),
            seen: Mutex::new(Vec::new()),
        });
        let (tx, rx) = mpsc::channel(8);
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let run = tokio::spawn(async move {
            let observer = ChannelObserver(events_tx);
            ExamRunner::new(evaluator).run(session(), rx, &observer).await
        });

        tx.send(StudentAction::Answer("binary search halves the range".into()))
            .await
            .unwrap();
        tx.send(StudentAction::Submit).await.unwrap();
        next_event(&mut events, |e| matches!(e, Event::Evaluating { .. })).await;
        drop(tx);

        next_event(&mut events, |e| *e == Event::Feedback(40.0)).await;
        next_event(&mut events, |e| *e == Event::Question(1)).await;
        next_event(&mut events, |e| *e == Event::Expired(1)).await;

        let outcome = tokio::time::timeout(Duration::from_secs(24 * 3600), run)
            .await
            .expect("runner stuck after the action channel closed")
            .unwrap()
            .unwrap();
        assert_eq!(outcome.results.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn submitting_interrupts_question_narration() {
        let sink = Arc::new(CountingSink::default());
        let speech: Arc<dyn SpeechSynthesizer> = Arc::new(DelayedSpeech(Duration::from_secs(5)));
        let audio = AudioSession::new(sink.clone(), Some(speech));
        let (tx, rx) = mpsc::channel(8);
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let run = tokio::spawn(async move {
            let observer = ChannelObserver(events_tx);
            ExamRunner::new(FixedEvaluator::scoring(75.0))
                .with_audio(audio)
                .run(session(), rx, &observer)
                .await
        });

        next_event(&mut events, |e| *e == Event::Question(0)).await;
        tx.send(StudentAction::Answer("it recurses".into())).await.unwrap();
        tx.send(StudentAction::Submit).await.unwrap();
        next_event(&mut events, |e| matches!(e, Event::Feedback(_))).await;

        // Long enough for the first question's clip to finish synthesizing.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.clips.load(Ordering::SeqCst), 0);

        tx.send(StudentAction::Abort).await.unwrap();
        assert!(run.await.unwrap().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_submission_waits_for_acknowledgement() {
        let evaluator = FixedEvaluator::scoring(90.0);
        let (tx, rx) = mpsc::channel(8);
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let run = tokio::spawn(async move {
            let observer = ChannelObserver(events_tx);
            ExamRunner::new(evaluator).run(session(), rx, &observer).await
        });

        next_event(&mut events, |e| *e == Event::Question(0)).await;
        tx.send(StudentAction::Submit).await.unwrap();
        next_event(&mut events, |e| *e == Event::Rejected).await;

        tx.send(StudentAction::Answer("the loop sums".into())).await.unwrap();
        tx.send(StudentAction::Submit).await.unwrap();
        let feedback = next_event(&mut events, |e| matches!(e, Event::Feedback(_))).await;
        assert_eq!(feedback, Event::Feedback(90.0));

        tx.send(StudentAction::Acknowledge).await.unwrap();
        next_event(&mut events, |e| *e == Event::Question(1)).await;

        tx.send(StudentAction::Answer("return early on error".into()))
            .await
            .unwrap();
        tx.send(StudentAction::Submit).await.unwrap();
        next_event(&mut events, |e| matches!(e, Event::Feedback(_))).await;
        tx.send(StudentAction::Acknowledge).await.unwrap();

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].student_answer, "the loop sums");
        assert_eq!(outcome.summary.total, 90);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_evaluation_records_zero() {
        let evaluator = Arc::new(FixedEvaluator {
            score: None,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        });
        let (_tx, rx) = mpsc::channel(8);

        let outcome = ExamRunner::new(evaluator)
            .run(session(), rx, &NoopObserver)
            .await
            .unwrap();

        assert!(outcome
            .results
            .iter()
            .all(|r| r.score == 0.0 && r.feedback == EVALUATION_FAILED_FEEDBACK));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_cancels_in_flight_evaluation() {
        let evaluator = Arc::new(FixedEvaluator {
            score: Some(50.0),
            delay: Duration::from_secs(3600),
            seen: Mutex::new(Vec::new()),
        });
        let (tx, rx) = mpsc::channel(8);
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let run = tokio::spawn(async move {
            let observer = ChannelObserver(events_tx);
            ExamRunner::new(evaluator).run(session(), rx, &observer).await
        });

        tx.send(StudentAction::Answer("answer".into())).await.unwrap();
        tx.send(StudentAction::Submit).await.unwrap();
        next_event(&mut events, |e| matches!(e, Event::Evaluating { .. })).await;
        let started = Instant::now();
        tx.send(StudentAction::Abort).await.unwrap();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, ExamError::Aborted { answered: 0 }));
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn external_cancellation_aborts() {
        let evaluator = FixedEvaluator::scoring(70.0);
        let (_tx, rx) = mpsc::channel(8);
        let runner = ExamRunner::new(evaluator);
        let token = runner.cancellation_token();

        let run = tokio::spawn(async move { runner.run(session(), rx, &NoopObserver).await });
        tokio::time::sleep(Duration::from_secs(75)).await;
        token.cancel();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, ExamError::Aborted { answered: 1 }));
    }
}

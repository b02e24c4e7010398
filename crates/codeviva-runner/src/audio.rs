//! Question narration.
//!
//! An [`AudioSession`] is started with the runner's cancellation token and
//! stopped when the exam ends. Every [`AudioSession::speak`] bumps a play
//! generation so that a clip which finishes synthesizing after a newer
//! request is dropped instead of talking over it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use codeviva_core::audio::AudioClip;
use codeviva_core::traits::SpeechSynthesizer;

/// Where narration ends up: a speaker, a file, a terminal.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play a synthesized clip to completion.
    async fn play(&self, clip: AudioClip) -> anyhow::Result<()>;

    /// Speak text without a synthesized clip (system TTS, or just printing).
    async fn speak_text(&self, text: &str) -> anyhow::Result<()>;

    /// Cut off whatever is playing.
    fn stop(&self);
}

pub struct AudioSession {
    sink: Arc<dyn AudioSink>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    generation: Arc<AtomicU64>,
    token: Option<CancellationToken>,
}

impl AudioSession {
    pub fn new(sink: Arc<dyn AudioSink>, synthesizer: Option<Arc<dyn SpeechSynthesizer>>) -> Self {
        Self {
            sink,
            synthesizer,
            generation: Arc::new(AtomicU64::new(0)),
            token: None,
        }
    }

    /// Begin accepting narration. Cancelling `parent` stops it.
    pub fn start(&mut self, parent: &CancellationToken) {
        if self.token.is_none() {
            self.token = Some(parent.child_token());
        }
    }

    pub fn is_active(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Narrate `text`, interrupting anything already playing.
    ///
    /// Returns `None` when the session is not active.
    pub fn speak(&self, text: impl Into<String>) -> Option<JoinHandle<()>> {
        let token = self.token.as_ref().filter(|t| !t.is_cancelled())?.clone();
        let text = text.into();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.sink.stop();

        let sink = Arc::clone(&self.sink);
        let synthesizer = self.synthesizer.clone();
        let current = Arc::clone(&self.generation);

        Some(tokio::spawn(async move {
            let narrate = async {
                let clip = match &synthesizer {
                    Some(synth) => Some(synth.synthesize(&text).await),
                    None => None,
                };
                if current.load(Ordering::SeqCst) != generation {
                    tracing::debug!("dropping stale narration {generation}");
                    return;
                }
                let played = match clip {
                    Some(Ok(clip)) => sink.play(clip).await,
                    Some(Err(e)) => {
                        tracing::warn!("speech synthesis failed, using text speech: {e:#}");
                        sink.speak_text(&text).await
                    }
                    None => sink.speak_text(&text).await,
                };
                if let Err(e) = played {
                    tracing::warn!("narration failed: {e:#}");
                }
            };

            tokio::select! {
                _ = token.cancelled() => {}
                _ = narrate => {}
            }
        }))
    }

    /// Silence the current narration but keep the session active.
    pub fn interrupt(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.sink.stop();
    }

    /// Stop narration and refuse further requests until restarted.
    pub fn stop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.sink.stop();
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.stop();
    }
}

//! codeviva-providers — Clients for the external collaborators.
//!
//! Implements `LlmProvider` and `SpeechSynthesizer` for Gemini and
//! OpenAI-compatible APIs, and talks to the spreadsheet-backed persistence
//! script that stores course settings and exam results.

pub mod config;
pub mod error;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod script;

pub use config::{
    create_provider, create_speech, load_config, load_config_from, CodevivaConfig, ProviderConfig,
};
pub use error::{PersistenceError, ProviderError};
pub use script::{RecalcTarget, ScriptClient};

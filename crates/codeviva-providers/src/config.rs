//! Provider configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use codeviva_core::traits::{LlmProvider, SpeechSynthesizer};

use crate::gemini::{GeminiProvider, GeminiSpeech};
use crate::openai::OpenAiProvider;

/// Configuration for a single AI provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Gemini {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Gemini {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
        }
    }
}

/// Top-level codeviva configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodevivaConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model used to generate questions.
    #[serde(default = "default_generation_model")]
    pub generation_model: String,
    /// Model used to evaluate answers and analyze uploads.
    #[serde(default = "default_evaluation_model")]
    pub evaluation_model: String,
    /// Text-to-speech model; narration falls back to text when unset or failing.
    #[serde(default)]
    pub speech_model: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    /// Seconds the AI evaluator gets before the heuristic takes over.
    #[serde(default = "default_evaluation_timeout")]
    pub evaluation_timeout_secs: u64,
    /// Retries on transient generation errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Web endpoint of the persistence script.
    #[serde(default)]
    pub persistence_url: Option<String>,
    /// Output directory for questions and exam records.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    "gemini-2.5-pro".to_string()
}
fn default_evaluation_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_evaluation_timeout() -> u64 {
    8
}
fn default_retries() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./codeviva-results")
}

impl Default for CodevivaConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            generation_model: default_generation_model(),
            evaluation_model: default_evaluation_model(),
            speech_model: None,
            voice: None,
            evaluation_timeout_secs: default_evaluation_timeout(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            persistence_url: None,
            output_dir: default_output_dir(),
        }
    }
}

impl CodevivaConfig {
    /// Look up a provider by name, or the default provider.
    pub fn provider(&self, name: Option<&str>) -> Result<&ProviderConfig> {
        let name = name.unwrap_or(&self.default_provider);
        self.providers.get(name).with_context(|| {
            format!("provider '{name}' is not configured (run `codeviva init` or set CODEVIVA_GEMINI_KEY)")
        })
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are inserted verbatim and never expanded again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::Gemini { api_key, base_url } => ProviderConfig::Gemini {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            org_id: org_id.as_deref().map(resolve_env_vars),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `codeviva.toml` in the current directory
/// 2. `~/.config/codeviva/config.toml`
///
/// Environment variable overrides: `CODEVIVA_GEMINI_KEY`, `CODEVIVA_OPENAI_KEY`.
pub fn load_config() -> Result<CodevivaConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<CodevivaConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("codeviva.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<CodevivaConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => CodevivaConfig::default(),
    };

    apply_env_overrides(&mut config);

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config.persistence_url = config.persistence_url.as_deref().map(resolve_env_vars);

    Ok(config)
}

fn apply_env_overrides(config: &mut CodevivaConfig) {
    if let Ok(key) = std::env::var("CODEVIVA_GEMINI_KEY") {
        let entry = config
            .providers
            .entry("gemini".into())
            .or_insert(ProviderConfig::Gemini {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Gemini { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("CODEVIVA_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("codeviva"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn LlmProvider>> {
    match config {
        ProviderConfig::Gemini { api_key, base_url } => {
            Ok(Box::new(GeminiProvider::new(api_key, base_url.clone())?))
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Ok(Box::new(OpenAiProvider::new(
            api_key,
            base_url.clone(),
            org_id.clone(),
        )?)),
    }
}

/// Create a speech synthesizer, if the provider offers one.
pub fn create_speech(
    config: &ProviderConfig,
    model: Option<String>,
    voice: Option<String>,
) -> Result<Option<Box<dyn SpeechSynthesizer>>> {
    match config {
        ProviderConfig::Gemini { api_key, base_url } => {
            let provider = GeminiProvider::new(api_key, base_url.clone())?;
            Ok(Some(Box::new(GeminiSpeech::new(provider, model, voice))))
        }
        ProviderConfig::OpenAI { .. } => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_CODEVIVA_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_CODEVIVA_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_CODEVIVA_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${unterminated"), "${unterminated");
        std::env::remove_var("_CODEVIVA_TEST_VAR");
    }

    #[test]
    fn resolved_values_are_not_expanded_again() {
        std::env::set_var("_CODEVIVA_SELF_REF", "a${_CODEVIVA_SELF_REF}b");
        std::env::set_var("_CODEVIVA_OTHER", "x");
        assert_eq!(
            resolve_env_vars("${_CODEVIVA_SELF_REF}-${_CODEVIVA_OTHER}"),
            "a${_CODEVIVA_SELF_REF}b-x"
        );
        assert_eq!(resolve_env_vars("${_CODEVIVA_UNSET_VAR}tail"), "tail");
        std::env::remove_var("_CODEVIVA_SELF_REF");
        std::env::remove_var("_CODEVIVA_OTHER");
    }

    #[test]
    fn default_config() {
        let config = CodevivaConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.evaluation_timeout(), Duration::from_secs(8));
        assert_eq!(config.max_retries, 2);
        assert!(config.persistence_url.is_none());
    }

    #[test]
    fn parse_provider_config() {
        let toml_str = r#"
default_provider = "gemini"
evaluation_model = "gemini-2.5-flash"
evaluation_timeout_secs = 5
persistence_url = "https://script.example.com/exec"

[providers.gemini]
type = "gemini"
api_key = "g-test"

[providers.openai]
type = "openai"
api_key = "sk-openai"
base_url = "http://localhost:8080"
"#;
        let config: CodevivaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert!(matches!(
            config.provider(None).unwrap(),
            ProviderConfig::Gemini { .. }
        ));
        assert!(matches!(
            config.provider(Some("openai")).unwrap(),
            ProviderConfig::OpenAI { .. }
        ));
        assert!(config.provider(Some("ollama")).is_err());
        assert_eq!(config.evaluation_timeout_secs, 5);
    }

    #[test]
    fn debug_masks_keys() {
        let config = ProviderConfig::Gemini {
            api_key: "secret-key".into(),
            base_url: None,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codeviva.toml");
        std::fs::write(
            &path,
            "[providers.work]\ntype = \"openai\"\napi_key = \"${_CODEVIVA_LOAD_KEY}\"\n",
        )
        .unwrap();
        std::env::set_var("_CODEVIVA_LOAD_KEY", "resolved");

        let config = load_config_from(Some(&path)).unwrap();
        match config.provider(Some("work")).unwrap() {
            ProviderConfig::OpenAI { api_key, .. } => assert_eq!(api_key, "resolved"),
            other => panic!("unexpected provider: {other:?}"),
        }
        std::env::remove_var("_CODEVIVA_LOAD_KEY");

        assert!(load_config_from(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn openai_has_no_speech() {
        let config = ProviderConfig::OpenAI {
            api_key: "k".into(),
            base_url: None,
            org_id: None,
        };
        assert!(create_speech(&config, None, None).unwrap().is_none());
        assert!(create_provider(&config).is_ok());
    }
}

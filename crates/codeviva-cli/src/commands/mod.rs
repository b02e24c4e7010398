//! Subcommand implementations.

pub mod analyze;
pub mod exam;
pub mod extract;
pub mod generate;
pub mod init;
pub mod list_models;
pub mod score;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use codeviva_core::model::CourseConfig;
use codeviva_core::parser;
use codeviva_core::traits::LlmProvider;
use codeviva_providers::{create_provider, load_config_from, CodevivaConfig, ScriptClient};

use crate::{CourseSource, ProviderArgs};

/// Load the config and build the selected provider.
pub(crate) fn connect(args: &ProviderArgs) -> Result<(CodevivaConfig, Arc<dyn LlmProvider>)> {
    let config = load_config_from(args.config.as_deref())?;
    let provider_config = config.provider(args.provider.as_deref())?;
    let provider: Arc<dyn LlmProvider> = Arc::from(create_provider(provider_config)?);
    tracing::debug!("using provider {}", provider.name());
    Ok((config, provider))
}

/// A course file when given, otherwise the defaults (all source extensions).
pub(crate) fn course_or_default(path: Option<&Path>) -> Result<CourseConfig> {
    match path {
        Some(path) => parser::parse_course_config(path),
        None => Ok(CourseConfig::new("ad hoc")),
    }
}

/// Resolve the course from a local file or the persistence script.
pub(crate) async fn resolve_course(
    source: &CourseSource,
    config: &CodevivaConfig,
) -> Result<CourseConfig> {
    if let Some(path) = &source.course {
        return parser::parse_course_config(path);
    }
    let name = source
        .remote_course
        .as_deref()
        .context("either --course or --remote-course is required")?;
    let client = ScriptClient::from_url(config.persistence_url.as_deref())?;
    client
        .course_config(name)
        .await
        .with_context(|| format!("failed to fetch course '{name}'"))
}

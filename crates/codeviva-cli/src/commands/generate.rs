//! The `codeviva generate` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use codeviva_core::archive::load_archive;
use codeviva_core::generation::{GenerationOptions, QuestionGenerator};
use codeviva_core::model::Question;

use super::{connect, resolve_course};
use crate::{CourseSource, ProviderArgs};

pub async fn execute(
    archive: PathBuf,
    source: CourseSource,
    student: String,
    exclude: Option<PathBuf>,
    output: Option<PathBuf>,
    args: ProviderArgs,
) -> Result<()> {
    let (config, provider) = connect(&args)?;
    let course = resolve_course(&source, &config).await?;

    let files = load_archive(&archive, &course.extensions())?;
    anyhow::ensure!(
        !files.is_empty(),
        "the archive contains no source files with an allowed extension"
    );

    let exclude_snippets = match &exclude {
        Some(path) => read_questions(path)?
            .into_iter()
            .map(|q| q.snippet)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        None => Vec::new(),
    };

    eprintln!(
        "Generating {} question(s) for {} from {} file(s)...",
        course.total_questions(),
        student,
        files.len()
    );

    let generator = QuestionGenerator::new(
        provider,
        GenerationOptions {
            model: config.generation_model.clone(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            ..Default::default()
        },
    );
    let questions = generator
        .generate(&files, &student, &course, &exclude_snippets)
        .await?;

    print_questions(&questions);

    let path = match output {
        Some(path) => path,
        None => {
            let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
            config.output_dir.join(format!("questions-{stamp}.json"))
        }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&questions)?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write questions: {}", path.display()))?;
    eprintln!("Questions saved to: {}", path.display());

    Ok(())
}

/// Read a question file written by this command.
pub(crate) fn read_questions(path: &Path) -> Result<Vec<Question>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read questions: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse questions: {}", path.display()))
}

fn print_questions(questions: &[Question]) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Type", "Difficulty", "File", "Prompt"]);
    for (i, q) in questions.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(q.kind),
            Cell::new(q.difficulty),
            Cell::new(q.file_source.as_deref().unwrap_or("-")),
            Cell::new(codeviva_core::model::truncate_chars(&q.ai_prompt, 80)),
        ]);
    }
    eprintln!("\n{table}");
}

//! The `codeviva analyze` command.

use std::path::PathBuf;

use anyhow::Result;

use codeviva_core::analysis::ProjectAnalyzer;
use codeviva_core::archive::load_archive;

use super::{connect, course_or_default};
use crate::ProviderArgs;

pub async fn execute(archive: PathBuf, course: Option<PathBuf>, args: ProviderArgs) -> Result<()> {
    let course = course_or_default(course.as_deref())?;
    let files = load_archive(&archive, &course.extensions())?;
    anyhow::ensure!(
        !files.is_empty(),
        "the archive contains no source files with an allowed extension"
    );

    let (config, provider) = connect(&args)?;
    let analyzer = ProjectAnalyzer::new(provider, config.evaluation_model.clone());
    let analysis = analyzer.analyze(&files).await;

    if analysis.complexity.is_simple {
        println!("Complexity: TOO SIMPLE");
    } else {
        println!("Complexity: OK");
    }
    println!("  {}", analysis.complexity.reason);
    println!("\nReview:\n{}", analysis.review.trim());

    Ok(())
}

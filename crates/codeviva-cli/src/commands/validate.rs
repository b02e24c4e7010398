//! The `codeviva validate` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use codeviva_core::parser;

pub fn execute(course_path: PathBuf) -> Result<()> {
    let paths = if course_path.is_dir() {
        course_files(&course_path)?
    } else {
        vec![course_path]
    };
    anyhow::ensure!(!paths.is_empty(), "no course files found");

    let mut total_warnings = 0;

    for path in &paths {
        let course = parser::parse_course_config(path)?;
        println!(
            "Course: {} ({} oral, {} coding questions)",
            course.name,
            course.oral.total(),
            course.coding.total()
        );

        let warnings = parser::validate_course_config(&course);
        for w in &warnings {
            let prefix = w
                .field
                .as_ref()
                .map(|field| format!("  [{field}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All courses valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}

fn course_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

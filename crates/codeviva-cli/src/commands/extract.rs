//! The `codeviva extract` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use codeviva_core::archive::load_archive;

use super::course_or_default;

pub fn execute(archive: PathBuf, course: Option<PathBuf>) -> Result<()> {
    let course = course_or_default(course.as_deref())?;
    let extensions = course.extensions();
    let files = load_archive(&archive, &extensions)?;

    if files.is_empty() {
        println!(
            "No source files matched the allowed extensions ({}).",
            extensions.join(", ")
        );
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["File", "Language", "Characters"]);
    for file in &files {
        table.add_row(vec![
            Cell::new(&file.name),
            Cell::new(&file.language),
            Cell::new(file.content.chars().count()),
        ]);
    }

    println!("{table}");
    println!("{} file(s) extracted.", files.len());
    Ok(())
}

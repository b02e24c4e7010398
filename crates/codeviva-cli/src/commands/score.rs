//! The `codeviva score` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use codeviva_core::parser;
use codeviva_core::report::{load_results, ExamRecord};
use codeviva_core::scoring::aggregate;
use codeviva_providers::{load_config_from, RecalcTarget, ScriptClient};

use super::exam::print_record;

pub async fn execute(
    record_path: Option<PathBuf>,
    results_path: Option<PathBuf>,
    course_path: Option<PathBuf>,
    recalculate: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let course = course_path
        .as_deref()
        .map(parser::parse_course_config)
        .transpose()?;

    if let Some(path) = record_path {
        let mut record = ExamRecord::load_json(&path)?;
        if let Some(course) = &course {
            let previous = record.reweigh(course.weights);
            if previous != record.summary.total {
                println!("Total changed: {previous} -> {}", record.summary.total);
                record.save_json(&path)?;
            }
        }
        print_record(&record);

        if recalculate {
            let config = load_config_from(config_path.as_deref())?;
            let client = ScriptClient::from_url(config.persistence_url.as_deref())?;
            let course_id = record
                .course_code
                .clone()
                .unwrap_or_else(|| record.course_name.clone());
            let updated = client
                .recalculate_scores(&[RecalcTarget::new(
                    record.candidate.student_id.clone(),
                    course_id,
                )])
                .await
                .context("failed to recalculate stored scores")?;
            println!("Persistence script updated {updated} row(s).");
        }
        return Ok(());
    }

    let results_path = results_path.context("either --record or --results is required")?;
    let course = course.context("--course is required with --results")?;
    let results = load_results(&results_path)?;
    let summary = aggregate(&results, &course.weights);

    let mut table = Table::new();
    table.set_header(vec!["", "Average", "Weight", "Questions"]);
    table.add_row(vec![
        Cell::new("Oral"),
        Cell::new(format!("{:.1}", summary.avg_oral)),
        Cell::new(format!("{}%", course.weights.oral)),
        Cell::new(summary.oral_count),
    ]);
    table.add_row(vec![
        Cell::new("Coding"),
        Cell::new(format!("{:.1}", summary.avg_coding)),
        Cell::new(format!("{}%", course.weights.coding)),
        Cell::new(summary.coding_count),
    ]);
    println!("{table}");
    println!("Total: {}", summary.total);

    Ok(())
}

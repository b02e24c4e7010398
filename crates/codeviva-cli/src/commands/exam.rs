//! The `codeviva exam` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use tokio::sync::mpsc;

use codeviva_core::evaluation::AiEvaluator;
use codeviva_core::model::Candidate;
use codeviva_core::report::ExamRecord;
use codeviva_core::session::ExamSession;
use codeviva_core::traits::SpeechSynthesizer;
use codeviva_providers::{create_speech, ScriptClient};
use codeviva_runner::{AudioSession, ExamRunner};

use super::generate::read_questions;
use super::{connect, resolve_course};
use crate::console::{read_actions, ConsoleObserver, TerminalSink};
use crate::{CourseSource, ProviderArgs};

pub async fn execute(
    questions_path: PathBuf,
    source: CourseSource,
    candidate: Candidate,
    narrate: bool,
    submit: bool,
    args: ProviderArgs,
) -> Result<()> {
    let (config, provider) = connect(&args)?;
    let course = resolve_course(&source, &config).await?;
    let questions = read_questions(&questions_path)?;

    // A missing persistence URL must fail before the exam starts.
    let script = if submit {
        Some(ScriptClient::from_url(config.persistence_url.as_deref())?)
    } else {
        None
    };

    let session = ExamSession::new(questions, course.clone())?;
    let evaluator = AiEvaluator::new(provider, config.evaluation_model.clone())
        .with_timeout(config.evaluation_timeout());
    let mut runner = ExamRunner::new(Arc::new(evaluator));

    if narrate {
        let provider_config = config.provider(args.provider.as_deref())?;
        let speech: Option<Arc<dyn SpeechSynthesizer>> =
            create_speech(provider_config, config.speech_model.clone(), config.voice.clone())?
                .map(Arc::from);
        if speech.is_none() {
            tracing::warn!("provider has no speech model, narration is text only");
        }
        runner = runner.with_audio(AudioSession::new(Arc::new(TerminalSink), speech));
    }

    let cancel = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let (tx, rx) = mpsc::channel(32);
    std::thread::spawn(move || read_actions(std::io::stdin().lock(), tx));

    println!(
        "{}: {} question(s) for {} ({})",
        course.name,
        session.questions().len(),
        candidate.name,
        candidate.student_id
    );

    let outcome = runner.run(session, rx, &ConsoleObserver).await?;
    let record = ExamRecord::new(candidate, &course, outcome.results);
    print_record(&record);

    std::fs::create_dir_all(&config.output_dir)?;
    let path = config.output_dir.join(record.file_name());
    record.save_json(&path)?;
    eprintln!("Record saved to: {}", path.display());

    if let Some(script) = script {
        script
            .submit_exam(&record)
            .await
            .context("exam finished and was saved locally, but submission failed")?;
        eprintln!("Submitted to the persistence script.");
    }

    Ok(())
}

pub(crate) fn print_record(record: &ExamRecord) {
    let mut table = Table::new();
    table.set_header(vec!["Question", "Type", "Score", "Feedback"]);
    for result in &record.results {
        table.add_row(vec![
            Cell::new(&result.question_id),
            Cell::new(result.kind),
            Cell::new(format!("{:.1}", result.score)),
            Cell::new(codeviva_core::model::truncate_chars(&result.feedback, 100)),
        ]);
    }
    println!("\n{table}");

    let summary = &record.summary;
    let mut totals = Table::new();
    totals.set_header(vec!["", "Average", "Weight", "Questions"]);
    totals.add_row(vec![
        Cell::new("Oral"),
        Cell::new(format!("{:.1}", summary.avg_oral)),
        Cell::new(format!("{}%", record.weights.oral)),
        Cell::new(summary.oral_count),
    ]);
    totals.add_row(vec![
        Cell::new("Coding"),
        Cell::new(format!("{:.1}", summary.avg_coding)),
        Cell::new(format!("{}%", record.weights.coding)),
        Cell::new(summary.coding_count),
    ]);
    println!("{totals}");
    println!("Total: {}", summary.total);
}

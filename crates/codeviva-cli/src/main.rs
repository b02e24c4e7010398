//! codeviva CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

mod commands;
mod console;

#[derive(Parser)]
#[command(
    name = "codeviva",
    version,
    about = "AI-assisted oral and coding exams over a student's own project"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the course settings come from.
#[derive(Args, Clone)]
#[group(required = true, multiple = false)]
pub struct CourseSource {
    /// Path to a course TOML file
    #[arg(long)]
    pub course: Option<PathBuf>,

    /// Fetch the course by name or code from the persistence script
    #[arg(long)]
    pub remote_course: Option<String>,
}

/// Provider selection shared by every command that talks to an AI service.
#[derive(Args, Clone)]
pub struct ProviderArgs {
    /// Provider name from the config (defaults to `default_provider`)
    #[arg(long)]
    pub provider: Option<String>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and an example course
    Init,

    /// Validate course TOML files
    Validate {
        /// Path to a course file or a directory of them
        #[arg(long)]
        course: PathBuf,
    },

    /// List the source files an upload contributes to an exam
    Extract {
        /// Project ZIP archive
        #[arg(long)]
        archive: PathBuf,

        /// Course file whose allowed extensions apply
        #[arg(long)]
        course: Option<PathBuf>,
    },

    /// Check an upload's complexity and get a short code review
    Analyze {
        #[arg(long)]
        archive: PathBuf,

        #[arg(long)]
        course: Option<PathBuf>,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Generate exam questions from a project archive
    Generate {
        #[arg(long)]
        archive: PathBuf,

        #[command(flatten)]
        course: CourseSource,

        /// Student name used to address the questions
        #[arg(long)]
        student: String,

        /// Earlier question file whose snippets must not be reused
        #[arg(long)]
        exclude: Option<PathBuf>,

        /// Output file for the questions (defaults to the configured output dir)
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Sit an exam in the terminal
    Exam {
        /// Question file written by `generate`
        #[arg(long)]
        questions: PathBuf,

        #[command(flatten)]
        course: CourseSource,

        /// Student number
        #[arg(long)]
        student_id: String,

        /// Student name
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        class_name: String,

        #[arg(long, default_value = "")]
        team_id: String,

        /// Read questions aloud with the configured speech model
        #[arg(long)]
        narrate: bool,

        /// Send the record to the persistence script when done
        #[arg(long)]
        submit: bool,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Score stored results with a course's weights
    Score {
        /// Exam record JSON written by `exam`
        #[arg(long, conflicts_with = "results")]
        record: Option<PathBuf>,

        /// Bare JSON array of results
        #[arg(long, required_unless_present = "record")]
        results: Option<PathBuf>,

        /// Course whose weights apply (required with --results)
        #[arg(long, required_unless_present = "record")]
        course: Option<PathBuf>,

        /// Ask the persistence script to recompute its stored total as well
        #[arg(long, requires = "record")]
        recalculate: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List available models
    ListModels {
        #[command(flatten)]
        provider: ProviderArgs,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("codeviva=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { course } => commands::validate::execute(course),
        Commands::Extract { archive, course } => commands::extract::execute(archive, course),
        Commands::Analyze {
            archive,
            course,
            provider,
        } => commands::analyze::execute(archive, course, provider).await,
        Commands::Generate {
            archive,
            course,
            student,
            exclude,
            output,
            provider,
        } => commands::generate::execute(archive, course, student, exclude, output, provider).await,
        Commands::Exam {
            questions,
            course,
            student_id,
            name,
            class_name,
            team_id,
            narrate,
            submit,
            provider,
        } => {
            let candidate = codeviva_core::model::Candidate {
                student_id,
                name,
                class_name,
                team_id,
            };
            commands::exam::execute(questions, course, candidate, narrate, submit, provider).await
        }
        Commands::Score {
            record,
            results,
            course,
            recalculate,
            config,
        } => commands::score::execute(record, results, course, recalculate, config).await,
        Commands::ListModels { provider } => commands::list_models::execute(provider),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

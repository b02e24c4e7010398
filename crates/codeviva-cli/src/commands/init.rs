//! The `codeviva init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("codeviva.toml").exists() {
        println!("codeviva.toml already exists, skipping.");
    } else {
        std::fs::write("codeviva.toml", SAMPLE_CONFIG)?;
        println!("Created codeviva.toml");
    }

    std::fs::create_dir_all("courses")?;
    let example_path = std::path::Path::new("courses/example.toml");
    if example_path.exists() {
        println!("courses/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_COURSE)?;
        println!("Created courses/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit codeviva.toml with your API keys");
    println!("  2. Run: codeviva validate --course courses/example.toml");
    println!(
        "  3. Run: codeviva generate --archive project.zip --course courses/example.toml --student \"Your Name\""
    );

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# codeviva configuration

default_provider = "gemini"
generation_model = "gemini-2.5-pro"
evaluation_model = "gemini-2.5-flash"
speech_model = "gemini-2.5-flash-preview-tts"
voice = "Kore"
evaluation_timeout_secs = 8
max_retries = 2
retry_delay_ms = 1000
output_dir = "./codeviva-results"
# persistence_url = "https://script.google.com/macros/s/<deployment>/exec"

[providers.gemini]
type = "gemini"
api_key = "${GEMINI_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"
"#;

const EXAMPLE_COURSE: &str = r#"[course]
name = "Web Programming"
code = "IF-301"
language_priority = ["php", "js", "html"]
allowed_extensions = ["php", "js", "html", "css"]
project_type = "WEB"
ui_framework = "Bootstrap"
app_framework = "Laravel"
time_oral_min = 5
time_coding_min = 15
ai_detail_level = 2
instr_oral = "Ask about request handling and input validation."

[course.oral]
easy = 1
medium = 1
hard = 1

[course.coding]
easy = 1
medium = 1
hard = 0

[course.weights]
oral = 40
coding = 60
"#;

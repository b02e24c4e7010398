//! Question generation.
//!
//! Packages the uploaded project and the course configuration into a single
//! request for the generative model, then normalizes the JSON array it
//! returns into [`Question`]s.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ExamError, ProviderError};
use crate::model::{
    truncate_chars, CodeFile, CourseConfig, Difficulty, Question, QuestionType,
    DEFAULT_DETAIL_LEVEL,
};
use crate::traits::{parse_json_lenient, GenerateRequest, GenerateResponse, LlmProvider};

/// Files sent per request.
pub const MAX_PROMPT_FILES: usize = 10;
/// Characters kept from each file.
pub const MAX_FILE_CHARS: usize = 3000;
/// Teammates' snippets listed as off limits.
pub const MAX_EXCLUDED_SNIPPETS: usize = 5;

/// Knobs for the generation request.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub max_tokens: u32,
    /// Retries on transient provider errors.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time.
    pub retry_delay: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-pro".to_string(),
            max_tokens: 8192,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Generates exam questions from a student's project.
pub struct QuestionGenerator {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl QuestionGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self { provider, options }
    }

    /// Generate the full question list for one student.
    ///
    /// # Errors
    ///
    /// [`ExamError::NoQuestions`] when nothing is configured or nothing usable
    /// came back; [`ExamError::Generation`] when the provider keeps failing.
    pub async fn generate(
        &self,
        files: &[CodeFile],
        student_name: &str,
        config: &CourseConfig,
        exclude_snippets: &[String],
    ) -> Result<Vec<Question>, ExamError> {
        if config.total_questions() == 0 {
            return Err(ExamError::NoQuestions);
        }

        let (_, temperature) = detail_profile(config.ai_detail_level);
        let request = GenerateRequest::new(
            self.options.model.clone(),
            build_generation_prompt(student_name, config, exclude_snippets),
        )
        .with_attachment(format!(
            "Student project source code:\n{}",
            render_sources(files, &config.language_priority)
        ))
        .with_temperature(temperature)
        .with_max_tokens(self.options.max_tokens)
        .json();

        let started = Instant::now();
        let response = generate_with_retry(
            self.provider.as_ref(),
            &request,
            self.options.max_retries,
            self.options.retry_delay,
        )
        .await
        .map_err(|e| ExamError::Generation(format!("{e:#}")))?;

        let questions = parse_questions(&response.content, config.ai_detail_level, Uuid::new_v4());
        tracing::info!(
            "generated {} of {} requested questions in {}ms",
            questions.len(),
            config.total_questions(),
            started.elapsed().as_millis()
        );

        if questions.is_empty() {
            return Err(ExamError::NoQuestions);
        }
        Ok(questions)
    }
}

/// Strictness description and sampling temperature for a detail level.
pub fn detail_profile(level: u8) -> (&'static str, f64) {
    match level {
        1 => (
            "Basic: ask about fundamental functions, variables, and simple control flow.",
            0.5,
        ),
        3 => (
            "Expert: be highly critical. Dissect algorithmic efficiency, security, best practices, and how modules interact.",
            0.9,
        ),
        _ => (
            "Standard: analyze the core logic and how data flows through it.",
            0.7,
        ),
    }
}

/// Stable sort by language priority. Unlisted languages go last.
pub fn prioritize_files<'a>(files: &'a [CodeFile], priority: &[String]) -> Vec<&'a CodeFile> {
    let rank = |file: &CodeFile| {
        priority
            .iter()
            .position(|lang| *lang == file.language)
            .unwrap_or(usize::MAX)
    };
    let mut sorted: Vec<&CodeFile> = files.iter().collect();
    sorted.sort_by_key(|f| rank(f));
    sorted
}

/// Render the prioritized, truncated sources as one attachment.
pub fn render_sources(files: &[CodeFile], priority: &[String]) -> String {
    prioritize_files(files, priority)
        .into_iter()
        .take(MAX_PROMPT_FILES)
        .map(|f| {
            format!(
                "FILE: {}\nLANGUAGE: {}\nCONTENT:\n{}",
                f.name,
                f.language,
                truncate_chars(&f.content, MAX_FILE_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Build the generation instruction.
pub fn build_generation_prompt(
    student_name: &str,
    config: &CourseConfig,
    exclude_snippets: &[String],
) -> String {
    let (strictness, _) = detail_profile(config.ai_detail_level);
    let total = config.total_questions();
    let oral = config.oral;
    let coding = config.coding;

    let mut prompt = format!(
        "Act as a highly experienced senior IT examiner. You are examining the student: {student_name}.\n\n\
         MANDATORY PROJECT CONFIGURATION (base every question on it):\n\
         - Project type: {project_type}\n\
         - UI framework: {ui}\n\
         - App framework: {app}\n\
         - Examiner strictness: {strictness}\n\n\
         TASK: Produce EXACTLY {total} questions based on the provided source code.\n\n\
         QUESTION SPLIT:\n\
         1. ORAL questions (type: ORAL):\n\
         \x20  - Easy: {oe}, Medium: {om}, Hard: {oh}.\n\
         \x20  - Focus: ask \"why\" and \"how\" the logic in the code works.\n",
        project_type = config.project_type,
        ui = config.ui_framework,
        app = config.app_framework,
        oe = oral.easy,
        om = oral.medium,
        oh = oral.hard,
    );
    if let Some(instr) = config.instr_oral.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("   - Additional oral instructions: {instr}\n"));
    }

    prompt.push_str(&format!(
        "2. CODING questions (type: CODING):\n\
         \x20  - Easy: {ce}, Medium: {cm}, Hard: {ch}.\n\
         \x20  - Focus: give a modification task. The student must write new code or fix the snippet.\n\
         \x20  - Keep the task consistent with {app} and {ui}.\n",
        ce = coding.easy,
        cm = coding.medium,
        ch = coding.hard,
        app = config.app_framework,
        ui = config.ui_framework,
    ));
    if let Some(instr) = config.instr_code.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("   - Additional coding instructions: {instr}\n"));
    }

    prompt.push_str(&format!(
        "\nTECHNOLOGY CHECK:\n\
         - If the project is configured for {ui} but the code does not reflect it, ask about it critically in an oral question.\n\n\
         JSON RULES:\n\
         - Output MUST be a JSON array of objects with keys: type (ORAL or CODING), fileSource, snippet, difficulty (easy, medium, hard), aiPrompt.\n\
         - Snippets must be copied accurately from the provided files.\n",
        ui = config.ui_framework,
    ));

    if !exclude_snippets.is_empty() {
        let excluded = exclude_snippets
            .iter()
            .take(MAX_EXCLUDED_SNIPPETS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n---\n");
        prompt.push_str(&format!(
            "\nIMPORTANT: the following snippets were already used for teammates, DO NOT use them again:\n{excluded}\n"
        ));
    }

    prompt
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    file_source: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    ai_prompt: String,
}

/// Normalize a model response into questions.
///
/// Items without a prompt or with an unknown type are dropped; an unknown
/// difficulty becomes medium.
pub fn parse_questions(response: &str, detail_level: u8, run_id: Uuid) -> Vec<Question> {
    let Some(raw) = parse_json_lenient::<Vec<RawQuestion>>(response, '[', ']') else {
        tracing::warn!("question response is not a JSON array");
        return Vec::new();
    };

    let detail_level = if (1..=3).contains(&detail_level) {
        detail_level
    } else {
        DEFAULT_DETAIL_LEVEL
    };
    let run = run_id.simple().to_string();

    raw.into_iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let kind: QuestionType = match item.kind.parse() {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::warn!("dropping generated question {idx}: {e}");
                    return None;
                }
            };
            if item.ai_prompt.trim().is_empty() {
                tracing::warn!("dropping generated question {idx}: empty prompt");
                return None;
            }
            let difficulty = item
                .difficulty
                .as_deref()
                .and_then(|d| d.parse::<Difficulty>().ok())
                .unwrap_or(Difficulty::Medium);

            Some(Question {
                id: format!("q-{}-{idx}", &run[..8]),
                kind,
                file_source: item.file_source.filter(|s| !s.trim().is_empty()),
                snippet: item
                    .snippet
                    .map(|s| s.replace("\\n", "\n"))
                    .unwrap_or_default(),
                difficulty,
                ai_prompt: item.ai_prompt.trim().to_string(),
                ai_detail_level: detail_level,
            })
        })
        .collect()
}

/// Call the provider, retrying transient failures with exponential backoff.
pub async fn generate_with_retry(
    provider: &dyn LlmProvider,
    request: &GenerateRequest,
    max_retries: u32,
    initial_delay: Duration,
) -> anyhow::Result<GenerateResponse> {
    let mut last_error = None;
    let mut retry_delay = initial_delay;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(retry_delay).await;
            retry_delay = (retry_delay * 2).min(Duration::from_secs(60));
        }
        match provider.generate(request).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                if let Some(provider_err) = e.downcast_ref::<ProviderError>() {
                    if provider_err.is_permanent() {
                        return Err(e);
                    }
                    if let Some(ms) = provider_err.retry_after_ms() {
                        retry_delay = Duration::from_millis(ms);
                    }
                }
                tracing::warn!(
                    "{} request failed (attempt {}): {e:#}",
                    provider.name(),
                    attempt + 1
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::model::QuestionCounts;
    use crate::traits::{ModelInfo, ResponseFormat, TokenUsage};

    /// Replays scripted outcomes, then repeats the last one.
    struct ScriptedProvider {
        outcomes: Mutex<Vec<Result<String, ProviderError>>>,
        calls: AtomicU32,
        last_request: Mutex<Option<GenerateRequest>>,
    }

    impl ScriptedProvider {
        fn new(outcomes: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicU32::new(0),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            *self.last_request.lock().unwrap() = Some(request.clone());
            let mut outcomes = self.outcomes.lock().unwrap();
            let outcome = if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                match &outcomes[0] {
                    Ok(s) => Ok(s.clone()),
                    Err(e) => Err(ProviderError::ApiError {
                        status: 500,
                        message: e.to_string(),
                    }),
                }
            };
            let content = outcome?;
            Ok(GenerateResponse {
                content,
                model: request.model.clone(),
                token_usage: TokenUsage::default(),
                latency_ms: 1,
            })
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn file(name: &str, language: &str) -> CodeFile {
        CodeFile {
            name: name.into(),
            content: format!("// {name}"),
            language: language.into(),
        }
    }

    fn course() -> CourseConfig {
        let mut config = CourseConfig::new("Web Programming");
        config.language_priority = vec!["php".into(), "js".into()];
        config.oral = QuestionCounts {
            easy: 1,
            medium: 1,
            hard: 0,
        };
        config.coding = QuestionCounts {
            easy: 0,
            medium: 1,
            hard: 0,
        };
        config
    }

    const QUESTIONS_JSON: &str = r#"```json
[
  {"type": "ORAL", "fileSource": "index.php", "snippet": "foreach ($items as $i) {\\n  $total += $i;\\n}", "difficulty": "easy", "aiPrompt": "Why does the loop accumulate into $total?"},
  {"type": "oral", "fileSource": "", "snippet": "", "difficulty": "Sedang", "aiPrompt": "How is the session started?"},
  {"type": "CODING", "fileSource": "app.js", "snippet": "fetch(url)", "difficulty": "medium", "aiPrompt": "Add error handling to the fetch call."},
  {"type": "ESSAY", "aiPrompt": "Write an essay."},
  {"type": "CODING", "aiPrompt": "   "}
]
```"#;

    #[test]
    fn priority_sort_is_stable_and_puts_unlisted_last() {
        let files = vec![
            file("style.css", "css"),
            file("app.js", "js"),
            file("index.php", "php"),
            file("page.html", "html"),
            file("util.js", "js"),
        ];
        let priority = vec!["php".to_string(), "js".to_string()];
        let names: Vec<&str> = prioritize_files(&files, &priority)
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["index.php", "app.js", "util.js", "style.css", "page.html"]
        );
    }

    #[test]
    fn sources_are_bounded() {
        let files: Vec<CodeFile> = (0..15)
            .map(|i| CodeFile {
                name: format!("f{i}.py"),
                content: "x".repeat(MAX_FILE_CHARS + 500),
                language: "py".into(),
            })
            .collect();
        let rendered = render_sources(&files, &[]);
        assert_eq!(rendered.matches("FILE: ").count(), MAX_PROMPT_FILES);
        assert!(!rendered.contains(&"x".repeat(MAX_FILE_CHARS + 1)));
        assert!(rendered.contains("FILE: f9.py"));
        assert!(!rendered.contains("FILE: f10.py"));
    }

    #[test]
    fn prompt_carries_counts_and_exclusions() {
        let mut config = course();
        config.instr_code = Some("Use prepared statements.".into());
        let excluded: Vec<String> = (0..7).map(|i| format!("snippet-{i}")).collect();
        let prompt = build_generation_prompt("Ayu", &config, &excluded);
        assert!(prompt.contains("student: Ayu"));
        assert!(prompt.contains("EXACTLY 3 questions"));
        assert!(prompt.contains("Easy: 1, Medium: 1, Hard: 0."));
        assert!(prompt.contains("Use prepared statements."));
        assert!(prompt.contains("snippet-4"));
        assert!(!prompt.contains("snippet-5"));
    }

    #[test]
    fn detail_levels_map_to_temperature() {
        assert_eq!(detail_profile(1).1, 0.5);
        assert_eq!(detail_profile(2).1, 0.7);
        assert_eq!(detail_profile(3).1, 0.9);
        assert_eq!(detail_profile(9).1, 0.7);
    }

    #[test]
    fn parse_normalizes_items() {
        let questions = parse_questions(QUESTIONS_JSON, 3, Uuid::nil());
        assert_eq!(questions.len(), 3);

        assert_eq!(questions[0].kind, QuestionType::Oral);
        assert_eq!(questions[0].difficulty, Difficulty::Easy);
        assert!(questions[0].snippet.contains("{\n  $total"));
        assert_eq!(questions[0].ai_detail_level, 3);
        assert_eq!(questions[0].id, "q-00000000-0");

        assert_eq!(questions[1].difficulty, Difficulty::Medium);
        assert_eq!(questions[1].file_source, None);

        assert_eq!(questions[2].kind, QuestionType::Coding);
    }

    #[test]
    fn parse_tolerates_prose_around_array() {
        let response = r#"Here are the questions: [{"type":"ORAL","difficulty":"hard","aiPrompt":"Explain the router."}] Good luck."#;
        let questions = parse_questions(response, 2, Uuid::nil());
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].difficulty, Difficulty::Hard);
    }

    #[test]
    fn parse_garbage_yields_nothing() {
        assert!(parse_questions("I cannot help with that.", 2, Uuid::nil()).is_empty());
    }

    #[tokio::test]
    async fn generate_sends_json_request() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(QUESTIONS_JSON.into())]));
        let generator = QuestionGenerator::new(provider.clone(), GenerationOptions::default());
        let files = vec![file("app.js", "js"), file("index.php", "php")];

        let questions = generator.generate(&files, "Ayu", &course(), &[]).await.unwrap();
        assert_eq!(questions.len(), 3);

        let request = provider.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.response_format, ResponseFormat::Json);
        assert_eq!(request.temperature, 0.7);
        let attachment = &request.attachments[0];
        assert!(attachment.find("index.php").unwrap() < attachment.find("app.js").unwrap());
    }

    #[tokio::test]
    async fn generate_without_configured_questions_fails_fast() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(QUESTIONS_JSON.into())]));
        let generator = QuestionGenerator::new(provider.clone(), GenerationOptions::default());
        let err = generator
            .generate(&[], "Ayu", &CourseConfig::new("Empty"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExamError::NoQuestions));
        assert_eq!(provider.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn generate_with_unusable_response_fails() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("[]".into())]));
        let generator = QuestionGenerator::new(provider, GenerationOptions::default());
        let err = generator.generate(&[], "Ayu", &course(), &[]).await.unwrap_err();
        assert!(matches!(err, ExamError::NoQuestions));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::RateLimited { retry_after_ms: 10 }),
            Ok(QUESTIONS_JSON.into()),
        ]));
        let generator = QuestionGenerator::new(provider.clone(), GenerationOptions::default());
        let questions = generator.generate(&[], "Ayu", &course(), &[]).await.unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(provider.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::AuthenticationFailed("bad key".into())),
            Ok(QUESTIONS_JSON.into()),
        ]));
        let generator = QuestionGenerator::new(provider.clone(), GenerationOptions::default());
        let err = generator.generate(&[], "Ayu", &course(), &[]).await.unwrap_err();
        assert!(matches!(err, ExamError::Generation(msg) if msg.contains("authentication")));
        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
    }
}

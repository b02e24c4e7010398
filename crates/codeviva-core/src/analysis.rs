//! Upload-time project analysis: a complexity gate and a code review.
//!
//! Neither check blocks the upload. Failures degrade to fixed answers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{truncate_chars, CodeFile};
use crate::traits::{parse_json_lenient, GenerateRequest, LlmProvider};

const COMPLEXITY_FILES: usize = 10;
const COMPLEXITY_CHARS: usize = 1000;
const REVIEW_FILES: usize = 15;
const REVIEW_CHARS: usize = 2000;

pub const COMPLEXITY_SKIPPED_REASON: &str = "complexity check skipped";
pub const REVIEW_UNAVAILABLE: &str = "Sorry, the AI could not review your code right now.";

/// Whether a project is too trivial to examine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityVerdict {
    pub is_simple: bool,
    pub reason: String,
}

impl ComplexityVerdict {
    fn skipped() -> Self {
        Self {
            is_simple: false,
            reason: COMPLEXITY_SKIPPED_REASON.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAnalysis {
    pub complexity: ComplexityVerdict,
    /// Markdown review.
    pub review: String,
}

pub struct ProjectAnalyzer {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl ProjectAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Run both checks concurrently.
    pub async fn analyze(&self, files: &[CodeFile]) -> ProjectAnalysis {
        let (complexity, review) = futures::join!(self.check_complexity(files), self.review(files));
        ProjectAnalysis { complexity, review }
    }

    pub async fn check_complexity(&self, files: &[CodeFile]) -> ComplexityVerdict {
        let request = GenerateRequest::new(self.model.clone(), COMPLEXITY_PROMPT)
            .with_attachment(format!(
                "Source code sample:\n{}",
                sample(files, COMPLEXITY_FILES, COMPLEXITY_CHARS, "\n---\n")
            ))
            .with_temperature(0.2)
            .with_max_tokens(512)
            .json();

        match self.provider.generate(&request).await {
            Ok(response) => parse_json_lenient(&response.content, '{', '}').unwrap_or_else(|| {
                tracing::warn!("complexity verdict is not a JSON object");
                ComplexityVerdict::skipped()
            }),
            Err(e) => {
                tracing::warn!("complexity check failed: {e:#}");
                ComplexityVerdict::skipped()
            }
        }
    }

    pub async fn review(&self, files: &[CodeFile]) -> String {
        let request = GenerateRequest::new(self.model.clone(), REVIEW_PROMPT)
            .with_attachment(format!(
                "Source code:\n{}",
                sample(files, REVIEW_FILES, REVIEW_CHARS, "\n\n---\n\n")
            ))
            .with_max_tokens(4096);

        match self.provider.generate(&request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => REVIEW_UNAVAILABLE.to_string(),
            Err(e) => {
                tracing::warn!("code review failed: {e:#}");
                REVIEW_UNAVAILABLE.to_string()
            }
        }
    }
}

const COMPLEXITY_PROMPT: &str = "\
Decide whether this student project is TOO SIMPLE for an intermediate IT project assignment.

Too simple means any of:
1. Only boilerplate (for example a single index.php that echoes \"hello\").
2. No business logic, loops, or meaningful data manipulation.
3. Very little productive code (under 50 lines of logic in total).

Output a JSON object: {\"isSimple\": boolean, \"reason\": \"short explanation\"}";

const REVIEW_PROMPT: &str = "\
Act as a senior software architect and review this student project.
Focus on:
1. Clean code.
2. Potential bugs and security holes.
3. Best practices for the languages used.
4. Optimization suggestions.

Answer in tidy Markdown with headings, bullet points, and code blocks where needed. \
Be professional but encouraging.";

fn sample(files: &[CodeFile], max_files: usize, max_chars: usize, separator: &str) -> String {
    files
        .iter()
        .take(max_files)
        .map(|f| format!("FILE: {}\nCONTENT:\n{}", f.name, truncate_chars(&f.content, max_chars)))
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::traits::{GenerateResponse, ModelInfo, ResponseFormat, TokenUsage};

    /// Answers JSON requests and text requests differently.
    struct SplitProvider {
        json: Option<&'static str>,
        text: Option<&'static str>,
    }

    #[async_trait]
    impl LlmProvider for SplitProvider {
        fn name(&self) -> &str {
            "split"
        }

        async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            let reply = match request.response_format {
                ResponseFormat::Json => self.json,
                ResponseFormat::Text => self.text,
            };
            let content = reply.ok_or_else(|| anyhow::anyhow!("service unavailable"))?;
            Ok(GenerateResponse {
                content: content.to_string(),
                model: request.model.clone(),
                token_usage: TokenUsage::default(),
                latency_ms: 1,
            })
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn files() -> Vec<CodeFile> {
        vec![CodeFile {
            name: "index.php".into(),
            content: "<?php echo 'hello';".into(),
            language: "php".into(),
        }]
    }

    #[tokio::test]
    async fn analyze_runs_both_checks() {
        let provider = Arc::new(SplitProvider {
            json: Some(r#"{"isSimple": true, "reason": "only a hello world"}"#),
            text: Some("## Review\n- add input validation"),
        });
        let analysis = ProjectAnalyzer::new(provider, "flash").analyze(&files()).await;
        assert!(analysis.complexity.is_simple);
        assert_eq!(analysis.complexity.reason, "only a hello world");
        assert!(analysis.review.starts_with("## Review"));
    }

    #[tokio::test]
    async fn failures_degrade_to_fixed_answers() {
        let provider = Arc::new(SplitProvider {
            json: None,
            text: None,
        });
        let analysis = ProjectAnalyzer::new(provider, "flash").analyze(&files()).await;
        assert!(!analysis.complexity.is_simple);
        assert_eq!(analysis.complexity.reason, COMPLEXITY_SKIPPED_REASON);
        assert_eq!(analysis.review, REVIEW_UNAVAILABLE);
    }

    #[tokio::test]
    async fn garbage_verdict_is_skipped() {
        let provider = Arc::new(SplitProvider {
            json: Some("looks fine to me"),
            text: Some("   "),
        });
        let analyzer = ProjectAnalyzer::new(provider, "flash");
        assert_eq!(
            analyzer.check_complexity(&files()).await,
            ComplexityVerdict::skipped()
        );
        assert_eq!(analyzer.review(&files()).await, REVIEW_UNAVAILABLE);
    }

    #[test]
    fn sample_is_bounded() {
        let many: Vec<CodeFile> = (0..20)
            .map(|i| CodeFile {
                name: format!("f{i}.js"),
                content: "y".repeat(3000),
                language: "js".into(),
            })
            .collect();
        let text = sample(&many, REVIEW_FILES, REVIEW_CHARS, "\n---\n");
        assert_eq!(text.matches("FILE: ").count(), REVIEW_FILES);
        assert!(!text.contains(&"y".repeat(REVIEW_CHARS + 1)));
    }
}

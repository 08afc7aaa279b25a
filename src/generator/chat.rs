use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ArtifactDraft, ArtifactGenerator, GenerationRequest, parse_draft};
use crate::errors::GenerationError;
use crate::util::truncate_with_marker;

pub const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

pub const MAX_CONTEXT_CHARS: usize = 4000;
pub const MAX_TREE_CHARS: usize = 1000;
const CONTEXT_TRUNCATED: &str = "...\n[Context truncated due to size limits]";
const TREE_TRUNCATED: &str = "...\n[File tree truncated due to size limits]";

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a unit test generation assistant. For the file you are given:
1. Identify the behaviour worth testing.
2. Write at most 3 focused test cases covering core behaviour, edge cases and error handling.
3. Use the testing framework idiomatic for the file's language, include its imports,
   mock external dependencies and give every test a descriptive name.

The repository's file tree and related sources follow; use them to resolve imports.";

const RESPONSE_FORMAT: &str = r###"Respond with a JSON object containing:
- "code": the test code only, no surrounding prose
- "metadata": markdown notes on how to run the tests
- "packages": array of required package names, without versions

Example:
{
  "code": "describe('add', () => { ... })",
  "metadata": "## Test Description\n\nCovers...",
  "packages": ["jest"]
}"###;

/// Connection and sampling settings for `ChatGenerator`.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Base URL; `/chat/completions` is appended.
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub system_prompt: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            api_url: GROQ_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.9,
            max_tokens: 4000,
            timeout: Duration::from_secs(120),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Build the system message: the configured prompt followed by the repository's
/// tree and aggregated context.
///
/// The aggregated context and the tree summary are truncated to fixed character
/// budgets.
pub fn build_system_message(system_prompt: &str, request: &GenerationRequest<'_>) -> String {
    let tree = truncate_with_marker(request.tree_summary, MAX_TREE_CHARS, TREE_TRUNCATED);
    let context = truncate_with_marker(request.context, MAX_CONTEXT_CHARS, CONTEXT_TRUNCATED);
    format!("{system_prompt}\n\nFile Tree:\n{tree}\n\nRepository Context:\n{context}")
}

/// Build the user message for one file. The target file is always sent whole.
pub fn build_prompt(request: &GenerationRequest<'_>) -> String {
    format!(
        "Code to Test ({path}):\n{code}\n\nRequest: {instruction}\n\n{RESPONSE_FORMAT}",
        path = request.target_path,
        code = request.target_content,
        instruction = request.instruction,
    )
}

/// `ArtifactGenerator` over an OpenAI-compatible chat-completions API (Groq by default).
pub struct ChatGenerator {
    client: reqwest::Client,
    settings: ChatSettings,
}

impl ChatGenerator {
    pub fn new(settings: ChatSettings) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(GenerationError::Transport)?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ArtifactGenerator for ChatGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<ArtifactDraft, GenerationError> {
        let system = build_system_message(&self.settings.system_prompt, request);
        let prompt = build_prompt(request);
        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let mut http = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.settings.api_key {
            http = http.header("Authorization", format!("Bearer {}", key));
        }

        tracing::debug!(
            model = %self.settings.model,
            path = request.target_path,
            prompt_chars = system.len() + prompt.len(),
            "requesting completion"
        );
        let response = http.send().await.map_err(GenerationError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(GenerationError::EmptyResponse)?;

        parse_draft(&content)
    }
}

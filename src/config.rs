//! `hiro.toml` configuration.
//!
//! Layered file → environment → CLI flags. Only this module reads the environment;
//! everything downstream receives explicit settings.
//!
//! ```toml
//! [github]
//! api_url = "https://api.github.com"
//! request_delay_ms = 1000
//! max_rate_limit_wait_secs = 60
//! timeout_secs = 30
//! user_agent = "hiro"
//!
//! [generator]
//! api_url = "https://api.groq.com/openai/v1"
//! model = "llama-3.3-70b-versatile"
//! temperature = 0.9
//! max_tokens = 4000
//! timeout_secs = 120
//! instruction = "Generate a test function for this file"
//!
//! [walk]
//! extra_skip_extensions = [".md"]
//!
//! [output]
//! dir = "hiro-tests"
//!
//! [publish]
//! branch = "hiro-tests"
//! remote_dir = "hiro-tests"
//! commit_message = "generated test cases for {file}"
//! open_pull_request = false
//! ```
//!
//! Secrets come from the environment first: `GITHUB_PERSONAL_ACCESS_TOKEN` or
//! `GITHUB_TOKEN` for the hosting API, `GROQ_API_KEY` or `GROQ_KEY` for the model.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::generator::chat::{DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, GROQ_API_URL};
use crate::generator::{ChatSettings, DEFAULT_INSTRUCTION};
use crate::github::client::GITHUB_API_URL;
use crate::github::{GitHubSettings, is_valid_github_token};
use crate::pipeline::{DEFAULT_BRANCH, DEFAULT_COMMIT_MESSAGE, DEFAULT_REMOTE_DIR, PipelineOptions};
use crate::walker::ExtensionDenylist;

pub const CONFIG_FILE: &str = "hiro.toml";

const GITHUB_TOKEN_VARS: &[&str] = &["GITHUB_PERSONAL_ACCESS_TOKEN", "GITHUB_TOKEN"];
const GENERATOR_KEY_VARS: &[&str] = &["GROQ_API_KEY", "GROQ_KEY"];

/// Environment lookup. `process_env` in production, a map in tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read a non-empty variable from the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn first_env(env: EnvLookup<'_>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| env(key))
}

/// `[github]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubSection {
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub request_delay_ms: u64,
    pub max_rate_limit_wait_secs: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            api_url: GITHUB_API_URL.to_string(),
            token: None,
            request_delay_ms: 1000,
            max_rate_limit_wait_secs: 60,
            timeout_secs: 30,
            user_agent: "hiro".to_string(),
        }
    }
}

/// `[generator]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSection {
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub instruction: String,
    /// Replaces the built-in system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            api_url: GROQ_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.9,
            max_tokens: 4000,
            timeout_secs: 120,
            instruction: DEFAULT_INSTRUCTION.to_string(),
            system_prompt: None,
        }
    }
}

/// `[walk]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkSection {
    /// Replaces the default denylist when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_extensions: Option<Vec<String>>,
    /// Added on top of the (default or replaced) denylist.
    pub extra_skip_extensions: Vec<String>,
}

/// `[output]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("hiro-tests"),
        }
    }
}

/// `[publish]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    pub branch: String,
    pub remote_dir: String,
    pub commit_message: String,
    pub open_pull_request: bool,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            branch: DEFAULT_BRANCH.to_string(),
            remote_dir: DEFAULT_REMOTE_DIR.to_string(),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            open_pull_request: false,
        }
    }
}

/// The complete hiro.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HiroToml {
    #[serde(default)]
    pub github: GithubSection,
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub walk: WalkSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub publish: PublishSection,
}

impl HiroToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse hiro.toml")
    }

    /// Load `path`, or defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize hiro.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Hosting-API token: environment first, then the file.
    pub fn github_token(&self, env: EnvLookup<'_>) -> Option<String> {
        first_env(env, GITHUB_TOKEN_VARS).or_else(|| self.github.token.clone())
    }

    /// Model API key: environment first, then the file.
    pub fn generator_api_key(&self, env: EnvLookup<'_>) -> Option<String> {
        first_env(env, GENERATOR_KEY_VARS).or_else(|| self.generator.api_key.clone())
    }

    pub fn github_settings(&self, env: EnvLookup<'_>) -> GitHubSettings {
        GitHubSettings {
            api_url: self.github.api_url.clone(),
            token: self.github_token(env),
            user_agent: self.github.user_agent.clone(),
            request_delay: Duration::from_millis(self.github.request_delay_ms),
            max_rate_limit_wait: Duration::from_secs(self.github.max_rate_limit_wait_secs),
            timeout: Duration::from_secs(self.github.timeout_secs),
        }
    }

    pub fn chat_settings(&self, env: EnvLookup<'_>) -> ChatSettings {
        ChatSettings {
            api_url: self.generator.api_url.clone(),
            api_key: self.generator_api_key(env),
            model: self.generator.model.clone(),
            temperature: self.generator.temperature,
            max_tokens: self.generator.max_tokens,
            timeout: Duration::from_secs(self.generator.timeout_secs),
            system_prompt: self
                .generator
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    pub fn denylist(&self) -> ExtensionDenylist {
        let mut denylist = match &self.walk.skip_extensions {
            Some(list) => ExtensionDenylist::new(list),
            None => ExtensionDenylist::default(),
        };
        denylist.extend(&self.walk.extra_skip_extensions);
        denylist
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            instruction: self.generator.instruction.clone(),
            branch: self.publish.branch.clone(),
            remote_dir: self.publish.remote_dir.clone(),
            commit_message: self.publish.commit_message.clone(),
            publish: true,
            open_pull_request: self.publish.open_pull_request,
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(token) = &self.github.token
            && !is_valid_github_token(token)
        {
            warnings.push(
                "github.token does not look like a GitHub token (expected ghp_, github_pat_, gho_, ghu_, ghs_ or ghr_ prefix)"
                    .to_string(),
            );
        }
        if !(0.0..=2.0).contains(&self.generator.temperature) {
            warnings.push(format!(
                "generator.temperature {} is outside 0.0..=2.0",
                self.generator.temperature
            ));
        }
        if self.generator.max_tokens == 0 {
            warnings.push("generator.max_tokens is 0".to_string());
        }
        if self.publish.branch.trim().is_empty() {
            warnings.push("publish.branch is empty".to_string());
        }
        if !self.publish.commit_message.contains("{file}") {
            warnings.push(format!(
                "publish.commit_message '{}' has no {{file}} placeholder",
                self.publish.commit_message
            ));
        }
        if self.output.dir.as_os_str().is_empty() {
            warnings.push("output.dir is empty".to_string());
        }

        warnings
    }
}

/// Mask a secret for display, keeping its first four characters.
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}****", prefix)
}

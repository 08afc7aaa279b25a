//! Test-artifact generation.
//!
//! `ArtifactGenerator` is the seam between the pipeline and the language model.
//! `ChatGenerator` talks to an OpenAI-compatible chat-completions endpoint;
//! `ScriptedGenerator` replays canned drafts for tests and dry runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;
use crate::util::extract_json_object;

pub mod chat;
pub mod scripted;

pub use chat::{ChatGenerator, ChatSettings};
pub use scripted::{RecordedRequest, ScriptedGenerator};

pub const DEFAULT_INSTRUCTION: &str = "Generate a test function for this file";

/// Inputs for generating the tests of one file.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub tree_summary: &'a str,
    /// Rendered aggregated context of the whole walk.
    pub context: &'a str,
    pub target_path: &'a str,
    pub target_content: &'a str,
    pub instruction: &'a str,
}

/// What the model hands back for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDraft {
    pub code: String,
    /// Markdown notes on running the tests.
    pub metadata: String,
    pub packages: Vec<String>,
}

impl ArtifactDraft {
    /// Reject drafts with empty `code` or `metadata`.
    pub fn validate(self) -> Result<Self, GenerationError> {
        if self.code.trim().is_empty() {
            return Err(GenerationError::InvalidResponse("missing code".to_string()));
        }
        if self.metadata.trim().is_empty() {
            return Err(GenerationError::InvalidResponse("missing metadata".to_string()));
        }
        Ok(self)
    }
}

/// Parse a model reply into a validated draft.
///
/// The reply should be a bare JSON object; when the model wraps it in prose or a
/// code fence, the outermost object is extracted first.
pub fn parse_draft(reply: &str) -> Result<ArtifactDraft, GenerationError> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    let draft = match serde_json::from_str::<ArtifactDraft>(reply) {
        Ok(draft) => draft,
        Err(direct) => {
            let json = extract_json_object(reply)
                .ok_or_else(|| GenerationError::InvalidResponse(direct.to_string()))?;
            serde_json::from_str::<ArtifactDraft>(json)
                .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?
        }
    };
    draft.validate()
}

#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<ArtifactDraft, GenerationError>;
}

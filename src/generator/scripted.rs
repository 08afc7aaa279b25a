use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ArtifactDraft, ArtifactGenerator, GenerationRequest};
use crate::errors::GenerationError;

/// Owned copy of a `GenerationRequest` as received by `ScriptedGenerator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub tree_summary: String,
    pub context: String,
    pub target_path: String,
    pub target_content: String,
    pub instruction: String,
}

impl From<&GenerationRequest<'_>> for RecordedRequest {
    fn from(request: &GenerationRequest<'_>) -> Self {
        Self {
            tree_summary: request.tree_summary.to_string(),
            context: request.context.to_string(),
            target_path: request.target_path.to_string(),
            target_content: request.target_content.to_string(),
            instruction: request.instruction.to_string(),
        }
    }
}

/// A generator that answers from a script instead of a model.
///
/// Every file gets a canned draft unless a reply was scripted for its path; listed
/// paths fail. Every request is recorded in full.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: HashMap<String, ArtifactDraft>,
    failures: HashSet<String>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, path: &str, draft: ArtifactDraft) -> Self {
        self.replies.insert(path.to_string(), draft);
        self
    }

    pub fn failing_on(mut self, path: &str) -> Self {
        self.failures.insert(path.to_string());
        self
    }

    /// Target paths of every request so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|request| request.target_path)
            .collect()
    }

    /// Every request so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn canned(path: &str) -> ArtifactDraft {
        ArtifactDraft {
            code: format!("// tests for {}\n", path),
            metadata: format!("Tests covering `{}`.", path),
            packages: Vec::new(),
        }
    }
}

#[async_trait]
impl ArtifactGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<ArtifactDraft, GenerationError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest::from(request));
        }
        if self.failures.contains(request.target_path) {
            return Err(GenerationError::InvalidResponse(format!(
                "scripted failure for {}",
                request.target_path
            )));
        }
        Ok(self
            .replies
            .get(request.target_path)
            .cloned()
            .unwrap_or_else(|| Self::canned(request.target_path)))
    }
}

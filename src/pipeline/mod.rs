//! Batch pipeline: discover → generate → persist → publish.
//!
//! Stages run strictly in sequence on one task. Only a failed directory listing
//! (or an unreadable output directory) aborts a run; every per-file problem is
//! recorded in the `RunReport` and the batch moves on.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::errors::PipelineError;
use crate::generator::{ArtifactGenerator, DEFAULT_INSTRUCTION, GenerationRequest};
use crate::github::{PullRequest, PutFile, RepositoryRef, ResourceClient};
use crate::store::{GeneratedArtifact, LocalArtifactStore};
use crate::walker::{Discovery, ExtensionDenylist, walk};

pub mod events;
pub mod report;

pub use events::PipelineEvent;
pub use report::{
    ArtifactRecord, BranchStatus, FailureStage, FileFailure, PublishedFile, PullRequestStatus,
    RunReport,
};

use events::emit;

pub const DEFAULT_BRANCH: &str = "hiro-tests";
pub const DEFAULT_REMOTE_DIR: &str = "hiro-tests";
pub const DEFAULT_COMMIT_MESSAGE: &str = "generated test cases for {file}";

/// Knobs for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub instruction: String,
    /// Branch the artifacts are committed to.
    pub branch: String,
    /// Folder on the branch that receives the artifacts.
    pub remote_dir: String,
    /// `{file}` is replaced with the artifact's file name.
    pub commit_message: String,
    pub publish: bool,
    pub open_pull_request: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            instruction: DEFAULT_INSTRUCTION.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            remote_dir: DEFAULT_REMOTE_DIR.to_string(),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            publish: true,
            open_pull_request: false,
        }
    }
}

impl PipelineOptions {
    pub fn remote_path(&self, file_name: &str) -> String {
        let dir = self.remote_dir.trim_matches('/');
        if dir.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", dir, file_name)
        }
    }

    pub fn commit_message_for(&self, file_name: &str) -> String {
        self.commit_message.replace("{file}", file_name)
    }
}

pub struct BatchPipeline {
    client: Arc<dyn ResourceClient>,
    generator: Arc<dyn ArtifactGenerator>,
    store: Arc<LocalArtifactStore>,
    denylist: ExtensionDenylist,
    options: PipelineOptions,
    events: Option<broadcast::Sender<PipelineEvent>>,
}

impl BatchPipeline {
    pub fn new(
        client: Arc<dyn ResourceClient>,
        generator: Arc<dyn ArtifactGenerator>,
        store: Arc<LocalArtifactStore>,
    ) -> Self {
        Self {
            client,
            generator,
            store,
            denylist: ExtensionDenylist::default(),
            options: PipelineOptions::default(),
            events: None,
        }
    }

    pub fn with_denylist(mut self, denylist: ExtensionDenylist) -> Self {
        self.denylist = denylist;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Broadcast progress on `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run every stage against `repo`, scoped to `scope` (empty for the whole repository).
    pub async fn run(&self, repo: &RepositoryRef, scope: &str) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::new(repo.clone(), scope);
        emit(
            self.events.as_ref(),
            PipelineEvent::RunStarted {
                run_id: report.run_id,
                repository: repo.to_string(),
                scope: scope.to_string(),
            },
        );
        tracing::info!(run_id = %report.run_id, repo = %repo, scope, "run started");

        let discovery = self.discover(repo, scope).await?;
        report.discovered = discovery.paths.clone();
        for (path, message) in discovery.context.fetch_errors() {
            self.record(&mut report, FileFailure::new(path, FailureStage::FileFetch, message));
        }

        self.generate(repo, &discovery, &mut report).await;

        if self.options.publish {
            self.publish_into(repo, &mut report).await?;
        } else {
            tracing::info!("publishing disabled, artifacts stay local");
        }

        Ok(self.complete(report))
    }

    /// Publish whatever is in the repository's output directory, without generating.
    pub async fn publish(&self, repo: &RepositoryRef) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::new(repo.clone(), "");
        emit(
            self.events.as_ref(),
            PipelineEvent::RunStarted {
                run_id: report.run_id,
                repository: repo.to_string(),
                scope: String::new(),
            },
        );
        self.publish_into(repo, &mut report).await?;
        Ok(self.complete(report))
    }

    /// Walk the repository.
    pub async fn discover(&self, repo: &RepositoryRef, scope: &str) -> Result<Discovery, PipelineError> {
        let discovery = walk(self.client.as_ref(), &repo.slug(), scope, &self.denylist)
            .await
            .map_err(PipelineError::Discovery)?;
        emit(
            self.events.as_ref(),
            PipelineEvent::DiscoveryCompleted {
                files: discovery.paths.len(),
                entries: discovery.entries.len(),
                fetch_errors: discovery.context.fetch_errors().count(),
            },
        );
        Ok(discovery)
    }

    async fn generate(&self, repo: &RepositoryRef, discovery: &Discovery, report: &mut RunReport) {
        let slug = repo.slug();
        let tree_summary = discovery.tree_summary();
        let context = discovery.context.render();
        let total = discovery.paths.len();

        for (index, path) in discovery.paths.iter().enumerate() {
            emit(
                self.events.as_ref(),
                PipelineEvent::GenerationStarted {
                    path: path.clone(),
                    index,
                    total,
                },
            );

            let content = match self.client.file_content(&slug, path).await {
                Ok(content) => content,
                Err(e) => {
                    self.record(report, FileFailure::new(path, FailureStage::FileFetch, e.to_string()));
                    continue;
                }
            };

            let request = GenerationRequest {
                tree_summary: &tree_summary,
                context: &context,
                target_path: path,
                target_content: &content,
                instruction: &self.options.instruction,
            };
            let draft = match self.generator.generate(&request).await {
                Ok(draft) => draft,
                Err(e) => {
                    self.record(report, FileFailure::new(path, FailureStage::Generation, e.to_string()));
                    continue;
                }
            };

            let artifact = GeneratedArtifact {
                source_path: path.clone(),
                code: draft.code,
                metadata: draft.metadata,
                packages: draft.packages,
            };
            match self.store.persist(repo.name(), &artifact) {
                Ok(artifact_path) => {
                    tracing::info!(path = %path, artifact = %artifact_path.display(), "artifact generated");
                    emit(
                        self.events.as_ref(),
                        PipelineEvent::ArtifactWritten {
                            path: path.clone(),
                            artifact: artifact_path.clone(),
                        },
                    );
                    report.generated.push(ArtifactRecord {
                        source_path: artifact.source_path,
                        artifact_path,
                        packages: artifact.packages,
                    });
                }
                Err(e) => {
                    self.record(report, FileFailure::new(path, FailureStage::Store, e.to_string()));
                }
            }
        }
    }

    async fn publish_into(&self, repo: &RepositoryRef, report: &mut RunReport) -> Result<(), PipelineError> {
        let files = self.store.publishable(repo.name())?;
        if files.is_empty() {
            tracing::info!(dir = %self.store.repo_dir(repo.name()).display(), "nothing to publish");
            return Ok(());
        }
        emit(
            self.events.as_ref(),
            PipelineEvent::PublishStarted { files: files.len() },
        );

        let slug = repo.slug();
        let branch = self.options.branch.as_str();
        let status = match self
            .client
            .create_branch(&slug, branch, repo.default_branch())
            .await
        {
            Ok(outcome) => BranchStatus::from_outcome(branch, outcome),
            Err(e) => {
                tracing::warn!(branch, error = %e, "branch creation failed, skipping commits");
                BranchStatus::Failed {
                    branch: branch.to_string(),
                    message: e.to_string(),
                }
            }
        };
        emit(
            self.events.as_ref(),
            PipelineEvent::BranchReady {
                status: status.clone(),
            },
        );
        let ready = status.is_ready();
        report.branch = Some(status);
        if !ready {
            return Ok(());
        }

        for local in &files {
            self.commit_file(&slug, local, report).await;
        }

        if self.options.open_pull_request && !report.published.is_empty() {
            self.open_pull_request(repo, report).await;
        }
        Ok(())
    }

    async fn commit_file(&self, slug: &str, local: &Path, report: &mut RunReport) {
        let file_name = local
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let remote_path = self.options.remote_path(&file_name);
        let branch = self.options.branch.as_str();

        let content = match std::fs::read(local) {
            Ok(content) => content,
            Err(e) => {
                self.record(report, FileFailure::new(&remote_path, FailureStage::Commit, e.to_string()));
                return;
            }
        };
        let revision = match self.client.revision_marker(slug, branch, &remote_path).await {
            Ok(revision) => revision,
            Err(e) => {
                self.record(report, FileFailure::new(&remote_path, FailureStage::Commit, e.to_string()));
                return;
            }
        };

        let message = self.options.commit_message_for(&file_name);
        let put = PutFile {
            branch,
            path: &remote_path,
            content: &content,
            message: &message,
            revision: revision.as_deref(),
        };
        match self.client.put_file(slug, &put).await {
            Ok(outcome) => {
                tracing::info!(path = %remote_path, ?outcome, "published");
                emit(
                    self.events.as_ref(),
                    PipelineEvent::FilePublished {
                        remote_path: remote_path.clone(),
                        outcome,
                    },
                );
                report.published.push(PublishedFile {
                    local_path: local.to_path_buf(),
                    remote_path,
                    outcome,
                });
            }
            Err(e) => {
                self.record(report, FileFailure::new(&remote_path, FailureStage::Commit, e.to_string()));
            }
        }
    }

    async fn open_pull_request(&self, repo: &RepositoryRef, report: &mut RunReport) {
        let title = format!("Add generated tests ({})", self.options.branch);
        let mut body = String::from("Generated test files:\n\n");
        for file in &report.published {
            body.push_str(&format!("- `{}`\n", file.remote_path));
        }
        let pr = PullRequest {
            title: &title,
            head: &self.options.branch,
            base: repo.default_branch(),
            body: &body,
        };
        report.pull_request = Some(match self.client.create_pull_request(&repo.slug(), &pr).await {
            Ok(url) => {
                tracing::info!(url = %url, "pull request opened");
                emit(
                    self.events.as_ref(),
                    PipelineEvent::PullRequestOpened { url: url.clone() },
                );
                PullRequestStatus::Opened { url }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to open pull request");
                PullRequestStatus::Failed {
                    message: e.to_string(),
                }
            }
        });
    }

    fn record(&self, report: &mut RunReport, failure: FileFailure) {
        tracing::warn!(
            path = %failure.path,
            stage = %failure.stage,
            error = %failure.message,
            "file failed"
        );
        emit(
            self.events.as_ref(),
            PipelineEvent::FileFailed {
                failure: failure.clone(),
            },
        );
        report.failures.push(failure);
    }

    fn complete(&self, mut report: RunReport) -> RunReport {
        report.finish();
        tracing::info!(run_id = %report.run_id, summary = %report.summary(), "run complete");
        emit(
            self.events.as_ref(),
            PipelineEvent::RunCompleted {
                summary: report.summary(),
            },
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_path_joins_dir() {
        let options = PipelineOptions::default();
        assert_eq!(options.remote_path("test_a.test.py"), "hiro-tests/test_a.test.py");

        let options = PipelineOptions {
            remote_dir: "/".to_string(),
            ..PipelineOptions::default()
        };
        assert_eq!(options.remote_path("metadata.md"), "metadata.md");
    }

    #[test]
    fn test_commit_message_substitutes_file() {
        let options = PipelineOptions::default();
        assert_eq!(
            options.commit_message_for("test_main.test.py"),
            "generated test cases for test_main.test.py"
        );
    }
}

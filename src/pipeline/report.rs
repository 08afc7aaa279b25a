use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::github::{BranchOutcome, PutOutcome, RepositoryRef};

/// Stage at which a single file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    FileFetch,
    Generation,
    Store,
    Commit,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::FileFetch => write!(f, "fetch"),
            FailureStage::Generation => write!(f, "generation"),
            FailureStage::Store => write!(f, "store"),
            FailureStage::Commit => write!(f, "commit"),
        }
    }
}

/// A recorded, non-fatal failure for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub stage: FailureStage,
    pub message: String,
}

impl FileFailure {
    pub fn new(path: impl Into<String>, stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stage,
            message: message.into(),
        }
    }
}

/// An artifact written to the local store during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub source_path: String,
    pub artifact_path: PathBuf,
    pub packages: Vec<String>,
}

/// A local file committed to the branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedFile {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub outcome: PutOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchStatus {
    Created { branch: String },
    AlreadyExists { branch: String },
    Failed { branch: String, message: String },
}

impl BranchStatus {
    pub fn from_outcome(branch: &str, outcome: BranchOutcome) -> Self {
        let branch = branch.to_string();
        match outcome {
            BranchOutcome::Created => BranchStatus::Created { branch },
            BranchOutcome::AlreadyExists => BranchStatus::AlreadyExists { branch },
        }
    }

    pub fn is_ready(&self) -> bool {
        !matches!(self, BranchStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullRequestStatus {
    Opened { url: String },
    Failed { message: String },
}

/// Outcome of one run. Produced even when individual files fail.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub repository: RepositoryRef,
    pub scope: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub discovered: Vec<String>,
    pub generated: Vec<ArtifactRecord>,
    /// `None` when the publish stage did not run.
    pub branch: Option<BranchStatus>,
    pub published: Vec<PublishedFile>,
    pub pull_request: Option<PullRequestStatus>,
    pub failures: Vec<FileFailure>,
}

impl RunReport {
    pub fn new(repository: RepositoryRef, scope: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            repository,
            scope: scope.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            discovered: Vec::new(),
            generated: Vec::new(),
            branch: None,
            published: Vec::new(),
            pull_request: None,
            failures: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn failures_at(&self, stage: FailureStage) -> impl Iterator<Item = &FileFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }

    /// True when nothing failed, the branch included.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.branch.as_ref().is_none_or(BranchStatus::is_ready)
            && !matches!(self.pull_request, Some(PullRequestStatus::Failed { .. }))
    }

    pub fn summary(&self) -> String {
        format!(
            "{} discovered, {} generated, {} published, {} failed",
            self.discovered.len(),
            self.generated.len(),
            self.published.len(),
            self.failures.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport::new(RepositoryRef::new("octo", "demo", "main"), "")
    }

    #[test]
    fn test_new_report_is_clean() {
        let report = report();
        assert!(report.is_clean());
        assert!(report.finished_at.is_none());
        assert_eq!(report.summary(), "0 discovered, 0 generated, 0 published, 0 failed");
    }

    #[test]
    fn test_failures_make_report_unclean() {
        let mut report = report();
        report
            .failures
            .push(FileFailure::new("a.py", FailureStage::Generation, "boom"));
        assert!(!report.is_clean());
        assert_eq!(report.failures_at(FailureStage::Generation).count(), 1);
        assert_eq!(report.failures_at(FailureStage::Commit).count(), 0);
    }

    #[test]
    fn test_failed_branch_makes_report_unclean() {
        let mut report = report();
        report.branch = Some(BranchStatus::Failed {
            branch: "hiro-tests".into(),
            message: "denied".into(),
        });
        assert!(!report.is_clean());
    }

    #[test]
    fn test_report_serializes_stage_names() {
        let mut report = report();
        report
            .failures
            .push(FileFailure::new("a.py", FailureStage::FileFetch, "gone"));
        report.branch = Some(BranchStatus::from_outcome("hiro-tests", BranchOutcome::AlreadyExists));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failures"][0]["stage"], "file_fetch");
        assert_eq!(json["branch"]["status"], "already_exists");
        assert_eq!(json["repository"]["owner"], "octo");
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(report().run_id, report().run_id);
    }
}

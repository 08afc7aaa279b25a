use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::report::{BranchStatus, FileFailure};
use crate::github::PutOutcome;

/// Progress notifications broadcast while a run is in flight.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: Uuid,
        repository: String,
        scope: String,
    },
    DiscoveryCompleted {
        files: usize,
        entries: usize,
        fetch_errors: usize,
    },
    GenerationStarted {
        path: String,
        index: usize,
        total: usize,
    },
    ArtifactWritten {
        path: String,
        artifact: PathBuf,
    },
    FileFailed {
        failure: FileFailure,
    },
    PublishStarted {
        files: usize,
    },
    BranchReady {
        status: BranchStatus,
    },
    FilePublished {
        remote_path: String,
        outcome: PutOutcome,
    },
    PullRequestOpened {
        url: String,
    },
    RunCompleted {
        summary: String,
    },
}

/// Send `event` if anyone is listening. A channel without receivers is not an error.
pub fn emit(tx: Option<&broadcast::Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}

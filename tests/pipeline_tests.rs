//! End-to-end pipeline runs against the in-memory repository and a scripted generator.

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use hiro::errors::{GenerationError, PipelineError};
use hiro::generator::{
    ArtifactDraft, ArtifactGenerator, DEFAULT_INSTRUCTION, GenerationRequest, ScriptedGenerator,
};
use hiro::github::{MemoryRepository, PutOutcome, RepositoryRef, ResourceClient};
use hiro::pipeline::{
    BatchPipeline, BranchStatus, FailureStage, PipelineEvent, PipelineOptions, PullRequestStatus,
};
use hiro::store::LocalArtifactStore;
use hiro::walker::{ExtensionDenylist, walk};
use tempfile::TempDir;
use tokio::sync::broadcast;

const SLUG: &str = "octo/demo";

fn repo_ref() -> RepositoryRef {
    RepositoryRef::new("octo", "demo", "main")
}

struct Harness {
    remote: Arc<MemoryRepository>,
    generator: Arc<ScriptedGenerator>,
    store: Arc<LocalArtifactStore>,
    _out: TempDir,
}

impl Harness {
    fn new(remote: MemoryRepository, generator: ScriptedGenerator) -> Self {
        let out = TempDir::new().unwrap();
        Self {
            remote: Arc::new(remote),
            generator: Arc::new(generator),
            store: Arc::new(LocalArtifactStore::new(out.path())),
            _out: out,
        }
    }

    fn pipeline(&self) -> BatchPipeline {
        BatchPipeline::new(
            self.remote.clone(),
            self.generator.clone(),
            self.store.clone(),
        )
    }

    fn pipeline_with(&self, options: PipelineOptions) -> BatchPipeline {
        self.pipeline().with_options(options)
    }

    fn local_files(&self) -> Vec<String> {
        self.store
            .publishable("demo")
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }
}

fn local_only() -> PipelineOptions {
    PipelineOptions {
        publish: false,
        ..PipelineOptions::default()
    }
}

#[tokio::test]
async fn test_logo_and_main_py_end_to_end() {
    let remote = MemoryRepository::new(SLUG, "main")
        .with_file("logo.png", "\u{89}PNG")
        .with_file("main.py", "def add(a, b):\n    return a + b\n");
    let harness = Harness::new(
        remote,
        ScriptedGenerator::new().with_reply(
            "main.py",
            ArtifactDraft {
                code: "def test_add():\n    assert add(1, 2) == 3\n".into(),
                metadata: "Run with `pytest`.".into(),
                packages: vec!["pytest".into()],
            },
        ),
    );

    let report = harness
        .pipeline_with(local_only())
        .run(&repo_ref(), "")
        .await
        .unwrap();

    assert_eq!(report.discovered, vec!["main.py"]);
    assert_eq!(harness.generator.calls(), vec!["main.py"]);
    assert_eq!(report.generated.len(), 1);
    assert!(report.failures.is_empty());
    assert!(report.branch.is_none());
    assert!(report.finished_at.is_some());

    assert_eq!(harness.local_files(), vec!["metadata.md", "test_main.test.py"]);
    let metadata = fs::read_to_string(harness.store.metadata_path("demo")).unwrap();
    assert_eq!(metadata.matches("## Required Packages").count(), 1);
    assert!(metadata.contains("- pytest"));
    assert!(!harness.remote.has_branch("hiro-tests"));
}

#[tokio::test]
async fn test_run_publishes_to_branch() {
    let remote = MemoryRepository::new(SLUG, "main")
        .with_file("src/app.ts", "export const x = 1;")
        .with_file("src/util.ts", "export const y = 2;");
    let harness = Harness::new(remote, ScriptedGenerator::new());

    let report = harness
        .pipeline()
        .run(&repo_ref(), "src")
        .await
        .unwrap();

    assert!(matches!(report.branch, Some(BranchStatus::Created { .. })));
    let published: Vec<&str> = report.published.iter().map(|p| p.remote_path.as_str()).collect();
    assert_eq!(
        published,
        vec![
            "hiro-tests/metadata.md",
            "hiro-tests/test_app.test.ts",
            "hiro-tests/test_util.test.ts",
        ]
    );
    assert!(report.published.iter().all(|p| p.outcome == PutOutcome::Created));
    assert!(
        harness
            .remote
            .file_on_branch("hiro-tests", "hiro-tests/test_app.test.ts")
            .unwrap()
            .contains("src/app.ts")
    );
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_partial_failures_are_recorded() {
    let remote = MemoryRepository::new(SLUG, "main")
        .with_file("a.py", "a")
        .with_file("b.py", "b")
        .with_file("c.py", "c")
        .with_file("d.py", "d");
    remote.fail_read("a.py");
    let harness = Harness::new(remote, ScriptedGenerator::new().failing_on("b.py"));

    let report = harness
        .pipeline_with(local_only())
        .run(&repo_ref(), "")
        .await
        .unwrap();

    // a.py failed during discovery, so it never reaches the generator.
    assert_eq!(report.discovered, vec!["b.py", "c.py", "d.py"]);
    assert_eq!(harness.generator.calls(), vec!["b.py", "c.py", "d.py"]);

    let fetch: Vec<&str> = report
        .failures_at(FailureStage::FileFetch)
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(fetch, vec!["a.py"]);
    let generation: Vec<&str> = report
        .failures_at(FailureStage::Generation)
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(generation, vec!["b.py"]);

    let generated: Vec<&str> = report.generated.iter().map(|g| g.source_path.as_str()).collect();
    assert_eq!(generated, vec!["c.py", "d.py"]);
    assert!(!report.is_clean());
}

#[tokio::test]
async fn test_listing_failure_aborts_run() {
    let remote = MemoryRepository::new(SLUG, "main").with_file("src/a.py", "a");
    remote.fail_listing("src");
    let harness = Harness::new(remote, ScriptedGenerator::new());

    let err = harness.pipeline().run(&repo_ref(), "").await.unwrap_err();
    assert!(matches!(err, PipelineError::Discovery(_)));
    assert!(harness.generator.calls().is_empty());
}

#[tokio::test]
async fn test_commit_failure_does_not_stop_other_commits() {
    let remote = MemoryRepository::new(SLUG, "main")
        .with_file("a.py", "a")
        .with_file("b.py", "b");
    remote.fail_write("hiro-tests/test_a.test.py");
    let harness = Harness::new(remote, ScriptedGenerator::new());

    let report = harness.pipeline().run(&repo_ref(), "").await.unwrap();

    let commits: Vec<&str> = report
        .failures_at(FailureStage::Commit)
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(commits, vec!["hiro-tests/test_a.test.py"]);
    assert_eq!(report.published.len(), 2);
    assert!(
        harness
            .remote
            .file_on_branch("hiro-tests", "hiro-tests/test_b.test.py")
            .is_some()
    );
}

#[tokio::test]
async fn test_branch_failure_skips_commits() {
    let remote = MemoryRepository::new(SLUG, "main").with_file("a.py", "a");
    remote.fail_branch_creation();
    let harness = Harness::new(remote, ScriptedGenerator::new());

    let report = harness.pipeline().run(&repo_ref(), "").await.unwrap();

    assert!(matches!(report.branch, Some(BranchStatus::Failed { .. })));
    assert!(report.published.is_empty());
    assert_eq!(report.generated.len(), 1);
    assert!(!report.is_clean());
}

#[tokio::test]
async fn test_second_run_updates_and_republishes_stale_artifacts() {
    let remote = MemoryRepository::new(SLUG, "main")
        .with_file("a.py", "a")
        .with_file("b.py", "b");
    let harness = Harness::new(remote, ScriptedGenerator::new());

    let first = harness.pipeline().run(&repo_ref(), "").await.unwrap();
    assert!(matches!(first.branch, Some(BranchStatus::Created { .. })));

    // Second run only covers a.py, but b.py's artifact from the first run is still on disk.
    harness.remote.fail_read("b.py");
    let second = harness.pipeline().run(&repo_ref(), "").await.unwrap();

    assert!(matches!(second.branch, Some(BranchStatus::AlreadyExists { .. })));
    let published: Vec<(&str, PutOutcome)> = second
        .published
        .iter()
        .map(|p| (p.remote_path.as_str(), p.outcome))
        .collect();
    assert_eq!(
        published,
        vec![
            ("hiro-tests/metadata.md", PutOutcome::Updated),
            ("hiro-tests/test_a.test.py", PutOutcome::Updated),
            ("hiro-tests/test_b.test.py", PutOutcome::Updated),
        ]
    );
    assert_eq!(second.generated.len(), 1);

    // The metadata log on the branch carries both runs.
    let log = harness
        .remote
        .file_on_branch("hiro-tests", "hiro-tests/metadata.md")
        .unwrap();
    assert_eq!(log.matches("## Required Packages").count(), 3);
}

#[tokio::test]
async fn test_publish_only_uses_files_on_disk() {
    let remote = MemoryRepository::new(SLUG, "main").with_file("a.py", "a");
    let harness = Harness::new(remote, ScriptedGenerator::new());
    harness
        .pipeline_with(local_only())
        .run(&repo_ref(), "")
        .await
        .unwrap();
    assert!(!harness.remote.has_branch("hiro-tests"));

    let report = harness.pipeline().publish(&repo_ref()).await.unwrap();
    assert!(report.discovered.is_empty());
    assert_eq!(report.published.len(), 2);
    assert!(harness.remote.has_branch("hiro-tests"));
    assert_eq!(harness.generator.calls().len(), 1);
}

#[tokio::test]
async fn test_publish_with_empty_output_dir_does_nothing() {
    let harness = Harness::new(MemoryRepository::new(SLUG, "main"), ScriptedGenerator::new());
    let report = harness.pipeline().publish(&repo_ref()).await.unwrap();
    assert!(report.branch.is_none());
    assert!(!harness.remote.has_branch("hiro-tests"));
}

#[tokio::test]
async fn test_pull_request_opened_after_publish() {
    let remote = MemoryRepository::new(SLUG, "main").with_file("a.py", "a");
    let harness = Harness::new(remote, ScriptedGenerator::new());
    let options = PipelineOptions {
        open_pull_request: true,
        branch: "generated".to_string(),
        ..PipelineOptions::default()
    };

    let report = harness.pipeline_with(options).run(&repo_ref(), "").await.unwrap();

    match &report.pull_request {
        Some(PullRequestStatus::Opened { url }) => assert!(url.ends_with("/pull/1")),
        other => panic!("expected an opened pull request, got {:?}", other),
    }
    let prs = harness.remote.pull_requests();
    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].head, "generated");
    assert_eq!(prs[0].base, "main");
    assert!(prs[0].body.contains("hiro-tests/test_a.test.py"));
}

#[tokio::test]
async fn test_events_follow_stage_order() {
    let remote = MemoryRepository::new(SLUG, "main").with_file("a.py", "a");
    let harness = Harness::new(remote, ScriptedGenerator::new());
    let (tx, mut rx) = broadcast::channel(64);

    harness
        .pipeline()
        .with_events(tx)
        .run(&repo_ref(), "")
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(match event {
            PipelineEvent::RunStarted { .. } => "run_started",
            PipelineEvent::DiscoveryCompleted { .. } => "discovery_completed",
            PipelineEvent::GenerationStarted { .. } => "generation_started",
            PipelineEvent::ArtifactWritten { .. } => "artifact_written",
            PipelineEvent::FileFailed { .. } => "file_failed",
            PipelineEvent::PublishStarted { .. } => "publish_started",
            PipelineEvent::BranchReady { .. } => "branch_ready",
            PipelineEvent::FilePublished { .. } => "file_published",
            PipelineEvent::PullRequestOpened { .. } => "pull_request_opened",
            PipelineEvent::RunCompleted { .. } => "run_completed",
        });
    }
    assert_eq!(
        kinds,
        vec![
            "run_started",
            "discovery_completed",
            "generation_started",
            "artifact_written",
            "publish_started",
            "branch_ready",
            "file_published",
            "file_published",
            "run_completed",
        ]
    );
}

#[tokio::test]
async fn test_walk_twice_fetches_same_order() {
    let remote = MemoryRepository::new(SLUG, "main")
        .with_file("z/last.py", "z")
        .with_file("a/first.py", "a")
        .with_file("m.py", "m");
    let harness = Harness::new(remote, ScriptedGenerator::new());
    let pipeline = harness.pipeline();

    let first = pipeline.discover(&repo_ref(), "").await.unwrap();
    let second = pipeline.discover(&repo_ref(), "").await.unwrap();
    assert_eq!(first.paths, vec!["a/first.py", "m.py", "z/last.py"]);
    assert_eq!(first.paths, second.paths);
    assert!(harness.remote.listing_calls() >= 6);
    assert_eq!(
        harness.remote.default_branch(SLUG).await.unwrap(),
        "main"
    );
}

/// Rewrites one remote file when the generator reaches `trigger`.
struct EditingGenerator {
    inner: Arc<ScriptedGenerator>,
    remote: Arc<MemoryRepository>,
    trigger: &'static str,
    edit: (&'static str, &'static str),
}

#[async_trait]
impl ArtifactGenerator for EditingGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<ArtifactDraft, GenerationError> {
        if request.target_path == self.trigger {
            self.remote.add_file(self.edit.0, self.edit.1);
        }
        self.inner.generate(request).await
    }
}

#[tokio::test]
async fn test_generator_receives_fresh_content_and_whole_context() {
    let remote = Arc::new(
        MemoryRepository::new(SLUG, "main")
            .with_file("a.py", "A")
            .with_file("b.py", "B"),
    );
    let scripted = Arc::new(ScriptedGenerator::new());
    let generator = Arc::new(EditingGenerator {
        inner: scripted.clone(),
        remote: remote.clone(),
        trigger: "a.py",
        edit: ("b.py", "B2"),
    });
    let out = TempDir::new().unwrap();
    let store = Arc::new(LocalArtifactStore::new(out.path()));

    BatchPipeline::new(remote.clone(), generator, store)
        .with_options(local_only())
        .run(&repo_ref(), "")
        .await
        .unwrap();

    // What discovery saw before the edit.
    let before = MemoryRepository::new(SLUG, "main")
        .with_file("a.py", "A")
        .with_file("b.py", "B");
    let expected = walk(&before, SLUG, "", &ExtensionDenylist::default())
        .await
        .unwrap();

    let requests = scripted.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].target_content, "A");
    assert_eq!(requests[1].target_content, "B2");
    for request in &requests {
        assert_eq!(request.context, expected.context.render());
        assert!(request.context.contains("=== File: b.py ===\nB"));
        assert_eq!(request.tree_summary, expected.tree_summary());
        assert_eq!(request.instruction, DEFAULT_INSTRUCTION);
    }
    // One fetch per file during discovery and one fresh fetch per file before generating.
    assert_eq!(remote.content_fetches(), 4);
}

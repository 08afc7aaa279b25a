use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fmt::Write as _;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::github::PutOutcome;
use crate::pipeline::{BranchStatus, PipelineEvent, PullRequestStatus, RunReport};
use crate::ui::icons::{
    BRANCH, CHECK, CROSS, FILE_MOD, FILE_NEW, LINK, SEARCH, SPARKLE, UPLOAD, WARN,
};

/// Terminal UI for a run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Stage spinner: what the pipeline is doing right now
/// - File bar: position in the generate or publish loop
pub struct RunUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    file_bar: ProgressBar,
    verbose: bool,
}

impl RunUI {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let stage_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let stage_bar = multi.add(ProgressBar::new_spinner());
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix(" Stage");
        stage_bar.enable_steady_tick(Duration::from_millis(100));

        let file_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");
        let file_bar = multi.add(ProgressBar::new(0));
        file_bar.set_style(file_style);
        file_bar.set_prefix(" Files");

        Self {
            multi,
            stage_bar,
            file_bar,
            verbose,
        }
    }

    /// Print above the bars, falling back to stderr when the terminal is gone.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn handle(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStarted { repository, scope, .. } => {
                let scope = if scope.is_empty() { "/" } else { scope.as_str() };
                self.stage_bar.set_message(format!(
                    "{}Walking {} ({})",
                    SEARCH,
                    style(repository).cyan(),
                    scope
                ));
            }
            PipelineEvent::DiscoveryCompleted {
                files,
                entries,
                fetch_errors,
            } => {
                self.print_line(format!(
                    "{}Discovered {} files to test ({} entries, {} unreadable)",
                    SEARCH,
                    style(files).bold(),
                    entries,
                    fetch_errors
                ));
                self.file_bar.set_length(*files as u64);
                self.file_bar.set_position(0);
            }
            PipelineEvent::GenerationStarted { path, index, total } => {
                self.stage_bar
                    .set_message(format!("Generating tests {}/{}", index + 1, total));
                self.file_bar.set_position(*index as u64);
                self.file_bar.set_message(path.clone());
            }
            PipelineEvent::ArtifactWritten { path, artifact } => {
                self.file_bar.inc(1);
                if self.verbose {
                    self.print_line(format!(
                        "    {}{} {} {}",
                        FILE_NEW,
                        path,
                        style("→").dim(),
                        style(artifact.display()).dim()
                    ));
                }
            }
            PipelineEvent::FileFailed { failure } => {
                self.print_line(format!(
                    "    {}{} {} {}",
                    WARN,
                    style(&failure.path).yellow(),
                    style(format!("({})", failure.stage)).dim(),
                    failure.message
                ));
            }
            PipelineEvent::PublishStarted { files } => {
                self.stage_bar.set_message(format!("{}Publishing", UPLOAD));
                self.file_bar.set_length(*files as u64);
                self.file_bar.set_position(0);
                self.file_bar.set_message("");
            }
            PipelineEvent::BranchReady { status } => match status {
                BranchStatus::Created { branch } => {
                    self.print_line(format!("{}Created branch {}", BRANCH, style(branch).green()));
                }
                BranchStatus::AlreadyExists { branch } => {
                    self.print_line(format!("{}Using existing branch {}", BRANCH, style(branch).green()));
                }
                BranchStatus::Failed { branch, message } => {
                    self.print_line(format!(
                        "{}Could not create branch {}: {}",
                        CROSS,
                        style(branch).red(),
                        message
                    ));
                }
            },
            PipelineEvent::FilePublished {
                remote_path,
                outcome,
            } => {
                self.file_bar.inc(1);
                if self.verbose {
                    let icon = match outcome {
                        PutOutcome::Created => FILE_NEW,
                        PutOutcome::Updated => FILE_MOD,
                    };
                    self.print_line(format!("    {}{}", icon, remote_path));
                }
            }
            PipelineEvent::PullRequestOpened { url } => {
                self.print_line(format!("{}Opened pull request {}", LINK, style(url).underlined()));
            }
            PipelineEvent::RunCompleted { summary } => {
                self.stage_bar.finish_and_clear();
                self.file_bar.finish_and_clear();
                self.print_line(format!("{}{}", SPARKLE, summary));
            }
        }
    }

    /// Render events from `rx` until the sender side closes.
    pub fn spawn(self, mut rx: broadcast::Receiver<PipelineEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.handle(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "ui lagged behind pipeline events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            self.stage_bar.finish_and_clear();
            self.file_bar.finish_and_clear();
        })
    }
}

/// Plain-text run summary printed after the bars are gone.
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} {}",
        style("Repository:").bold(),
        report.repository
    );
    if !report.scope.is_empty() {
        let _ = writeln!(out, "{} {}", style("Scope:").bold(), report.scope);
    }
    let _ = writeln!(out, "{} {}", style("Run:").bold(), report.run_id);
    let _ = writeln!(out);
    let _ = writeln!(out, "  Discovered: {}", report.discovered.len());
    let _ = writeln!(out, "  Generated:  {}", report.generated.len());
    let _ = writeln!(out, "  Published:  {}", report.published.len());

    match &report.branch {
        Some(BranchStatus::Created { branch }) => {
            let _ = writeln!(out, "  Branch:     {} (created)", branch);
        }
        Some(BranchStatus::AlreadyExists { branch }) => {
            let _ = writeln!(out, "  Branch:     {} (existing)", branch);
        }
        Some(BranchStatus::Failed { branch, message }) => {
            let _ = writeln!(out, "  Branch:     {} {}failed: {}", branch, CROSS, message);
        }
        None => {}
    }
    match &report.pull_request {
        Some(PullRequestStatus::Opened { url }) => {
            let _ = writeln!(out, "  Pull request: {}", url);
        }
        Some(PullRequestStatus::Failed { message }) => {
            let _ = writeln!(out, "  Pull request: {}failed: {}", CROSS, message);
        }
        None => {}
    }

    if report.failures.is_empty() {
        let _ = writeln!(out, "\n{}No failures", CHECK);
    } else {
        let _ = writeln!(out, "\n{}{} failures:", WARN, report.failures.len());
        for failure in &report.failures {
            let _ = writeln!(
                out,
                "  - [{}] {}: {}",
                failure.stage, failure.path, failure.message
            );
        }
    }
    out
}

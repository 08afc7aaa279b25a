//! Pipeline commands: `hiro run` and `hiro publish`.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

use hiro::config::{HiroToml, process_env};
use hiro::errors::PipelineError;
use hiro::generator::ChatGenerator;
use hiro::pipeline::{BatchPipeline, PipelineEvent, RunReport};
use hiro::store::LocalArtifactStore;
use hiro::ui::{RunUI, render_report};

use super::super::{Cli, PublishArgs, RunArgs};
use super::{connect, load_config};

fn build_pipeline(
    toml: &HiroToml,
    client: Arc<dyn hiro::github::ResourceClient>,
    output_dir: Option<&std::path::Path>,
) -> Result<BatchPipeline> {
    let generator = ChatGenerator::new(toml.chat_settings(&process_env))?;
    let root = output_dir.map(|p| p.to_path_buf()).unwrap_or_else(|| toml.output.dir.clone());
    let store = LocalArtifactStore::new(root);
    Ok(BatchPipeline::new(client, Arc::new(generator), Arc::new(store))
        .with_denylist(toml.denylist())
        .with_options(toml.pipeline_options()))
}

/// Run `stage` with progress rendering (unless `json`), then print the report.
async fn drive<F>(
    pipeline: BatchPipeline,
    verbose: bool,
    json: bool,
    stage: impl FnOnce(Arc<BatchPipeline>) -> F,
) -> Result<()>
where
    F: Future<Output = Result<RunReport, PipelineError>>,
{
    let (tx, rx) = broadcast::channel::<PipelineEvent>(256);
    let ui = if json {
        drop(rx);
        None
    } else {
        Some(RunUI::new(verbose).spawn(rx))
    };

    let pipeline = Arc::new(pipeline.with_events(tx));
    let result = stage(Arc::clone(&pipeline)).await;
    // Closing the last sender ends the UI task.
    drop(pipeline);
    if let Some(handle) = ui {
        let _ = handle.await;
    }

    let report = result?;
    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
        println!("{}", out);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

pub async fn cmd_run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let toml = load_config(cli)?;
    if toml.generator_api_key(&process_env).is_none() {
        anyhow::bail!(
            "No model API key configured. Set GROQ_API_KEY (or [generator].api_key in {}).",
            cli.config.display()
        );
    }

    let (client, repo) = connect(&toml, &args.repo_url).await?;
    let mut pipeline = build_pipeline(&toml, client, args.output_dir.as_deref())?;

    let mut options = pipeline.options().clone();
    if let Some(branch) = &args.branch {
        options.branch = branch.clone();
    }
    options.publish = !args.no_publish;
    options.open_pull_request |= args.open_pr;
    pipeline = pipeline.with_options(options);

    let scope = args.path.clone().unwrap_or_default();
    drive(pipeline, cli.verbose, args.json, |pipeline| async move {
        pipeline.run(&repo, &scope).await
    })
    .await
}

pub async fn cmd_publish(cli: &Cli, args: &PublishArgs) -> Result<()> {
    let toml = load_config(cli)?;
    let (client, repo) = connect(&toml, &args.repo_url).await?;
    let mut pipeline = build_pipeline(&toml, client, args.output_dir.as_deref())?;

    let mut options = pipeline.options().clone();
    if let Some(branch) = &args.branch {
        options.branch = branch.clone();
    }
    options.open_pull_request |= args.open_pr;
    pipeline = pipeline.with_options(options);

    drive(pipeline, cli.verbose, args.json, |pipeline| async move {
        pipeline.publish(&repo).await
    })
    .await
}

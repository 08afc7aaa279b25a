//! CLI command implementations.
//!
//! | Module    | Commands handled         |
//! |-----------|--------------------------|
//! | `run`     | `Run`, `Publish`         |
//! | `tree`    | `Tree`                   |
//! | `config`  | `Config`                 |

pub mod config;
pub mod run;
pub mod tree;

pub use config::cmd_config;
pub use run::{cmd_publish, cmd_run};
pub use tree::cmd_tree;

use anyhow::{Context, Result};
use std::sync::Arc;

use hiro::config::{HiroToml, process_env};
use hiro::github::{GitHubClient, RepositoryRef, ResourceClient};

use super::Cli;

pub(crate) fn load_config(cli: &Cli) -> Result<HiroToml> {
    let toml = HiroToml::load_or_default(&cli.config)?;
    for warning in toml.validate() {
        tracing::warn!(config = %cli.config.display(), "{}", warning);
    }
    Ok(toml)
}

/// Build the GitHub client and resolve the repository behind `repo_url`.
pub(crate) async fn connect(
    toml: &HiroToml,
    repo_url: &str,
) -> Result<(Arc<dyn ResourceClient>, RepositoryRef)> {
    let settings = toml.github_settings(&process_env);
    if settings.token.is_none() {
        tracing::warn!(
            "no GitHub token configured (GITHUB_PERSONAL_ACCESS_TOKEN); requests are unauthenticated and publishing will fail"
        );
    }
    let client: Arc<dyn ResourceClient> = Arc::new(GitHubClient::new(settings)?);
    let repo = RepositoryRef::resolve(client.as_ref(), repo_url)
        .await
        .with_context(|| format!("Failed to resolve repository '{}'", repo_url))?;
    tracing::info!(repo = %repo, "repository resolved");
    Ok((client, repo))
}

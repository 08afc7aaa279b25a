//! `hiro tree`: print the remote file tree of the default branch.

use anyhow::{Context, Result};
use console::style;

use super::super::Cli;
use super::{connect, load_config};

pub async fn cmd_tree(cli: &Cli, repo_url: &str) -> Result<()> {
    let toml = load_config(cli)?;
    let (client, repo) = connect(&toml, repo_url).await?;

    let tree = client
        .tree(&repo.slug(), repo.default_branch())
        .await
        .with_context(|| format!("Failed to list tree of {}", repo))?;

    println!("{}", style(repo.to_string()).bold());
    print!("{}", tree.render());
    Ok(())
}

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use hiro::logging::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "hiro")]
#[command(version, about = "Generate unit tests for a GitHub repository and publish them to a branch")]
pub struct Cli {
    /// Debug logging for hiro (overrides RUST_LOG for the hiro target)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to the configuration file
    #[arg(long, global = true, default_value = hiro::config::CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Walk a repository, generate tests for every file and publish them
    Run(RunArgs),
    /// Publish the artifacts already in the output directory
    Publish(PublishArgs),
    /// Print the repository's file tree
    Tree {
        /// Repository URL (https://github.com/owner/repo) or owner/repo
        repo_url: String,
    },
    /// View, validate or create the configuration file
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Repository URL (https://github.com/owner/repo) or owner/repo
    pub repo_url: String,

    /// Only walk this folder of the repository
    #[arg(short, long)]
    pub path: Option<String>,

    /// Local output root (overrides [output].dir)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Branch to publish to (overrides [publish].branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Keep artifacts local
    #[arg(long)]
    pub no_publish: bool,

    /// Open a pull request after publishing
    #[arg(long)]
    pub open_pr: bool,

    /// Print the run report as JSON instead of progress output
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct PublishArgs {
    /// Repository URL (https://github.com/owner/repo) or owner/repo
    pub repo_url: String,

    /// Local output root (overrides [output].dir)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Branch to publish to (overrides [publish].branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Open a pull request after publishing
    #[arg(long)]
    pub open_pr: bool,

    /// Print the run report as JSON instead of progress output
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default hiro.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logging::init(cli.verbose, format);

    match &cli.command {
        Commands::Run(args) => cmd::cmd_run(&cli, args).await?,
        Commands::Publish(args) => cmd::cmd_publish(&cli, args).await?,
        Commands::Tree { repo_url } => cmd::cmd_tree(&cli, repo_url).await?,
        Commands::Config { command } => cmd::cmd_config(&cli.config, command.clone())?,
    }

    Ok(())
}

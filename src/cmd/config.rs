//! Configuration view and validation commands: `hiro config`.

use anyhow::Result;
use std::path::Path;

use hiro::config::{HiroToml, mask_secret, process_env};

use super::super::ConfigCommands;

fn print_sections(toml: &HiroToml) {
    println!("[github]");
    println!("  api_url = \"{}\"", toml.github.api_url);
    println!("  request_delay_ms = {}", toml.github.request_delay_ms);
    println!("  max_rate_limit_wait_secs = {}", toml.github.max_rate_limit_wait_secs);
    println!("  timeout_secs = {}", toml.github.timeout_secs);
    println!();
    println!("[generator]");
    println!("  api_url = \"{}\"", toml.generator.api_url);
    println!("  model = \"{}\"", toml.generator.model);
    println!("  temperature = {}", toml.generator.temperature);
    println!("  max_tokens = {}", toml.generator.max_tokens);
    println!("  instruction = \"{}\"", toml.generator.instruction);
    println!();
    println!("[walk]");
    let denylist = toml.denylist();
    println!("  skipped extensions = {}", denylist.extensions().join(" "));
    println!();
    println!("[output]");
    println!("  dir = \"{}\"", toml.output.dir.display());
    println!();
    println!("[publish]");
    println!("  branch = \"{}\"", toml.publish.branch);
    println!("  remote_dir = \"{}\"", toml.publish.remote_dir);
    println!("  commit_message = \"{}\"", toml.publish.commit_message);
    println!("  open_pull_request = {}", toml.publish.open_pull_request);
    println!();
}

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Hiro Configuration");
            println!("==================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                HiroToml::load(config_path)?
            } else {
                println!("No hiro.toml found at {}; using defaults.", config_path.display());
                HiroToml::default()
            };
            println!();
            print_sections(&toml);

            println!("Effective secrets (with env overrides):");
            let show = |secret: Option<String>| {
                secret
                    .map(|s| mask_secret(&s))
                    .unwrap_or_else(|| "(not set)".to_string())
            };
            println!("  github token = {}", show(toml.github_token(&process_env)));
            println!("  generator api key = {}", show(toml.generator_api_key(&process_env)));
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No hiro.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = HiroToml::load(config_path)?;
            let warnings = toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("hiro.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)?;
            }

            HiroToml::default().save(config_path)?;

            println!("Created hiro.toml at {}", config_path.display());
            println!();
            println!("Secrets are read from the environment (or a .env file):");
            println!("  - GITHUB_PERSONAL_ACCESS_TOKEN for the GitHub API");
            println!("  - GROQ_API_KEY for the model API");
            println!();
        }
    }

    Ok(())
}

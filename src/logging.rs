//! Diagnostic logging to stderr.
//!
//! `RUST_LOG` is honoured; without it only warnings are shown. `--verbose` forces
//! `hiro=debug`. The run report itself goes to stdout and is never routed here.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Filter directives for the given verbosity.
pub fn filter_directives(verbose: bool, rust_log: Option<&str>) -> String {
    match (verbose, rust_log) {
        (true, Some(env)) if !env.trim().is_empty() => format!("{},hiro=debug", env),
        (true, _) => "warn,hiro=debug".to_string(),
        (false, Some(env)) if !env.trim().is_empty() => env.to_string(),
        (false, _) => "warn".to_string(),
    }
}

/// Install the global subscriber. Safe to call once per process.
pub fn init(verbose: bool, format: LogFormat) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directives = filter_directives(verbose, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Compact => registry
            .with(fmt::layer().with_writer(std::io::stderr).compact())
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("[hiro] logging already initialised: {}", e);
    }
}

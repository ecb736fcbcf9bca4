//! A set of utilities to enable logging configuration using tracing_subscriber.

use std::{
    fs::OpenOptions,
    io::IsTerminal,
    path::{Path, PathBuf},
    sync::{Mutex, Once},
};

use tracing::field::DisplayValue;
use tracing_subscriber::{
    self, EnvFilter, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

static EAVESDROP_LOG_ENV_VAR: &str = "EAVESDROP_LOG";

/// List of crates in the workspace.
const EAVESDROP_CRATES: &[&str] = &[
    "codegen",
    "common",
    "dispatcher",
    "eavesdrop",
    "eavesdrop_config",
    "monitoring",
];

/// Initializes a tracing subscriber that logs to stderr.
pub fn init() {
    // Since we also use this function to enable logging in tests, wrap it in `Once` to prevent
    // multiple initializations.
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let (env_filter, log_level) = env_filter_and_log_level(false);

        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .try_init();

        tracing::info!("log level: {}", log_level);
    });
}

/// Initializes a tracing subscriber that logs to stderr and appends to `logfile`.
///
/// With `debug` set, the workspace crates log at `debug` unless `EAVESDROP_LOG` says otherwise.
/// Only the first call in a process installs a subscriber.
pub fn init_with_logfile(logfile: &Path, debug: bool) -> Result<(), LogFileError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logfile)
        .map_err(|source| LogFileError {
            path: logfile.to_path_buf(),
            source,
        })?;

    let (env_filter, log_level) = env_filter_and_log_level(debug);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal());
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false);

    let installed = tracing_subscriber::Registry::default()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(logfile = %logfile.display(), "log level: {}", log_level);
    }

    Ok(())
}

/// Formats the source chain of an error for the `error_source` log field.
///
/// The top-level error is not included, log it separately as `error = %err`.
pub fn error_source(err: &(dyn std::error::Error + 'static)) -> DisplayValue<String> {
    let mut chain = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        chain.push(source.to_string());
        current = source.source();
    }
    tracing::field::display(chain.join(" -> "))
}

/// The log file could not be opened for appending
#[derive(Debug, thiserror::Error)]
#[error("failed to open log file {}", .path.display())]
pub struct LogFileError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

fn env_filter_and_log_level(debug: bool) -> (EnvFilter, String) {
    // Parse directives from RUST_LOG
    let directive_string = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let log_level = std::env::var(EAVESDROP_LOG_ENV_VAR)
        .unwrap_or_else(|_| default_log_level(debug).to_string());

    let mut env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::ERROR.into())
        .parse_lossy(&directive_string);
    for directive in crate_directives(&directive_string, &log_level) {
        match directive.parse() {
            Ok(directive) => env_filter = env_filter.add_directive(directive),
            Err(err) => eprintln!("ignoring invalid log directive `{directive}`: {err}"),
        }
    }

    (env_filter, log_level)
}

fn default_log_level(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}

/// Directives for each workspace crate not already mentioned by `RUST_LOG`.
fn crate_directives(rust_log: &str, log_level: &str) -> Vec<String> {
    EAVESDROP_CRATES
        .iter()
        .filter(|crate_name| !rust_log.contains(&format!("{crate_name}=")))
        .map(|crate_name| format!("{crate_name}={log_level}"))
        .collect()
}

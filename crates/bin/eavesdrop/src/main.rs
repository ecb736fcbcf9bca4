use std::path::{Path, PathBuf};

use eavesdrop_config::{Config, DEFAULT_CONFIG_FILENAME};

mod builtin;
mod channels_cmd;
mod check_cmd;
mod generate_cmd;
mod init_cmd;
mod listen_cmd;

#[derive(Debug, clap::Parser)]
#[command(
    version,
    about = "Postgres change notifications: trigger code generation and event dispatch"
)]
struct Args {
    /// The configuration file to use. TOML, or YAML when the file extension is `.yaml` or
    /// `.yml`. Values can be overridden with `EAVESDROP_CONFIG_*` environment variables.
    #[arg(long, short, env = "EAVESDROP_CONFIG", default_value = DEFAULT_CONFIG_FILENAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
enum Command {
    /// Print the SQL that installs a channel's trigger procedure and trigger.
    ///
    /// Without a selection flag the full script is printed: the procedure followed by the
    /// trigger.
    Generate {
        /// The channel to generate SQL for.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        channel: Option<String>,
        /// Generate SQL for every configured channel.
        #[arg(long)]
        all: bool,
        /// Only print the trigger procedure.
        #[arg(long = "proc", conflicts_with_all = ["trigger", "json"])]
        procedure: bool,
        /// Only print the trigger.
        #[arg(long, conflicts_with = "json")]
        trigger: bool,
        /// Only print the payload's `json_build_object` expression.
        #[arg(long)]
        json: bool,
        /// Write one `<channel>.sql` file per channel into this directory instead of printing.
        ///
        /// Relative paths resolve against `globals.project_directory`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Listen on a channel and dispatch every event to the channel's handler.
    ///
    /// Database credentials are read from `PGSQL_USER` and `PGSQL_PASSWORD`. Stops on Ctrl+C.
    Listen {
        /// The channel to listen on.
        channel: String,
        /// Reconnect with exponential backoff when the database connection is lost.
        #[arg(long, env = "EAVESDROP_RECONNECT")]
        reconnect: bool,
    },
    /// List the configured channels with their resolved names.
    Channels,
    /// Validate the configuration without connecting to the database.
    ///
    /// Resolves every channel and its handler, renders its SQL and builds the service objects.
    /// Building runs their constructors, so a `JsonlSink` creates its file.
    Check,
    /// Write a starter configuration file to the `--config` path.
    Init {
        /// The database to listen on.
        #[arg(long)]
        database_name: String,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = main_inner().await {
        // Manually print the error so we can control the format.
        let err = error_with_causes(&err);
        eprintln!("Exiting with error: {err}");
        std::process::exit(1);
    }
}

async fn main_inner() -> Result<(), Error> {
    let Args {
        config: config_path,
        command,
    } = clap::Parser::parse();

    match command {
        Command::Generate {
            channel,
            all: _,
            procedure,
            trigger,
            json,
            out,
        } => {
            monitoring::logging::init();
            let config = load_config(&config_path)?;

            let channels = match channel {
                Some(channel) => vec![channel],
                None => config.channel_names().map(str::to_string).collect(),
            };
            let target = if procedure {
                generate_cmd::Target::Procedure
            } else if trigger {
                generate_cmd::Target::Trigger
            } else if json {
                generate_cmd::Target::JsonBuilder
            } else {
                generate_cmd::Target::Script
            };
            let out = out.map(|out| config.globals.project_dir().join(out));

            generate_cmd::run(&config, &channels, target, out.as_deref()).map_err(Error::Generate)
        }
        Command::Listen { channel, reconnect } => {
            let config = load_config(&config_path)?;
            if config.globals.logfile.trim().is_empty() {
                monitoring::logging::init();
            } else {
                monitoring::logging::init_with_logfile(
                    Path::new(config.globals.logfile.trim()),
                    config.globals.debug,
                )
                .map_err(Error::Logging)?;
            }

            listen_cmd::run(config, &channel, reconnect)
                .await
                .map_err(Error::Listen)
        }
        Command::Channels => {
            monitoring::logging::init();
            let config = load_config(&config_path)?;
            channels_cmd::run(&config).map_err(Error::Channels)
        }
        Command::Check => {
            monitoring::logging::init();
            let config = load_config(&config_path)?;
            check_cmd::run(&config, &builtin::bindings()).map_err(Error::Check)
        }
        Command::Init {
            database_name,
            force,
        } => {
            monitoring::logging::init();
            init_cmd::run(&config_path, &database_name, force).map_err(Error::Init)
        }
    }
}

fn load_config(config_path: &Path) -> Result<Config, Error> {
    eavesdrop_config::load(config_path).map_err(Error::LoadConfig)
}

/// Top-level error type for the `eavesdrop` binary.
///
/// Each variant wraps a command-specific error, providing a unified error type
/// for the main entry point while preserving the full error chain.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to load configuration.
    #[error("Failed to load config: {0}")]
    LoadConfig(#[source] eavesdrop_config::LoadError),

    /// Failed to open the log file.
    #[error("Failed to initialize logging: {0}")]
    Logging(#[source] monitoring::logging::LogFileError),

    /// Generate command failed.
    #[error("Generate command failed: {0}")]
    Generate(#[source] generate_cmd::Error),

    /// Listen command failed.
    #[error("Listen command failed: {0}")]
    Listen(#[source] listen_cmd::Error),

    /// Channels command failed.
    #[error("Channels command failed: {0}")]
    Channels(#[source] std::io::Error),

    /// Check command failed.
    #[error("Check command failed: {0}")]
    Check(#[source] check_cmd::Error),

    /// Init command failed.
    #[error("Init command failed: {0}")]
    Init(#[source] init_cmd::Error),
}

/// Builds an error chain string from an error and its sources.
fn error_with_causes(err: &dyn std::error::Error) -> String {
    let mut error_chain = Vec::new();
    let mut current = err;
    while let Some(source) = current.source() {
        error_chain.push(source.to_string());
        current = source;
    }

    if error_chain.is_empty() {
        err.to_string()
    } else {
        format!("{} | Caused by: {}", err, error_chain.join(" -> "))
    }
}

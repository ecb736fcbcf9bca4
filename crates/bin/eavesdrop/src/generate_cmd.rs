use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use codegen::{ChannelSql, RenderError};
use eavesdrop_config::{ChannelError, Config};
use monitoring::logging;

/// Which part of the generated SQL to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The procedure followed by the trigger
    Script,
    Procedure,
    Trigger,
    /// The payload's `json_build_object` expression
    JsonBuilder,
}

impl Target {
    fn select(self, sql: &ChannelSql) -> String {
        match self {
            Self::Script => sql.script(),
            Self::Procedure => sql.procedure.clone(),
            Self::Trigger => sql.trigger.clone(),
            Self::JsonBuilder => format!("{}\n", sql.json_builder),
        }
    }
}

/// Renders `channels` and prints the SQL, or writes one `<channel>.sql` per channel into `out`.
pub fn run(
    config: &Config,
    channels: &[String],
    target: Target,
    out: Option<&Path>,
) -> Result<(), Error> {
    let stdout = io::stdout();
    generate(config, channels, target, out, &mut stdout.lock())
}

/// Generates SQL for each channel in turn.
///
/// A channel that fails to resolve or render does not stop the others. With a single channel
/// its error is returned as is, with several the failures are logged and counted.
pub fn generate(
    config: &Config,
    channels: &[String],
    target: Target,
    out: Option<&Path>,
    stdout: &mut impl Write,
) -> Result<(), Error> {
    if let Some(dir) = out {
        fs::create_dir_all(dir).map_err(|source| Error::CreateOutDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let mut failed = 0;
    for (idx, name) in channels.iter().enumerate() {
        let sql = match render_channel(config, name) {
            Ok(sql) => target.select(&sql),
            Err(err) if channels.len() == 1 => return Err(err),
            Err(err) => {
                tracing::error!(channel = %name, error = %err, error_source = logging::error_source(&err), "skipping channel");
                failed += 1;
                continue;
            }
        };

        match out {
            Some(dir) => {
                let path = dir.join(format!("{name}.sql"));
                fs::write(&path, sql).map_err(|source| Error::WriteFile {
                    path: path.clone(),
                    source,
                })?;
                tracing::info!(channel = %name, path = %path.display(), "wrote channel SQL");
            }
            None => {
                if idx > 0 {
                    writeln!(stdout).map_err(Error::Stdout)?;
                }
                stdout.write_all(sql.as_bytes()).map_err(Error::Stdout)?;
            }
        }
    }

    if failed > 0 {
        return Err(Error::ChannelsFailed(failed));
    }
    Ok(())
}

fn render_channel(config: &Config, name: &str) -> Result<ChannelSql, Error> {
    let spec = config.channel(name).map_err(Error::Channel)?;
    codegen::render(&spec).map_err(|source| Error::Render {
        channel: name.to_string(),
        source,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The channel is unknown or invalid
    #[error(transparent)]
    Channel(ChannelError),

    /// The channel holds values that cannot be rendered into SQL
    #[error("failed to render SQL for channel \"{channel}\"")]
    Render {
        channel: String,
        #[source]
        source: RenderError,
    },

    #[error("failed to create output directory {}", .path.display())]
    CreateOutDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}", .path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to stdout")]
    Stdout(#[source] io::Error),

    /// Some channels of a multi-channel run failed, see the log for details
    #[error("{0} channel(s) could not be generated")]
    ChannelsFailed(usize),
}

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use eavesdrop_config::ConfigFile;

/// Writes a starter configuration for `database_name` to `path`
pub fn run(path: &Path, database_name: &str, force: bool) -> Result<(), Error> {
    if path.exists() && !force {
        return Err(Error::AlreadyExists(path.to_path_buf()));
    }

    let contents = ConfigFile::starter(database_name)
        .to_toml()
        .map_err(Error::Serialize)?;
    fs::write(path, contents).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!(path = %path.display(), "wrote starter configuration");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{} already exists, pass --force to overwrite it", .0.display())]
    AlreadyExists(PathBuf),

    #[error("failed to serialize the starter configuration")]
    Serialize(#[source] toml::ser::Error),

    #[error("failed to write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

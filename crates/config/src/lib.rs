//! Configuration layer: loads the config document and resolves it into the data model.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use common::{ChannelSpec, GlobalSettings, ServiceObjectSpec, UnsupportedOperation};

pub mod config_file;
pub mod credentials;
pub mod redacted;

pub use self::{
    config_file::{ChannelEntry, ConfigFile, LoadConfigFileError, ServiceObjectEntry},
    credentials::{Credentials, MissingEnvVar},
    redacted::Redacted,
};

/// Default config file name, looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILENAME: &str = "eavesdrop.toml";

/// The resolved configuration document
#[derive(Debug, Clone)]
pub struct Config {
    pub globals: GlobalSettings,
    /// Service objects in declaration order
    pub service_objects: Vec<ServiceObjectSpec>,
    channels: BTreeMap<String, ChannelEntry>,
    pub config_path: PathBuf,
}

/// Loads and resolves the configuration at `config_path`.
#[tracing::instrument(skip_all, fields(path = %config_path.display()), err)]
pub fn load(config_path: &Path) -> Result<Config, LoadError> {
    if !config_path.is_file() {
        return Err(LoadError::ConfigNotAFile(config_path.to_path_buf()));
    }

    let file = config_file::load(config_path).map_err(LoadError::ConfigFile)?;
    Ok(Config::from_file(file, config_path.to_path_buf()))
}

impl Config {
    /// Resolves a raw [`ConfigFile`].
    ///
    /// Service object entries convert infallibly. Channel entries are validated lazily by
    /// [`Config::channel`].
    pub fn from_file(file: ConfigFile, config_path: PathBuf) -> Self {
        let service_objects = file
            .service_objects
            .into_iter()
            .map(|entry| {
                entry.init_params.into_iter().fold(
                    ServiceObjectSpec::new(entry.name, entry.class),
                    |spec, param| spec.with_added_param(param.name, param.value),
                )
            })
            .collect();

        Self {
            globals: file.globals,
            service_objects,
            channels: file.channels,
            config_path,
        }
    }

    /// Names of all configured channels, sorted
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Resolves the named channel into a validated [`ChannelSpec`].
    pub fn channel(&self, name: &str) -> Result<ChannelSpec, ChannelError> {
        let entry = self
            .channels
            .get(name)
            .ok_or_else(|| ChannelError::NoSuchEventChannel(name.to_string()))?;

        let mut spec = ChannelSpec::new(
            name,
            &entry.table_name,
            &entry.operation,
            &entry.primary_key_field,
            &entry.primary_key_type,
        )
        .map_err(|source| ChannelError::UnsupportedOperation {
            channel: name.to_string(),
            source,
        })?
        .with_payload_fields(entry.payload_fields.iter().cloned());

        if let Some(schema) = non_blank(&entry.schema) {
            spec = spec.with_schema(schema);
        }
        if let Some(procedure_name) = non_blank(&entry.procedure_name) {
            spec = spec.with_procedure_name(procedure_name);
        }
        if let Some(trigger_name) = non_blank(&entry.trigger_name) {
            spec = spec.with_trigger_name(trigger_name);
        }
        if let Some(handler_function) = non_blank(&entry.handler_function) {
            spec = spec.with_handler_function(handler_function);
        }

        Ok(spec)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Errors that can occur when loading the configuration
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Config path does not exist or is not a file.
    #[error("config path is not a file: {}", .0.display())]
    ConfigNotAFile(PathBuf),

    /// The config file could not be parsed.
    #[error(transparent)]
    ConfigFile(LoadConfigFileError),
}

/// Errors resolving a channel from the configuration
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// No channel is configured under the given name
    #[error("No event channel registered under the name \"{0}\". Please check your config file")]
    NoSuchEventChannel(String),

    /// The channel names an unsupported database operation
    #[error("channel \"{channel}\" is invalid")]
    UnsupportedOperation {
        channel: String,
        #[source]
        source: UnsupportedOperation,
    },
}

#[cfg(test)]
mod tests;

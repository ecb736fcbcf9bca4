//! Process-wide settings

use std::path::PathBuf;

/// Default database host
pub const DEFAULT_DATABASE_HOST: &str = "127.0.0.1";

/// Default handler module name
pub const DEFAULT_HANDLER_MODULE: &str = "eavesdrop_handlers";

/// Default service module name
pub const DEFAULT_SERVICE_MODULE: &str = "eavesdrop_services";

/// Default project directory, resolved from the environment
pub const DEFAULT_PROJECT_DIRECTORY: &str = "$EAVESDROP_HOME";

/// Default log file name
pub const DEFAULT_LOGFILE: &str = "eavesdrop.log";

/// Global settings, constructed once at startup and never mutated by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GlobalSettings {
    /// Database host to connect to (default: `127.0.0.1`)
    #[serde(default = "default_database_host")]
    pub database_host: String,
    /// Database name to connect to (required)
    #[serde(default)]
    pub database_name: String,
    /// Project directory, may reference environment variables (default: `$EAVESDROP_HOME`)
    #[serde(default = "default_project_directory")]
    pub project_directory: String,
    /// Name of the module supplying handler functions (default: `eavesdrop_handlers`)
    #[serde(default = "default_handler_module")]
    pub handler_module: String,
    /// Name of the module supplying service object classes (default: `eavesdrop_services`)
    #[serde(default = "default_service_module")]
    pub service_module: String,
    /// Enable debug-level logging (default: false)
    #[serde(default)]
    pub debug: bool,
    /// Log file path, relative paths resolve against the working directory
    /// (default: `eavesdrop.log`)
    #[serde(default = "default_logfile")]
    pub logfile: String,
}

impl GlobalSettings {
    /// Settings for the given database with every other field at its default
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            ..Self::default()
        }
    }

    /// Checks the fields the dispatcher needs before it may connect.
    pub fn validate_for_dispatch(&self) -> Result<(), InvalidSettings> {
        if self.database_host.trim().is_empty() {
            return Err(InvalidSettings::EmptyDatabaseHost);
        }
        if self.database_name.trim().is_empty() {
            return Err(InvalidSettings::EmptyDatabaseName);
        }
        Ok(())
    }

    /// Resolves the project directory, expanding `$VAR` and `${VAR}` references.
    ///
    /// Variables that are not set expand to the empty string.
    pub fn project_dir(&self) -> PathBuf {
        PathBuf::from(expand_env_vars(&self.project_directory, |name| {
            std::env::var(name).ok()
        }))
    }
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            database_host: default_database_host(),
            database_name: String::new(),
            project_directory: default_project_directory(),
            handler_module: default_handler_module(),
            service_module: default_service_module(),
            debug: false,
            logfile: default_logfile(),
        }
    }
}

/// Settings that cannot be used to start a dispatcher
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSettings {
    #[error("globals.database_host must not be empty")]
    EmptyDatabaseHost,

    #[error("globals.database_name must not be empty")]
    EmptyDatabaseName,
}

fn default_database_host() -> String {
    DEFAULT_DATABASE_HOST.into()
}

fn default_project_directory() -> String {
    DEFAULT_PROJECT_DIRECTORY.into()
}

fn default_handler_module() -> String {
    DEFAULT_HANDLER_MODULE.into()
}

fn default_service_module() -> String {
    DEFAULT_SERVICE_MODULE.into()
}

fn default_logfile() -> String {
    DEFAULT_LOGFILE.into()
}

fn expand_env_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        if name.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }

        out.push_str(&lookup(name).unwrap_or_default());
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}

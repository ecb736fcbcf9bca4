//! Configuration file loading with environment variable overrides.
//!
//! Deserializes a [`ConfigFile`] from a TOML or YAML file using [Figment], merging
//! `EAVESDROP_CONFIG_*` environment variables on top. The format is chosen by the file
//! extension: `.yaml` and `.yml` are read as YAML, everything else as TOML.
//!
//! ## Environment variables
//!
//! All env vars are prefixed with `EAVESDROP_CONFIG_` and use double underscores to
//! separate nested keys. For example, `EAVESDROP_CONFIG_GLOBALS__DATABASE_HOST` maps to
//! `globals.database_host` in the config file.
//!
//! ## Example
//!
//! ```toml
//! [globals]
//! database_host = "127.0.0.1"
//! database_name = "shop"
//! handler_module = "shop_handlers"
//!
//! [[service_objects]]
//! name = "sink"
//! class = "JsonlSink"
//! init_params = [{ name = "path", value = "orders.jsonl" }]
//!
//! [channels.orders_created]
//! table_name = "orders"
//! operation = "INSERT"
//! primary_key_field = "id"
//! primary_key_type = "bigint"
//! handler_function = "append_jsonl"
//! payload_fields = ["amount", "status"]
//! ```

use std::{collections::BTreeMap, path::Path};

use common::{GlobalSettings, InitParam};
use figment::{
    Figment,
    providers::{Env, Format as _, Toml, Yaml},
};

/// Prefix of the environment variables overriding config file values
pub const ENV_PREFIX: &str = "EAVESDROP_CONFIG_";

/// Load a [`ConfigFile`] from a TOML or YAML file with env-var overrides.
pub fn load(config_path: &Path) -> Result<ConfigFile, LoadConfigFileError> {
    let figment = if is_yaml(config_path) {
        Figment::new().merge(Yaml::file(config_path))
    } else {
        Figment::new().merge(Toml::file(config_path))
    };

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|err| LoadConfigFileError(Box::new(err)))
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

/// Raw configuration as deserialized from the config file.
///
/// Channel entries are kept unvalidated so that one malformed channel only fails the
/// operations that use it.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub globals: GlobalSettings,
    /// Service objects in declaration order
    #[serde(default)]
    pub service_objects: Vec<ServiceObjectEntry>,
    /// Channels keyed by channel name
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelEntry>,
}

impl ConfigFile {
    /// A starter configuration for `database_name`: default globals, a JSON Lines sink service
    /// object and one example channel.
    pub fn starter(database_name: &str) -> Self {
        let sink = ServiceObjectEntry {
            name: "sink".to_string(),
            class: "JsonlSink".to_string(),
            init_params: vec![InitParam::new("path", "events.jsonl")],
        };
        let channel = ChannelEntry {
            table_name: "orders".to_string(),
            operation: "INSERT".to_string(),
            primary_key_field: "id".to_string(),
            primary_key_type: "bigint".to_string(),
            schema: None,
            procedure_name: None,
            trigger_name: None,
            handler_function: Some("default_handler".to_string()),
            payload_fields: Vec::new(),
        };

        Self {
            globals: GlobalSettings::new(database_name),
            service_objects: vec![sink],
            channels: BTreeMap::from([("orders_created".to_string(), channel)]),
        }
    }

    /// Renders the configuration as a TOML document that [`load`] reads back.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// A `[[service_objects]]` entry
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServiceObjectEntry {
    pub name: String,
    #[serde(alias = "class_name")]
    pub class: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_params: Vec<InitParam>,
}

/// A `[channels.<name>]` entry.
///
/// The `db_*` and `pk_*` aliases accept files written with the older key names.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChannelEntry {
    #[serde(alias = "db_table_name")]
    pub table_name: String,
    #[serde(alias = "db_operation")]
    pub operation: String,
    #[serde(alias = "pk_field_name")]
    pub primary_key_field: String,
    #[serde(alias = "pk_field_type")]
    pub primary_key_type: String,
    #[serde(default, alias = "db_schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, alias = "db_proc_name", skip_serializing_if = "Option::is_none")]
    pub procedure_name: Option<String>,
    #[serde(default, alias = "db_trigger_name", skip_serializing_if = "Option::is_none")]
    pub trigger_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_function: Option<String>,
    #[serde(default)]
    pub payload_fields: Vec<String>,
}

/// Error when loading configuration from a config file.
#[derive(Debug, thiserror::Error)]
#[error("Failed to load configuration file")]
pub struct LoadConfigFileError(#[source] pub Box<figment::Error>);

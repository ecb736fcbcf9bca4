//! Handler functions and service object classes shipped with the binary.
//!
//! They are bound under the default module names, so a config file that sets neither
//! `globals.handler_module` nor `globals.service_module` can use them directly.

use std::{
    fs::{File, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
    sync::Mutex,
};

use common::{
    BoxError, ChannelEvent,
    settings::{DEFAULT_HANDLER_MODULE, DEFAULT_SERVICE_MODULE},
};
use dispatcher::{
    Bindings, DEFAULT_HANDLER, HandlerModule, ServiceModule, ServiceRegistry, handlers,
    require_param,
};

/// Service object name the `append_jsonl` handler writes through
pub const JSONL_SINK_OBJECT: &str = "sink";

/// The built-in handler and service modules
pub fn bindings() -> Bindings {
    Bindings::new()
        .with_handler_module(handler_module())
        .with_service_module(service_module())
}

pub fn handler_module() -> HandlerModule {
    HandlerModule::new(DEFAULT_HANDLER_MODULE)
        .with_handler(DEFAULT_HANDLER, handlers::default_handler)
        .with_handler("print_payload", print_payload)
        .with_handler("append_jsonl", append_jsonl)
}

pub fn service_module() -> ServiceModule {
    ServiceModule::new(DEFAULT_SERVICE_MODULE)
        .with_class("JsonlSink", |spec| Ok(JsonlSink::open(require_param(spec, "path")?)?))
}

/// Writes the raw payload to stdout, one event per line
fn print_payload(event: &ChannelEvent, _services: &ServiceRegistry) -> Result<(), BoxError> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", event.payload)?;
    Ok(())
}

/// Appends the event to the [`JsonlSink`] registered as [`JSONL_SINK_OBJECT`]
fn append_jsonl(event: &ChannelEvent, services: &ServiceRegistry) -> Result<(), BoxError> {
    let sink = services.get_as::<JsonlSink>(JSONL_SINK_OBJECT)?;
    sink.append(event)
}

/// Appends events to a file in JSON Lines format.
///
/// Each line holds the channel, the notifying backend's process ID and the payload. Payloads
/// that are valid JSON are embedded as JSON, anything else as a string.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    /// Opens `path` for appending, creating it if needed
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &ChannelEvent) -> Result<(), BoxError> {
        let payload = event
            .json()
            .unwrap_or_else(|_| serde_json::Value::String(event.payload.clone()));
        let record = serde_json::json!({
            "channel": event.channel,
            "process_id": event.process_id,
            "payload": payload,
        });
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| format!("jsonl sink {} is poisoned", self.path.display()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

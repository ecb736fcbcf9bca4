//! Event handlers and handler resolution
//!
//! Handlers are bound by name in a [`HandlerModule`], an explicit table the application
//! populates at startup. Resolution looks a handler function up by name in the module named by
//! `globals.handler_module`, once, before the dispatcher starts listening.

use std::{collections::BTreeMap, fmt, sync::Arc};

use common::{BoxError, ChannelEvent};

use crate::services::ServiceRegistry;

/// Name that always selects the built-in [`default_handler`]
pub const DEFAULT_HANDLER: &str = "default_handler";

type HandlerFn = dyn Fn(&ChannelEvent, &ServiceRegistry) -> Result<(), BoxError> + Send + Sync;

/// A named, callable event handler. Clones share the same function.
#[derive(Clone)]
pub struct Handler {
    name: Arc<str>,
    func: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&ChannelEvent, &ServiceRegistry) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// The built-in default handler
    pub fn default_handler() -> Self {
        Self::new(DEFAULT_HANDLER, default_handler)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the handler
    pub fn call(&self, event: &ChannelEvent, services: &ServiceRegistry) -> Result<(), BoxError> {
        (self.func)(event, services)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.name).finish()
    }
}

/// The handler used when a channel configures none.
///
/// Parses the payload as JSON and logs a pretty-printed rendering of it. A payload that is not
/// valid JSON is a handler failure.
pub fn default_handler(event: &ChannelEvent, _services: &ServiceRegistry) -> Result<(), BoxError> {
    let value = event.json()?;
    let pretty = serde_json::to_string_pretty(&value)?;
    tracing::info!(
        channel = %event.channel,
        process_id = event.process_id,
        "received event:\n{pretty}"
    );
    Ok(())
}

/// A named table of handler functions
#[derive(Debug, Clone)]
pub struct HandlerModule {
    name: String,
    handlers: BTreeMap<String, Handler>,
}

impl HandlerModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds `func` under `name`, replacing any previous binding
    #[must_use]
    pub fn with_handler<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&ChannelEvent, &ServiceRegistry) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Handler::new(name, func));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    /// Names of the bound handlers, sorted
    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

/// The handler modules available to the process, keyed by module name
#[derive(Debug, Clone, Default)]
pub struct HandlerModules {
    modules: BTreeMap<String, HandlerModule>,
}

impl HandlerModules {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_module(mut self, module: HandlerModule) -> Self {
        self.modules.insert(module.name.clone(), module);
        self
    }

    pub fn module(&self, name: &str) -> Option<&HandlerModule> {
        self.modules.get(name)
    }

    /// Resolves a handler function by name.
    ///
    /// `None` and [`DEFAULT_HANDLER`] select the built-in default handler regardless of the
    /// module. Any other name must be bound in the module registered as `handler_module`.
    pub fn resolve(
        &self,
        handler_function: Option<&str>,
        handler_module: &str,
    ) -> Result<Handler, NoSuchEventHandler> {
        let function = match handler_function {
            None | Some(DEFAULT_HANDLER) => return Ok(Handler::default_handler()),
            Some(function) => function,
        };

        self.modules
            .get(handler_module)
            .and_then(|module| module.get(function))
            .cloned()
            .ok_or_else(|| NoSuchEventHandler {
                function: function.to_string(),
                module: handler_module.to_string(),
            })
    }
}

/// The configured handler function is not bound in the handler module
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "No event handler function \"{function}\" exists in handler module \"{module}\". Please check your config file and handler bindings"
)]
pub struct NoSuchEventHandler {
    pub function: String,
    pub module: String,
}

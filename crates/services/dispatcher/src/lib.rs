//! Single-channel event dispatcher.
//!
//! A [`Dispatcher`] subscribes to one Postgres notification channel and hands each event to a
//! handler function, together with a read-only [`ServiceRegistry`] of shared service objects.
//! Handler functions and service object classes are bound by name in explicit tables
//! ([`HandlerModule`], [`ServiceModule`]) that the application collects in [`Bindings`].

pub mod dispatch;
pub mod events;
pub mod handlers;
pub mod service;
pub mod services;

pub use self::{
    dispatch::{
        DispatchError, DispatchState, DispatchStats, Dispatcher, HandlerExecutionError,
        StartupError,
    },
    events::{ChannelListener, RecvError, connection_url, notify},
    handlers::{DEFAULT_HANDLER, Handler, HandlerModule, HandlerModules, NoSuchEventHandler},
    service::{listen, listen_with_reconnect},
    services::{
        ServiceLookupError, ServiceModule, ServiceModules, ServiceObjectConstructionError,
        ServiceRegistry, require_param,
    },
};

/// The handler and service modules available to dispatchers
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub handlers: HandlerModules,
    pub services: ServiceModules,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_handler_module(mut self, module: HandlerModule) -> Self {
        self.handlers = self.handlers.with_module(module);
        self
    }

    #[must_use]
    pub fn with_service_module(mut self, module: ServiceModule) -> Self {
        self.services = self.services.with_module(module);
        self
    }
}

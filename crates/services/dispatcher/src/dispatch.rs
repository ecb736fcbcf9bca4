//! The event dispatch loop

use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use common::{BoxError, ChannelEvent, ChannelSpec, InvalidSettings};
use eavesdrop_config::{ChannelError, Config};
use futures::{Stream, StreamExt as _};
use monitoring::logging;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    Bindings,
    events::RecvError,
    handlers::{Handler, NoSuchEventHandler},
    services::{ServiceObjectConstructionError, ServiceRegistry},
};

/// Dispatcher lifecycle states.
///
/// `Disconnected → Connected → Listening ⇄ Dispatching`, with `Stopped` terminal. A lost
/// connection moves the dispatcher back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Disconnected,
    Connected,
    Listening,
    Dispatching,
    Stopped,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Listening => "listening",
            Self::Dispatching => "dispatching",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Event counters of a dispatcher run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events taken off the channel
    pub received: u64,
    /// Handler invocations that returned `Ok`
    pub succeeded: u64,
    /// Handler invocations that returned an error or panicked
    pub failed: u64,
}

/// A single-channel event dispatcher.
///
/// Holds everything resolved at startup: the channel, its handler and the service registry.
/// None of it changes while the dispatcher runs.
pub struct Dispatcher {
    channel: ChannelSpec,
    handler: Handler,
    services: Arc<ServiceRegistry>,
    state: watch::Sender<DispatchState>,
}

impl Dispatcher {
    pub fn new(channel: ChannelSpec, handler: Handler, services: Arc<ServiceRegistry>) -> Self {
        let (state, _) = watch::channel(DispatchState::Disconnected);
        Self {
            channel,
            handler,
            services,
            state,
        }
    }

    /// Resolves everything the dispatcher needs for `channel_name`.
    ///
    /// Fails fast, before any connection is opened, in this order: invalid global settings,
    /// unknown or invalid channel, unbound handler function, service object construction.
    #[tracing::instrument(skip(config, bindings), err)]
    pub fn start(
        config: &Config,
        channel_name: &str,
        bindings: &Bindings,
    ) -> Result<Self, StartupError> {
        config
            .globals
            .validate_for_dispatch()
            .map_err(StartupError::InvalidSettings)?;

        let channel = config
            .channel(channel_name)
            .map_err(StartupError::Channel)?;

        let handler = bindings
            .handlers
            .resolve(channel.handler_function(), &config.globals.handler_module)
            .map_err(StartupError::NoSuchEventHandler)?;

        let services = ServiceRegistry::build(
            &config.service_objects,
            bindings.services.module(&config.globals.service_module),
        )
        .map_err(StartupError::ServiceObjectConstruction)?;

        tracing::info!(
            channel = channel.name(),
            handler = handler.name(),
            service_objects = services.len(),
            "dispatcher ready"
        );

        Ok(Self::new(channel, handler, Arc::new(services)))
    }

    pub fn channel(&self) -> &ChannelSpec {
        &self.channel
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// The current lifecycle state
    pub fn state(&self) -> DispatchState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle state changes
    pub fn subscribe_state(&self) -> watch::Receiver<DispatchState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: DispatchState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::trace!(channel = self.channel.name(), from = %previous, to = %state, "state transition");
        }
    }

    /// Dispatches `events` to the handler until `shutdown` is cancelled or the stream fails.
    ///
    /// Events are handled one at a time, in stream order. A handler error or panic is logged
    /// and counted, and the loop moves on to the next event. Cancellation is observed only
    /// while waiting for the next event, so an in-flight handler always runs to completion.
    ///
    /// Returns the run's counters on shutdown. A stream error or the end of the stream is a
    /// [`DispatchError::TransportDisconnect`].
    #[tracing::instrument(skip_all, fields(channel = %self.channel.name()))]
    pub async fn run<S>(
        &self,
        events: S,
        shutdown: &CancellationToken,
    ) -> Result<DispatchStats, DispatchError>
    where
        S: Stream<Item = Result<ChannelEvent, RecvError>> + Unpin,
    {
        let mut stats = DispatchStats::default();
        self.run_with_stats(events, shutdown, &mut stats).await?;
        Ok(stats)
    }

    /// Like [`Dispatcher::run`], but adds to `stats` so the counts survive a disconnect
    pub(crate) async fn run_with_stats<S>(
        &self,
        mut events: S,
        shutdown: &CancellationToken,
        stats: &mut DispatchStats,
    ) -> Result<(), DispatchError>
    where
        S: Stream<Item = Result<ChannelEvent, RecvError>> + Unpin,
    {
        loop {
            self.set_state(DispatchState::Listening);

            let next = tokio::select! { biased;
                _ = shutdown.cancelled() => {
                    self.set_state(DispatchState::Stopped);
                    tracing::info!(
                        received = stats.received,
                        succeeded = stats.succeeded,
                        failed = stats.failed,
                        "dispatcher stopped"
                    );
                    return Ok(());
                }
                next = events.next() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    self.set_state(DispatchState::Disconnected);
                    return Err(DispatchError::TransportDisconnect(err));
                }
                None => {
                    self.set_state(DispatchState::Disconnected);
                    return Err(DispatchError::TransportDisconnect(RecvError::ConnectionLost));
                }
            };

            self.set_state(DispatchState::Dispatching);
            stats.received += 1;

            match self.dispatch(&event) {
                Ok(()) => stats.succeeded += 1,
                Err(err) => {
                    stats.failed += 1;
                    tracing::error!(
                        channel = %event.channel,
                        process_id = event.process_id,
                        error = %err, error_source = logging::error_source(&err),
                        "event handler failed"
                    );
                }
            }
        }
    }

    /// Invokes the handler for a single event, turning a panic into an error
    pub fn dispatch(&self, event: &ChannelEvent) -> Result<(), HandlerExecutionError> {
        let result = catch_unwind(AssertUnwindSafe(|| self.handler.call(event, &self.services)));
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(HandlerExecutionError::Failed {
                handler: self.handler.name().to_string(),
                source,
            }),
            Err(panic) => Err(HandlerExecutionError::Panicked {
                handler: self.handler.name().to_string(),
                message: panic_message(panic.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channel", &self.channel.name())
            .field("handler", &self.handler)
            .field("services", &self.services)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The dispatcher could not be started. Nothing was connected.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The global settings are not usable for dispatching
    #[error("invalid global settings")]
    InvalidSettings(#[source] InvalidSettings),

    /// The channel is not configured, or its configuration is invalid
    #[error(transparent)]
    Channel(ChannelError),

    /// The channel's handler function is not bound
    #[error(transparent)]
    NoSuchEventHandler(NoSuchEventHandler),

    /// A declared service object could not be constructed
    #[error("failed to construct service objects")]
    ServiceObjectConstruction(#[source] ServiceObjectConstructionError),
}

/// A handler invocation failed. Logged and counted, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum HandlerExecutionError {
    /// The handler returned an error
    #[error("event handler \"{handler}\" failed")]
    Failed {
        handler: String,
        #[source]
        source: BoxError,
    },

    /// The handler panicked
    #[error("event handler \"{handler}\" panicked: {message}")]
    Panicked { handler: String, message: String },
}

/// The dispatcher stopped because of a transport failure
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The listener connection could not be established
    #[error("failed to connect to the database")]
    Connect(#[source] sqlx::Error),

    /// The `LISTEN` command failed
    #[error("failed to subscribe to channel \"{channel}\"")]
    Listen {
        channel: String,
        #[source]
        source: sqlx::Error,
    },

    /// The notification stream failed or ended
    #[error("notification transport disconnected")]
    TransportDisconnect(#[source] RecvError),
}

impl DispatchError {
    /// Whether starting over with a fresh connection may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(err) | Self::Listen { source: err, .. } => is_connection_error(err),
            Self::TransportDisconnect(_) => true,
        }
    }
}

fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

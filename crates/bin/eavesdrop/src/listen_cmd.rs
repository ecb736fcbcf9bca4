use dispatcher::{
    DispatchError, Dispatcher, StartupError, connection_url, events::ConnectionUrlError,
};
use eavesdrop_config::{Config, Credentials, MissingEnvVar};
use tokio_util::sync::CancellationToken;

use crate::builtin;

pub async fn run(config: Config, channel: &str, reconnect: bool) -> Result<(), Error> {
    let dispatcher =
        Dispatcher::start(&config, channel, &builtin::bindings()).map_err(Error::Startup)?;
    let credentials = Credentials::from_env().map_err(Error::Credentials)?;
    let url = connection_url(&config.globals, &credentials).map_err(Error::ConnectionUrl)?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received, stopping dispatcher...");
                    shutdown.cancel();
                }
                Err(err) => tracing::error!(error = %err, "Failed to listen for Ctrl+C"),
            }
        }
    });

    tracing::info!(
        channel,
        database_host = %config.globals.database_host,
        database_name = %config.globals.database_name,
        reconnect,
        "Starting dispatcher. Press Ctrl+C to stop."
    );

    let stats = if reconnect {
        dispatcher::listen_with_reconnect(&dispatcher, &url, &shutdown).await
    } else {
        dispatcher::listen(&dispatcher, &url, &shutdown).await
    }
    .map_err(Error::Dispatch)?;

    tracing::info!(
        channel,
        received = stats.received,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "Dispatcher shutdown complete"
    );
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The dispatcher could not be set up from the configuration
    #[error("failed to start dispatcher")]
    Startup(#[source] StartupError),

    /// Database credentials are missing from the environment
    #[error("missing database credentials")]
    Credentials(#[source] MissingEnvVar),

    #[error("invalid database location")]
    ConnectionUrl(#[source] ConnectionUrlError),

    /// The dispatcher stopped on a transport failure
    #[error("dispatcher stopped")]
    Dispatch(#[source] DispatchError),
}

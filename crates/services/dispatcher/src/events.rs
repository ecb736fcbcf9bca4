//! Channel notifications
//!
//! This module provides the transport side of the dispatcher: a [`ChannelListener`] subscribed
//! to a single Postgres channel via `LISTEN`, and a [`notify`] helper sending notifications via
//! `pg_notify`.

use common::{ChannelEvent, GlobalSettings};
use eavesdrop_config::Credentials;
use futures::stream::{self, Stream};
use sqlx::{Postgres, postgres::PgListener};
use url::Url;

/// Sends `payload` as a notification on `channel` using the provided executor.
///
/// # Delivery Guarantees
///
/// - Notifications sent before the `LISTEN` command is issued will not be delivered.
/// - Notifications sent inside a transaction are delivered when it commits.
#[tracing::instrument(skip(exe, payload), err)]
pub async fn notify<'c, E>(exe: E, channel: &str, payload: &str) -> Result<(), NotifySendError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(channel)
        .bind(payload)
        .execute(exe)
        .await
        .map_err(NotifySendError)?;
    Ok(())
}

/// An error that occurred while sending a notification
#[derive(Debug, thiserror::Error)]
#[error("failed to send notification")]
pub struct NotifySendError(#[source] pub sqlx::Error);

/// Builds the Postgres connection URL for the configured database.
///
/// User and password are percent-encoded, so any characters are allowed in them. The
/// `database_host` may carry a port (`db.internal:5433`).
pub fn connection_url(
    settings: &GlobalSettings,
    credentials: &Credentials,
) -> Result<Url, ConnectionUrlError> {
    let host = settings.database_host.trim();
    let mut url = Url::parse(&format!("postgres://{host}"))
        .map_err(|source| ConnectionUrlError::InvalidHost {
            host: host.to_string(),
            source,
        })?;

    url.set_username(&credentials.user)
        .and_then(|()| url.set_password(Some(credentials.password.as_str())))
        .map_err(|()| ConnectionUrlError::CannotHaveCredentials(host.to_string()))?;

    url.path_segments_mut()
        .map_err(|()| ConnectionUrlError::CannotHaveCredentials(host.to_string()))?
        .clear()
        .push(settings.database_name.trim());

    Ok(url)
}

/// The configured database location cannot be turned into a connection URL
#[derive(Debug, thiserror::Error)]
pub enum ConnectionUrlError {
    #[error("invalid database host \"{host}\"")]
    InvalidHost {
        host: String,
        #[source]
        source: url::ParseError,
    },

    #[error("database host \"{0}\" cannot be used with a user name and password")]
    CannotHaveCredentials(String),
}

/// A connection subscribed to a single notification channel.
///
/// # Delivery Guarantees
///
/// - Notifications sent before the `LISTEN` command is issued will not be delivered.
/// - Notifications sent while the connection is down are lost.
pub struct ChannelListener {
    listener: PgListener,
    channel: String,
}

impl ChannelListener {
    /// Opens a dedicated connection to the database at `url`
    #[tracing::instrument(skip_all, err)]
    pub async fn connect(url: &Url) -> Result<Self, sqlx::Error> {
        let listener = PgListener::connect(url.as_str()).await?;
        Ok(Self {
            listener,
            channel: String::new(),
        })
    }

    /// Subscribes the connection to `channel` using `LISTEN`
    #[tracing::instrument(skip(self), err)]
    pub async fn listen(&mut self, channel: &str) -> Result<(), sqlx::Error> {
        self.listener.listen(channel).await?;
        self.channel = channel.to_string();
        Ok(())
    }

    /// The subscribed channel, empty before [`ChannelListener::listen`] succeeded
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Borrows the listener as a stream of channel events.
    ///
    /// Events are yielded in the order the server delivers them. A lost connection yields
    /// [`RecvError::ConnectionLost`]. The listener is not reconnected by the stream consumer; the
    /// caller decides whether to start over.
    pub fn events(&mut self) -> impl Stream<Item = Result<ChannelEvent, RecvError>> + Unpin + '_ {
        Box::pin(stream::unfold(&mut self.listener, |listener| async move {
            let item = match listener.try_recv().await {
                Ok(Some(notification)) => Ok(ChannelEvent::new(
                    notification.channel(),
                    notification.payload(),
                    notification.process_id(),
                )),
                Ok(None) => Err(RecvError::ConnectionLost),
                Err(err) => Err(RecvError::Database(err)),
            };
            Some((item, listener))
        }))
    }

    /// Releases the subscription with `UNLISTEN *` and closes the connection
    #[tracing::instrument(skip(self), fields(channel = %self.channel))]
    pub async fn close(mut self) {
        if let Err(err) = self.listener.unlisten_all().await {
            // The server drops the subscription with the session anyway
            tracing::debug!(error = %err, "UNLISTEN failed while closing the listener");
        }
    }
}

/// An error that occurred while waiting for a notification
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    /// The server connection was lost
    #[error("connection to the database was lost")]
    ConnectionLost,

    /// An error occurred while receiving the notification
    #[error(transparent)]
    Database(sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_url_carries_host_database_and_credentials() {
        //* Given
        let settings = GlobalSettings {
            database_host: "db.internal:5433".to_string(),
            ..GlobalSettings::new("shop")
        };
        let credentials = Credentials::new("app", "s3cret");

        //* When
        let url = connection_url(&settings, &credentials).expect("url should build");

        //* Then
        assert_eq!(url.scheme(), "postgres");
        assert_eq!(url.host_str(), Some("db.internal"));
        assert_eq!(url.port(), Some(5433));
        assert_eq!(url.username(), "app");
        assert_eq!(url.password(), Some("s3cret"));
        assert_eq!(url.path(), "/shop");
    }

    #[test]
    fn connection_url_encodes_special_characters_in_credentials() {
        let settings = GlobalSettings::new("shop");
        let credentials = Credentials::new("app", "p@ss word");

        let url = connection_url(&settings, &credentials).expect("url should build");

        assert_eq!(url.host_str(), Some("127.0.0.1"));
        assert_eq!(url.password(), Some("p%40ss%20word"));
    }

    #[test]
    fn connection_url_rejects_invalid_host() {
        let settings = GlobalSettings {
            database_host: "db internal".to_string(),
            ..GlobalSettings::new("shop")
        };

        let result = connection_url(&settings, &Credentials::new("app", "s3cret"));

        assert!(matches!(result, Err(ConnectionUrlError::InvalidHost { .. })));
    }
}

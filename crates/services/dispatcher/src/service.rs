//! Running a dispatcher against the database

use std::time::Duration;

use backon::{BackoffBuilder as _, ExponentialBuilder};
use monitoring::logging;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    dispatch::{DispatchError, DispatchState, DispatchStats, Dispatcher},
    events::ChannelListener,
};

/// A session that ran at least this long before its connection dropped counts as healthy and
/// resets the reconnect backoff
const HEALTHY_SESSION: Duration = Duration::from_secs(30);

/// Connects, subscribes to the dispatcher's channel and dispatches events until `shutdown` is
/// cancelled.
///
/// The subscription and the connection are released before returning, whatever the outcome.
/// A lost connection is terminal and surfaces as [`DispatchError::TransportDisconnect`]; see
/// [`listen_with_reconnect`] for the retrying variant.
#[tracing::instrument(skip_all, fields(channel = %dispatcher.channel().name()))]
pub async fn listen(
    dispatcher: &Dispatcher,
    url: &Url,
    shutdown: &CancellationToken,
) -> Result<DispatchStats, DispatchError> {
    let mut stats = DispatchStats::default();
    listen_session(dispatcher, url, shutdown, &mut stats).await?;
    Ok(stats)
}

async fn listen_session(
    dispatcher: &Dispatcher,
    url: &Url,
    shutdown: &CancellationToken,
    stats: &mut DispatchStats,
) -> Result<(), DispatchError> {
    dispatcher.set_state(DispatchState::Disconnected);

    let mut listener = ChannelListener::connect(url)
        .await
        .map_err(DispatchError::Connect)?;
    dispatcher.set_state(DispatchState::Connected);

    let channel = dispatcher.channel().name();
    if let Err(source) = listener.listen(channel).await {
        listener.close().await;
        dispatcher.set_state(DispatchState::Disconnected);
        return Err(DispatchError::Listen {
            channel: channel.to_string(),
            source,
        });
    }
    tracing::info!(channel, "listening for notifications");

    let result = dispatcher
        .run_with_stats(listener.events(), shutdown, stats)
        .await;
    listener.close().await;
    result
}

/// Like [`listen`], but starts over with a fresh connection when the transport fails.
///
/// Notifications sent while disconnected are lost. Consecutive failures back off
/// exponentially and the last error is returned once the retry policy is exhausted. A session
/// that delivered events, or stayed subscribed for a while, before dropping resets the
/// backoff. The returned counters cover every session.
pub async fn listen_with_reconnect(
    dispatcher: &Dispatcher,
    url: &Url,
    shutdown: &CancellationToken,
) -> Result<DispatchStats, DispatchError> {
    let mut stats = DispatchStats::default();
    let mut backoff = with_policy().build();

    loop {
        if shutdown.is_cancelled() {
            dispatcher.set_state(DispatchState::Stopped);
            return Ok(stats);
        }

        let started_at = Instant::now();
        let received_before = stats.received;
        let err = match listen_session(dispatcher, url, shutdown, &mut stats).await {
            Ok(()) => return Ok(stats),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        let healthy = matches!(err, DispatchError::TransportDisconnect(_))
            && (stats.received > received_before || started_at.elapsed() >= HEALTHY_SESSION);
        if healthy {
            backoff = with_policy().build();
        }

        let Some(delay) = backoff.next() else {
            tracing::error!(
                channel = dispatcher.channel().name(),
                error = %err, error_source = logging::error_source(&err),
                "giving up reconnecting"
            );
            return Err(err);
        };

        tracing::warn!(
            channel = dispatcher.channel().name(),
            error = %err, error_source = logging::error_source(&err),
            "Lost the notification connection. Reconnecting in {:.1}s",
            delay.as_secs_f32()
        );

        tokio::select! { biased;
            _ = shutdown.cancelled() => {
                dispatcher.set_state(DispatchState::Stopped);
                return Ok(stats);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// The reconnect policy: exponential backoff starting at 1s, capped at 60s, 3 attempts.
#[inline]
fn with_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
}

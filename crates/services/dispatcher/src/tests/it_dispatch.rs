//! Dispatch loop tests over in-memory event streams

use std::{
    sync::{Arc, Mutex},
    task::Poll,
};

use common::{BoxError, ChannelEvent, ChannelSpec, ServiceObjectSpec};
use futures::stream::{self, Stream, StreamExt as _};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    DispatchError, DispatchState, DispatchStats, Dispatcher, Handler, RecvError, ServiceModule,
    ServiceRegistry, listen_with_reconnect,
};

const CHANNEL: &str = "orders_created";

fn orders_channel() -> ChannelSpec {
    ChannelSpec::new(CHANNEL, "orders", "INSERT", "id", "bigint").expect("operation is supported")
}

fn event(id: u32) -> ChannelEvent {
    ChannelEvent::new(CHANNEL, format!(r#"{{"id": {id}, "status": "new"}}"#), 4242)
}

/// Yields `events`, then cancels `shutdown` and stays pending
fn events_then_cancel(
    events: Vec<ChannelEvent>,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<ChannelEvent, RecvError>> + Unpin {
    stream::iter(events.into_iter().map(Ok)).chain(stream::poll_fn(move |_| {
        shutdown.cancel();
        Poll::Pending
    }))
}

fn event_id(event: &ChannelEvent) -> u64 {
    event
        .json()
        .ok()
        .and_then(|value| value["id"].as_u64())
        .unwrap_or_default()
}

#[tokio::test]
async fn events_are_dispatched_in_order_with_the_same_registry() {
    //* Given
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = Handler::new("record", {
        let seen = seen.clone();
        move |event: &ChannelEvent, services: &ServiceRegistry| -> Result<(), BoxError> {
            let registry = services as *const ServiceRegistry as usize;
            seen.lock().unwrap().push((event_id(event), registry));
            Ok(())
        }
    });
    let module = ServiceModule::new("services").with_class("Connector", |_| Ok(()));
    let registry = ServiceRegistry::build(
        &[ServiceObjectSpec::new("db", "Connector")],
        Some(&module),
    )
    .expect("registry should build");
    let dispatcher = Dispatcher::new(orders_channel(), handler, Arc::new(registry));
    let shutdown = CancellationToken::new();

    //* When
    let stats = dispatcher
        .run(
            events_then_cancel(vec![event(1), event(2), event(3)], shutdown.clone()),
            &shutdown,
        )
        .await
        .expect("run should stop cleanly");

    //* Then
    assert_eq!(
        stats,
        DispatchStats {
            received: 3,
            succeeded: 3,
            failed: 0
        }
    );
    let expected_registry = Arc::as_ptr(dispatcher.services()) as usize;
    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        [
            (1, expected_registry),
            (2, expected_registry),
            (3, expected_registry)
        ]
    );
    assert_eq!(dispatcher.state(), DispatchState::Stopped);
}

#[tokio::test]
async fn handler_failure_does_not_stop_the_loop() {
    //* Given
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = Handler::new("fail_on_two", {
        let seen = seen.clone();
        move |event: &ChannelEvent, _: &ServiceRegistry| -> Result<(), BoxError> {
            let id = event_id(event);
            seen.lock().unwrap().push(id);
            if id == 2 {
                return Err("order 2 is malformed".into());
            }
            Ok(())
        }
    });
    let dispatcher = Dispatcher::new(orders_channel(), handler, Arc::default());
    let shutdown = CancellationToken::new();

    //* When
    let stats = dispatcher
        .run(
            events_then_cancel(vec![event(1), event(2), event(3)], shutdown.clone()),
            &shutdown,
        )
        .await
        .expect("run should stop cleanly");

    //* Then
    assert_eq!(
        stats,
        DispatchStats {
            received: 3,
            succeeded: 2,
            failed: 1
        }
    );
    assert_eq!(*seen.lock().unwrap(), [1, 2, 3]);
}

#[tokio::test]
async fn handler_panic_counts_as_a_failure() {
    //* Given
    let handler = Handler::new("panic_on_two", |event: &ChannelEvent, _: &ServiceRegistry| {
        if event_id(event) == 2 {
            panic!("unexpected order");
        }
        Ok(())
    });
    let dispatcher = Dispatcher::new(orders_channel(), handler, Arc::default());
    let shutdown = CancellationToken::new();

    //* When
    let stats = dispatcher
        .run(
            events_then_cancel(vec![event(1), event(2), event(3)], shutdown.clone()),
            &shutdown,
        )
        .await
        .expect("run should stop cleanly");

    //* Then
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn default_handler_fails_on_non_json_payloads() {
    //* Given
    let dispatcher = Dispatcher::new(orders_channel(), Handler::default_handler(), Arc::default());
    let shutdown = CancellationToken::new();
    let events = vec![event(1), ChannelEvent::new(CHANNEL, "not json", 4242)];

    //* When
    let stats = dispatcher
        .run(events_then_cancel(events, shutdown.clone()), &shutdown)
        .await
        .expect("run should stop cleanly");

    //* Then
    assert_eq!(
        stats,
        DispatchStats {
            received: 2,
            succeeded: 1,
            failed: 1
        }
    );
}

#[tokio::test]
async fn end_of_stream_is_a_transport_disconnect() {
    //* Given
    let dispatcher = Dispatcher::new(orders_channel(), Handler::default_handler(), Arc::default());
    let events = stream::iter(vec![Ok(event(1))]);

    //* When
    let result = dispatcher.run(events, &CancellationToken::new()).await;

    //* Then
    assert!(matches!(
        result,
        Err(DispatchError::TransportDisconnect(RecvError::ConnectionLost))
    ));
    assert_eq!(dispatcher.state(), DispatchState::Disconnected);
}

#[tokio::test]
async fn receive_error_is_a_transport_disconnect() {
    let dispatcher = Dispatcher::new(orders_channel(), Handler::default_handler(), Arc::default());
    let events = stream::iter(vec![Ok(event(1)), Err(RecvError::ConnectionLost), Ok(event(2))]);

    let result = dispatcher.run(events, &CancellationToken::new()).await;

    assert!(matches!(result, Err(DispatchError::TransportDisconnect(_))));
}

#[tokio::test]
async fn shutdown_interrupts_the_wait_for_events() {
    //* Given
    let dispatcher = Arc::new(Dispatcher::new(
        orders_channel(),
        Handler::default_handler(),
        Arc::default(),
    ));
    let shutdown = CancellationToken::new();
    let mut state = dispatcher.subscribe_state();

    let run = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        async move {
            dispatcher
                .run(stream::pending::<Result<ChannelEvent, RecvError>>(), &shutdown)
                .await
        }
    });

    //* When
    state
        .wait_for(|state| *state == DispatchState::Listening)
        .await
        .expect("dispatcher should start listening");
    shutdown.cancel();
    let result = run.await.expect("run task should not panic");

    //* Then
    assert_eq!(result.expect("run should stop cleanly"), DispatchStats::default());
    assert_eq!(dispatcher.state(), DispatchState::Stopped);
}

#[test]
fn transport_failures_are_retryable() {
    let lost = DispatchError::TransportDisconnect(RecvError::ConnectionLost);
    let refused = DispatchError::Connect(sqlx::Error::Io(std::io::Error::other("refused")));
    let misconfigured = DispatchError::Connect(sqlx::Error::Configuration("bad url".into()));
    let denied = DispatchError::Listen {
        channel: CHANNEL.to_string(),
        source: sqlx::Error::Protocol("permission denied".to_string()),
    };

    assert!(lost.is_retryable());
    assert!(refused.is_retryable());
    assert!(!misconfigured.is_retryable());
    assert!(!denied.is_retryable());
}

#[tokio::test]
async fn reconnect_loop_does_not_connect_after_shutdown() {
    //* Given
    let dispatcher = Dispatcher::new(
        orders_channel(),
        Handler::new("noop", |_, _| Ok(())),
        Arc::default(),
    );
    let url = Url::parse("postgres://127.0.0.1:1/shop").expect("url should parse");
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    //* When
    let result = listen_with_reconnect(&dispatcher, &url, &shutdown).await;

    //* Then
    assert_eq!(
        result.expect("a cancelled run should stop cleanly"),
        DispatchStats::default()
    );
    assert_eq!(dispatcher.state(), DispatchState::Stopped);
}

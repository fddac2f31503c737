//! Endpoint behavior over the WebSocket binding, plus the converter service

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use magix_rs::{
    spawn_converter, spawn_portal, ConnectionError, Endpoint, Error, JsonCodec, MagixMessage,
    MagixMessageFilter, Subscription, SubscriptionState,
};
use serde_json::{json, Value};
use tokio::time::timeout;

use common::{init_tracing, LoopServer, Mode};

const WAIT: Duration = Duration::from_secs(5);
const PATH: &str = "/magix/ws";

async fn next_message(sub: &mut Subscription<Value, JsonCodec>) -> MagixMessage<Value> {
    timeout(WAIT, sub.next())
        .await
        .expect("Subscription should yield within the timeout")
        .expect("Subscription ended early")
        .expect("Expected a message")
}

#[tokio::test]
async fn test_two_subscriptions_see_third_party_broadcast() {
    init_tracing();
    let server = LoopServer::websocket(PATH, Mode::Accept).await;

    let endpoint = Endpoint::<Value>::websocket("127.0.0.1", server.port(), PATH)
        .await
        .unwrap();
    let mut first = endpoint.subscribe();
    let mut second = endpoint.subscribe();

    let other = Endpoint::<Value>::websocket("127.0.0.1", server.port(), PATH)
        .await
        .unwrap();
    let outgoing = MagixMessage::new("chat", "other", json!({"text": "hi"}));
    timeout(WAIT, other.broadcast(outgoing.clone()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(next_message(&mut first).await, outgoing);
    assert_eq!(next_message(&mut second).await, outgoing);

    // Cancelling one leaves the other untouched
    first.cancel();
    other.send("chat", "other", json!({"text": "again"})).await.unwrap();

    assert_eq!(
        next_message(&mut second).await.payload(),
        &json!({"text": "again"})
    );
    assert!(first.next().await.is_none());
    assert_eq!(first.state(), SubscriptionState::Cancelled);
    assert_eq!(second.state(), SubscriptionState::Active);
}

#[tokio::test]
async fn test_websocket_push_and_remote_close() {
    init_tracing();
    let server = LoopServer::websocket(PATH, Mode::Accept).await;
    let endpoint = Endpoint::<Value>::websocket("127.0.0.1", server.port(), PATH)
        .await
        .unwrap();
    let mut sub = endpoint.subscribe();

    server.push(&MagixMessage::new("test", "srv", json!("hello")));
    let message = next_message(&mut sub).await;
    assert_eq!(message.payload(), &json!("hello"));
    assert_eq!(message.origin(), "srv");

    server.close_all();
    assert!(timeout(WAIT, sub.next()).await.unwrap().is_none());
    assert_eq!(sub.state(), SubscriptionState::Completed);
    assert!(endpoint.is_closed());
}

#[tokio::test]
async fn test_websocket_unknown_path_rejected() {
    init_tracing();
    let server = LoopServer::websocket(PATH, Mode::Accept).await;

    let err = Endpoint::<Value>::websocket("127.0.0.1", server.port(), "/elsewhere")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::HandshakeRejected(_))
    ));
}

#[tokio::test]
async fn test_websocket_handshake_rejected() {
    init_tracing();
    let server = LoopServer::websocket(PATH, Mode::Reject("maintenance".into())).await;

    let err = Endpoint::<Value>::websocket("127.0.0.1", server.port(), PATH)
        .await
        .unwrap_err();
    match err {
        Error::Connection(ConnectionError::HandshakeRejected(reason)) => {
            assert_eq!(reason, "maintenance")
        }
        other => panic!("Expected HandshakeRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_converter_republishes_transformed_payloads() {
    init_tracing();
    let server = LoopServer::websocket(PATH, Mode::Accept).await;
    let endpoint = Arc::new(
        Endpoint::<Value>::websocket("127.0.0.1", server.port(), PATH)
            .await
            .unwrap(),
    );
    let mut converted =
        endpoint.subscribe_filtered(MagixMessageFilter::default().formats(["fahrenheit"]));

    let converter = spawn_converter(
        Arc::clone(&endpoint),
        MagixMessageFilter::default().formats(["celsius"]),
        "fahrenheit",
        Some("converter".to_string()),
        |celsius: &Value| celsius.as_f64().map(|c| json!(c * 9.0 / 5.0 + 32.0)),
    );

    // The converter subscribes before returning
    assert_eq!(endpoint.stats().active_subscriptions, 2);

    server.push(&MagixMessage::new("celsius", "sensor", json!("broken")));
    server.push(&MagixMessage::new("celsius", "sensor", json!(100.0)).with_target("display"));

    let message = next_message(&mut converted).await;
    assert_eq!(message.payload(), &json!(212.0));
    assert_eq!(message.origin(), "converter");
    assert_eq!(message.target(), Some("display"));

    endpoint.close();
    timeout(WAIT, converter).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_portal_bridges_two_loops() {
    init_tracing();
    let ws_loop = LoopServer::websocket(PATH, Mode::Accept).await;
    let tcp_loop = LoopServer::tcp(Mode::Accept).await;

    let first = Arc::new(
        Endpoint::<Value>::websocket("127.0.0.1", ws_loop.port(), PATH)
            .await
            .unwrap(),
    );
    let second = Arc::new(Endpoint::<Value>::tcp("127.0.0.1", tcp_loop.port()).await.unwrap());
    let mut on_first = first.subscribe_filtered(MagixMessageFilter::default().formats(["down"]));
    let mut on_second = second.subscribe();

    let portal = spawn_portal(
        Arc::clone(&first),
        Arc::clone(&second),
        MagixMessageFilter::default().formats(["up"]),
        MagixMessageFilter::default().formats(["down"]),
    );

    // Not accepted by the forward filter, stays on the first loop
    ws_loop.push(&MagixMessage::new("local", "a", json!(0)));
    ws_loop.push(&MagixMessage::new("up", "a", json!(1)).with_id("m-1"));

    let message = next_message(&mut on_second).await;
    assert_eq!(message.format(), "up");
    assert_eq!(message.origin(), "a");
    assert_eq!(message.id(), Some("m-1"));

    tcp_loop.push(&MagixMessage::new("down", "b", json!(2)));
    let message = next_message(&mut on_first).await;
    assert_eq!(message.origin(), "b");
    assert_eq!(message.payload(), &json!(2));

    first.close();
    timeout(WAIT, portal).await.unwrap().unwrap();
}

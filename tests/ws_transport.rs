use futures_util::{SinkExt, StreamExt};
use opencockpit::config::NetworkSettings;
use opencockpit::network::{
    spawn_transport, ChannelEvent, ChannelUpdate, ConnectionState, NetworkChannel, TransportLink,
};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Single-client server answering every `ping` with a `pong` carrying the same stamp.
async fn echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = socket.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let value: Value = serde_json::from_str(&text).unwrap();
            if let Some(stamp) = value.get("ping") {
                let reply = json!({ "pong": stamp, "engine_running": false });
                if socket.send(Message::Text(reply.to_string())).await.is_err() {
                    break;
                }
            }
        }
    });
    format!("ws://{}", addr)
}

async fn next_event(events: &mut mpsc::Receiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("transport stalled")
        .expect("transport exited")
}

#[tokio::test]
async fn probe_round_trip_yields_latency() {
    let settings = NetworkSettings {
        url: echo_server().await,
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    let TransportLink {
        commands,
        mut events,
        task,
    } = spawn_transport(settings.clone(), cancel.clone());
    let mut channel = NetworkChannel::new(&settings, commands, Instant::now());

    channel.connect(Instant::now());
    let opened = next_event(&mut events).await;
    assert!(matches!(opened, ChannelEvent::Opened(_)));
    assert!(matches!(
        channel.handle_event(opened, Instant::now()),
        ChannelUpdate::Opened
    ));
    assert_eq!(channel.state(), ConnectionState::Connected);

    assert!(channel.poll_probe(Instant::now()));
    let reply = next_event(&mut events).await;
    match channel.handle_event(reply, Instant::now()) {
        ChannelUpdate::Inbound(message) => {
            assert!(message.pong.is_some());
            assert_eq!(message.engine_running, Some(false));
        }
        other => panic!("expected inbound pong, got {:?}", other),
    }
    let latency = channel.latency().expect("no latency sample");
    assert!(latency.rtt_ms >= 0.0);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn refused_connection_schedules_first_backoff() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let settings = NetworkSettings {
        url: format!("ws://{}", addr),
        connect_timeout_ms: 2000,
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    let TransportLink {
        commands,
        mut events,
        task,
    } = spawn_transport(settings.clone(), cancel.clone());
    let mut channel = NetworkChannel::new(&settings, commands, Instant::now());

    channel.connect(Instant::now());
    let event = next_event(&mut events).await;
    assert!(matches!(event, ChannelEvent::ConnectFailed(_)));
    channel.handle_event(event, Instant::now());
    assert_eq!(
        channel.state(),
        ConnectionState::Reconnecting {
            delay: Duration::from_millis(1000)
        }
    );

    cancel.cancel();
    task.await.unwrap();
}

//! WebSocket transport task.
//!
//! Owns the socket and nothing else. It waits for a [`TransportCommand`],
//! performs one connection attempt, then pumps frames in both directions until
//! the socket closes, reporting every step as a [`ChannelEvent`]. Retry timing
//! is decided by the [`NetworkChannel`](super::channel::NetworkChannel), never here.

use crate::config::NetworkSettings;
use crate::network::channel::{ChannelError, ChannelEvent, TransportCommand};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Both ends the scheduler loop needs to talk to the transport task.
pub struct TransportLink {
    pub commands: mpsc::Sender<TransportCommand>,
    pub events: mpsc::Receiver<ChannelEvent>,
    pub task: JoinHandle<()>,
}

pub fn spawn_transport(settings: NetworkSettings, cancel: CancellationToken) -> TransportLink {
    info!("Spawning WebSocket transport for {}", settings.url);
    let (command_tx, command_rx) = mpsc::channel(4);
    let (event_tx, event_rx) = mpsc::channel(64);
    let task = tokio::spawn(run_transport(settings, command_rx, event_tx, cancel));
    TransportLink {
        commands: command_tx,
        events: event_rx,
        task,
    }
}

pub async fn run_transport(
    settings: NetworkSettings,
    mut commands: mpsc::Receiver<TransportCommand>,
    events: mpsc::Sender<ChannelEvent>,
    cancel: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => command,
        };
        match command {
            Some(TransportCommand::Connect) => {}
            None => {
                debug!("Channel dropped its transport handle");
                break;
            }
        }

        let event = match open(&settings).await {
            Ok(socket) => {
                let reason = pump(socket, &settings, &events, &cancel).await;
                ChannelEvent::Closed(reason)
            }
            Err(e) => ChannelEvent::ConnectFailed(e.to_string()),
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
    info!("WebSocket transport stopped");
}

async fn open(settings: &NetworkSettings) -> Result<Socket, ChannelError> {
    debug!("Opening {}", settings.url);
    let timeout = settings.connect_timeout();
    let (socket, response) = tokio::time::timeout(timeout, connect_async(settings.url.as_str()))
        .await
        .map_err(|_| ChannelError::Timeout(timeout))??;
    debug!("Handshake complete: HTTP {}", response.status());
    Ok(socket)
}

/// Runs one open connection; returns the close reason, if any.
async fn pump(
    socket: Socket,
    settings: &NetworkSettings,
    events: &mpsc::Sender<ChannelEvent>,
    cancel: &CancellationToken,
) -> Option<String> {
    let (mut sink, mut source) = socket.split();
    let (writer_tx, mut writer_rx) = mpsc::channel::<String>(settings.outbound_capacity.max(1));

    if events.send(ChannelEvent::Opened(writer_tx)).await.is_err() {
        return Some("channel dropped".to_string());
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.close().await {
                    debug!("Close handshake failed: {}", e);
                }
                return Some("shutdown".to_string());
            }
            Some(text) = writer_rx.recv() => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    error!("Write failed: {}", e);
                    return Some(e.to_string());
                }
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if events.send(ChannelEvent::Frame(text)).await.is_err() {
                        return Some("channel dropped".to_string());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return frame.map(|f| f.reason.to_string());
                }
                Some(Ok(Message::Binary(bytes))) => {
                    warn!("Ignoring binary frame of {} bytes", bytes.len());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Read failed: {}", e);
                    return Some(e.to_string());
                }
                None => return None,
            },
        }
    }
}

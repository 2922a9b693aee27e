//! Duplex channel lifecycle.
//!
//! [`NetworkChannel`] owns the connection state machine, the reconnect backoff
//! and the latency probe. It never performs I/O itself: it asks the transport
//! task to connect through a [`TransportCommand`] and is told what happened
//! through [`ChannelEvent`]s. That keeps every state change on the scheduler
//! loop and lets tests stand in for the socket with two mpsc channels.
//!
//! ```text
//! Disconnected ─connect()─► Connecting ─Opened─► Connected
//!                              ▲   │                  │
//!                  retry due   │   │ ConnectFailed    │ Closed
//!                              │   ▼                  ▼
//!                           Reconnecting{delay} ◄─────┘
//! ```

use crate::config::NetworkSettings;
use crate::network::backoff::Backoff;
use crate::network::latency::{LatencyProbe, LatencySample};
use crate::network::message::{ControlCommand, InboundMessage};
use chrono::{DateTime, Local};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting {
        delay: Duration,
    },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Link status published for collaborators outside the core (video layer, status line).
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct ConnectionHealth {
    pub state: ConnectionState,
    pub latency: Option<LatencySample>,
}

#[derive(Clone, Debug, Default)]
pub struct ChannelStats {
    pub messages_sent: usize,
    pub messages_dropped: usize,
    pub messages_received: usize,
    pub messages_malformed: usize,
    pub connects: usize,
    pub last_activity: Option<DateTime<Local>>,
}

/// Requests from the channel to its transport task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Connect,
}

/// What the transport task reports back.
#[derive(Debug)]
pub enum ChannelEvent {
    /// Socket is open; frames pushed into the sender are written in order.
    Opened(mpsc::Sender<String>),
    ConnectFailed(String),
    Closed(Option<String>),
    Frame(String),
}

/// Result of feeding one [`ChannelEvent`] into the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    Opened,
    Lost,
    Inbound(InboundMessage),
    Nothing,
}

pub struct NetworkChannel {
    state: ConnectionState,
    backoff: Backoff,
    retry_at: Option<Instant>,
    transport: mpsc::Sender<TransportCommand>,
    writer: Option<mpsc::Sender<String>>,
    probe: LatencyProbe,
    latency: Option<LatencySample>,
    stats: ChannelStats,
    health: watch::Sender<ConnectionHealth>,
}

impl NetworkChannel {
    pub fn new(
        settings: &NetworkSettings,
        transport: mpsc::Sender<TransportCommand>,
        epoch: Instant,
    ) -> Self {
        let (health, _) = watch::channel(ConnectionHealth::default());
        Self {
            state: ConnectionState::Disconnected,
            backoff: Backoff::new(settings.backoff_initial(), settings.backoff_max()),
            retry_at: None,
            transport,
            writer: None,
            probe: LatencyProbe::new(epoch, settings.probe_interval()),
            latency: None,
            stats: ChannelStats::default(),
            health,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub fn latency(&self) -> Option<LatencySample> {
        self.latency
    }

    /// Next scheduled reconnect attempt, if any.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Receiver for the health signal; may be cloned freely.
    pub fn subscribe_health(&self) -> watch::Receiver<ConnectionHealth> {
        self.health.subscribe()
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Channel state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.publish_health();
    }

    fn publish_health(&self) {
        let health = ConnectionHealth {
            state: self.state,
            latency: self.latency,
        };
        self.health.send_if_modified(|current| {
            if *current != health {
                *current = health;
                true
            } else {
                false
            }
        });
    }

    /// Starts a connection attempt unless one is already open or in flight.
    pub fn connect(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!("connect() ignored in state {:?}", self.state);
                return;
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting { .. } => {}
        }

        self.retry_at = None;
        match self.transport.try_send(TransportCommand::Connect) {
            Ok(()) => {
                info!("Connecting (attempt {})", self.backoff.attempts() + 1);
                self.set_state(ConnectionState::Connecting);
            }
            Err(e) => {
                error!("Transport unavailable: {}", e);
                self.schedule_retry(now);
            }
        }
    }

    fn schedule_retry(&mut self, now: Instant) {
        let delay = self.backoff.next_delay();
        self.retry_at = Some(now + delay);
        info!("Reconnecting in {}ms", delay.as_millis());
        self.set_state(ConnectionState::Reconnecting { delay });
    }

    /// Fires the pending reconnect once its delay has elapsed.
    pub fn poll_retry(&mut self, now: Instant) {
        if let (ConnectionState::Reconnecting { .. }, Some(at)) = (self.state, self.retry_at) {
            if now >= at {
                self.connect(now);
            }
        }
    }

    pub fn handle_event(&mut self, event: ChannelEvent, now: Instant) -> ChannelUpdate {
        match event {
            ChannelEvent::Opened(writer) => {
                info!("Channel connected");
                self.writer = Some(writer);
                self.backoff.reset();
                self.retry_at = None;
                self.probe.arm(now);
                self.stats.connects += 1;
                self.stats.last_activity = Some(Local::now());
                self.set_state(ConnectionState::Connected);
                ChannelUpdate::Opened
            }
            ChannelEvent::ConnectFailed(reason) => {
                warn!("Connection attempt failed: {}", reason);
                self.writer = None;
                self.schedule_retry(now);
                ChannelUpdate::Nothing
            }
            ChannelEvent::Closed(reason) => {
                match reason {
                    Some(reason) => warn!("Channel closed: {}", reason),
                    None => warn!("Channel closed"),
                }
                self.writer = None;
                self.probe.disarm();
                self.latency = None;
                self.schedule_retry(now);
                ChannelUpdate::Lost
            }
            ChannelEvent::Frame(text) => {
                self.stats.messages_received += 1;
                self.stats.last_activity = Some(Local::now());
                match InboundMessage::decode(&text) {
                    Ok(message) => {
                        if let Some(pong) = message.pong {
                            self.record_pong(pong, now);
                        }
                        ChannelUpdate::Inbound(message)
                    }
                    Err(e) => {
                        self.stats.messages_malformed += 1;
                        warn!("Dropping malformed frame: {}", e);
                        debug!("Malformed payload: {}", text);
                        ChannelUpdate::Nothing
                    }
                }
            }
        }
    }

    fn record_pong(&mut self, pong: f64, now: Instant) {
        match self.probe.on_pong(pong, now) {
            Some(sample) => {
                debug!("RTT {:.1}ms ({})", sample.rtt_ms, sample.band);
                self.latency = Some(sample);
                self.publish_health();
            }
            None => debug!("Ignoring pong with invalid stamp {}", pong),
        }
    }

    /// Best-effort send. Returns `false` when the command was dropped.
    pub fn send(&mut self, command: &ControlCommand) -> bool {
        let Some(writer) = self.writer.as_ref().filter(|_| self.state.is_connected()) else {
            self.stats.messages_dropped += 1;
            return false;
        };

        let text = match command.encode() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {:?}: {}", command, e);
                self.stats.messages_dropped += 1;
                return false;
            }
        };

        match writer.try_send(text) {
            Ok(()) => {
                self.stats.messages_sent += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("Writer saturated, dropping {:?}", command);
                self.stats.messages_dropped += 1;
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Writer gone, dropping {:?}", command);
                self.stats.messages_dropped += 1;
                false
            }
        }
    }

    /// Sends a latency probe when one is due. Returns whether a probe went out.
    pub fn poll_probe(&mut self, now: Instant) -> bool {
        if !self.state.is_connected() {
            return false;
        }
        match self.probe.poll(now) {
            Some(stamp) => self.send(&ControlCommand::Ping(stamp)),
            None => false,
        }
    }
}

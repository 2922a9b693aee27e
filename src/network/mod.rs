//! Network subsystem for the vehicle link
//!
//! 1. [`message`] - JSON wire schema for commands and inbound state
//! 2. [`backoff`] - Exponential reconnect delay
//! 3. [`latency`] - Ping/pong round-trip measurement
//! 4. [`channel`] - Connection state machine, best-effort send, inbound dispatch
//! 5. [`ws_transport`] - tokio-tungstenite socket task
//!
//! # Architecture
//!
//! ```text
//! RenderScheduler ──► NetworkChannel ─[TransportCommand]─► ws_transport ──► socket
//!                          ▲                                   │
//!                          └──────────[ChannelEvent]───────────┘
//! ```

pub mod backoff;
pub mod channel;
pub mod latency;
pub mod message;
pub mod ws_transport;

pub use backoff::{delay_for_attempt, Backoff};
pub use channel::{
    ChannelError, ChannelEvent, ChannelStats, ChannelUpdate, ConnectionHealth, ConnectionState,
    NetworkChannel, TransportCommand,
};
pub use latency::{LatencyBand, LatencyProbe, LatencySample};
pub use message::{AxisFrame, ControlCommand, Gear, InboundMessage, ProtocolError, Toggle};
pub use ws_transport::{spawn_transport, TransportLink};

//! Communication session management
//!
//! This module defines the trait for tunneling messages between the
//! negotiation engine and connected clients, and the identifier the
//! transport layer assigns to each live connection. The tunnel abstraction
//! keeps the engine independent of the concrete real-time protocol.

use std::{fmt::Display, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Identifier of one live transport connection
///
/// Connection ids are minted by the transport when a client connects and
/// are never reused. An identity may move between connections over time.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a new random connection id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Trait for sending messages through a communication tunnel
///
/// Implementations might use WebSockets, Server-Sent Events, or an
/// in-memory channel in tests. Sending is best-effort: a tunnel whose peer
/// has gone away silently drops the message.
pub trait Tunnel {
    /// Sends a message to the client
    ///
    /// # Arguments
    ///
    /// * `message` - The message to send
    fn send_message(&self, message: &ServerMessage);

    /// Closes the communication tunnel
    ///
    /// This is only used when the server shuts down; ordinary game
    /// terminations leave connections open.
    fn close(self);
}

//! Identity and connection registry
//!
//! This module keeps track of every identity (session) that has registered
//! with the server and of the live connection currently speaking for it.
//! Identities outlive connections: a client that reconnects and replays its
//! session id gets the same identity back, which is what lets tournament
//! players drop out and come back between matches.

use std::{collections::HashMap, fmt::Display, str::FromStr};

use heck::ToTitleCase;
use rustrict::CensorStr;
use serde::Serialize;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use uuid::Uuid;
use web_time::SystemTime;

use crate::{constants, session::ConnectionId};

/// A reusable identity token
///
/// Clients persist this value and present it again when they reconnect.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random session id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    /// Parses a session id from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s.trim())?))
    }
}

/// A registered identity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The identity token
    pub id: SessionId,
    /// Name shown to opponents and in standings
    pub display_name: String,
    /// When the identity was first registered
    pub created_at: SystemTime,
    /// When the identity last registered
    pub last_seen_at: SystemTime,
    /// Live connection currently speaking for this identity
    #[serde(skip)]
    connection: Option<ConnectionId>,
}

/// Result of registering a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// The identity now bound to the connection
    pub session: SessionId,
    /// Whether the identity was minted by this registration
    pub created: bool,
    /// An identity this connection spoke for before, now released
    pub released: Option<SessionId>,
    /// A connection that spoke for this identity before, now unbound
    pub superseded: Option<ConnectionId>,
}

/// Cleans a client supplied display name
///
/// Surrounding whitespace is removed, the name is cut to `max_length`
/// characters and inappropriate words are censored.
///
/// # Returns
///
/// The cleaned name, or `None` if nothing is left after trimming
pub fn sanitize_name(name: &str, max_length: usize) -> Option<String> {
    let name = rustrict::trim_whitespace(name);
    if name.is_empty() {
        return None;
    }
    let name: String = name.chars().take(max_length).collect();
    Some(name.as_str().censor())
}

/// Generates a random pet-style display name, e.g. "Cheerful Otter"
pub fn generated_name() -> String {
    loop {
        if let Some(name) = petname::petname(constants::session::GENERATED_NAME_WORDS, " ") {
            return name.to_title_case();
        }
    }
}

/// Manages identities and the connections speaking for them
#[derive(Debug, Default)]
pub struct Registry {
    /// Every identity ever registered with this process
    sessions: HashMap<SessionId, Session>,
    /// Reverse mapping from live connection to identity
    connections: HashMap<ConnectionId, SessionId>,
}

impl Registry {
    /// Registers `connection` under a supplied or freshly minted identity
    ///
    /// If `supplied` parses to a known identity, that identity is refreshed
    /// and rebound to `connection`. Otherwise a new identity is created. A
    /// connection that previously spoke for this identity loses the binding
    /// but is not closed.
    ///
    /// # Arguments
    ///
    /// * `connection` - The connection registering
    /// * `supplied` - Identity token replayed by the client, if any
    /// * `name` - Requested display name, if any
    /// * `max_name_length` - Display name length limit
    pub fn register(
        &mut self,
        connection: ConnectionId,
        supplied: Option<&str>,
        name: Option<&str>,
        max_name_length: usize,
    ) -> Registration {
        let now = SystemTime::now();
        let name = name.and_then(|n| sanitize_name(n, max_name_length));
        let known = supplied
            .and_then(|s| SessionId::from_str(s).ok())
            .filter(|id| self.sessions.contains_key(id));

        let released = self
            .connections
            .get(&connection)
            .copied()
            .filter(|previous| Some(*previous) != known);
        if let Some(previous) = released {
            self.unbind(connection, previous);
        }

        let (id, created, superseded) = match known.and_then(|id| self.sessions.get_mut(&id)) {
            Some(session) => {
                if let Some(name) = name {
                    session.display_name = name;
                }
                session.last_seen_at = now;
                let superseded = session
                    .connection
                    .replace(connection)
                    .filter(|old| *old != connection);
                (session.id, false, superseded)
            }
            None => {
                let id = SessionId::new();
                self.sessions.insert(
                    id,
                    Session {
                        id,
                        display_name: name.unwrap_or_else(generated_name),
                        created_at: now,
                        last_seen_at: now,
                        connection: Some(connection),
                    },
                );
                (id, true, None)
            }
        };

        if let Some(old) = superseded {
            self.connections.remove(&old);
        }
        self.connections.insert(connection, id);

        Registration {
            session: id,
            created,
            released,
            superseded,
        }
    }

    /// Unbinds a closing connection
    ///
    /// # Returns
    ///
    /// The identity the connection spoke for, if any
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<SessionId> {
        let id = self.connections.get(&connection).copied()?;
        self.unbind(connection, id);
        Some(id)
    }

    fn unbind(&mut self, connection: ConnectionId, id: SessionId) {
        self.connections.remove(&connection);
        if let Some(session) = self.sessions.get_mut(&id) {
            if session.connection == Some(connection) {
                session.connection = None;
            }
        }
    }

    /// Gets the identity a connection speaks for
    pub fn session_of(&self, connection: ConnectionId) -> Option<SessionId> {
        self.connections.get(&connection).copied()
    }

    /// Gets a registered identity
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Gets the display name of an identity
    pub fn name(&self, id: SessionId) -> Option<&str> {
        self.sessions.get(&id).map(|s| s.display_name.as_str())
    }

    /// Gets the live connection of an identity
    pub fn connection(&self, id: SessionId) -> Option<ConnectionId> {
        self.sessions.get(&id).and_then(|s| s.connection)
    }

    /// Checks whether an identity currently has a live connection
    pub fn is_connected(&self, id: SessionId) -> bool {
        self.connection(id).is_some()
    }

    /// Iterates over every live connection
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.keys().copied()
    }
}

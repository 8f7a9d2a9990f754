//! Wire messages exchanged with clients
//!
//! Every message is a JSON object with a `type` discriminator. Inbound
//! messages carry their arguments in an optional `payload` object; outbound
//! messages carry their fields inline.

use enum_map::EnumMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    code::Code,
    config::Item,
    negotiation::Outcome,
    offer::{InvalidOffer, Offer, Role},
    registry::SessionId,
    tournament::{MatchId, Snapshot},
};

/// Errors produced while decoding an inbound message
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The text is not valid JSON or the payload has the wrong shape
    #[error("malformed message")]
    MalformedMessage,
    /// The `type` discriminator is missing or not recognized
    #[error("unknown message type")]
    UnknownMessageType,
}

/// Message types a client may send
const CLIENT_TYPES: &[&str] = &[
    "register",
    "createGame",
    "joinGame",
    "joinQueue",
    "leaveQueue",
    "makeOffer",
    "acceptOffer",
    "walkAway",
    "requestNewGame",
    "createTournament",
    "joinTournament",
    "startTournament",
    "readyForMatch",
    "tournamentStatus",
];

/// Messages sent from a client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Bind the connection to an identity
    Register {
        /// Identity token from an earlier registration
        session_id: Option<String>,
        /// Requested display name
        name: Option<String>,
    },
    /// Open a game and wait for an opponent
    CreateGame {
        /// Requested display name
        name: Option<String>,
    },
    /// Take the second seat of a game
    JoinGame {
        /// Code of the game
        game_id: Option<String>,
        /// Requested display name
        name: Option<String>,
    },
    /// Wait for an anonymous opponent
    JoinQueue {},
    /// Stop waiting for an opponent
    LeaveQueue {},
    /// Propose a split
    MakeOffer {
        /// Units of each item offered to the opponent
        quantities: Option<Value>,
    },
    /// Accept the pending offer
    AcceptOffer {},
    /// Take the outside option
    WalkAway {},
    /// Replay a friendly game with fresh valuations
    RequestNewGame {},
    /// Open a tournament
    CreateTournament {
        /// Tournament name
        name: Option<String>,
    },
    /// Join a pending tournament
    JoinTournament {
        /// Code of the tournament
        tournament_id: String,
    },
    /// Fix the schedule of a tournament
    StartTournament {
        /// Code of the tournament
        tournament_id: String,
    },
    /// Signal readiness to play the next scheduled match
    ReadyForMatch {
        /// Code of the tournament
        tournament_id: String,
    },
    /// Query a tournament's progress
    TournamentStatus {
        /// Code of the tournament
        tournament_id: String,
    },
}

impl ClientMessage {
    /// Decodes a message received as text
    ///
    /// A missing or `null` payload is treated as an empty object.
    ///
    /// # Errors
    ///
    /// * [`Error::MalformedMessage`] - invalid JSON or a payload of the wrong shape
    /// * [`Error::UnknownMessageType`] - the `type` field is absent or not recognized
    pub fn parse(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text).map_err(|_| Error::MalformedMessage)?;
        let Value::Object(mut object) = value else {
            return Err(Error::UnknownMessageType);
        };
        let kind = match object.remove("type") {
            Some(Value::String(kind)) if CLIENT_TYPES.contains(&kind.as_str()) => kind,
            _ => return Err(Error::UnknownMessageType),
        };
        let payload = match object.remove("payload") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(payload) => payload,
        };

        let mut tagged = Map::new();
        tagged.insert("type".to_owned(), Value::String(kind));
        tagged.insert("payload".to_owned(), payload);
        serde_json::from_value(Value::Object(tagged)).map_err(|_| Error::MalformedMessage)
    }
}

/// Reads offer quantities from a payload value
///
/// The count is checked before the values, so a short list of junk reports
/// a length problem.
///
/// # Errors
///
/// * [`InvalidOffer::Length`] - not a list of `expected` entries
/// * [`InvalidOffer::NotWhole`] - an entry is not a whole number
pub fn quantities(value: Option<&Value>, expected: usize) -> Result<Vec<i64>, InvalidOffer> {
    let Some(Value::Array(entries)) = value else {
        return Err(InvalidOffer::Length);
    };
    if entries.len() != expected {
        return Err(InvalidOffer::Length);
    }
    entries
        .iter()
        .map(|entry| match entry {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0. && f.abs() < 1e15)
                        .map(|f| f as i64)
                })
                .ok_or(InvalidOffer::NotWhole),
            _ => Err(InvalidOffer::NotWhole),
        })
        .collect()
}

/// Progress of a direct game as reported to lobby members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LobbyStatus {
    /// The game was created and awaits an opponent
    Created,
    /// The recipient took the second seat
    Joined,
    /// An opponent took the second seat of the recipient's game
    OpponentJoined,
}

/// One party as seen in a state message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyView {
    /// Seat held
    pub role: Role,
    /// Display name
    pub name: String,
    /// Private item values, once drawn
    pub values: Option<Vec<u32>>,
    /// Outside option, once drawn
    pub outside: Option<u32>,
}

/// The part of a game's state both parties see
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Game code
    pub game_id: Code,
    /// Current round
    pub round: u32,
    /// Round cap
    pub total_rounds: u32,
    /// Per-round discount factor
    pub discount: f64,
    /// Item catalog
    pub items: Vec<Item>,
    /// Seat to act
    pub turn: Option<Role>,
    /// Most recent entry first
    pub history: Vec<String>,
    /// Pending offer
    pub current_offer: Option<Offer>,
    /// Whether the game settled
    pub finished: bool,
    /// Terminal outcome
    pub outcome: Option<Outcome>,
    /// Display name of each seat's occupant
    pub players: EnumMap<Role, Option<String>>,
    /// Tournament the game belongs to
    pub tournament_id: Option<Code>,
}

/// Messages sent to a client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Identity bound to the connection
    Registered {
        /// Token to persist and replay
        session_id: SessionId,
        /// Current display name
        display_name: String,
        /// Whether the identity is new
        created: bool,
    },
    /// Direct game lobby progress
    Lobby {
        /// What happened
        status: LobbyStatus,
        /// Game code
        game_id: Code,
        /// Recipient's seat
        role: Role,
        /// Human readable summary
        message: String,
    },
    /// Full game state for one party
    State {
        /// Shared state
        state: GameState,
        /// The recipient
        you: Option<PartyView>,
        /// The opponent, once finished
        opponent: Option<PartyView>,
    },
    /// Quick-match queue position
    QueueStatus {
        /// Whether the recipient is queued
        queued: bool,
        /// 1-indexed position, while queued
        position: Option<usize>,
    },
    /// The queue paired the recipient with an opponent
    MatchFound {
        /// Game code
        game_id: Code,
        /// Recipient's seat
        role: Role,
        /// Opponent's display name
        opponent: String,
    },
    /// The recipient created a tournament
    TournamentCreated {
        /// Tournament view
        tournament: Snapshot,
    },
    /// The recipient joined a tournament
    TournamentJoined {
        /// Tournament view
        tournament: Snapshot,
    },
    /// A tournament the recipient plays in changed
    TournamentUpdate {
        /// Tournament view
        tournament: Snapshot,
    },
    /// Reply to a status query
    TournamentStatus {
        /// Tournament view
        tournament: Snapshot,
    },
    /// A scheduled match began
    TournamentMatchStart {
        /// Tournament code
        tournament_id: Code,
        /// The match
        match_id: MatchId,
        /// Schedule round
        round_number: u32,
        /// Game code
        game_id: Code,
        /// Recipient's seat
        role: Role,
        /// Opponent's display name
        opponent: String,
    },
    /// No match could start for the recipient yet
    TournamentWaiting {
        /// Tournament code
        tournament_id: Code,
        /// Human readable reason
        message: String,
    },
    /// The opponent disconnected mid-game
    OpponentLeft {
        /// Human readable summary
        message: String,
    },
    /// A request failed
    Error {
        /// Human readable reason
        message: String,
    },
    /// The server is going away
    ServerShutdown {
        /// Human readable summary
        message: String,
    },
}

impl ServerMessage {
    /// Builds the error report for a failed request
    pub fn error(error: &impl std::fmt::Display) -> Self {
        Self::Error {
            message: error.to_string(),
        }
    }

    /// Converts the message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

//! Facts emitted for the historical record
//!
//! Every transition worth analysing later produces a [`Record`]. Records
//! are handed to a [`Recorder`] on a best-effort basis: a recorder failure
//! is reported to the operational log and never affects game state or
//! reaches a client.

use enum_map::EnumMap;
use serde::Serialize;
use thiserror::Error;

use crate::{
    code::Code,
    negotiation::Outcome,
    offer::Role,
    registry::SessionId,
    tournament::MatchId,
};

/// The kind of turn action taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    /// A proposal or counter-proposal
    Offer,
    /// Acceptance of the pending offer
    Accept,
    /// Taking the outside option
    Walk,
}

/// A seat as recorded at game start
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatRecord {
    /// Identity seated
    pub session: SessionId,
    /// Display name at game start
    pub name: String,
    /// Private item values
    pub values: Vec<u32>,
    /// Outside option
    pub outside: u32,
}

/// A fact to be persisted for analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Record {
    /// An identity registered or re-registered
    SessionSeen {
        /// The identity
        session: SessionId,
        /// Its current display name
        display_name: String,
    },
    /// A match started (or restarted) with fresh valuations
    GameStart {
        /// Game code
        game: Code,
        /// Tournament the game belongs to, if any
        tournament: Option<Code>,
        /// Both seats
        players: EnumMap<Role, SeatRecord>,
    },
    /// A game reached its terminal outcome
    GameOutcome {
        /// Game code
        game: Code,
        /// The outcome
        outcome: Outcome,
    },
    /// A turn action was taken
    Action {
        /// Game code
        game: Code,
        /// Identity acting
        session: SessionId,
        /// Seat acting
        role: Role,
        /// What was done
        action: ActionKind,
        /// Round at the time of the action
        round: u32,
        /// Offered quantities, for offers
        quantities: Option<Vec<u32>>,
        /// Undiscounted value of the actor's resulting share
        value_to_self: Option<u64>,
        /// Undiscounted value of the opponent's resulting share
        value_to_opponent: Option<u64>,
        /// Discount factor in force for the round
        discount_factor: f64,
    },
    /// A tournament was created
    TournamentCreated {
        /// Tournament code
        tournament: Code,
        /// Tournament name
        name: String,
        /// Creating identity
        creator: SessionId,
    },
    /// An identity joined a tournament
    TournamentPlayerJoined {
        /// Tournament code
        tournament: Code,
        /// Joining identity
        session: SessionId,
        /// Its display name
        display_name: String,
    },
    /// A tournament's schedule was generated
    TournamentStarted {
        /// Tournament code
        tournament: Code,
    },
    /// A scheduled match
    MatchScheduled {
        /// Tournament code
        tournament: Code,
        /// The match
        match_id: MatchId,
        /// Schedule round
        round_number: u32,
        /// First seat
        player1: SessionId,
        /// Second seat
        player2: SessionId,
    },
    /// A scheduled match began play
    MatchStarted {
        /// Tournament code
        tournament: Code,
        /// The match
        match_id: MatchId,
        /// Game the match is played in
        game: Code,
    },
    /// A match settled and its payoffs were credited
    MatchCompleted {
        /// Tournament code
        tournament: Code,
        /// The match
        match_id: MatchId,
        /// Discounted payoff credited to each seat
        payoffs: EnumMap<Role, f64>,
    },
    /// Every match of a tournament completed
    TournamentCompleted {
        /// Tournament code
        tournament: Code,
    },
}

/// Errors a record sink may report
#[derive(Error, Debug)]
pub enum Error {
    /// The sink cannot accept records right now
    #[error("record sink unavailable: {0}")]
    Unavailable(String),
    /// The record could not be encoded
    #[error("record could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A destination for records
///
/// Implementations must not block the caller for long; slow sinks should
/// queue internally. Errors are logged by the caller and otherwise ignored.
pub trait Recorder {
    /// Persists one record
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the record could not be accepted.
    fn record(&self, record: &Record) -> Result<(), Error>;
}

/// A recorder that writes every record to the operational log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl Recorder for TracingRecorder {
    fn record(&self, record: &Record) -> Result<(), Error> {
        let encoded = serde_json::to_string(record)?;
        tracing::info!(target: "bargain::record", record = %encoded, "record");
        Ok(())
    }
}

/// Hands a record to `recorder`, logging instead of propagating failure
pub fn submit<R: Recorder + ?Sized>(recorder: &R, record: &Record) {
    if let Err(e) = recorder.record(record) {
        tracing::warn!(error = %e, "dropping record");
    }
}

//! Round-robin tournaments
//!
//! A tournament collects players while pending, then fixes a round-robin
//! schedule when its creator starts it. Each scheduled match is played as an
//! ordinary negotiation; settled payoffs accumulate in the tournament's
//! [`Standings`]. The tournament completes once every match has.

use std::fmt::Display;

use enum_map::EnumMap;
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

use crate::{
    code::Code,
    offer::Role,
    record::Record,
    registry::SessionId,
    standings::{Ranked, Standings},
};

/// Position of a match in its tournament's schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MatchId(pub usize);

impl Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "M{}", self.0 + 1)
    }
}

/// Lifecycle of a tournament or of one of its matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not yet started (tournament) or not yet played (match)
    Pending,
    /// Schedule fixed (tournament) or being played (match)
    Active,
    /// Every match settled (tournament) or settled (match)
    Completed,
}

/// Errors produced by tournament operations
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The tournament no longer accepts joins or starts
    #[error("the tournament has already started")]
    AlreadyStarted,
    /// Only the creator may start a tournament
    #[error("only the tournament creator can start it")]
    NotCreator,
    /// A tournament needs at least two players
    #[error("at least two players are needed to start")]
    InsufficientPlayers,
    /// Round-robin pairing needs an even number of players
    #[error("an even number of players is needed to start")]
    OddPlayerCount,
    /// Matches are only played while the tournament is active
    #[error("the tournament is not active")]
    NotActive,
}

/// A scheduled pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    /// Position in the schedule
    pub id: MatchId,
    /// Schedule round, starting at 1
    pub round_number: u32,
    /// Seated as P1
    pub player1: SessionId,
    /// Seated as P2
    pub player2: SessionId,
    /// Progress of the match
    pub status: Status,
    /// Game the match is being (or was) played in
    pub game_id: Option<Code>,
}

impl Match {
    /// Whether `session` plays in this match
    pub fn involves(&self, session: SessionId) -> bool {
        self.player1 == session || self.player2 == session
    }

    /// The other participant of the match
    pub fn opponent_of(&self, session: SessionId) -> SessionId {
        if self.player1 == session {
            self.player2
        } else {
            self.player1
        }
    }
}

/// Builds a round-robin schedule with the circle method
///
/// The first player stays in place while the rest rotate one position per
/// round. In every round position `i` meets position `n - 1 - i`. With an
/// even number of players this yields `n - 1` rounds of `n / 2` matches in
/// which every pair meets exactly once.
///
/// # Returns
///
/// `(round_number, player1, player2)` triples in schedule order
pub fn round_robin<T: Copy>(players: &[T]) -> Vec<(u32, T, T)> {
    let n = players.len();
    if n < 2 {
        return Vec::new();
    }
    let mut circle = players.to_vec();
    let mut schedule = Vec::with_capacity(n * (n - 1) / 2);
    for round in 1..n {
        let round_number = u32::try_from(round).unwrap_or(u32::MAX);
        schedule.extend((0..n / 2).map(|i| (round_number, circle[i], circle[n - 1 - i])));
        circle[1..].rotate_right(1);
    }
    schedule
}

/// Read-only view of a tournament sent to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Tournament code
    pub id: Code,
    /// Tournament name
    pub name: String,
    /// Creating identity
    pub creator: SessionId,
    /// Lifecycle status
    pub status: Status,
    /// Participants ranked by cumulative payoff
    pub standings: Vec<Ranked>,
    /// Schedule in order
    pub matches: Vec<Match>,
}

/// A round-robin tournament
#[derive(Debug, Clone)]
pub struct Tournament {
    id: Code,
    name: String,
    creator: SessionId,
    status: Status,
    standings: Standings,
    matches: Vec<Match>,
}

impl Tournament {
    /// Creates a pending tournament whose only player is its creator
    pub fn new(id: Code, name: String, creator: SessionId, creator_name: String) -> Self {
        let mut standings = Standings::default();
        standings.add(creator, creator_name);
        Self {
            id,
            name,
            creator,
            status: Status::Pending,
            standings,
            matches: Vec::new(),
        }
    }

    /// Tournament code
    pub fn id(&self) -> Code {
        self.id
    }

    /// Tournament name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifecycle status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Cumulative results
    pub fn standings(&self) -> &Standings {
        &self.standings
    }

    /// Schedule in order
    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    /// Looks up a scheduled match
    pub fn get_match(&self, id: MatchId) -> Option<&Match> {
        self.matches.get(id.0)
    }

    /// Participants in join order
    pub fn players(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.standings.sessions()
    }

    /// Whether `session` participates
    pub fn has_player(&self, session: SessionId) -> bool {
        self.standings.contains(session)
    }

    /// Adds a player
    ///
    /// Joining again is a no-op, even after the tournament started.
    ///
    /// # Returns
    ///
    /// `true` if the player was newly added
    ///
    /// # Errors
    ///
    /// * [`Error::AlreadyStarted`] - a new player tried to join after the start
    pub fn join(&mut self, session: SessionId, display_name: String) -> Result<bool, Error> {
        if self.has_player(session) {
            return Ok(false);
        }
        if self.status != Status::Pending {
            return Err(Error::AlreadyStarted);
        }
        Ok(self.standings.add(session, display_name))
    }

    /// Fixes the schedule and activates the tournament
    ///
    /// # Errors
    ///
    /// * [`Error::NotCreator`] - `session` did not create the tournament
    /// * [`Error::AlreadyStarted`] - the tournament is not pending
    /// * [`Error::InsufficientPlayers`] - fewer than two players
    /// * [`Error::OddPlayerCount`] - an odd number of players
    pub fn start(&mut self, session: SessionId) -> Result<Vec<Record>, Error> {
        if session != self.creator {
            return Err(Error::NotCreator);
        }
        if self.status != Status::Pending {
            return Err(Error::AlreadyStarted);
        }
        if self.standings.len() < 2 {
            return Err(Error::InsufficientPlayers);
        }
        if self.standings.len() % 2 != 0 {
            return Err(Error::OddPlayerCount);
        }

        let players = self.players().collect_vec();
        self.matches = round_robin(&players)
            .into_iter()
            .enumerate()
            .map(|(i, (round_number, player1, player2))| Match {
                id: MatchId(i),
                round_number,
                player1,
                player2,
                status: Status::Pending,
                game_id: None,
            })
            .collect_vec();
        self.status = Status::Active;

        tracing::info!(
            tournament = %self.id,
            players = players.len(),
            matches = self.matches.len(),
            "tournament started"
        );

        let mut records = vec![Record::TournamentStarted {
            tournament: self.id,
        }];
        records.extend(self.matches.iter().map(|m| Record::MatchScheduled {
            tournament: self.id,
            match_id: m.id,
            round_number: m.round_number,
            player1: m.player1,
            player2: m.player2,
        }));
        Ok(records)
    }

    /// Finds the earliest pending match of `session` in schedule order
    ///
    /// # Errors
    ///
    /// * [`Error::NotActive`] - the tournament is pending or completed
    pub fn next_match(&self, session: SessionId) -> Result<Option<&Match>, Error> {
        if self.status != Status::Active {
            return Err(Error::NotActive);
        }
        Ok(self
            .matches
            .iter()
            .find(|m| m.status == Status::Pending && m.involves(session)))
    }

    /// Marks a pending match as being played in `game`
    pub fn activate(&mut self, id: MatchId, game: Code) -> Option<Record> {
        let m = self
            .matches
            .get_mut(id.0)
            .filter(|m| m.status == Status::Pending)?;
        m.status = Status::Active;
        m.game_id = Some(game);
        tracing::debug!(tournament = %self.id, match_id = %id, game = %game, "match started");
        Some(Record::MatchStarted {
            tournament: self.id,
            match_id: id,
            game,
        })
    }

    /// Credits a settled match and completes the tournament after the last
    ///
    /// `payoffs` are indexed by the seat each player held, P1 being the
    /// match's `player1`. Settling a match that is not active does nothing.
    pub fn settle(&mut self, id: MatchId, payoffs: EnumMap<Role, f64>) -> Vec<Record> {
        let Some(m) = self
            .matches
            .get_mut(id.0)
            .filter(|m| m.status == Status::Active)
        else {
            return Vec::new();
        };
        m.status = Status::Completed;
        let (player1, player2) = (m.player1, m.player2);
        self.standings.credit(player1, payoffs[Role::P1]);
        self.standings.credit(player2, payoffs[Role::P2]);

        let mut records = vec![Record::MatchCompleted {
            tournament: self.id,
            match_id: id,
            payoffs,
        }];
        if self.matches.iter().all(|m| m.status == Status::Completed) {
            self.status = Status::Completed;
            tracing::info!(tournament = %self.id, "tournament completed");
            records.push(Record::TournamentCompleted {
                tournament: self.id,
            });
        }
        records
    }

    /// Returns an interrupted match to the pending pool
    pub fn reopen(&mut self, id: MatchId) {
        if let Some(m) = self
            .matches
            .get_mut(id.0)
            .filter(|m| m.status == Status::Active)
        {
            m.status = Status::Pending;
            m.game_id = None;
            tracing::debug!(tournament = %self.id, match_id = %id, "match reopened");
        }
    }

    /// Builds the view sent to clients
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            id: self.id,
            name: self.name.clone(),
            creator: self.creator,
            status: self.status,
            standings: self.standings.ranked(),
            matches: self.matches.clone(),
        }
    }
}

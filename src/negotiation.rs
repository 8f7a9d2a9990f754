//! Alternating-offer negotiation state machine
//!
//! A [`Negotiation`] owns one game: two seats with private valuations, the
//! round counter, whose turn it is, the pending offer and a short history.
//! Every transition validates turn order before touching state, so a
//! rejected action always leaves the game exactly as it was. Successful
//! transitions return the [`Record`]s they produced; delivering state to the
//! players is left to the caller.

use std::collections::VecDeque;

use enum_map::{EnumMap, enum_map};
use serde::Serialize;
use thiserror::Error;

use crate::{
    code::Code,
    config::Config,
    offer::{self, InvalidOffer, Offer, Role},
    protocol::{GameState, PartyView, ServerMessage},
    record::{ActionKind, Record, SeatRecord},
    registry::SessionId,
    tournament::MatchId,
    valuation::Valuation,
};

/// Terminal result of a game
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Outcome {
    /// An offer was accepted
    Deal {
        /// Round at settlement
        round: u32,
        /// The accepted offer
        offer: Offer,
        /// Undiscounted value of each seat's share
        values: EnumMap<Role, u64>,
        /// Discounted payoff of each seat
        discounted: EnumMap<Role, f64>,
        /// Units of each item held by each seat
        shares: EnumMap<Role, Vec<u32>>,
    },
    /// A seat took its outside option
    Walk {
        /// The seat that walked
        by: Role,
        /// Round at settlement
        round: u32,
        /// Discounted outside option of each seat
        discounted: EnumMap<Role, f64>,
    },
    /// A seat left before the game settled
    Disconnect {
        /// The seat that left
        by: Role,
        /// Round at the time of leaving
        round: u32,
    },
}

impl Outcome {
    /// Round in which the game ended
    pub fn round(&self) -> u32 {
        match self {
            Self::Deal { round, .. } | Self::Walk { round, .. } | Self::Disconnect { round, .. } => {
                *round
            }
        }
    }

    /// Discounted payoffs, if the outcome defines any
    pub fn payoffs(&self) -> Option<EnumMap<Role, f64>> {
        match self {
            Self::Deal { discounted, .. } | Self::Walk { discounted, .. } => Some(*discounted),
            Self::Disconnect { .. } => None,
        }
    }
}

/// Errors produced by turn actions
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The acting seat does not hold the turn
    #[error("it is not your turn to act")]
    NotYourTurn,
    /// The game already reached its outcome
    #[error("the game is already finished")]
    GameFinished,
    /// The proposed quantities are malformed
    #[error(transparent)]
    InvalidOffer(#[from] InvalidOffer),
    /// There is no pending offer addressed to the acting seat
    #[error("there is no offer for you to accept")]
    NoOfferToAccept,
    /// A match needs both seats filled
    #[error("both players must be seated to start")]
    SeatEmpty,
    /// Tournament games are played exactly once
    #[error("tournament games cannot be restarted")]
    TournamentRematch,
}

/// Occupant of one seat
#[derive(Debug, Clone, PartialEq)]
pub struct Seat {
    /// Identity seated
    pub session: SessionId,
    /// Name shown to the opponent
    pub name: String,
    /// Private information, drawn when the match starts
    pub valuation: Option<Valuation>,
}

impl Seat {
    /// Creates a seat whose valuation is drawn at match start
    pub fn new(session: SessionId, name: String) -> Self {
        Self {
            session,
            name,
            valuation: None,
        }
    }

    fn values(&self) -> &[u32] {
        self.valuation.as_ref().map_or(&[], |v| v.values.as_slice())
    }

    fn outside(&self) -> u32 {
        self.valuation.as_ref().map_or(0, |v| v.outside)
    }

    fn record(&self) -> SeatRecord {
        SeatRecord {
            session: self.session,
            name: self.name.clone(),
            values: self.values().to_vec(),
            outside: self.outside(),
        }
    }
}

/// The tournament match a game is played for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TournamentLink {
    /// Tournament code
    pub tournament: Code,
    /// Match within the tournament
    pub match_id: MatchId,
}

/// One bargaining game between two seats
#[derive(Debug, Clone)]
pub struct Negotiation {
    id: Code,
    round: u32,
    turn: Option<Role>,
    first_mover: Role,
    current_offer: Option<Offer>,
    /// Most recent entry first
    history: VecDeque<String>,
    outcome: Option<Outcome>,
    seats: EnumMap<Role, Option<Seat>>,
    tournament: Option<TournamentLink>,
}

impl Negotiation {
    /// Creates a game with only the first seat filled
    pub fn new(id: Code, creator: Seat) -> Self {
        let mut seats = EnumMap::default();
        seats[Role::P1] = Some(creator);
        Self {
            id,
            round: 1,
            turn: None,
            first_mover: Role::P1,
            current_offer: None,
            history: VecDeque::new(),
            outcome: None,
            seats,
            tournament: None,
        }
    }

    /// Creates a game with both seats filled, ready to start
    pub fn with_players(
        id: Code,
        first: Seat,
        second: Seat,
        tournament: Option<TournamentLink>,
    ) -> Self {
        let mut game = Self::new(id, first);
        game.seats[Role::P2] = Some(second);
        game.tournament = tournament;
        game
    }

    /// The game code
    pub fn id(&self) -> Code {
        self.id
    }

    /// Current round, starting at 1
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Seat that must act next, `None` before the start and once finished
    pub fn turn(&self) -> Option<Role> {
        self.turn
    }

    /// Pending offer, if any
    pub fn current_offer(&self) -> Option<&Offer> {
        self.current_offer.as_ref()
    }

    /// History entries, most recent first
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    /// Terminal outcome, once finished
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Whether the game reached its outcome
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// The tournament match this game is played for
    pub fn tournament(&self) -> Option<TournamentLink> {
        self.tournament
    }

    /// Occupant of a seat
    pub fn seat(&self, role: Role) -> Option<&Seat> {
        self.seats[role].as_ref()
    }

    /// Seat held by an identity
    pub fn role_of(&self, session: SessionId) -> Option<Role> {
        self.seats
            .iter()
            .find(|(_, seat)| seat.as_ref().is_some_and(|s| s.session == session))
            .map(|(role, _)| role)
    }

    /// Fills the second seat
    pub fn seat_second(&mut self, seat: Seat) {
        self.seats[Role::P2] = Some(seat);
    }

    fn push_history(&mut self, entry: String, limit: usize) {
        self.history.push_front(entry);
        self.history.truncate(limit);
    }

    /// Starts (or restarts) the match with fresh private valuations
    ///
    /// # Errors
    ///
    /// * [`Error::SeatEmpty`] - the second seat has not been filled
    pub fn start_match(
        &mut self,
        config: &Config,
        rng: &mut fastrand::Rng,
    ) -> Result<Vec<Record>, Error> {
        if self.seats.values().any(Option::is_none) {
            return Err(Error::SeatEmpty);
        }
        for seat in self.seats.values_mut().flatten() {
            seat.valuation = Some(Valuation::draw(config, rng));
        }

        self.round = 1;
        self.first_mover = Role::P1;
        self.turn = Some(self.first_mover);
        self.current_offer = None;
        self.history.clear();
        self.outcome = None;

        tracing::info!(game = %self.id, "match started");

        let (Some(first), Some(second)) = (self.seat(Role::P1), self.seat(Role::P2)) else {
            return Err(Error::SeatEmpty);
        };

        Ok(vec![Record::GameStart {
            game: self.id,
            tournament: self.tournament.map(|t| t.tournament),
            players: enum_map! {
                Role::P1 => first.record(),
                Role::P2 => second.record(),
            },
        }])
    }

    /// Starts a rematch of a settled or ongoing friendly game
    ///
    /// # Errors
    ///
    /// * [`Error::TournamentRematch`] - the game belongs to a tournament
    /// * [`Error::SeatEmpty`] - the second seat has not been filled
    pub fn restart(&mut self, config: &Config, rng: &mut fastrand::Rng) -> Result<Vec<Record>, Error> {
        if self.tournament.is_some() {
            return Err(Error::TournamentRematch);
        }
        self.start_match(config, rng)
    }

    /// Checks that `role` may act now
    ///
    /// # Errors
    ///
    /// * [`Error::GameFinished`] - the game already ended
    /// * [`Error::NotYourTurn`] - `role` does not hold the turn
    pub fn check_turn(&self, role: Role) -> Result<(), Error> {
        if self.is_finished() {
            return Err(Error::GameFinished);
        }
        if self.turn != Some(role) {
            return Err(Error::NotYourTurn);
        }
        Ok(())
    }

    fn session(&self, role: Role) -> SessionId {
        self.seats[role]
            .as_ref()
            .map(|s| s.session)
            .unwrap_or_default()
    }

    fn values(&self, role: Role) -> &[u32] {
        self.seats[role].as_ref().map_or(&[], Seat::values)
    }

    fn outside(&self, role: Role) -> u32 {
        self.seats[role].as_ref().map_or(0, Seat::outside)
    }

    /// Proposes `quantities` to the other seat
    ///
    /// The round advances when the seat that did not open the match makes
    /// an offer, so an opening offer and its counter share a round. The
    /// round never exceeds the configured total.
    ///
    /// # Errors
    ///
    /// * [`Error::GameFinished`] - the game already ended
    /// * [`Error::NotYourTurn`] - `role` does not hold the turn
    /// * [`Error::InvalidOffer`] - the quantities are malformed
    pub fn make_offer(
        &mut self,
        role: Role,
        quantities: &[i64],
        config: &Config,
    ) -> Result<Vec<Record>, Error> {
        self.check_turn(role)?;
        let offer = Offer::new(role, quantities, &config.items)?;

        let shares = offer.shares(&config.totals());
        let record = Record::Action {
            game: self.id,
            session: self.session(role),
            role,
            action: ActionKind::Offer,
            round: self.round,
            quantities: Some(offer.quantities.clone()),
            value_to_self: Some(offer::value(&shares[role], self.values(role))),
            value_to_opponent: Some(offer::value(
                &shares[role.other()],
                self.values(role.other()),
            )),
            discount_factor: config.discount_factor(self.round),
        };

        self.push_history(offer.describe(&config.items), config.history_limit);
        self.turn = Some(offer.to);
        if role != self.first_mover && self.round < config.total_rounds {
            self.round += 1;
        }
        tracing::debug!(game = %self.id, %role, round = self.round, "offer made");
        self.current_offer = Some(offer);

        Ok(vec![record])
    }

    /// Accepts the pending offer, settling the game
    ///
    /// # Errors
    ///
    /// * [`Error::GameFinished`] - the game already ended
    /// * [`Error::NotYourTurn`] - `role` does not hold the turn
    /// * [`Error::NoOfferToAccept`] - no offer is addressed to `role`
    pub fn accept_offer(&mut self, role: Role, config: &Config) -> Result<Vec<Record>, Error> {
        self.check_turn(role)?;
        let offer = match &self.current_offer {
            Some(offer) if offer.to == role => offer.clone(),
            _ => return Err(Error::NoOfferToAccept),
        };

        let factor = config.discount_factor(self.round);
        let shares = offer.shares(&config.totals());
        let values = enum_map! { r => offer::value(&shares[r], self.values(r)) };
        let discounted = enum_map! { r => values[r] as f64 * factor };

        let action = Record::Action {
            game: self.id,
            session: self.session(role),
            role,
            action: ActionKind::Accept,
            round: self.round,
            quantities: Some(offer.quantities.clone()),
            value_to_self: Some(values[role]),
            value_to_opponent: Some(values[role.other()]),
            discount_factor: factor,
        };

        let outcome = Outcome::Deal {
            round: self.round,
            offer,
            values,
            discounted,
            shares,
        };
        let entry = format!("Deal reached in round {}.", self.round);
        Ok(vec![action, self.finish(outcome, entry, config)])
    }

    /// Takes the outside option, settling the game
    ///
    /// Both seats receive their own outside option, discounted by the
    /// current round.
    ///
    /// # Errors
    ///
    /// * [`Error::GameFinished`] - the game already ended
    /// * [`Error::NotYourTurn`] - `role` does not hold the turn
    pub fn walk_away(&mut self, role: Role, config: &Config) -> Result<Vec<Record>, Error> {
        self.check_turn(role)?;

        let factor = config.discount_factor(self.round);
        let discounted = enum_map! { r => f64::from(self.outside(r)) * factor };

        let action = Record::Action {
            game: self.id,
            session: self.session(role),
            role,
            action: ActionKind::Walk,
            round: self.round,
            quantities: None,
            value_to_self: Some(u64::from(self.outside(role))),
            value_to_opponent: Some(u64::from(self.outside(role.other()))),
            discount_factor: factor,
        };

        let outcome = Outcome::Walk {
            by: role,
            round: self.round,
            discounted,
        };
        let entry = format!("{} walked away in round {}.", role.label(), self.round);
        Ok(vec![action, self.finish(outcome, entry, config)])
    }

    /// Ends the game because the seat `role` disconnected
    ///
    /// Only a live opponent in an unsettled game turns the departure into
    /// a `disconnect` outcome; otherwise nothing changes.
    ///
    /// # Returns
    ///
    /// The outcome record, if an outcome was set
    pub fn handle_disconnect(
        &mut self,
        role: Role,
        opponent_connected: bool,
        config: &Config,
    ) -> Option<Record> {
        if self.is_finished() || !opponent_connected || self.seats[role.other()].is_none() {
            return None;
        }
        let outcome = Outcome::Disconnect {
            by: role,
            round: self.round,
        };
        let entry = format!("{} disconnected.", role.label());
        Some(self.finish(outcome, entry, config))
    }

    fn finish(&mut self, outcome: Outcome, entry: String, config: &Config) -> Record {
        self.push_history(entry, config.history_limit);
        self.turn = None;
        self.outcome = Some(outcome.clone());
        tracing::info!(game = %self.id, round = self.round, "game finished");
        Record::GameOutcome {
            game: self.id,
            outcome,
        }
    }

    /// Builds the state message for the occupant of `role`
    ///
    /// The shared part is identical for both seats. The private part
    /// carries the recipient's own valuation and, once the game is
    /// finished, the opponent's.
    pub fn state_message(&self, role: Role, config: &Config) -> ServerMessage {
        let view = |r: Role| {
            self.seats[r].as_ref().map(|seat| PartyView {
                role: r,
                name: seat.name.clone(),
                values: seat.valuation.as_ref().map(|v| v.values.clone()),
                outside: seat.valuation.as_ref().map(|v| v.outside),
            })
        };

        ServerMessage::State {
            state: GameState {
                game_id: self.id,
                round: self.round,
                total_rounds: config.total_rounds,
                discount: config.discount,
                items: config.items.clone(),
                turn: self.turn,
                history: self.history.iter().cloned().collect(),
                current_offer: self.current_offer.clone(),
                finished: self.is_finished(),
                outcome: self.outcome.clone(),
                players: enum_map! { r => self.seats[r].as_ref().map(|s| s.name.clone()) },
                tournament_id: self.tournament.map(|t| t.tournament),
            },
            you: view(role),
            opponent: if self.is_finished() {
                view(role.other())
            } else {
                None
            },
        }
    }
}

//! Top-level orchestration of connections, games, the queue and tournaments
//!
//! A [`Lobby`] owns every registry the server keeps. It consumes one inbound
//! message at a time and answers with a list of [`Effect`]s: messages to
//! deliver to connections, records to hand to the record sink, and
//! connections to close. The host process decodes client frames, calls
//! [`Lobby::receive`] and passes the effects to [`deliver`].

use std::str::FromStr;

use enum_map::enum_map;
use garde::Validate;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    code::Code,
    config::Config,
    constants,
    directory::Directory,
    negotiation::{self, Negotiation, Seat, TournamentLink},
    offer::Role,
    protocol::{self, ClientMessage, LobbyStatus, ServerMessage},
    queue::Queue,
    record::{self, Record, Recorder},
    registry::{self, Registry, SessionId},
    session::{ConnectionId, Tunnel},
    tournament::{self, Tournament},
};

/// Errors reported to the connection that sent a request
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The message could not be decoded
    #[error(transparent)]
    Protocol(#[from] protocol::Error),
    /// A turn action was rejected
    #[error(transparent)]
    Negotiation(#[from] negotiation::Error),
    /// A tournament operation was rejected
    #[error(transparent)]
    Tournament(#[from] tournament::Error),
    /// The connection has no identity yet
    #[error("register before sending other messages")]
    NotRegistered,
    /// No game has the given code
    #[error("game not found, double-check the code")]
    GameNotFound,
    /// The identity already sits in an unfinished game
    #[error("you are already in an active game")]
    AlreadyInGame,
    /// Both seats of the game are taken
    #[error("this game already has two players")]
    GameFull,
    /// The identity does not sit in any game
    #[error("you are not part of an active game")]
    NotInGame,
    /// A rematch needs both players connected and still in the game
    #[error("both players must be connected to start a new game")]
    OpponentMissing,
    /// No tournament has the given code
    #[error("tournament not found")]
    TournamentNotFound,
}

/// A consequence of handling one inbound message
#[derive(Debug, Clone, PartialEq, derive_more::From)]
pub enum Effect {
    /// Deliver a message to a connection
    #[from(ignore)]
    Send {
        /// Recipient
        to: ConnectionId,
        /// The message
        message: ServerMessage,
    },
    /// Hand a record to the record sink
    Record(Record),
    /// Close a connection
    #[from(ignore)]
    Close(ConnectionId),
}

/// Pushes effects into tunnels and the record sink
///
/// Messages to connections without a tunnel are dropped. Record failures
/// are logged and otherwise ignored.
///
/// # Arguments
///
/// * `effects` - Effects returned by the lobby, in order
/// * `tunnel_finder` - Function to find the tunnel of a connection
/// * `recorder` - Destination of records
pub fn deliver<T, F, R>(effects: Vec<Effect>, tunnel_finder: F, recorder: &R)
where
    T: Tunnel,
    F: Fn(ConnectionId) -> Option<T>,
    R: Recorder + ?Sized,
{
    for effect in effects {
        match effect {
            Effect::Send { to, message } => {
                if let Some(tunnel) = tunnel_finder(to) {
                    tunnel.send_message(&message);
                }
            }
            Effect::Record(record) => record::submit(recorder, &record),
            Effect::Close(connection) => {
                if let Some(tunnel) = tunnel_finder(connection) {
                    tunnel.close();
                }
            }
        }
    }
}

/// The server's entire in-memory state
#[derive(Debug)]
pub struct Lobby {
    config: Config,
    rng: fastrand::Rng,
    registry: Registry,
    directory: Directory,
    queue: Queue,
}

impl Lobby {
    /// Creates an empty lobby
    ///
    /// # Errors
    ///
    /// Returns the validation report if `config` is invalid.
    pub fn new(config: Config) -> Result<Self, garde::Report> {
        Self::with_rng(config, fastrand::Rng::new())
    }

    /// Creates an empty lobby with a seeded random number generator
    ///
    /// # Errors
    ///
    /// Returns the validation report if `config` is invalid.
    pub fn with_seed(config: Config, seed: u64) -> Result<Self, garde::Report> {
        Self::with_rng(config, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(config: Config, rng: fastrand::Rng) -> Result<Self, garde::Report> {
        config.validate()?;
        Ok(Self {
            config,
            rng,
            registry: Registry::default(),
            directory: Directory::default(),
            queue: Queue::default(),
        })
    }

    /// The configuration every game uses
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Identities and their connections
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Live games and tournaments
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Identities waiting for a quick match
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Handles a raw text frame from a connection
    pub fn receive_text(&mut self, connection: ConnectionId, text: &str) -> Vec<Effect> {
        match ClientMessage::parse(text) {
            Ok(message) => self.receive(connection, message),
            Err(error) => {
                tracing::debug!(%connection, %error, "undecodable message");
                vec![Effect::Send {
                    to: connection,
                    message: ServerMessage::error(&error),
                }]
            }
        }
    }

    /// Handles a decoded message from a connection
    ///
    /// Failures are reported to `connection` alone and never close it.
    pub fn receive(&mut self, connection: ConnectionId, message: ClientMessage) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Err(error) = self.handle(connection, message, &mut effects) {
            tracing::debug!(%connection, %error, "request rejected");
            effects.push(Effect::Send {
                to: connection,
                message: ServerMessage::error(&error),
            });
        }
        effects
    }

    /// Handles a connection going away
    ///
    /// The identity it spoke for leaves the queue, and any game it sits in
    /// ends and is removed.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(session) = self.registry.disconnect(connection) {
            tracing::debug!(%connection, %session, "connection closed");
            self.depart(session, &mut effects);
        }
        effects
    }

    /// Notifies and closes every registered connection
    pub fn shutdown(&self) -> Vec<Effect> {
        tracing::info!("lobby shutting down");
        self.registry
            .connections()
            .flat_map(|connection| {
                [
                    Effect::Send {
                        to: connection,
                        message: ServerMessage::ServerShutdown {
                            message: "The server is shutting down.".to_owned(),
                        },
                    },
                    Effect::Close(connection),
                ]
            })
            .collect()
    }

    fn handle(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
        effects: &mut Vec<Effect>,
    ) -> Result<(), Error> {
        if let ClientMessage::Register { session_id, name } = message {
            self.register(connection, session_id.as_deref(), name.as_deref(), effects);
            return Ok(());
        }

        let session = self
            .registry
            .session_of(connection)
            .ok_or(Error::NotRegistered)?;

        match message {
            ClientMessage::Register { .. } => Ok(()),
            ClientMessage::CreateGame { name } => self.create_game(session, name.as_deref(), effects),
            ClientMessage::JoinGame { game_id, name } => {
                self.join_game(session, game_id.as_deref(), name.as_deref(), effects)
            }
            ClientMessage::JoinQueue {} => self.join_queue(session, effects),
            ClientMessage::LeaveQueue {} => {
                self.leave_queue(session, effects);
                Ok(())
            }
            ClientMessage::MakeOffer { quantities } => {
                self.make_offer(session, quantities.as_ref(), effects)
            }
            ClientMessage::AcceptOffer {} => self.accept_offer(session, effects),
            ClientMessage::WalkAway {} => self.walk_away(session, effects),
            ClientMessage::RequestNewGame {} => self.request_new_game(session, effects),
            ClientMessage::CreateTournament { name } => {
                self.create_tournament(session, name.as_deref(), effects);
                Ok(())
            }
            ClientMessage::JoinTournament { tournament_id } => {
                self.join_tournament(session, &tournament_id, effects)
            }
            ClientMessage::StartTournament { tournament_id } => {
                self.start_tournament(session, &tournament_id, effects)
            }
            ClientMessage::ReadyForMatch { tournament_id } => {
                self.ready_for_match(session, &tournament_id, effects)
            }
            ClientMessage::TournamentStatus { tournament_id } => {
                self.tournament_status(session, &tournament_id, effects)
            }
        }
    }

    fn send(&self, session: SessionId, message: ServerMessage, effects: &mut Vec<Effect>) {
        if let Some(to) = self.registry.connection(session) {
            effects.push(Effect::Send { to, message });
        }
    }

    fn records(effects: &mut Vec<Effect>, records: Vec<Record>) {
        effects.extend(records.into_iter().map(Effect::from));
    }

    fn send_state(&self, code: Code, effects: &mut Vec<Effect>) {
        let Some(game) = self.directory.game(code) else {
            return;
        };
        for role in [Role::P1, Role::P2] {
            if let Some(seat) = game.seat(role) {
                self.send(seat.session, game.state_message(role, &self.config), effects);
            }
        }
    }

    fn display_name(&self, session: SessionId) -> String {
        self.registry
            .name(session)
            .map_or_else(registry::generated_name, ToOwned::to_owned)
    }

    /// Name used for a seat: the requested one if usable, else the identity's
    fn seat_name(&self, session: SessionId, requested: Option<&str>) -> String {
        requested
            .and_then(|name| registry::sanitize_name(name, self.config.max_name_length))
            .unwrap_or_else(|| self.display_name(session))
    }

    fn register(
        &mut self,
        connection: ConnectionId,
        supplied: Option<&str>,
        name: Option<&str>,
        effects: &mut Vec<Effect>,
    ) {
        let registration =
            self.registry
                .register(connection, supplied, name, self.config.max_name_length);
        if let Some(released) = registration.released {
            self.depart(released, effects);
        }

        let session = registration.session;
        let display_name = self.display_name(session);
        tracing::info!(%connection, %session, created = registration.created, "registered");

        effects.push(Effect::Record(Record::SessionSeen {
            session,
            display_name: display_name.clone(),
        }));
        effects.push(Effect::Send {
            to: connection,
            message: ServerMessage::Registered {
                session_id: session,
                display_name,
                created: registration.created,
            },
        });

        if let Some(game) = self
            .directory
            .current_game(session)
            .and_then(|code| self.directory.game(code))
        {
            if let Some(role) = game.role_of(session) {
                effects.push(Effect::Send {
                    to: connection,
                    message: game.state_message(role, &self.config),
                });
            }
        }
    }

    /// Handles an identity losing its live connection
    fn depart(&mut self, session: SessionId, effects: &mut Vec<Effect>) {
        if self.queue.leave(session) {
            self.announce_queue(effects);
        }

        let Some(code) = self.directory.current_game(session) else {
            return;
        };
        let Some(game) = self.directory.game_mut(code) else {
            return;
        };
        let Some(role) = game.role_of(session) else {
            return;
        };

        let opponent = game.seat(role.other()).map(|seat| seat.session);
        let opponent_connected = opponent.is_some_and(|o| self.registry.is_connected(o));
        if let Some(record) = game.handle_disconnect(role, opponent_connected, &self.config) {
            tracing::info!(game = %code, %session, "player left mid-game");
            effects.push(Effect::Record(record));
            if let Some(opponent) = opponent {
                self.send(
                    opponent,
                    ServerMessage::OpponentLeft {
                        message: format!("{} disconnected. The match has ended.", role.label()),
                    },
                    effects,
                );
            }
            self.send_state(code, effects);
        }

        let Some(game) = self.directory.remove_game(code) else {
            return;
        };
        let settled = game.outcome().and_then(|o| o.payoffs()).is_some();
        if let Some(link) = game.tournament().filter(|_| !settled) {
            if let Some(tournament) = self.directory.tournament_mut(link.tournament) {
                tournament.reopen(link.match_id);
            }
            self.announce_tournament(link.tournament, effects);
        }
    }

    fn create_game(
        &mut self,
        session: SessionId,
        name: Option<&str>,
        effects: &mut Vec<Effect>,
    ) -> Result<(), Error> {
        if self.directory.active_game(session).is_some() {
            return Err(Error::AlreadyInGame);
        }
        if self.queue.leave(session) {
            self.announce_queue(effects);
        }

        let name = self.seat_name(session, name);
        let code = self.directory.allocate_code(&mut self.rng);
        self.directory
            .insert_game(Negotiation::new(code, Seat::new(session, name)));
        tracing::info!(game = %code, %session, "game created");

        self.send(
            session,
            ServerMessage::Lobby {
                status: LobbyStatus::Created,
                game_id: code,
                role: Role::P1,
                message: "Game created. Share the code so another player can join.".to_owned(),
            },
            effects,
        );
        self.send_state(code, effects);
        Ok(())
    }

    fn join_game(
        &mut self,
        session: SessionId,
        game_id: Option<&str>,
        name: Option<&str>,
        effects: &mut Vec<Effect>,
    ) -> Result<(), Error> {
        let code = game_id
            .and_then(|id| Code::from_str(id).ok())
            .ok_or(Error::GameNotFound)?;
        if self.directory.active_game(session).is_some() {
            return Err(Error::AlreadyInGame);
        }
        let game = self.directory.game(code).ok_or(Error::GameNotFound)?;
        if game.tournament().is_some()
            || game
                .seat(Role::P2)
                .is_some_and(|seat| self.registry.is_connected(seat.session))
        {
            return Err(Error::GameFull);
        }
        let host = game.seat(Role::P1).map(|seat| seat.session);

        let name = self.seat_name(session, name);
        if let Some(game) = self.directory.game_mut(code) {
            game.seat_second(Seat::new(session, name.clone()));
        }
        self.directory.bind(session, code);
        if self.queue.leave(session) {
            self.announce_queue(effects);
        }
        tracing::info!(game = %code, %session, "game joined");

        self.send(
            session,
            ServerMessage::Lobby {
                status: LobbyStatus::Joined,
                game_id: code,
                role: Role::P2,
                message: "Joined game. Waiting for the host to start the negotiation.".to_owned(),
            },
            effects,
        );
        if let Some(host) = host {
            self.send(
                host,
                ServerMessage::Lobby {
                    status: LobbyStatus::OpponentJoined,
                    game_id: code,
                    role: Role::P1,
                    message: format!("{name} joined as Player 2. The negotiation is starting!"),
                },
                effects,
            );
        }

        self.start_game(code, effects)
    }

    fn start_game(&mut self, code: Code, effects: &mut Vec<Effect>) -> Result<(), Error> {
        let game = self.directory.game_mut(code).ok_or(Error::GameNotFound)?;
        let records = game.start_match(&self.config, &mut self.rng)?;
        Self::records(effects, records);
        self.send_state(code, effects);
        Ok(())
    }

    fn join_queue(&mut self, session: SessionId, effects: &mut Vec<Effect>) -> Result<(), Error> {
        if self.directory.active_game(session).is_some() {
            return Err(Error::AlreadyInGame);
        }
        let position = self.queue.join(session);
        tracing::debug!(%session, position, "queued");
        self.send(
            session,
            ServerMessage::QueueStatus {
                queued: true,
                position: Some(position),
            },
            effects,
        );

        let mut paired = false;
        while let Some((first, second)) = self.queue.pair() {
            paired = true;
            self.start_quick_match(first, second, effects)?;
        }
        if paired {
            self.announce_queue(effects);
        }
        Ok(())
    }

    fn start_quick_match(
        &mut self,
        first: SessionId,
        second: SessionId,
        effects: &mut Vec<Effect>,
    ) -> Result<(), Error> {
        let names = enum_map! {
            Role::P1 => self.display_name(first),
            Role::P2 => self.display_name(second),
        };
        let code = self.directory.allocate_code(&mut self.rng);
        self.directory.insert_game(Negotiation::with_players(
            code,
            Seat::new(first, names[Role::P1].clone()),
            Seat::new(second, names[Role::P2].clone()),
            None,
        ));
        tracing::info!(game = %code, %first, %second, "queue paired");

        for (session, role) in [(first, Role::P1), (second, Role::P2)] {
            self.send(
                session,
                ServerMessage::MatchFound {
                    game_id: code,
                    role,
                    opponent: names[role.other()].clone(),
                },
                effects,
            );
        }
        self.start_game(code, effects)
    }

    fn leave_queue(&mut self, session: SessionId, effects: &mut Vec<Effect>) {
        let removed = self.queue.leave(session);
        self.send(
            session,
            ServerMessage::QueueStatus {
                queued: false,
                position: None,
            },
            effects,
        );
        if removed {
            self.announce_queue(effects);
        }
    }

    /// Tells every queued identity its current position
    fn announce_queue(&self, effects: &mut Vec<Effect>) {
        for (session, position) in self.queue.positions() {
            self.send(
                session,
                ServerMessage::QueueStatus {
                    queued: true,
                    position: Some(position),
                },
                effects,
            );
        }
    }

    /// Finds the game and seat of an identity
    fn seated(&self, session: SessionId) -> Result<(Code, Role), Error> {
        let code = self
            .directory
            .current_game(session)
            .ok_or(Error::NotInGame)?;
        let game = self.directory.game(code).ok_or(Error::GameNotFound)?;
        let role = game.role_of(session).ok_or(Error::NotInGame)?;
        Ok((code, role))
    }

    fn make_offer(
        &mut self,
        session: SessionId,
        quantities: Option<&Value>,
        effects: &mut Vec<Effect>,
    ) -> Result<(), Error> {
        let (code, role) = self.seated(session)?;
        let game = self.directory.game_mut(code).ok_or(Error::GameNotFound)?;
        game.check_turn(role)?;
        let quantities = protocol::quantities(quantities, self.config.items.len())
            .map_err(negotiation::Error::from)?;
        let records = game.make_offer(role, &quantities, &self.config)?;
        Self::records(effects, records);
        self.send_state(code, effects);
        Ok(())
    }

    fn accept_offer(&mut self, session: SessionId, effects: &mut Vec<Effect>) -> Result<(), Error> {
        let (code, role) = self.seated(session)?;
        let game = self.directory.game_mut(code).ok_or(Error::GameNotFound)?;
        let records = game.accept_offer(role, &self.config)?;
        Self::records(effects, records);
        self.send_state(code, effects);
        self.settle_tournament(code, effects);
        Ok(())
    }

    fn walk_away(&mut self, session: SessionId, effects: &mut Vec<Effect>) -> Result<(), Error> {
        let (code, role) = self.seated(session)?;
        let game = self.directory.game_mut(code).ok_or(Error::GameNotFound)?;
        let records = game.walk_away(role, &self.config)?;
        Self::records(effects, records);
        self.send_state(code, effects);
        self.settle_tournament(code, effects);
        Ok(())
    }

    /// Credits a settled tournament game to its tournament
    fn settle_tournament(&mut self, code: Code, effects: &mut Vec<Effect>) {
        let Some(game) = self.directory.game(code) else {
            return;
        };
        let (Some(link), Some(payoffs)) = (
            game.tournament(),
            game.outcome().and_then(negotiation::Outcome::payoffs),
        ) else {
            return;
        };
        if let Some(tournament) = self.directory.tournament_mut(link.tournament) {
            let records = tournament.settle(link.match_id, payoffs);
            Self::records(effects, records);
        }
        self.announce_tournament(link.tournament, effects);
    }

    fn request_new_game(
        &mut self,
        session: SessionId,
        effects: &mut Vec<Effect>,
    ) -> Result<(), Error> {
        let (code, _) = self.seated(session)?;
        let game = self.directory.game(code).ok_or(Error::GameNotFound)?;
        if game.tournament().is_some() {
            return Err(negotiation::Error::TournamentRematch.into());
        }
        let both_present = [Role::P1, Role::P2].into_iter().all(|role| {
            game.seat(role).is_some_and(|seat| {
                self.registry.is_connected(seat.session)
                    && self.directory.current_game(seat.session) == Some(code)
            })
        });
        if !both_present {
            return Err(Error::OpponentMissing);
        }

        let game = self.directory.game_mut(code).ok_or(Error::GameNotFound)?;
        let records = game.restart(&self.config, &mut self.rng)?;
        tracing::info!(game = %code, %session, "rematch started");
        Self::records(effects, records);
        self.send_state(code, effects);
        Ok(())
    }

    fn find_tournament(&self, tournament_id: &str) -> Result<Code, Error> {
        Code::from_str(tournament_id)
            .ok()
            .filter(|code| self.directory.tournament(*code).is_some())
            .ok_or(Error::TournamentNotFound)
    }

    /// Sends the current view of a tournament to every connected player
    fn announce_tournament(&self, code: Code, effects: &mut Vec<Effect>) {
        let Some(tournament) = self.directory.tournament(code) else {
            return;
        };
        let snapshot = tournament.snapshot();
        for player in tournament.players() {
            self.send(
                player,
                ServerMessage::TournamentUpdate {
                    tournament: snapshot.clone(),
                },
                effects,
            );
        }
    }

    fn create_tournament(
        &mut self,
        session: SessionId,
        name: Option<&str>,
        effects: &mut Vec<Effect>,
    ) {
        let code = self.directory.allocate_code(&mut self.rng);
        let name = name
            .and_then(|n| registry::sanitize_name(n, constants::tournament::MAX_NAME_LENGTH))
            .unwrap_or_else(|| format!("Tournament {code}"));
        let display_name = self.display_name(session);
        let tournament = Tournament::new(code, name.clone(), session, display_name.clone());
        let snapshot = tournament.snapshot();
        self.directory.insert_tournament(tournament);
        tracing::info!(tournament = %code, %session, "tournament created");

        effects.push(Effect::Record(Record::TournamentCreated {
            tournament: code,
            name,
            creator: session,
        }));
        effects.push(Effect::Record(Record::TournamentPlayerJoined {
            tournament: code,
            session,
            display_name,
        }));
        self.send(
            session,
            ServerMessage::TournamentCreated {
                tournament: snapshot,
            },
            effects,
        );
    }

    fn join_tournament(
        &mut self,
        session: SessionId,
        tournament_id: &str,
        effects: &mut Vec<Effect>,
    ) -> Result<(), Error> {
        let code = self.find_tournament(tournament_id)?;
        let display_name = self.display_name(session);
        let tournament = self
            .directory
            .tournament_mut(code)
            .ok_or(Error::TournamentNotFound)?;
        let added = tournament.join(session, display_name.clone())?;
        let snapshot = tournament.snapshot();

        if added {
            tracing::debug!(tournament = %code, %session, "tournament joined");
            effects.push(Effect::Record(Record::TournamentPlayerJoined {
                tournament: code,
                session,
                display_name,
            }));
        }
        self.send(
            session,
            ServerMessage::TournamentJoined {
                tournament: snapshot,
            },
            effects,
        );
        if added {
            self.announce_tournament(code, effects);
        }
        Ok(())
    }

    fn start_tournament(
        &mut self,
        session: SessionId,
        tournament_id: &str,
        effects: &mut Vec<Effect>,
    ) -> Result<(), Error> {
        let code = self.find_tournament(tournament_id)?;
        let tournament = self
            .directory
            .tournament_mut(code)
            .ok_or(Error::TournamentNotFound)?;
        let records = tournament.start(session)?;
        Self::records(effects, records);
        self.announce_tournament(code, effects);
        Ok(())
    }

    fn waiting(&self, session: SessionId, code: Code, message: String, effects: &mut Vec<Effect>) {
        self.send(
            session,
            ServerMessage::TournamentWaiting {
                tournament_id: code,
                message,
            },
            effects,
        );
    }

    fn ready_for_match(
        &mut self,
        session: SessionId,
        tournament_id: &str,
        effects: &mut Vec<Effect>,
    ) -> Result<(), Error> {
        let code = self.find_tournament(tournament_id)?;
        let tournament = self
            .directory
            .tournament(code)
            .ok_or(Error::TournamentNotFound)?;
        let next = tournament.next_match(session)?.cloned();
        if self.directory.active_game(session).is_some() {
            return Err(Error::AlreadyInGame);
        }

        let Some(next) = next else {
            self.waiting(
                session,
                code,
                "You have no pending matches.".to_owned(),
                effects,
            );
            return Ok(());
        };
        let opponent = next.opponent_of(session);
        let opponent_name = self.display_name(opponent);
        if !self.registry.is_connected(opponent) {
            self.waiting(
                session,
                code,
                format!("Waiting for {opponent_name} to connect."),
                effects,
            );
            return Ok(());
        }
        if self.directory.active_game(opponent).is_some() {
            self.waiting(
                session,
                code,
                format!("{opponent_name} is still playing another game."),
                effects,
            );
            return Ok(());
        }

        let game_code = self.directory.allocate_code(&mut self.rng);
        let link = TournamentLink {
            tournament: code,
            match_id: next.id,
        };
        let names = enum_map! {
            Role::P1 => self.display_name(next.player1),
            Role::P2 => self.display_name(next.player2),
        };
        self.directory.insert_game(Negotiation::with_players(
            game_code,
            Seat::new(next.player1, names[Role::P1].clone()),
            Seat::new(next.player2, names[Role::P2].clone()),
            Some(link),
        ));
        if let Some(record) = self
            .directory
            .tournament_mut(code)
            .and_then(|t| t.activate(next.id, game_code))
        {
            effects.push(Effect::Record(record));
        }
        let mut requeued = false;
        for player in [next.player1, next.player2] {
            requeued |= self.queue.leave(player);
        }
        if requeued {
            self.announce_queue(effects);
        }
        tracing::info!(tournament = %code, match_id = %next.id, game = %game_code, "tournament match started");

        for (player, role) in [(next.player1, Role::P1), (next.player2, Role::P2)] {
            self.send(
                player,
                ServerMessage::TournamentMatchStart {
                    tournament_id: code,
                    match_id: next.id,
                    round_number: next.round_number,
                    game_id: game_code,
                    role,
                    opponent: names[role.other()].clone(),
                },
                effects,
            );
        }
        self.start_game(game_code, effects)?;
        self.announce_tournament(code, effects);
        Ok(())
    }

    fn tournament_status(
        &self,
        session: SessionId,
        tournament_id: &str,
        effects: &mut Vec<Effect>,
    ) -> Result<(), Error> {
        let code = self.find_tournament(tournament_id)?;
        let tournament = self
            .directory
            .tournament(code)
            .ok_or(Error::TournamentNotFound)?;
        self.send(
            session,
            ServerMessage::TournamentStatus {
                tournament: tournament.snapshot(),
            },
            effects,
        );
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::{cell::RefCell, collections::HashMap, rc::Rc};

    use itertools::Itertools;

    use super::*;
    use crate::{negotiation::Outcome, tournament::Status};

    fn lobby() -> Lobby {
        Lobby::with_seed(Config::default(), 17).unwrap()
    }

    fn text(message: serde_json::Value) -> String {
        message.to_string()
    }

    fn register(lobby: &mut Lobby, name: &str) -> (ConnectionId, SessionId) {
        let connection = ConnectionId::new();
        lobby.receive(
            connection,
            ClientMessage::Register {
                session_id: None,
                name: Some(name.to_owned()),
            },
        );
        (connection, lobby.registry().session_of(connection).unwrap())
    }

    fn sent_to(effects: &[Effect], connection: ConnectionId) -> Vec<&ServerMessage> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Send { to, message } if *to == connection => Some(message),
                _ => None,
            })
            .collect_vec()
    }

    fn errors_to(effects: &[Effect], connection: ConnectionId) -> Vec<String> {
        sent_to(effects, connection)
            .into_iter()
            .filter_map(|message| match message {
                ServerMessage::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect_vec()
    }

    fn records(effects: &[Effect]) -> Vec<&Record> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Record(record) => Some(record),
                _ => None,
            })
            .collect_vec()
    }

    fn game_code(lobby: &Lobby, session: SessionId) -> Code {
        lobby.directory().current_game(session).unwrap()
    }

    fn created_game(lobby: &mut Lobby) -> (ConnectionId, SessionId, ConnectionId, SessionId, Code) {
        let (c1, s1) = register(lobby, "Alice");
        let (c2, s2) = register(lobby, "Bob");
        lobby.receive(c1, ClientMessage::CreateGame { name: None });
        let code = game_code(lobby, s1);
        lobby.receive(
            c2,
            ClientMessage::JoinGame {
                game_id: Some(code.to_string().to_lowercase()),
                name: None,
            },
        );
        (c1, s1, c2, s2, code)
    }

    fn offer(lobby: &mut Lobby, connection: ConnectionId, quantities: &[i64]) -> Vec<Effect> {
        lobby.receive(
            connection,
            ClientMessage::MakeOffer {
                quantities: Some(serde_json::json!(quantities)),
            },
        )
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = Config {
            total_rounds: 0,
            ..Config::default()
        };
        assert!(Lobby::new(config).is_err());
    }

    #[test]
    fn test_register_reports_identity() {
        let mut lobby = lobby();
        let connection = ConnectionId::new();
        let effects = lobby.receive_text(
            connection,
            &text(serde_json::json!({"type": "register", "payload": {"name": " Dana "}})),
        );

        let session = lobby.registry().session_of(connection).unwrap();
        assert!(matches!(
            sent_to(&effects, connection)[..],
            [ServerMessage::Registered { session_id, display_name, created: true }]
                if *session_id == session && display_name == "Dana"
        ));
        assert!(matches!(
            records(&effects)[..],
            [Record::SessionSeen { .. }]
        ));
    }

    #[test]
    fn test_messages_before_registering_fail() {
        let mut lobby = lobby();
        let connection = ConnectionId::new();
        let effects = lobby.receive(connection, ClientMessage::JoinQueue {});
        assert_eq!(
            errors_to(&effects, connection),
            vec![Error::NotRegistered.to_string()]
        );
    }

    #[test]
    fn test_undecodable_text_reports_error() {
        let mut lobby = lobby();
        let connection = ConnectionId::new();
        let effects = lobby.receive_text(connection, "{oops");
        assert_eq!(errors_to(&effects, connection), vec!["malformed message"]);
        let effects = lobby.receive_text(connection, r#"{"type":"fly"}"#);
        assert_eq!(errors_to(&effects, connection), vec!["unknown message type"]);
    }

    #[test]
    fn test_direct_game_flow() {
        let mut lobby = lobby();
        let (c1, s1) = register(&mut lobby, "Alice");
        let (c2, s2) = register(&mut lobby, "Bob");

        let effects = lobby.receive(c1, ClientMessage::CreateGame { name: None });
        let code = game_code(&lobby, s1);
        assert!(matches!(
            sent_to(&effects, c1)[..],
            [
                ServerMessage::Lobby { status: LobbyStatus::Created, role: Role::P1, .. },
                ServerMessage::State { .. }
            ]
        ));

        let effects = lobby.receive(
            c2,
            ClientMessage::JoinGame {
                game_id: Some(format!(" {} ", code.to_string().to_lowercase())),
                name: Some("Bobby".to_owned()),
            },
        );
        assert_eq!(game_code(&lobby, s2), code);
        assert!(
            sent_to(&effects, c1)
                .iter()
                .any(|m| matches!(m, ServerMessage::Lobby { status: LobbyStatus::OpponentJoined, message, .. } if message.starts_with("Bobby")))
        );
        assert!(
            records(&effects)
                .iter()
                .any(|r| matches!(r, Record::GameStart { .. }))
        );
        let game = lobby.directory().game(code).unwrap();
        assert_eq!(game.turn(), Some(Role::P1));
        assert_eq!(game.seat(Role::P2).unwrap().name, "Bobby");

        offer(&mut lobby, c1, &[7, 4, 1]);
        let effects = lobby.receive(c2, ClientMessage::AcceptOffer {});
        assert!(
            records(&effects)
                .iter()
                .any(|r| matches!(r, Record::GameOutcome { outcome: Outcome::Deal { round: 1, .. }, .. }))
        );
        for connection in [c1, c2] {
            assert!(sent_to(&effects, connection).iter().any(|m| matches!(
                m,
                ServerMessage::State { state, opponent: Some(_), .. } if state.finished
            )));
        }
    }

    #[test]
    fn test_join_errors() {
        let mut lobby = lobby();
        let (c1, _, c2, _, code) = created_game(&mut lobby);
        let (c3, _) = register(&mut lobby, "Carol");

        let effects = lobby.receive(
            c3,
            ClientMessage::JoinGame {
                game_id: Some("ZZZZ".to_owned()),
                name: None,
            },
        );
        assert_eq!(
            errors_to(&effects, c3),
            vec![Error::GameNotFound.to_string()]
        );

        let effects = lobby.receive(
            c3,
            ClientMessage::JoinGame {
                game_id: None,
                name: None,
            },
        );
        assert_eq!(
            errors_to(&effects, c3),
            vec![Error::GameNotFound.to_string()]
        );

        let effects = lobby.receive(
            c3,
            ClientMessage::JoinGame {
                game_id: Some(code.to_string()),
                name: None,
            },
        );
        assert_eq!(errors_to(&effects, c3), vec![Error::GameFull.to_string()]);

        let effects = lobby.receive(c1, ClientMessage::CreateGame { name: None });
        assert_eq!(
            errors_to(&effects, c1),
            vec![Error::AlreadyInGame.to_string()]
        );
        let effects = lobby.receive(c2, ClientMessage::JoinQueue {});
        assert_eq!(
            errors_to(&effects, c2),
            vec![Error::AlreadyInGame.to_string()]
        );
    }

    #[test]
    fn test_turn_errors_leave_game_untouched() {
        let mut lobby = lobby();
        let (c1, _, c2, _, code) = created_game(&mut lobby);

        let effects = offer(&mut lobby, c2, &[1, 1, 1]);
        assert_eq!(
            errors_to(&effects, c2),
            vec!["it is not your turn to act"]
        );
        let effects = offer(&mut lobby, c2, &[99]);
        assert_eq!(
            errors_to(&effects, c2),
            vec!["it is not your turn to act"]
        );
        let effects = lobby.receive(c1, ClientMessage::AcceptOffer {});
        assert_eq!(
            errors_to(&effects, c1),
            vec!["there is no offer for you to accept"]
        );
        let effects = offer(&mut lobby, c1, &[1, 1]);
        assert_eq!(
            errors_to(&effects, c1),
            vec!["offer must include all item quantities"]
        );
        let effects = lobby.receive(
            c1,
            ClientMessage::MakeOffer {
                quantities: Some(serde_json::json!([1, 0.5, 0])),
            },
        );
        assert_eq!(
            errors_to(&effects, c1),
            vec!["quantities must be whole numbers greater than or equal to zero"]
        );
        let effects = offer(&mut lobby, c1, &[1, 5, 0]);
        assert_eq!(
            errors_to(&effects, c1),
            vec!["quantities cannot exceed the available total of an item"]
        );

        let game = lobby.directory().game(code).unwrap();
        assert_eq!(game.turn(), Some(Role::P1));
        assert!(game.current_offer().is_none());
        assert_eq!(game.history().count(), 0);
    }

    #[test]
    fn test_actions_outside_game_fail() {
        let mut lobby = lobby();
        let (c1, _) = register(&mut lobby, "Loner");
        for message in [
            ClientMessage::AcceptOffer {},
            ClientMessage::WalkAway {},
            ClientMessage::RequestNewGame {},
        ] {
            let effects = lobby.receive(c1, message);
            assert_eq!(
                errors_to(&effects, c1),
                vec![Error::NotInGame.to_string()]
            );
        }
    }

    #[test]
    fn test_finished_game_rejects_actions_and_allows_rematch() {
        let mut lobby = lobby();
        let (c1, _, c2, _, code) = created_game(&mut lobby);
        lobby.receive(c1, ClientMessage::WalkAway {});

        let effects = lobby.receive(c2, ClientMessage::WalkAway {});
        assert_eq!(
            errors_to(&effects, c2),
            vec!["the game is already finished"]
        );

        let effects = lobby.receive(c2, ClientMessage::RequestNewGame {});
        assert!(errors_to(&effects, c2).is_empty());
        let game = lobby.directory().game(code).unwrap();
        assert!(!game.is_finished());
        assert_eq!(game.turn(), Some(Role::P1));
    }

    #[test]
    fn test_rematch_needs_both_connected() {
        let mut lobby = lobby();
        let (c1, s1) = register(&mut lobby, "Alice");
        lobby.receive(c1, ClientMessage::CreateGame { name: None });
        let effects = lobby.receive(c1, ClientMessage::RequestNewGame {});
        assert_eq!(
            errors_to(&effects, c1),
            vec![Error::OpponentMissing.to_string()]
        );
        assert!(lobby.directory().game(game_code(&lobby, s1)).is_some());
    }

    #[test]
    fn test_rematch_refused_after_opponent_moves_on() {
        let mut lobby = lobby();
        let (c1, s1, c2, _, old) = created_game(&mut lobby);
        lobby.receive(c1, ClientMessage::WalkAway {});
        lobby.receive(c1, ClientMessage::CreateGame { name: None });
        let new = game_code(&lobby, s1);
        assert_ne!(new, old);

        let effects = lobby.receive(c2, ClientMessage::RequestNewGame {});
        assert_eq!(
            errors_to(&effects, c2),
            vec![Error::OpponentMissing.to_string()]
        );
        assert!(records(&effects).is_empty());
        let game = lobby.directory().game(old).unwrap();
        assert!(game.is_finished());
        assert_eq!(game.turn(), None);

        let effects = lobby.receive(c1, ClientMessage::WalkAway {});
        assert_eq!(
            errors_to(&effects, c1),
            vec![negotiation::Error::NotYourTurn.to_string()]
        );
        assert_eq!(game_code(&lobby, s1), new);
        assert!(lobby.directory().game(old).unwrap().is_finished());
    }

    #[test]
    fn test_queue_pairs_in_arrival_order() {
        let mut lobby = lobby();
        let (cx, sx) = register(&mut lobby, "X");
        let (cy, sy) = register(&mut lobby, "Y");

        let effects = lobby.receive(cx, ClientMessage::JoinQueue {});
        assert_eq!(
            sent_to(&effects, cx),
            vec![&ServerMessage::QueueStatus {
                queued: true,
                position: Some(1)
            }]
        );

        let effects = lobby.receive(cy, ClientMessage::JoinQueue {});
        assert!(lobby.queue().is_empty());
        let code = game_code(&lobby, sx);
        assert_eq!(game_code(&lobby, sy), code);

        let game = lobby.directory().game(code).unwrap();
        assert_eq!(game.seat(Role::P1).unwrap().session, sx);
        assert_eq!(game.turn(), Some(Role::P1));
        assert!(sent_to(&effects, cx).iter().any(|m| matches!(
            m,
            ServerMessage::MatchFound { role: Role::P1, opponent, .. } if opponent == "Y"
        )));
        assert!(sent_to(&effects, cy).iter().any(|m| matches!(
            m,
            ServerMessage::MatchFound { role: Role::P2, opponent, .. } if opponent == "X"
        )));
    }

    #[test]
    fn test_queue_renumbers_after_leave() {
        let mut lobby = lobby();
        let (ca, _) = register(&mut lobby, "A");
        let (cb, _) = register(&mut lobby, "B");
        let (cc, sc) = register(&mut lobby, "C");

        lobby.receive(ca, ClientMessage::JoinQueue {});
        lobby.receive(ca, ClientMessage::LeaveQueue {});
        lobby.receive(cb, ClientMessage::JoinQueue {});
        lobby.receive(ca, ClientMessage::JoinQueue {});
        assert!(lobby.queue().is_empty());

        lobby.receive(cc, ClientMessage::JoinQueue {});
        assert_eq!(lobby.queue().position(sc), Some(1));

        let (cd, sd) = register(&mut lobby, "D");
        lobby.receive(cd, ClientMessage::JoinQueue {});
        assert!(lobby.queue().is_empty());
        assert_eq!(game_code(&lobby, sc), game_code(&lobby, sd));
    }

    #[test]
    fn test_other_paths_leave_queue() {
        let mut lobby = lobby();
        let (ca, sa) = register(&mut lobby, "A");
        let (cb, sb) = register(&mut lobby, "B");

        lobby.receive(ca, ClientMessage::JoinQueue {});
        lobby.receive(ca, ClientMessage::CreateGame { name: None });
        assert_eq!(lobby.queue().position(sa), None);

        let effects = lobby.receive(cb, ClientMessage::JoinQueue {});
        assert_eq!(
            sent_to(&effects, cb),
            vec![&ServerMessage::QueueStatus {
                queued: true,
                position: Some(1)
            }]
        );
        let effects = lobby.receive(cb, ClientMessage::JoinQueue {});
        assert_eq!(lobby.queue().len(), 1);
        assert_eq!(
            sent_to(&effects, cb),
            vec![&ServerMessage::QueueStatus {
                queued: true,
                position: Some(1)
            }]
        );

        let effects = lobby.receive(cb, ClientMessage::LeaveQueue {});
        assert_eq!(
            sent_to(&effects, cb),
            vec![&ServerMessage::QueueStatus {
                queued: false,
                position: None
            }]
        );

        lobby.receive(cb, ClientMessage::JoinQueue {});
        lobby.disconnect(cb);
        assert_eq!(lobby.queue().position(sb), None);
        assert!(lobby.queue().is_empty());
    }

    #[test]
    fn test_disconnect_ends_game_and_notifies_opponent() {
        let mut lobby = lobby();
        let (c1, _, c2, s2, code) = created_game(&mut lobby);

        let effects = lobby.disconnect(c1);

        assert!(lobby.directory().game(code).is_none());
        assert_eq!(lobby.directory().current_game(s2), None);
        let to_opponent = sent_to(&effects, c2);
        assert!(matches!(
            to_opponent[0],
            ServerMessage::OpponentLeft { message } if message == "Player 1 disconnected. The match has ended."
        ));
        assert!(matches!(
            to_opponent[1],
            ServerMessage::State { state, .. }
                if matches!(state.outcome, Some(Outcome::Disconnect { by: Role::P1, round: 1 }))
        ));
        assert!(
            records(&effects)
                .iter()
                .any(|r| matches!(r, Record::GameOutcome { outcome: Outcome::Disconnect { .. }, .. }))
        );
    }

    #[test]
    fn test_disconnect_without_live_opponent_just_removes() {
        let mut lobby = lobby();
        let (c1, s1) = register(&mut lobby, "Alice");
        lobby.receive(c1, ClientMessage::CreateGame { name: None });
        let code = game_code(&lobby, s1);

        let effects = lobby.disconnect(c1);

        assert!(effects.is_empty());
        assert!(lobby.directory().game(code).is_none());
    }

    #[test]
    fn test_reconnect_keeps_identity() {
        let mut lobby = lobby();
        let (c1, s1) = register(&mut lobby, "Alice");
        lobby.disconnect(c1);

        let c2 = ConnectionId::new();
        let effects = lobby.receive(
            c2,
            ClientMessage::Register {
                session_id: Some(s1.to_string()),
                name: None,
            },
        );
        assert!(matches!(
            sent_to(&effects, c2)[..],
            [ServerMessage::Registered { session_id, created: false, .. }] if *session_id == s1
        ));
        assert_eq!(lobby.registry().session_of(c2), Some(s1));
    }

    #[test]
    fn test_superseded_connection_closing_keeps_game() {
        let mut lobby = lobby();
        let (c1, s1, _, _, code) = created_game(&mut lobby);
        let replacement = ConnectionId::new();
        let effects = lobby.receive(
            replacement,
            ClientMessage::Register {
                session_id: Some(s1.to_string()),
                name: None,
            },
        );
        assert!(
            sent_to(&effects, replacement)
                .iter()
                .any(|m| matches!(m, ServerMessage::State { .. }))
        );

        let effects = lobby.disconnect(c1);
        assert!(effects.is_empty());
        assert!(lobby.directory().game(code).is_some());
    }

    fn tournament(lobby: &mut Lobby, players: usize) -> (Vec<(ConnectionId, SessionId)>, Code) {
        let seats = (0..players)
            .map(|i| register(lobby, &format!("T{i}")))
            .collect_vec();
        let creator = seats[0].0;
        let effects = lobby.receive(
            creator,
            ClientMessage::CreateTournament {
                name: Some("Cup".to_owned()),
            },
        );
        let code = sent_to(&effects, creator)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::TournamentCreated { tournament } => Some(tournament.id),
                _ => None,
            })
            .unwrap();
        for (connection, _) in seats.iter().skip(1) {
            lobby.receive(
                *connection,
                ClientMessage::JoinTournament {
                    tournament_id: code.to_string(),
                },
            );
        }
        (seats, code)
    }

    #[test]
    fn test_tournament_creation_defaults_name() {
        let mut lobby = lobby();
        let (c1, s1) = register(&mut lobby, "Host");
        let effects = lobby.receive(c1, ClientMessage::CreateTournament { name: Some("  ".to_owned()) });

        let snapshot = sent_to(&effects, c1)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::TournamentCreated { tournament } => Some(tournament.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(snapshot.name, format!("Tournament {}", snapshot.id));
        assert_eq!(snapshot.creator, s1);
        assert_eq!(snapshot.status, Status::Pending);
        assert_eq!(snapshot.standings.len(), 1);
        assert!(matches!(
            records(&effects)[..],
            [Record::TournamentCreated { .. }, Record::TournamentPlayerJoined { .. }]
        ));
    }

    #[test]
    fn test_tournament_errors() {
        let mut lobby = lobby();
        let (seats, code) = tournament(&mut lobby, 3);
        let id = code.to_string();

        let effects = lobby.receive(
            seats[1].0,
            ClientMessage::StartTournament {
                tournament_id: id.clone(),
            },
        );
        assert_eq!(
            errors_to(&effects, seats[1].0),
            vec![tournament::Error::NotCreator.to_string()]
        );

        let effects = lobby.receive(
            seats[0].0,
            ClientMessage::StartTournament {
                tournament_id: id.clone(),
            },
        );
        assert_eq!(
            errors_to(&effects, seats[0].0),
            vec![tournament::Error::OddPlayerCount.to_string()]
        );

        let effects = lobby.receive(
            seats[0].0,
            ClientMessage::ReadyForMatch {
                tournament_id: id.clone(),
            },
        );
        assert_eq!(
            errors_to(&effects, seats[0].0),
            vec![tournament::Error::NotActive.to_string()]
        );

        let effects = lobby.receive(
            seats[0].0,
            ClientMessage::JoinTournament {
                tournament_id: "QQQQ".to_owned(),
            },
        );
        assert_eq!(
            errors_to(&effects, seats[0].0),
            vec![Error::TournamentNotFound.to_string()]
        );
    }

    /// Plays every match of a tournament, each ending with the first mover walking away
    #[test]
    fn test_four_player_tournament_completes() {
        let mut lobby = lobby();
        let (seats, code) = tournament(&mut lobby, 4);
        let id = code.to_string();
        let connections: HashMap<SessionId, ConnectionId> =
            seats.iter().map(|(c, s)| (*s, *c)).collect();

        let effects = lobby.receive(
            seats[0].0,
            ClientMessage::StartTournament {
                tournament_id: id.clone(),
            },
        );
        assert_eq!(
            records(&effects)
                .iter()
                .filter(|r| matches!(r, Record::MatchScheduled { .. }))
                .count(),
            6
        );
        assert_eq!(
            lobby.directory().tournament(code).unwrap().matches().len(),
            6
        );

        for _ in 0..6 {
            let next = lobby
                .directory()
                .tournament(code)
                .unwrap()
                .matches()
                .iter()
                .find(|m| m.status == Status::Pending)
                .unwrap()
                .clone();
            let c1 = connections[&next.player1];
            let effects = lobby.receive(
                c1,
                ClientMessage::ReadyForMatch {
                    tournament_id: id.clone(),
                },
            );
            assert!(errors_to(&effects, c1).is_empty());
            assert!(sent_to(&effects, c1).iter().any(|m| matches!(
                m,
                ServerMessage::TournamentMatchStart { role: Role::P1, .. }
            )));

            let game = lobby.directory().active_game(next.player1).unwrap();
            assert_eq!(game.tournament().unwrap().match_id, next.id);
            lobby.receive(c1, ClientMessage::WalkAway {});

            let effects = lobby.receive(c1, ClientMessage::RequestNewGame {});
            assert_eq!(
                errors_to(&effects, c1),
                vec![negotiation::Error::TournamentRematch.to_string()]
            );
        }

        let tournament = lobby.directory().tournament(code).unwrap();
        assert_eq!(tournament.status(), Status::Completed);
        for (_, session) in &seats {
            assert_eq!(
                tournament.standings().get(*session).unwrap().games_played,
                3
            );
        }

        let effects = lobby.receive(
            seats[2].0,
            ClientMessage::ReadyForMatch {
                tournament_id: id.clone(),
            },
        );
        assert_eq!(
            errors_to(&effects, seats[2].0),
            vec![tournament::Error::NotActive.to_string()]
        );
    }

    #[test]
    fn test_ready_waits_for_disconnected_opponent() {
        let mut lobby = lobby();
        let (seats, code) = tournament(&mut lobby, 2);
        let id = code.to_string();
        lobby.receive(
            seats[0].0,
            ClientMessage::StartTournament {
                tournament_id: id.clone(),
            },
        );
        lobby.disconnect(seats[1].0);

        let effects = lobby.receive(
            seats[0].0,
            ClientMessage::ReadyForMatch {
                tournament_id: id.clone(),
            },
        );
        assert!(matches!(
            sent_to(&effects, seats[0].0)[..],
            [ServerMessage::TournamentWaiting { .. }]
        ));
        assert!(lobby.directory().active_game(seats[0].1).is_none());
    }

    #[test]
    fn test_disconnect_reopens_tournament_match() {
        let mut lobby = lobby();
        let (seats, code) = tournament(&mut lobby, 2);
        let id = code.to_string();
        lobby.receive(
            seats[0].0,
            ClientMessage::StartTournament {
                tournament_id: id.clone(),
            },
        );
        lobby.receive(
            seats[0].0,
            ClientMessage::ReadyForMatch {
                tournament_id: id.clone(),
            },
        );
        let game = game_code(&lobby, seats[0].1);

        lobby.disconnect(seats[1].0);

        assert!(lobby.directory().game(game).is_none());
        let m = lobby
            .directory()
            .tournament(code)
            .unwrap()
            .get_match(tournament::MatchId(0))
            .unwrap();
        assert_eq!(m.status, Status::Pending);
        assert_eq!(m.game_id, None);

        let reconnect = ConnectionId::new();
        lobby.receive(
            reconnect,
            ClientMessage::Register {
                session_id: Some(seats[1].1.to_string()),
                name: None,
            },
        );
        let effects = lobby.receive(
            reconnect,
            ClientMessage::ReadyForMatch {
                tournament_id: id.clone(),
            },
        );
        assert!(errors_to(&effects, reconnect).is_empty());
        assert!(lobby.directory().active_game(seats[1].1).is_some());
    }

    #[test]
    fn test_tournament_status_for_anyone() {
        let mut lobby = lobby();
        let (_, code) = tournament(&mut lobby, 2);
        let (outsider, _) = register(&mut lobby, "Outsider");
        let effects = lobby.receive(
            outsider,
            ClientMessage::TournamentStatus {
                tournament_id: code.to_string().to_lowercase(),
            },
        );
        assert!(matches!(
            sent_to(&effects, outsider)[..],
            [ServerMessage::TournamentStatus { tournament }] if tournament.standings.len() == 2
        ));
    }

    #[test]
    fn test_shutdown_notifies_and_closes() {
        let mut lobby = lobby();
        let (c1, _) = register(&mut lobby, "A");
        let (c2, _) = register(&mut lobby, "B");

        let effects = lobby.shutdown();

        for connection in [c1, c2] {
            assert!(matches!(
                sent_to(&effects, connection)[..],
                [ServerMessage::ServerShutdown { .. }]
            ));
            assert!(effects.contains(&Effect::Close(connection)));
        }
    }

    #[derive(Clone, Default)]
    struct MockTunnel {
        messages: Rc<RefCell<Vec<ServerMessage>>>,
        closed: Rc<RefCell<bool>>,
    }

    impl Tunnel for MockTunnel {
        fn send_message(&self, message: &ServerMessage) {
            self.messages.borrow_mut().push(message.clone());
        }

        fn close(self) {
            *self.closed.borrow_mut() = true;
        }
    }

    #[derive(Default)]
    struct MockRecorder {
        records: RefCell<Vec<Record>>,
    }

    impl Recorder for MockRecorder {
        fn record(&self, record: &Record) -> Result<(), record::Error> {
            self.records.borrow_mut().push(record.clone());
            Ok(())
        }
    }

    #[test]
    fn test_deliver_routes_effects() {
        let mut lobby = lobby();
        let tunnel = MockTunnel::default();
        let recorder = MockRecorder::default();
        let connection = ConnectionId::new();

        let effects = lobby.receive(
            connection,
            ClientMessage::Register {
                session_id: None,
                name: Some("Eve".to_owned()),
            },
        );
        deliver(
            effects,
            |id| (id == connection).then(|| tunnel.clone()),
            &recorder,
        );
        assert!(matches!(
            tunnel.messages.borrow()[..],
            [ServerMessage::Registered { .. }]
        ));
        assert_eq!(recorder.records.borrow().len(), 1);

        deliver(
            lobby.shutdown(),
            |id| (id == connection).then(|| tunnel.clone()),
            &recorder,
        );
        assert!(*tunnel.closed.borrow());
        assert_eq!(tunnel.messages.borrow().len(), 2);
    }

    #[test]
    fn test_deliver_drops_unknown_connections() {
        let recorder = MockRecorder::default();
        deliver(
            vec![Effect::Send {
                to: ConnectionId::new(),
                message: ServerMessage::OpponentLeft {
                    message: String::new(),
                },
            }],
            |_| None::<MockTunnel>,
            &recorder,
        );
        assert!(recorder.records.borrow().is_empty());
    }
}

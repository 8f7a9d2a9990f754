//! In-memory directory of games and tournaments
//!
//! Games and tournaments are keyed by a [`Code`] unique across both kinds.
//! The directory also remembers which game each identity currently sits in,
//! so turn actions can be routed without the client naming the game.

use std::collections::HashMap;

use crate::{
    code::Code, negotiation::Negotiation, offer::Role, registry::SessionId,
    tournament::Tournament,
};

/// Registry of live games and tournaments
#[derive(Debug, Default)]
pub struct Directory {
    games: HashMap<Code, Negotiation>,
    tournaments: HashMap<Code, Tournament>,
    /// Game each identity is currently seated in
    current_game: HashMap<SessionId, Code>,
}

impl Directory {
    /// Draws a code used by neither a game nor a tournament
    pub fn allocate_code(&self, rng: &mut fastrand::Rng) -> Code {
        Code::unique(rng, |code| {
            self.games.contains_key(code) || self.tournaments.contains_key(code)
        })
    }

    /// Adds a game and seats its occupants in it
    pub fn insert_game(&mut self, game: Negotiation) -> Code {
        let code = game.id();
        let seated = [Role::P1, Role::P2]
            .into_iter()
            .filter_map(|role| game.seat(role).map(|s| s.session))
            .collect::<Vec<_>>();
        self.games.insert(code, game);
        for session in seated {
            self.bind(session, code);
        }
        code
    }

    /// Looks up a game
    pub fn game(&self, code: Code) -> Option<&Negotiation> {
        self.games.get(&code)
    }

    /// Looks up a game for mutation
    pub fn game_mut(&mut self, code: Code) -> Option<&mut Negotiation> {
        self.games.get_mut(&code)
    }

    /// Removes a game, unseating everyone still bound to it
    pub fn remove_game(&mut self, code: Code) -> Option<Negotiation> {
        self.current_game.retain(|_, bound| *bound != code);
        self.games.remove(&code)
    }

    /// Records that `session` now sits in `code`
    ///
    /// The game the identity sat in before is dropped once it is finished
    /// and nobody else is bound to it.
    pub fn bind(&mut self, session: SessionId, code: Code) {
        if let Some(previous) = self.current_game.insert(session, code) {
            if previous != code {
                self.prune(previous);
            }
        }
    }

    fn prune(&mut self, code: Code) {
        let finished = self.games.get(&code).is_some_and(Negotiation::is_finished);
        let bound = self.current_game.values().any(|bound| *bound == code);
        if finished && !bound {
            self.games.remove(&code);
            tracing::debug!(game = %code, "finished game pruned");
        }
    }

    /// Game `session` currently sits in
    pub fn current_game(&self, session: SessionId) -> Option<Code> {
        self.current_game.get(&session).copied()
    }

    /// Game `session` sits in, if it has not finished
    pub fn active_game(&self, session: SessionId) -> Option<&Negotiation> {
        self.current_game(session)
            .and_then(|code| self.games.get(&code))
            .filter(|game| !game.is_finished())
    }

    /// Adds a tournament
    pub fn insert_tournament(&mut self, tournament: Tournament) -> Code {
        let code = tournament.id();
        self.tournaments.insert(code, tournament);
        code
    }

    /// Looks up a tournament
    pub fn tournament(&self, code: Code) -> Option<&Tournament> {
        self.tournaments.get(&code)
    }

    /// Looks up a tournament for mutation
    pub fn tournament_mut(&mut self, code: Code) -> Option<&mut Tournament> {
        self.tournaments.get_mut(&code)
    }

    /// Number of live games
    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    /// Number of tournaments
    pub fn tournament_count(&self) -> usize {
        self.tournaments.len()
    }
}

//! Tournament standings
//!
//! Standings accumulate the discounted payoff every participant earned over
//! the matches they completed. Participants are kept in join order, which
//! is also the tie-break when ranking.

use itertools::Itertools;
use serde::Serialize;

use crate::registry::SessionId;

/// One participant's running totals
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    /// The participant
    pub session: SessionId,
    /// Name shown in standings
    pub display_name: String,
    /// Sum of discounted payoffs over completed matches
    pub cumulative_payoff: f64,
    /// Number of completed matches
    pub games_played: u32,
}

/// A ranked row of the standings table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranked {
    /// Position in the table (1-indexed)
    pub position: usize,
    /// The participant's totals
    #[serde(flatten)]
    pub standing: Standing,
}

/// Cumulative results of every participant
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Standings {
    /// In join order
    entries: Vec<Standing>,
}

impl Standings {
    /// Adds a participant with zero totals
    ///
    /// # Returns
    ///
    /// `false` if the participant was already present
    pub fn add(&mut self, session: SessionId, display_name: String) -> bool {
        if self.contains(session) {
            return false;
        }
        self.entries.push(Standing {
            session,
            display_name,
            cumulative_payoff: 0.,
            games_played: 0,
        });
        true
    }

    /// Whether `session` participates
    pub fn contains(&self, session: SessionId) -> bool {
        self.entries.iter().any(|s| s.session == session)
    }

    /// Number of participants
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no participants
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Participants in join order
    pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.entries.iter().map(|s| s.session)
    }

    /// Totals of one participant
    pub fn get(&self, session: SessionId) -> Option<&Standing> {
        self.entries.iter().find(|s| s.session == session)
    }

    /// Credits a completed match to a participant
    pub fn credit(&mut self, session: SessionId, payoff: f64) {
        if let Some(standing) = self.entries.iter_mut().find(|s| s.session == session) {
            standing.cumulative_payoff += payoff;
            standing.games_played += 1;
        }
    }

    /// Ranks participants by cumulative payoff, highest first
    ///
    /// Equal payoffs keep join order.
    pub fn ranked(&self) -> Vec<Ranked> {
        self.entries
            .iter()
            .sorted_by(|a, b| b.cumulative_payoff.total_cmp(&a.cumulative_payoff))
            .enumerate()
            .map(|(i, standing)| Ranked {
                position: i + 1,
                standing: standing.clone(),
            })
            .collect_vec()
    }
}

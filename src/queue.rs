//! Quick-match queue
//!
//! Identities waiting for an anonymous opponent are kept in arrival order.
//! Whenever two or more are waiting, the two who waited longest are paired,
//! the earlier one taking the first seat.

use std::collections::VecDeque;

use serde::Serialize;
use web_time::SystemTime;

use crate::registry::SessionId;

/// A waiting identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// The identity waiting
    pub session: SessionId,
    /// When it joined the queue
    pub joined_at: SystemTime,
}

/// FIFO of identities waiting for a quick match
#[derive(Debug, Default)]
pub struct Queue {
    entries: VecDeque<Entry>,
}

impl Queue {
    /// Enqueues an identity
    ///
    /// Joining while already queued keeps the original place.
    ///
    /// # Returns
    ///
    /// The identity's 1-indexed position
    pub fn join(&mut self, session: SessionId) -> usize {
        if let Some(position) = self.position(session) {
            return position;
        }
        self.entries.push_back(Entry {
            session,
            joined_at: SystemTime::now(),
        });
        self.entries.len()
    }

    /// Removes an identity, if queued
    ///
    /// # Returns
    ///
    /// Whether the identity was queued
    pub fn leave(&mut self, session: SessionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.session != session);
        self.entries.len() != before
    }

    /// Dequeues the two longest-waiting identities, oldest first
    pub fn pair(&mut self) -> Option<(SessionId, SessionId)> {
        if self.entries.len() < 2 {
            return None;
        }
        let first = self.entries.pop_front()?;
        let second = self.entries.pop_front()?;
        Some((first.session, second.session))
    }

    /// 1-indexed position of an identity
    pub fn position(&self, session: SessionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.session == session)
            .map(|i| i + 1)
    }

    /// Every waiting identity with its 1-indexed position
    pub fn positions(&self) -> impl Iterator<Item = (SessionId, usize)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.session, i + 1))
    }

    /// Number of waiting identities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is waiting
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

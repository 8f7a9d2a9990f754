//! Offers and the shares they imply
//!
//! An offer names the units of each item the offerer hands *to* the
//! recipient; the offerer implicitly keeps the rest. The functions here are
//! pure and are used both for settlement and for the per-action facts
//! recorded for analysis.

use std::fmt::Display;

use enum_map::{Enum, EnumMap, enum_map};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Item;

/// One of the two negotiating seats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum Role {
    /// The seat filled first (game creator, earlier queue entry, first
    /// scheduled player)
    P1,
    /// The seat filled second
    P2,
}

impl Role {
    /// Returns the opposite seat
    pub fn other(self) -> Self {
        match self {
            Self::P1 => Self::P2,
            Self::P2 => Self::P1,
        }
    }

    /// Human readable label used in history entries
    pub fn label(self) -> &'static str {
        match self {
            Self::P1 => "Player 1",
            Self::P2 => "Player 2",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::P1 => "P1",
            Self::P2 => "P2",
        })
    }
}

/// Reasons a proposed offer is rejected
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidOffer {
    /// The offer does not list a quantity for every item
    #[error("offer must include all item quantities")]
    Length,
    /// A quantity is negative or not a whole number
    #[error("quantities must be whole numbers greater than or equal to zero")]
    NotWhole,
    /// A quantity is larger than the item total
    #[error("quantities cannot exceed the available total of an item")]
    ExceedsTotal,
}

/// A pending proposal from one seat to the other
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// The proposing seat
    pub from: Role,
    /// The seat that must respond
    pub to: Role,
    /// Units of each item handed to `to`
    pub quantities: Vec<u32>,
}

impl Offer {
    /// Validates raw quantities against the catalog and builds an offer
    ///
    /// # Errors
    ///
    /// * [`InvalidOffer::Length`] - wrong number of quantities
    /// * [`InvalidOffer::NotWhole`] - a negative quantity
    /// * [`InvalidOffer::ExceedsTotal`] - a quantity above its item total
    pub fn new(from: Role, quantities: &[i64], items: &[Item]) -> Result<Self, InvalidOffer> {
        if quantities.len() != items.len() {
            return Err(InvalidOffer::Length);
        }
        let quantities = quantities
            .iter()
            .map(|q| u32::try_from(*q).map_err(|_| InvalidOffer::NotWhole))
            .collect::<Result<Vec<_>, _>>()?;
        if quantities
            .iter()
            .zip(items)
            .any(|(q, item)| *q > item.total)
        {
            return Err(InvalidOffer::ExceedsTotal);
        }
        Ok(Self {
            from,
            to: from.other(),
            quantities,
        })
    }

    /// Computes the share each seat would hold if this offer were accepted
    ///
    /// The recipient receives the literal quantities and the offerer keeps
    /// the remainder of every item total.
    pub fn shares(&self, totals: &[u32]) -> EnumMap<Role, Vec<u32>> {
        let kept = totals
            .iter()
            .zip(&self.quantities)
            .map(|(total, q)| total.saturating_sub(*q))
            .collect_vec();
        let mut shares = enum_map! { _ => Vec::new() };
        shares[self.to] = self.quantities.clone();
        shares[self.from] = kept;
        shares
    }

    /// Formats the offer for a history entry
    pub fn describe(&self, items: &[Item]) -> String {
        format!(
            "{} offers {} to {}.",
            self.from.label(),
            self.quantities
                .iter()
                .zip(items)
                .map(|(q, item)| format!("{q} × {}", item.name))
                .join(", "),
            self.to.label()
        )
    }
}

/// Undiscounted value of holding `share` for a party with `values`
pub fn value(share: &[u32], values: &[u32]) -> u64 {
    share
        .iter()
        .zip(values)
        .map(|(q, v)| u64::from(*q) * u64::from(*v))
        .sum()
}

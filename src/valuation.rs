//! Private valuations
//!
//! Every party privately values each item and holds an outside option: the
//! payoff it receives if no deal is made. Both are drawn fresh at the start
//! of every match.

use serde::Serialize;

use crate::{config::Config, offer};

/// A party's private information for one match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Valuation {
    /// Value of one unit of each item
    pub values: Vec<u32>,
    /// Payoff when walking away
    pub outside: u32,
}

impl Valuation {
    /// Draws a valuation for one party
    ///
    /// Each item value is uniform over the configured value range. The
    /// outside option is uniform between the configured floor and the
    /// party's value of the whole catalog, so it never exceeds what a
    /// deal could achieve (unless the catalog is worth less than the floor).
    pub fn draw(config: &Config, rng: &mut fastrand::Rng) -> Self {
        let values: Vec<u32> = config
            .items
            .iter()
            .map(|_| rng.u32(config.value_range.min..=config.value_range.max))
            .collect();
        let total = u32::try_from(offer::value(&config.totals(), &values)).unwrap_or(u32::MAX);
        let outside = rng.u32(config.min_outside..=total.max(config.min_outside));
        Self { values, outside }
    }

    /// Value of the whole catalog to this party
    pub fn total_value(&self, totals: &[u32]) -> u64 {
        offer::value(totals, &self.values)
    }
}

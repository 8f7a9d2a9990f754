//! Runtime configuration for negotiations
//!
//! The configuration fixes the item catalog, the round structure and the
//! ranges private valuations are drawn from. It is deserialized from the
//! host process and validated with `garde` before a lobby accepts it.

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::constants;

/// A kind of good being bargained over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Item {
    /// Display name of the item
    #[garde(length(min = 1, max = 40))]
    pub name: String,
    /// Number of indivisible units available
    #[garde(range(max = constants::negotiation::MAX_ITEM_TOTAL))]
    pub total: u32,
}

/// Inclusive range of per-item private values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    /// Smallest value (inclusive)
    pub min: u32,
    /// Largest value (inclusive)
    pub max: u32,
}

fn validate_value_range(val: &ValueRange, _ctx: &()) -> garde::Result {
    if val.min <= val.max {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "empty value range [{},{}]",
            val.min, val.max
        )))
    }
}

fn validate_discount(val: &f64, _ctx: &()) -> garde::Result {
    if *val > 0. && *val <= 1. {
        Ok(())
    } else {
        Err(garde::Error::new("discount must be within (0,1]".to_owned()))
    }
}

/// Configuration shared by every game in a lobby
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Item catalog, fixed for the lifetime of the process
    #[garde(length(min = 1, max = constants::negotiation::MAX_ITEM_COUNT), dive)]
    pub items: Vec<Item>,
    /// Round cap for the round counter
    #[garde(range(min = 1, max = constants::negotiation::MAX_TOTAL_ROUNDS))]
    pub total_rounds: u32,
    /// Per-round discount factor
    #[garde(custom(validate_discount))]
    pub discount: f64,
    /// Range private item values are drawn from
    #[garde(custom(validate_value_range))]
    pub value_range: ValueRange,
    /// Floor of the outside option
    #[garde(skip)]
    pub min_outside: u32,
    /// Number of history entries kept per game
    #[garde(range(min = 1))]
    pub history_limit: usize,
    /// Maximum display name length in characters
    #[garde(range(min = 1))]
    pub max_name_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            items: constants::negotiation::ITEMS
                .iter()
                .map(|(name, total)| Item {
                    name: (*name).to_owned(),
                    total: *total,
                })
                .collect(),
            total_rounds: constants::negotiation::TOTAL_ROUNDS,
            discount: constants::negotiation::DISCOUNT,
            value_range: ValueRange {
                min: constants::valuation::MIN_VALUE,
                max: constants::valuation::MAX_VALUE,
            },
            min_outside: constants::valuation::MIN_OUTSIDE,
            history_limit: constants::negotiation::HISTORY_LIMIT,
            max_name_length: constants::session::MAX_NAME_LENGTH,
        }
    }
}

impl Config {
    /// Returns the unit totals of every item, in catalog order
    pub fn totals(&self) -> Vec<u32> {
        self.items.iter().map(|item| item.total).collect_vec()
    }

    /// Multiplier applied to payoffs settled in `round`
    ///
    /// Round 1 settles undiscounted; every later round multiplies by
    /// another factor of [`Config::discount`].
    pub fn discount_factor(&self, round: u32) -> f64 {
        self.discount
            .powi(i32::try_from(round.saturating_sub(1)).unwrap_or(i32::MAX))
    }
}

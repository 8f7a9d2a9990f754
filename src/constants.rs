//! Default configuration constants for the bargaining server
//!
//! This module contains the default values and hard limits used throughout
//! the negotiation engine. The runtime [`Config`](crate::config::Config)
//! starts from these values and validates overrides against the limits.

/// Negotiation defaults
pub mod negotiation {
    /// Number of rounds before offers stop advancing the round counter
    pub const TOTAL_ROUNDS: u32 = 4;
    /// Per-round discount applied to payoffs at settlement
    pub const DISCOUNT: f64 = 0.95;
    /// Names and totals of the default item catalog
    pub const ITEMS: [(&str, u32); 3] = [("Item 1", 7), ("Item 2", 4), ("Item 3", 1)];
    /// Maximum number of entries kept in a game's history
    pub const HISTORY_LIMIT: usize = 50;
    /// Upper bound on the configurable round count
    pub const MAX_TOTAL_ROUNDS: u32 = 20;
    /// Upper bound on the number of items in a catalog
    pub const MAX_ITEM_COUNT: usize = 10;
    /// Upper bound on the total of a single item
    pub const MAX_ITEM_TOTAL: u32 = 1000;
}

/// Private valuation defaults
pub mod valuation {
    /// Smallest per-item value a party can draw
    pub const MIN_VALUE: u32 = 5;
    /// Largest per-item value a party can draw
    pub const MAX_VALUE: u32 = 100;
    /// Floor of the outside option
    pub const MIN_OUTSIDE: u32 = 10;
}

/// Identity and display name limits
pub mod session {
    /// Maximum length of a display name in characters
    pub const MAX_NAME_LENGTH: usize = 20;
    /// Number of words in generated display names
    pub const GENERATED_NAME_WORDS: u8 = 2;
}

/// Shareable code configuration
pub mod code {
    /// Number of characters in a game or tournament code
    pub const LENGTH: usize = 4;
    /// Characters codes are drawn from, without 0/O, 1/I/L
    pub const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
}

/// Tournament limits
pub mod tournament {
    /// Maximum length of a tournament name in characters
    pub const MAX_NAME_LENGTH: usize = 40;
}

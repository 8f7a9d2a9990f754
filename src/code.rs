//! Shareable game and tournament codes
//!
//! Codes are short strings drawn from an alphabet without visually
//! confusable characters, so players can read them aloud or copy them by
//! hand. Games and tournaments share a single code space.

use std::{fmt::Display, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::constants::code::{ALPHABET, LENGTH};

/// A short human-shareable identifier for a game or tournament
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct Code([u8; LENGTH]);

/// Errors produced when parsing a code typed by a player
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseCodeError {
    /// The input does not have exactly the code length
    #[error("code must be {LENGTH} characters")]
    Length,
    /// The input contains a character outside the code alphabet
    #[error("code contains an invalid character")]
    Character,
}

impl Code {
    /// Draws a random code from `rng`
    pub fn random(rng: &mut fastrand::Rng) -> Self {
        let mut bytes = [0; LENGTH];
        for byte in &mut bytes {
            *byte = ALPHABET[rng.usize(..ALPHABET.len())];
        }
        Self(bytes)
    }

    /// Draws random codes until one is not `taken`
    ///
    /// # Arguments
    ///
    /// * `rng` - Source of randomness
    /// * `taken` - Returns `true` if a code is already in use
    pub fn unique<F: Fn(&Code) -> bool>(rng: &mut fastrand::Rng, taken: F) -> Self {
        loop {
            let code = Self::random(rng);
            if !taken(&code) {
                return code;
            }
        }
    }

    /// Returns the code as a string slice
    pub fn as_str(&self) -> &str {
        // every byte comes from the ASCII alphabet
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Code {
    type Err = ParseCodeError;

    /// Parses a code, ignoring surrounding whitespace and letter case
    ///
    /// # Errors
    ///
    /// Returns [`ParseCodeError`] if the trimmed input has the wrong length
    /// or contains characters outside the alphabet.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_uppercase();
        let bytes: [u8; LENGTH] = s
            .as_bytes()
            .try_into()
            .map_err(|_| ParseCodeError::Length)?;
        if bytes.iter().all(|b| ALPHABET.contains(b)) {
            Ok(Self(bytes))
        } else {
            Err(ParseCodeError::Character)
        }
    }
}

//! Join code generation
//!
//! Rooms and sessions are joined by a short numeric code. Codes are always
//! shown as exactly six decimal digits (leading zeros included) so they can
//! be read out loud or typed on a phone keypad.

use std::{fmt::Display, str::FromStr};

use serde::Serialize;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::constants::join_code::{DIGITS, MAX_ATTEMPTS, SPACE};

/// A six digit join code
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct JoinCode(u32);

/// Errors produced when parsing a join code typed by a user
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseJoinCodeError {
    /// The code does not have exactly six characters
    #[error("join code must have exactly {DIGITS} digits")]
    Length,
    /// The code contains something other than ASCII digits
    #[error("join code may only contain digits")]
    NotNumeric,
}

/// No free code turned up within the attempt limit
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[error("no free join code found after {MAX_ATTEMPTS} attempts")]
pub struct CodesExhausted;

impl JoinCode {
    /// Creates a new random join code
    pub fn new() -> Self {
        Self(fastrand::u32(0..SPACE))
    }

    /// Generates codes until one is found that `in_use` rejects
    ///
    /// # Arguments
    ///
    /// * `in_use` - Returns `true` when a candidate collides with a live code
    ///
    /// # Errors
    ///
    /// Returns the first error reported by `in_use`, or [`CodesExhausted`]
    /// once `MAX_ATTEMPTS` candidates were all taken.
    pub fn generate_unique<E, F>(mut in_use: F) -> Result<Self, E>
    where
        E: From<CodesExhausted>,
        F: FnMut(JoinCode) -> Result<bool, E>,
    {
        for _ in 0..MAX_ATTEMPTS {
            let code = Self::new();
            if !in_use(code)? {
                return Ok(code);
            }
        }
        Err(CodesExhausted.into())
    }
}

impl Default for JoinCode {
    /// Creates a new random join code (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JoinCode {
    /// Formats the code as a zero padded six digit number
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:0width$}", self.0, width = DIGITS)
    }
}

impl FromStr for JoinCode {
    type Err = ParseJoinCodeError;

    /// Parses a join code, ignoring surrounding whitespace
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is not exactly six ASCII digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != DIGITS {
            return Err(ParseJoinCodeError::Length);
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseJoinCodeError::NotNumeric);
        }
        s.parse::<u32>()
            .map(Self)
            .map_err(|_| ParseJoinCodeError::NotNumeric)
    }
}

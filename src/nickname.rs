//! Nickname validation and generation
//!
//! Members pick their own nickname when they join a room, unless the room
//! is configured to hand out random pet names. Either way the nickname is
//! trimmed, length checked and screened for inappropriate content before it
//! is stored.

use heck::ToTitleCase;
use rustrict::CensorStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::nickname::MAX_LENGTH;

/// Defines the style of automatically generated nicknames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, garde::Validate)]
pub enum NameStyle {
    /// Pet-style names (adjective + animal combinations)
    Petname(#[garde(range(min = 2, max = 3))] usize),
}

impl Default for NameStyle {
    /// Default name style is Petname with 2 words
    fn default() -> Self {
        Self::Petname(2)
    }
}

impl NameStyle {
    /// Generates a random title-cased nickname according to this style
    pub fn get_name(&self) -> String {
        match self {
            Self::Petname(count) => {
                petname::petname(u8::try_from(*count).unwrap_or(2), " ").unwrap_or_default()
            }
        }
        .to_title_case()
    }

    /// Generates nicknames until one is found that `taken` rejects
    ///
    /// Gives up after a bounded number of attempts and appends a numeric
    /// suffix to the last candidate instead.
    pub fn get_unique_name<F: Fn(&str) -> bool>(&self, taken: F) -> String {
        const ATTEMPTS: usize = 16;

        let mut candidate = self.get_name();
        for _ in 1..ATTEMPTS {
            if !taken(&candidate) {
                return candidate;
            }
            candidate = self.get_name();
        }
        (2..)
            .map(|n| format!("{candidate} {n}"))
            .find(|name| !taken(name))
            .unwrap_or(candidate)
    }
}

/// Reasons a requested nickname is rejected
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicknameError {
    /// The nickname is empty or contains only whitespace
    #[error("nickname cannot be empty")]
    Empty,
    /// The nickname exceeds the maximum allowed length
    #[error("nickname is too long")]
    TooLong,
    /// The nickname contains inappropriate content
    #[error("nickname is inappropriate")]
    Inappropriate,
}

/// Cleans up and validates a requested nickname
///
/// # Returns
///
/// The trimmed nickname on success.
///
/// # Errors
///
/// * `NicknameError::Empty` - Nothing is left after trimming whitespace
/// * `NicknameError::TooLong` - More than 100 characters after trimming
/// * `NicknameError::Inappropriate` - Flagged by the content filter
pub fn clean(nickname: &str) -> Result<String, NicknameError> {
    let nickname = rustrict::trim_whitespace(nickname);
    if nickname.is_empty() {
        return Err(NicknameError::Empty);
    }
    if nickname.chars().count() > MAX_LENGTH {
        return Err(NicknameError::TooLong);
    }
    if nickname.is_inappropriate() {
        return Err(NicknameError::Inappropriate);
    }
    Ok(nickname.to_owned())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_clean_trims_whitespace() {
        assert_eq!(clean("  Alice  "), Ok("Alice".to_owned()));
    }

    #[test]
    fn test_clean_rejects_empty() {
        assert_eq!(clean(""), Err(NicknameError::Empty));
        assert_eq!(clean(" \t\n"), Err(NicknameError::Empty));
    }

    #[test]
    fn test_clean_length_counts_characters() {
        assert!(clean(&"a".repeat(MAX_LENGTH)).is_ok());
        assert_eq!(
            clean(&"a".repeat(MAX_LENGTH + 1)),
            Err(NicknameError::TooLong)
        );
        assert!(clean(&"é".repeat(MAX_LENGTH)).is_ok());
    }

    #[test]
    fn test_clean_rejects_inappropriate() {
        for name in ["fuck", "shit"] {
            assert_eq!(
                clean(name),
                Err(NicknameError::Inappropriate),
                "Expected '{name}' to be flagged as inappropriate"
            );
        }
    }

    #[test]
    fn test_clean_keeps_unicode() {
        assert_eq!(clean("Плеер测试"), Ok("Плеер测试".to_owned()));
    }

    #[test]
    fn test_petname_generation() {
        let two = NameStyle::Petname(2).get_name();
        assert_eq!(two.matches(' ').count(), 1);
        assert!(two.chars().next().unwrap().is_uppercase());

        let three = NameStyle::Petname(3).get_name();
        assert_eq!(three.matches(' ').count(), 2);
    }

    #[test]
    fn test_unique_name_falls_back_to_suffix() {
        let style = NameStyle::default();
        let name = style.get_unique_name(|candidate| !candidate.ends_with(" 2"));
        assert!(name.ends_with(" 2"));

        let free = style.get_unique_name(|_| false);
        assert!(!free.is_empty());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(NicknameError::Empty.to_string(), "nickname cannot be empty");
        assert_eq!(NicknameError::TooLong.to_string(), "nickname is too long");
        assert_eq!(
            NicknameError::Inappropriate.to_string(),
            "nickname is inappropriate"
        );
    }
}

//! Runtime options for a quiz room deployment
//!
//! Options are deserialized from whatever configuration source the
//! embedding application uses and validated once with [`garde`] before any
//! component is built from them.

use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::{
    constants::{bot, leaderboard},
    nickname::NameStyle,
    question::QuestionType,
};

/// Tunable behavior of rooms, sessions and the bot poll loop
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct Options {
    /// How often every tracked session is polled by the bot loop
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[garde(custom(check_poll_interval))]
    pub poll_interval: Duration,
    /// How many entries truncated leaderboards carry
    #[garde(range(min = 1, max = leaderboard::MAX_LIMIT))]
    pub leaderboard_limit: usize,
    /// Question types that are skipped when a session starts in a bot room
    #[garde(skip)]
    pub bot_excluded_types: Vec<QuestionType>,
    /// Style for generated nicknames (None means members must choose their own)
    #[garde(dive)]
    pub random_nicknames: Option<NameStyle>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(bot::DEFAULT_POLL_INTERVAL_MS),
            leaderboard_limit: leaderboard::DEFAULT_LIMIT,
            bot_excluded_types: vec![QuestionType::Ordering, QuestionType::Matching],
            random_nicknames: None,
        }
    }
}

impl Options {
    /// Returns whether questions of this type may be asked in a bot room
    pub fn allowed_in_bot(&self, kind: QuestionType) -> bool {
        !self.bot_excluded_types.contains(&kind)
    }
}

fn check_poll_interval(value: &Duration, _ctx: &()) -> garde::Result {
    let range = bot::MIN_POLL_INTERVAL_MS..=bot::MAX_POLL_INTERVAL_MS;
    let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
    if range.contains(&millis) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "poll interval must be between {} and {} ms",
            range.start(),
            range.end()
        )))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        let options = Options::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.poll_interval, Duration::from_millis(1500));
        assert!(!options.allowed_in_bot(QuestionType::Ordering));
        assert!(!options.allowed_in_bot(QuestionType::Matching));
        assert!(options.allowed_in_bot(QuestionType::Numeric));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: Options = serde_json::from_value(serde_json::json!({
            "poll_interval": 250,
            "random_nicknames": { "Petname": 3 },
        }))
        .unwrap();
        assert_eq!(options.poll_interval, Duration::from_millis(250));
        assert_eq!(options.leaderboard_limit, 50);
        assert_eq!(options.random_nicknames, Some(NameStyle::Petname(3)));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_reject_out_of_range() {
        let fast = Options {
            poll_interval: Duration::from_millis(10),
            ..Options::default()
        };
        assert!(fast.validate().is_err());

        let empty_board = Options {
            leaderboard_limit: 0,
            ..Options::default()
        };
        assert!(empty_board.validate().is_err());

        let long_names = Options {
            random_nicknames: Some(NameStyle::Petname(7)),
            ..Options::default()
        };
        assert!(long_names.validate().is_err());
    }

    #[test]
    fn test_options_allow_every_type_when_nothing_excluded() {
        let options = Options {
            bot_excluded_types: Vec::new(),
            ..Options::default()
        };
        assert!(options.allowed_in_bot(QuestionType::Ordering));
    }
}

//! Configuration constants for the quiz room system
//!
//! This module contains the fixed limits and scoring scales used
//! throughout the crate so that every component agrees on the same
//! boundaries.

/// Scoring scales used when points are assigned at reveal time
pub mod scoring {
    /// Points awarded for a fully correct answer
    pub const FULL_CORRECTNESS: u64 = 100;
    /// Maximum points subtracted for selecting every incorrect option of a multiple choice question
    pub const OVER_SELECTION_PENALTY: f64 = 50.;
    /// Speed bonus earned per participant in the session, and the step lost per rank
    pub const SPEED_BONUS_STEP: u64 = 10;
    /// Lowest speed bonus any answer can earn
    pub const MIN_SPEED_BONUS: u64 = 10;
}

/// Join code configuration
pub mod join_code {
    /// Number of decimal digits in a room or session join code
    pub const DIGITS: usize = 6;
    /// Exclusive upper bound of the numeric code space
    pub const SPACE: u32 = 1_000_000;
    /// Random candidates tried before giving up on finding a free code
    pub const MAX_ATTEMPTS: usize = 64;
}

/// Question content limits checked when questions enter the catalog
pub mod question {
    /// Maximum length of a question text in characters
    pub const MAX_TEXT_LENGTH: usize = 500;
    /// Maximum length of an option (or its match text) in characters
    pub const MAX_OPTION_LENGTH: usize = 200;
    /// Maximum number of options a question can have
    pub const MAX_OPTION_COUNT: usize = 16;
    /// Maximum length of a media URL in characters
    pub const MAX_MEDIA_URL_LENGTH: usize = 2048;
}

/// Nickname configuration
pub mod nickname {
    /// Maximum length of a nickname in characters
    pub const MAX_LENGTH: usize = 100;
}

/// Leaderboard configuration
pub mod leaderboard {
    /// Default number of entries included in truncated leaderboards
    pub const DEFAULT_LIMIT: usize = 50;
    /// Upper bound accepted for a configured leaderboard limit
    pub const MAX_LIMIT: usize = 500;
}

/// Bot poll loop configuration
pub mod bot {
    /// Default interval between two polls of a tracked session, in milliseconds
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;
    /// Shortest accepted poll interval, in milliseconds
    pub const MIN_POLL_INTERVAL_MS: u64 = 100;
    /// Longest accepted poll interval, in milliseconds
    pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
}

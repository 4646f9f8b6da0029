//! Error taxonomy shared by every operation of the crate
//!
//! Each failure a caller can observe is a variant of [`Error`]. Variants are
//! grouped into five classes by [`Error::kind`], which tells the caller
//! whether to report, re-fetch state, give up or retry.

use serde::Serialize;
use thiserror::Error;

use crate::{join_code::CodesExhausted, nickname::NicknameError, question::AnswerError};

/// Failures reported by a [`Store`](crate::store::Store) implementation
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A record with the same unique key already exists
    #[error("record already exists")]
    Duplicate,
    /// A conditional write found the record in an unexpected state
    #[error("record was modified concurrently")]
    Conflict,
    /// The backing store could not complete the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Every failure an operation of this crate can report
#[derive(Error, Serialize, Debug, Clone, PartialEq)]
pub enum Error {
    /// The quiz has no questions eligible for this room
    #[error("quiz has no eligible questions")]
    EmptyQuiz,
    /// The session has already left the waiting state
    #[error("session has already started")]
    AlreadyStarted,
    /// There is no open question to reveal
    #[error("no active question")]
    NoActiveQuestion,
    /// The current question is still open
    #[error("current question must be revealed first")]
    MustRevealFirst,
    /// The session is already finished
    #[error("session is already finished")]
    AlreadyFinished,
    /// Answers are only accepted while a question is open
    #[error("session is not accepting answers")]
    SessionNotAcceptingAnswers,
    /// The identity has not joined the session
    #[error("participant not found")]
    ParticipantNotFound,
    /// No session with this id or code exists
    #[error("session not found")]
    SessionNotFound,
    /// No room with this id or code exists
    #[error("room not found")]
    RoomNotFound,
    /// The room no longer accepts members or sessions
    #[error("room is closed")]
    RoomClosed,
    /// The catalog does not know the quiz
    #[error("quiz not found")]
    QuizNotFound,
    /// The catalog does not know a question of the session
    #[error("question not found")]
    QuestionNotFound,
    /// No room member with this id or identity exists
    #[error("member not found")]
    MemberNotFound,
    /// The session points at a question outside of its sequence
    #[error("session is in an invalid question state")]
    InvalidQuestionState,
    /// The actor does not own the session or room
    #[error("only the host may do this")]
    NotHost,
    /// The actor may not act on behalf of this member
    #[error("not a member of this room")]
    NotMember,
    /// The submitted answer does not fit the question
    #[error(transparent)]
    Answer(#[from] AnswerError),
    /// The requested nickname was rejected
    #[error(transparent)]
    Nickname(#[from] NicknameError),
    /// Every join code tried was taken
    #[error(transparent)]
    CodesExhausted(#[from] CodesExhausted),
    /// The store failed while applying the operation
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Classes of failure, each with its own handling contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, reported to the caller and never retried
    Validation,
    /// The operation does not fit the current status; re-fetch state first
    StateConflict,
    /// Unknown entity, terminal
    NotFound,
    /// The actor is not allowed to do this, terminal
    Authorization,
    /// Transient store failure, safe to retry
    Persistence,
}

impl ErrorKind {
    /// Returns whether repeating the same call may succeed
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Persistence)
    }
}

impl Error {
    /// Returns the class this failure belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Answer(_) | Self::Nickname(_) => ErrorKind::Validation,
            Self::EmptyQuiz
            | Self::AlreadyStarted
            | Self::NoActiveQuestion
            | Self::MustRevealFirst
            | Self::AlreadyFinished
            | Self::SessionNotAcceptingAnswers
            | Self::RoomClosed
            | Self::InvalidQuestionState
            | Self::CodesExhausted(_) => ErrorKind::StateConflict,
            Self::ParticipantNotFound
            | Self::SessionNotFound
            | Self::RoomNotFound
            | Self::QuizNotFound
            | Self::QuestionNotFound
            | Self::MemberNotFound => ErrorKind::NotFound,
            Self::NotHost | Self::NotMember => ErrorKind::Authorization,
            Self::Store(StoreError::Duplicate | StoreError::Conflict) => ErrorKind::StateConflict,
            Self::Store(_) => ErrorKind::Persistence,
        }
    }
}

/// Shorthand for results of this crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::NoActiveQuestion.kind(), ErrorKind::StateConflict);
        assert_eq!(Error::SessionNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(Error::NotHost.kind(), ErrorKind::Authorization);
        assert_eq!(
            Error::from(AnswerError::EmptySelection).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Error::from(NicknameError::Empty).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Error::from(StoreError::Unavailable("timeout".to_owned())).kind(),
            ErrorKind::Persistence
        );
        assert_eq!(
            Error::from(StoreError::Duplicate).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            Error::from(StoreError::Conflict).kind(),
            ErrorKind::StateConflict
        );
    }

    #[test]
    fn test_only_persistence_is_retryable() {
        assert!(ErrorKind::Persistence.is_retryable());
        for kind in [
            ErrorKind::Validation,
            ErrorKind::StateConflict,
            ErrorKind::NotFound,
            ErrorKind::Authorization,
        ] {
            assert!(!kind.is_retryable());
        }
    }

    #[test]
    fn test_error_display_is_transparent_for_nested() {
        assert_eq!(
            Error::from(NicknameError::TooLong).to_string(),
            "nickname is too long"
        );
        assert_eq!(
            Error::MustRevealFirst.to_string(),
            "current question must be revealed first"
        );
    }

    #[test]
    fn test_error_serializes_variant_name() {
        let json = serde_json::to_string(&Error::AlreadyFinished).unwrap();
        assert_eq!(json, r#""AlreadyFinished""#);
    }
}

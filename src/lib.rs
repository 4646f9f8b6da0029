//! # Quiz Room Library
//!
//! This library provides the core of a live multiplayer quiz: rooms that
//! people join with a code, sessions that step through a quiz question by
//! question, answer collection with last-write-wins semantics, speed and
//! correctness based scoring at reveal time, and best-effort fan-out of
//! state changes to connected clients and to a polling chat bot.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
use derive_where::derive_where;
use itertools::Itertools;
use serde::Serialize;

pub mod bot;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod game;
pub mod hub;
pub mod identity;
pub mod join_code;
pub mod leaderboard;
pub mod ledger;
pub mod nickname;
pub mod question;
pub mod room;
pub mod roster;
pub mod scoring;
pub mod session;
pub mod store;

pub use engine::Engine;
pub use error::{Error, ErrorKind, Result};
pub use identity::{Id, Identity};

use leaderboard::Standing;
use room::Member;
use session::{ParticipantView, SessionState};

/// Events pushed to every connection registered for a session or room
///
/// Serialized as `{"type": "<snake_case name>", "data": ...}`. Delivery is
/// best-effort; clients that miss an event recover by fetching the state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// Someone joined the session
    ParticipantJoined(ParticipantView),
    /// The number of answers for the open question changed
    AnswerReceived {
        /// The session that received an answer
        session_id: Id,
    },
    /// The first question was opened
    QuizStarted(Box<SessionState>),
    /// A later question was opened
    Question(Box<SessionState>),
    /// The current question was closed and scored
    Revealed(Box<SessionState>),
    /// The session is over
    Finished {
        /// Final state of the session
        state: Box<SessionState>,
        /// Best standings
        leaderboard: TruncatedVec<Standing>,
    },
    /// The room was closed by its host
    RoomClosed {
        /// The closed room
        room_id: Id,
    },
    /// Someone joined the room
    MemberJoined(Member),
    /// A member changed their nickname
    MemberUpdated(Member),
}

impl Event {
    /// Converts the event to a JSON string for transmission
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the event cannot be encoded.
    pub fn to_message(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::ParticipantJoined(_) => "participant_joined",
            Self::AnswerReceived { .. } => "answer_received",
            Self::QuizStarted(_) => "quiz_started",
            Self::Question(_) => "question",
            Self::Revealed(_) => "revealed",
            Self::Finished { .. } => "finished",
            Self::RoomClosed { .. } => "room_closed",
            Self::MemberJoined(_) => "member_joined",
            Self::MemberUpdated(_) => "member_updated",
        }
    }
}

/// A truncated vector that maintains the exact count while limiting displayed items
///
/// Useful for showing "120 participants" while only sending the first few
/// names over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[derive_where(Default)]
pub struct TruncatedVec<T> {
    /// The exact total count of items
    exact_count: usize,
    /// The truncated list of items (up to the limit)
    items: Vec<T>,
}

impl<T: Clone> TruncatedVec<T> {
    /// Creates a new truncated vector from an iterator
    ///
    /// # Arguments
    ///
    /// * `list` - An iterator over items to include
    /// * `limit` - Maximum number of items to include in the truncated vector
    /// * `exact_count` - The exact total count of items (may be larger than limit)
    pub fn new<I: Iterator<Item = T>>(list: I, limit: usize, exact_count: usize) -> Self {
        let items = list.take(limit).collect_vec();
        Self { exact_count, items }
    }

    /// Returns the exact count of items
    pub fn exact_count(&self) -> usize {
        self.exact_count
    }

    /// Returns the truncated items
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_vec_new() {
        let truncated = TruncatedVec::new(vec![1, 2, 3, 4, 5].into_iter(), 3, 5);
        assert_eq!(truncated.exact_count(), 5);
        assert_eq!(truncated.items(), &[1, 2, 3]);
    }

    #[test]
    fn test_truncated_vec_limit_larger_than_items() {
        let truncated = TruncatedVec::new(vec![1, 2, 3].into_iter(), 5, 3);
        assert_eq!(truncated.exact_count(), 3);
        assert_eq!(truncated.items(), &[1, 2, 3]);
    }

    #[test]
    fn test_truncated_vec_default_is_empty() {
        let truncated = TruncatedVec::<String>::default();
        assert_eq!(truncated.exact_count(), 0);
        assert!(truncated.items().is_empty());
    }

    #[test]
    fn test_event_wire_format() {
        let session_id = Id::new();
        let json: serde_json::Value = serde_json::from_str(
            &Event::AnswerReceived { session_id }.to_message().unwrap(),
        )
        .unwrap();
        assert_eq!(json["type"], "answer_received");
        assert_eq!(json["data"]["session_id"], session_id.to_string());
    }

    #[test]
    fn test_event_name_matches_tag() {
        let room_id = Id::new();
        let event = Event::RoomClosed { room_id };
        let json: serde_json::Value =
            serde_json::from_str(&event.to_message().unwrap()).unwrap();
        assert_eq!(json["type"], event.name());
    }

    #[test]
    fn test_member_event_hides_identity() {
        let member = Member::new(
            Id::new(),
            Identity::Web("secret-token".to_owned()),
            "Ann".to_owned(),
        );
        let message = Event::MemberJoined(member).to_message().unwrap();
        assert!(message.contains("\"type\":\"member_joined\""));
        assert!(!message.contains("secret-token"));
    }
}

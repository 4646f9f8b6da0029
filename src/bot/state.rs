//! Per-user conversation state
//!
//! Each chat user walks through a small dialogue: entering a code, picking a
//! nickname, playing, or driving a session as host. The current step and
//! the question last shown to them live here until the user restarts the
//! dialogue or their session ends.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use super::UserId;
use crate::{identity::Id, join_code::JoinCode};

/// Where a user is in the bot dialogue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Nothing in progress
    #[default]
    Idle,
    /// Waiting for a room code
    EnterCode,
    /// Waiting for a nickname for the room with this code
    EnterNickname {
        /// The room being joined
        code: JoinCode,
    },
    /// Playing in a session
    InSession {
        /// The session played
        session_id: Id,
    },
    /// Waiting for the host password
    HostPassword,
    /// Controlling a session from the chat
    HostRemote {
        /// The session controlled
        session_id: Id,
    },
}

/// The question a user was last shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Session the question belongs to
    pub session_id: Id,
    /// The question shown
    pub question_id: Id,
    /// 1-based index of the question
    pub current_question: usize,
    /// Number of questions in the session
    pub total_questions: usize,
}

/// Everything the bot remembers about one user
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Current dialogue step
    pub step: Step,
    /// Nickname chosen while joining
    pub nickname: Option<String>,
    /// The question last shown
    pub prompt: Option<Prompt>,
    /// Options picked so far for the shown question
    #[serde(default)]
    pub selected: Vec<Id>,
}

/// A concurrent map from user to conversation state
///
/// Users without an entry are in the default state.
#[derive(Debug, Default)]
pub struct UserStates {
    users: RwLock<HashMap<UserId, ConversationState>>,
}

impl UserStates {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of a user's state
    pub fn get(&self, user: UserId) -> ConversationState {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
            .cloned()
            .unwrap_or_default()
    }

    /// Replaces a user's state
    pub fn set(&self, user: UserId, state: ConversationState) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user, state);
    }

    /// Forgets a user, returning them to the default state
    pub fn clear(&self, user: UserId) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user);
    }

    /// Edits a user's state in place
    pub fn update<R>(&self, user: UserId, f: impl FnOnce(&mut ConversationState) -> R) -> R {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        f(users.entry(user).or_default())
    }

    /// Edits a user's state only if they are still at `expected`
    ///
    /// Returns whether the edit was applied.
    pub fn compare_and_update(
        &self,
        user: UserId,
        expected: Step,
        f: impl FnOnce(&mut ConversationState),
    ) -> bool {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let current = users.get(&user).map_or(Step::Idle, |state| state.step);
        if current != expected {
            return false;
        }
        f(users.entry(user).or_default());
        true
    }

    /// Number of users with a stored state
    pub fn len(&self) -> usize {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns whether no user has a stored state
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_user_is_idle() {
        let states = UserStates::new();
        assert_eq!(states.get(7), ConversationState::default());
        assert_eq!(states.get(7).step, Step::Idle);
        assert!(states.is_empty());
    }

    #[test]
    fn test_get_returns_a_copy() {
        let states = UserStates::new();
        states.set(
            1,
            ConversationState {
                step: Step::EnterCode,
                ..ConversationState::default()
            },
        );
        let mut copy = states.get(1);
        copy.step = Step::HostPassword;
        assert_eq!(states.get(1).step, Step::EnterCode);
    }

    #[test]
    fn test_update_creates_entry() {
        let states = UserStates::new();
        let code = JoinCode::new();
        states.update(3, |s| s.step = Step::EnterNickname { code });
        assert_eq!(states.get(3).step, Step::EnterNickname { code });
        assert_eq!(states.len(), 1);

        states.clear(3);
        assert!(states.is_empty());
    }

    #[test]
    fn test_compare_and_update() {
        let states = UserStates::new();
        let session_id = Id::new();

        assert!(!states.compare_and_update(5, Step::EnterCode, |s| {
            s.step = Step::InSession { session_id };
        }));
        assert_eq!(states.get(5).step, Step::Idle);
        assert!(states.is_empty());

        assert!(states.compare_and_update(5, Step::Idle, |s| {
            s.step = Step::InSession { session_id };
        }));
        assert_eq!(states.get(5).step, Step::InSession { session_id });
    }

    #[test]
    fn test_step_wire_format() {
        let json = serde_json::to_value(Step::EnterCode).unwrap();
        assert_eq!(json["step"], "enter_code");
    }
}

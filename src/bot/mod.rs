//! The chat bot's push channel
//!
//! Chat users cannot hold a connection open, so the bot polls the state of
//! every session it has players in and sends each of them a message when
//! something they care about changed. [`state`] keeps what each user is in
//! the middle of, [`notify`] describes the outgoing messages, and
//! [`tracker`] runs one poll task per session.

pub mod notify;
pub mod state;
pub mod tracker;

pub use notify::{Notification, Notifier, NotifyError};
pub use state::{ConversationState, Step, UserStates};
pub use tracker::{SessionSource, Tracker};

/// A chat user's numeric id
pub type UserId = i64;

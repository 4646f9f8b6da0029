//! Messages the bot pushes to chat users

use std::future::Future;

use serde::Serialize;
use thiserror::Error;

use super::UserId;
use crate::{
    TruncatedVec,
    identity::Id,
    join_code::JoinCode,
    leaderboard::Standing,
    session::{ParticipantResult, QuestionView, SessionState, Status},
};

/// A question to answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionNotice {
    /// Session the question belongs to
    pub session_id: Id,
    /// 1-based index of the question
    pub current_question: usize,
    /// Number of questions in the session
    pub total_questions: usize,
    /// The question, without its answers
    pub question: QuestionView,
}

/// The outcome of the question that was just revealed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultNotice {
    /// Session the question belongs to
    pub session_id: Id,
    /// 1-based index of the question
    pub current_question: usize,
    /// Number of questions in the session
    pub total_questions: usize,
    /// The question with its answers
    pub question: Option<QuestionView>,
    /// How the recipient did
    pub result: ParticipantResult,
}

/// Final standings with the recipient's own place
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalNotice {
    /// The finished session
    pub session_id: Id,
    /// Best standings
    pub leaderboard: TruncatedVec<Standing>,
    /// The recipient's 1-based place, if they took part
    pub position: Option<usize>,
}

/// The host's remote control panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostPanel {
    /// Session controlled
    pub session_id: Id,
    /// Title of the quiz
    pub quiz_title: String,
    /// Join code of the session
    pub code: JoinCode,
    /// Current lifecycle phase
    pub status: Status,
    /// 1-based index of the current question
    pub current_question: usize,
    /// Number of questions in the session
    pub total_questions: usize,
    /// Answers received for the current question
    pub answer_count: usize,
    /// Number of participants
    pub participant_count: usize,
    /// The current question, with answers once revealed
    pub question: Option<QuestionView>,
}

impl From<&SessionState> for HostPanel {
    fn from(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id,
            quiz_title: state.quiz_title.clone(),
            code: state.code,
            status: state.status,
            current_question: state.current_question,
            total_questions: state.total_questions,
            answer_count: state.answer_count,
            participant_count: state.participants.len(),
            question: state.question.clone(),
        }
    }
}

/// Anything the bot sends on its own initiative
#[derive(Debug, Clone, PartialEq, Serialize, derive_more::From)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Notification {
    /// A new question was opened
    Question(QuestionNotice),
    /// The question was revealed
    Result(ResultNotice),
    /// The session finished
    Final(FinalNotice),
    /// The host's panel changed
    HostPanel(HostPanel),
}

/// Failure to deliver a notification
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NotifyError {
    /// The user blocked the bot or deleted the chat
    #[error("recipient is unreachable")]
    Unreachable,
    /// The chat service rejected the message
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// The transport that delivers notifications to chat users
pub trait Notifier: Send + Sync + 'static {
    /// Delivers one notification
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be delivered. The tracker
    /// logs it and carries on.
    fn notify(
        &self,
        recipient: UserId,
        notification: Notification,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_notification_from_notice() {
        let notice = FinalNotice {
            session_id: Id::new(),
            leaderboard: TruncatedVec::default(),
            position: None,
        };
        let notification = Notification::from(notice.clone());
        assert_eq!(notification, Notification::Final(notice));
    }

    #[test]
    fn test_notification_wire_format() {
        let json = serde_json::to_value(Notification::Final(FinalNotice {
            session_id: Id::new(),
            leaderboard: TruncatedVec::default(),
            position: Some(2),
        }))
        .unwrap();
        assert_eq!(json["kind"], "final");
        assert_eq!(json["data"]["position"], 2);
    }
}

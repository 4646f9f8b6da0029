//! Sessions and the read models derived from them
//!
//! A [`Session`] is one run of a quiz inside a room. Its progress is the
//! pair (`status`, `current_question`); everything clients see is rebuilt
//! from the store on demand as a [`SessionState`] snapshot.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use web_time::SystemTime;

use crate::{
    identity::Id,
    join_code::JoinCode,
    question::{media::Media, AnswerOption, Question, QuestionType},
};

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Participants are gathering, no question has been shown yet
    #[default]
    Waiting,
    /// The current question is open for answers
    Question,
    /// The current question is closed and scored
    Revealed,
    /// The session is over; terminal
    Finished,
}

impl Status {
    /// Returns whether correctness metadata may be shown to participants
    pub fn shows_answers(self) -> bool {
        matches!(self, Self::Revealed | Self::Finished)
    }

    /// Returns whether the session can still change
    pub fn is_active(self) -> bool {
        self != Self::Finished
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::Question => "question",
            Self::Revealed => "revealed",
            Self::Finished => "finished",
        })
    }
}

/// One run of a quiz inside a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier of the session
    pub id: Id,
    /// The quiz being played
    pub quiz_id: Id,
    /// The room the session runs in
    pub room_id: Id,
    /// The host that controls the session
    pub host_id: Id,
    /// Code participants use to find the session
    pub code: JoinCode,
    /// Current lifecycle phase
    pub status: Status,
    /// 1-based index of the current question, 0 before the first one
    pub current_question: usize,
    /// The eligible questions in play order, fixed at creation
    pub question_ids: Vec<Id>,
    /// When the session was created
    pub created_at: SystemTime,
}

impl Session {
    /// Number of questions in the session
    pub fn total_questions(&self) -> usize {
        self.question_ids.len()
    }

    /// Id of the current question, if one has been shown
    pub fn current_question_id(&self) -> Option<Id> {
        self.current_question
            .checked_sub(1)
            .and_then(|index| self.question_ids.get(index))
            .copied()
    }

    /// Returns whether the current question is the last one
    pub fn on_last_question(&self) -> bool {
        self.current_question >= self.total_questions()
    }
}

/// An option as shown to clients, with correctness hidden until reveal
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionView {
    /// Option id
    pub id: Id,
    /// Option text
    pub text: String,
    /// Display color
    pub color: Option<String>,
    /// Whether the option is correct (after reveal only)
    pub is_correct: Option<bool>,
    /// Correct 1-based position (ordering, after reveal only)
    pub correct_position: Option<usize>,
    /// Right-hand text to match against (matching, always shown)
    pub match_text: Option<String>,
}

impl OptionView {
    fn new(option: &AnswerOption, show_answers: bool) -> Self {
        Self {
            id: option.id,
            text: option.text.clone(),
            color: option.color.clone(),
            is_correct: show_answers.then_some(option.is_correct),
            correct_position: option.correct_position.filter(|_| show_answers),
            match_text: option.match_text.clone(),
        }
    }
}

/// The current question as shown to clients
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionView {
    /// Question id
    pub id: Id,
    /// Question type
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Question text
    pub text: String,
    /// Category title
    pub category_name: Option<String>,
    /// Options in display order
    pub options: Vec<OptionView>,
    /// Attached media
    pub media: Vec<Media>,
    /// Expected value (numeric, after reveal only)
    pub correct_number: Option<f64>,
    /// Accepted distance (numeric, after reveal only)
    pub tolerance: Option<f64>,
}

impl QuestionView {
    /// Builds the client view of a question
    ///
    /// # Arguments
    ///
    /// * `question` - The resolved question
    /// * `show_answers` - Whether correctness metadata may be included
    pub fn new(question: &Question, show_answers: bool) -> Self {
        Self {
            id: question.id,
            kind: question.kind,
            text: question.text.clone(),
            category_name: question.category_name.clone(),
            options: question
                .options
                .iter()
                .map(|option| OptionView::new(option, show_answers))
                .collect(),
            media: question.media.clone(),
            correct_number: question.correct_number.filter(|_| show_answers),
            tolerance: question.tolerance.filter(|_| show_answers),
        }
    }
}

/// A participant as listed in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    /// Participant id
    pub id: Id,
    /// Display name
    pub nickname: String,
    /// Points accumulated so far
    pub total_score: u64,
}

/// A read-only snapshot of a session
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Session id
    pub session_id: Id,
    /// The room the session runs in
    pub room_id: Id,
    /// Join code
    pub code: JoinCode,
    /// Title of the quiz being played
    pub quiz_title: String,
    /// Current lifecycle phase
    pub status: Status,
    /// 1-based index of the current question, 0 before the first one
    pub current_question: usize,
    /// Number of questions in the session
    pub total_questions: usize,
    /// The current question, once one has been shown
    pub question: Option<QuestionView>,
    /// Participants ordered by score, highest first
    pub participants: Vec<ParticipantView>,
    /// Answers received for the current question
    pub answer_count: usize,
}

/// One participant's outcome for the current question
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantResult {
    /// Whether an answer for the current question exists and is scored
    pub answered: bool,
    /// The picked option for choice answers
    pub option_id: Option<Id>,
    /// Whether the answer was correct
    pub is_correct: Option<bool>,
    /// Points awarded for the answer
    pub score: Option<u64>,
    /// Points accumulated so far
    pub total_score: u64,
}

impl ParticipantResult {
    /// A result for a participant with no scored answer
    pub fn unanswered(total_score: u64) -> Self {
        Self {
            answered: false,
            option_id: None,
            is_correct: None,
            score: None,
            total_score,
        }
    }
}

/// A short listing entry for a host's sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session id
    pub id: Id,
    /// Title of the quiz being played
    pub quiz_title: String,
    /// Join code
    pub code: JoinCode,
    /// Current lifecycle phase
    pub status: Status,
    /// Number of participants
    pub participant_count: usize,
    /// When the session was created
    pub created_at: SystemTime,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn session(question_count: usize) -> Session {
        Session {
            id: Id::new(),
            quiz_id: Id::new(),
            room_id: Id::new(),
            host_id: Id::new(),
            code: JoinCode::new(),
            status: Status::Waiting,
            current_question: 0,
            question_ids: (0..question_count).map(|_| Id::new()).collect(),
            created_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_current_question_id() {
        let mut s = session(2);
        assert_eq!(s.current_question_id(), None);
        s.current_question = 1;
        assert_eq!(s.current_question_id(), Some(s.question_ids[0]));
        s.current_question = 2;
        assert_eq!(s.current_question_id(), Some(s.question_ids[1]));
        assert!(s.on_last_question());
        s.current_question = 3;
        assert_eq!(s.current_question_id(), None);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Status::Revealed).unwrap(),
            r#""revealed""#
        );
        assert_eq!(Status::Question.to_string(), "question");
        assert!(Status::Finished.shows_answers());
        assert!(!Status::Question.shows_answers());
        assert!(!Status::Finished.is_active());
    }

    #[test]
    fn test_question_view_hides_answers_until_reveal() {
        let question = Question::new(QuestionType::Matching, "Pairs").with_options([
            AnswerOption::new("a", true).at_position(1).matched_with("A"),
        ]);

        let hidden = QuestionView::new(&question, false);
        assert_eq!(hidden.options[0].is_correct, None);
        assert_eq!(hidden.options[0].correct_position, None);
        assert_eq!(hidden.options[0].match_text.as_deref(), Some("A"));

        let shown = QuestionView::new(&question, true);
        assert_eq!(shown.options[0].is_correct, Some(true));
        assert_eq!(shown.options[0].correct_position, Some(1));
    }

    #[test]
    fn test_question_view_hides_numeric_target() {
        let question =
            Question::new(QuestionType::Numeric, "How many?").with_number(42., Some(1.));
        let hidden = serde_json::to_value(QuestionView::new(&question, false)).unwrap();
        assert!(hidden.get("correct_number").is_none());
        assert!(hidden.get("tolerance").is_none());

        let shown = QuestionView::new(&question, true);
        assert_eq!(shown.correct_number, Some(42.));
        assert_eq!(shown.tolerance, Some(1.));
    }

    #[test]
    fn test_unanswered_result() {
        let result = ParticipantResult::unanswered(70);
        assert!(!result.answered);
        assert_eq!(result.total_score, 70);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("score").is_none());
    }
}

//! Resolved questions and their type-specific answer rules
//!
//! A [`Question`] is the read-only snapshot of one quiz question as handed
//! out by the catalog. Everything that depends on the question type
//! (payload validation, correctness and partial scoring) lives behind the
//! [`Behavior`] trait, implemented once per type in the sub-modules and
//! dispatched by [`QuestionType::behavior`].

use std::collections::{BTreeMap, HashSet};

use enum_map::Enum;
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;

use crate::{constants, identity::Id};

pub mod matching;
pub mod media;
pub mod multiple_choice;
pub mod numeric;
pub mod ordering;
pub mod single_choice;

use media::Media;

/// The answer shape a question expects
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Enum, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Exactly one option is picked
    #[default]
    SingleChoice,
    /// Any number of options are picked
    MultipleChoice,
    /// All options are arranged into a sequence
    Ordering,
    /// Every option is paired with a right-hand text
    Matching,
    /// A number is typed and compared against a tolerance window
    Numeric,
}

impl QuestionType {
    /// Returns the rules implementation for this question type
    pub fn behavior(self) -> &'static dyn Behavior {
        match self {
            Self::SingleChoice => &single_choice::SingleChoice,
            Self::MultipleChoice => &multiple_choice::MultipleChoice,
            Self::Ordering => &ordering::Ordering,
            Self::Matching => &matching::Matching,
            Self::Numeric => &numeric::Numeric,
        }
    }
}

/// One selectable option of a question, including its hidden answer metadata
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AnswerOption {
    /// Unique identifier of the option
    #[garde(skip)]
    pub id: Id,
    /// Text shown to participants
    #[garde(length(chars, max = constants::question::MAX_OPTION_LENGTH))]
    pub text: String,
    /// Whether picking this option is correct (choice types)
    #[garde(skip)]
    #[serde(default)]
    pub is_correct: bool,
    /// Display color as a `#rrggbb` string
    #[garde(skip)]
    pub color: Option<String>,
    /// The 1-based position of this option in the correct sequence (ordering)
    #[garde(skip)]
    pub correct_position: Option<usize>,
    /// The right-hand text this option must be paired with (matching)
    #[garde(length(chars, max = constants::question::MAX_OPTION_LENGTH))]
    pub match_text: Option<String>,
}

impl AnswerOption {
    /// Creates a plain option with no answer metadata
    pub fn new(text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id: Id::new(),
            text: text.into(),
            is_correct,
            color: None,
            correct_position: None,
            match_text: None,
        }
    }

    /// Sets the correct 1-based position of this option
    pub fn at_position(mut self, position: usize) -> Self {
        self.correct_position = Some(position);
        self
    }

    /// Sets the right-hand text this option must be matched with
    pub fn matched_with(mut self, match_text: impl Into<String>) -> Self {
        self.match_text = Some(match_text.into());
        self
    }
}

/// A question resolved from the catalog
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Question {
    /// Unique identifier of the question
    #[garde(skip)]
    pub id: Id,
    /// The answer shape this question expects
    #[garde(skip)]
    #[serde(rename = "type", default)]
    pub kind: QuestionType,
    /// The question text
    #[garde(length(chars, min = 1, max = constants::question::MAX_TEXT_LENGTH))]
    pub text: String,
    /// Position inside its category (or among uncategorized questions)
    #[garde(skip)]
    pub order_num: i32,
    /// Title of the category the question belongs to
    #[garde(skip)]
    pub category_name: Option<String>,
    /// Options in display order
    #[garde(length(max = constants::question::MAX_OPTION_COUNT), dive)]
    pub options: Vec<AnswerOption>,
    /// Attached media in display order
    #[garde(dive)]
    #[serde(default)]
    pub media: Vec<Media>,
    /// The expected value (numeric)
    #[garde(skip)]
    pub correct_number: Option<f64>,
    /// Accepted absolute distance from `correct_number` (numeric)
    #[garde(skip)]
    pub tolerance: Option<f64>,
}

impl Question {
    /// Creates a question of the given type with no options
    pub fn new(kind: QuestionType, text: impl Into<String>) -> Self {
        Self {
            id: Id::new(),
            kind,
            text: text.into(),
            order_num: 0,
            category_name: None,
            options: Vec::new(),
            media: Vec::new(),
            correct_number: None,
            tolerance: None,
        }
    }

    /// Appends options to the question
    pub fn with_options<I: IntoIterator<Item = AnswerOption>>(mut self, options: I) -> Self {
        self.options.extend(options);
        self
    }

    /// Sets the expected value and tolerance of a numeric question
    pub fn with_number(mut self, correct_number: f64, tolerance: Option<f64>) -> Self {
        self.correct_number = Some(correct_number);
        self.tolerance = tolerance;
        self
    }

    /// Looks up an option of this question by id
    pub fn option(&self, option_id: Id) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    /// Returns the ids of all options flagged as correct
    pub fn correct_option_ids(&self) -> HashSet<Id> {
        self.options
            .iter()
            .filter(|o| o.is_correct)
            .map(|o| o.id)
            .collect()
    }

    /// Validates a payload and decides whether it is correct
    ///
    /// # Errors
    ///
    /// Returns an [`AnswerError`] when the payload does not fit this question.
    pub fn evaluate(&self, payload: &AnswerPayload) -> Result<bool, AnswerError> {
        let behavior = self.kind.behavior();
        behavior.validate(self, payload)?;
        Ok(behavior.is_correct(self, payload))
    }

    /// Returns the 0..=100 correctness component for an already evaluated payload
    pub fn partial_score(&self, payload: &AnswerPayload, is_correct: bool) -> u64 {
        self.kind
            .behavior()
            .partial_score(self, payload, is_correct)
            .min(constants::scoring::FULL_CORRECTNESS)
    }
}

/// The value a participant submits for a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerPayload {
    /// A single picked option (single choice)
    Choice {
        /// The picked option
        option_id: Id,
    },
    /// A set of picked options (multiple choice)
    Selection {
        /// The picked options
        option_ids: Vec<Id>,
    },
    /// A full arrangement of the options (ordering)
    Order {
        /// Option ids from first to last
        order: Vec<Id>,
    },
    /// Left option id to right-hand text pairs (matching)
    Pairs {
        /// The submitted pairs
        pairs: BTreeMap<Id, String>,
    },
    /// A typed number (numeric)
    Number {
        /// The submitted value
        value: Option<f64>,
    },
}

impl AnswerPayload {
    /// Returns the picked option for single choice answers
    pub fn option_id(&self) -> Option<Id> {
        match self {
            Self::Choice { option_id } => Some(*option_id),
            _ => None,
        }
    }
}

/// Reasons a submitted payload is rejected
#[derive(Error, Serialize, Debug, Clone, PartialEq)]
pub enum AnswerError {
    /// The payload shape does not belong to the question type
    #[error("answer shape does not fit a {expected:?} question")]
    WrongShape {
        /// The question type that was expected
        expected: QuestionType,
    },
    /// An option id does not belong to the current question
    #[error("option {0} does not belong to the current question")]
    UnknownOption(Id),
    /// A multiple choice answer picked nothing
    #[error("no options selected")]
    EmptySelection,
    /// The same option appears twice in one answer
    #[error("option {0} was submitted more than once")]
    DuplicateOption(Id),
    /// An ordering answer does not contain every option exactly once
    #[error("ordering must arrange every option exactly once")]
    IncompleteOrder,
    /// A numeric answer carries no usable value
    #[error("no numeric value provided")]
    MissingValue,
    /// A numeric question has no expected value configured
    #[error("question has no correct number")]
    MissingCorrectNumber,
}

/// Type-specific answer rules
///
/// Implemented once per [`QuestionType`]; callers go through
/// [`Question::evaluate`] and [`Question::partial_score`].
pub trait Behavior: Sync {
    /// Checks that a payload is acceptable for the question
    ///
    /// # Errors
    ///
    /// Returns an [`AnswerError`] describing the first problem found.
    fn validate(&self, question: &Question, payload: &AnswerPayload) -> Result<(), AnswerError>;

    /// Decides whether a validated payload is fully correct
    fn is_correct(&self, question: &Question, payload: &AnswerPayload) -> bool;

    /// Returns the correctness component (0..=100) of the score
    ///
    /// The default awards full points for correct answers and nothing otherwise.
    fn partial_score(
        &self,
        _question: &Question,
        _payload: &AnswerPayload,
        is_correct: bool,
    ) -> u64 {
        binary_score(is_correct)
    }
}

/// Full points for correct answers, none otherwise
pub fn binary_score(is_correct: bool) -> u64 {
    if is_correct {
        constants::scoring::FULL_CORRECTNESS
    } else {
        0
    }
}

/// Rejects ids that are repeated or not part of the question
fn check_known_unique<'a, I: IntoIterator<Item = &'a Id>>(
    question: &Question,
    ids: I,
) -> Result<(), AnswerError> {
    let mut seen = HashSet::new();
    for id in ids {
        if question.option(*id).is_none() {
            return Err(AnswerError::UnknownOption(*id));
        }
        if !seen.insert(*id) {
            return Err(AnswerError::DuplicateOption(*id));
        }
    }
    Ok(())
}

/// Integer percentage of `hits` out of `total`, truncated
fn percentage(hits: usize, total: usize) -> u64 {
    if total == 0 {
        return 0;
    }
    (hits as f64 / total as f64 * constants::scoring::FULL_CORRECTNESS as f64) as u64
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn single_choice() -> Question {
        Question::new(QuestionType::SingleChoice, "2 + 2?")
            .with_options([AnswerOption::new("4", true), AnswerOption::new("5", false)])
    }

    #[test]
    fn test_question_type_serializes_snake_case() {
        let json = serde_json::to_string(&QuestionType::MultipleChoice).unwrap();
        assert_eq!(json, r#""multiple_choice""#);
    }

    #[test]
    fn test_question_type_defaults_to_single_choice() {
        let question: Question = serde_json::from_value(serde_json::json!({
            "id": Id::new(),
            "text": "untyped",
            "order_num": 1,
            "options": [],
        }))
        .unwrap();
        assert_eq!(question.kind, QuestionType::SingleChoice);
    }

    #[test]
    fn test_evaluate_dispatches_on_type() {
        let question = single_choice();
        let right = AnswerPayload::Choice {
            option_id: question.options[0].id,
        };
        let wrong = AnswerPayload::Choice {
            option_id: question.options[1].id,
        };
        assert_eq!(question.evaluate(&right), Ok(true));
        assert_eq!(question.evaluate(&wrong), Ok(false));
        assert_eq!(
            question.evaluate(&AnswerPayload::Number { value: Some(4.) }),
            Err(AnswerError::WrongShape {
                expected: QuestionType::SingleChoice
            })
        );
    }

    #[test]
    fn test_partial_score_is_capped() {
        let question = single_choice();
        let payload = AnswerPayload::Choice {
            option_id: question.options[0].id,
        };
        assert_eq!(question.partial_score(&payload, true), 100);
        assert_eq!(question.partial_score(&payload, false), 0);
    }

    #[test]
    fn test_percentage_handles_empty_total() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 66);
        assert_eq!(percentage(3, 3), 100);
    }

    #[test]
    fn test_check_known_unique() {
        let question = single_choice();
        let a = question.options[0].id;
        let stranger = Id::new();
        assert_eq!(check_known_unique(&question, [&a]), Ok(()));
        assert_eq!(
            check_known_unique(&question, [&a, &a]),
            Err(AnswerError::DuplicateOption(a))
        );
        assert_eq!(
            check_known_unique(&question, [&stranger]),
            Err(AnswerError::UnknownOption(stranger))
        );
    }

    #[test]
    fn test_question_validation_limits_text() {
        let mut question = single_choice();
        assert!(question.validate().is_ok());
        question.text = String::new();
        assert!(question.validate().is_err());
    }

    #[test]
    fn test_payload_wire_format() {
        let id = Id::new();
        let payload = AnswerPayload::Choice { option_id: id };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "choice");
        assert_eq!(json["option_id"], id.to_string());
        assert_eq!(payload.option_id(), Some(id));
        assert_eq!(AnswerPayload::Number { value: None }.option_id(), None);
    }
}

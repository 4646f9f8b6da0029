//! Matching questions: every option is paired with a right-hand text

use std::collections::BTreeMap;

use super::{percentage, AnswerError, AnswerPayload, Behavior, Question, QuestionType};
use crate::identity::Id;

/// Rules for [`QuestionType::Matching`]
#[derive(Debug, Clone, Copy)]
pub struct Matching;

impl Matching {
    /// Number of submitted pairs that agree with the options' match texts
    fn matched(question: &Question, pairs: &BTreeMap<Id, String>) -> usize {
        question
            .options
            .iter()
            .filter(|option| {
                pairs
                    .get(&option.id)
                    .is_some_and(|right| option.match_text.as_deref() == Some(right.as_str()))
            })
            .count()
    }
}

impl Behavior for Matching {
    fn validate(&self, question: &Question, payload: &AnswerPayload) -> Result<(), AnswerError> {
        let AnswerPayload::Pairs { pairs } = payload else {
            return Err(AnswerError::WrongShape {
                expected: QuestionType::Matching,
            });
        };
        match pairs.keys().find(|id| question.option(**id).is_none()) {
            Some(unknown) => Err(AnswerError::UnknownOption(*unknown)),
            None => Ok(()),
        }
    }

    fn is_correct(&self, question: &Question, payload: &AnswerPayload) -> bool {
        let AnswerPayload::Pairs { pairs } = payload else {
            return false;
        };
        pairs.len() == question.options.len()
            && Self::matched(question, pairs) == question.options.len()
    }

    fn partial_score(&self, question: &Question, payload: &AnswerPayload, is_correct: bool) -> u64 {
        let AnswerPayload::Pairs { pairs } = payload else {
            return super::binary_score(is_correct);
        };
        percentage(Self::matched(question, pairs), question.options.len())
    }
}

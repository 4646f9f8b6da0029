//! Multiple choice questions: any non-empty set of options is picked
//!
//! An answer is correct only when the picked set equals the set of correct
//! options. Partial credit is proportional to the correct options found,
//! minus a penalty proportional to the incorrect options picked.

use std::collections::HashSet;

use super::{check_known_unique, AnswerError, AnswerPayload, Behavior, Question, QuestionType};
use crate::constants::scoring::{FULL_CORRECTNESS, OVER_SELECTION_PENALTY};

/// Rules for [`QuestionType::MultipleChoice`]
#[derive(Debug, Clone, Copy)]
pub struct MultipleChoice;

impl Behavior for MultipleChoice {
    fn validate(&self, question: &Question, payload: &AnswerPayload) -> Result<(), AnswerError> {
        let AnswerPayload::Selection { option_ids } = payload else {
            return Err(AnswerError::WrongShape {
                expected: QuestionType::MultipleChoice,
            });
        };
        if option_ids.is_empty() {
            return Err(AnswerError::EmptySelection);
        }
        check_known_unique(question, option_ids)
    }

    fn is_correct(&self, question: &Question, payload: &AnswerPayload) -> bool {
        let AnswerPayload::Selection { option_ids } = payload else {
            return false;
        };
        let selected: HashSet<_> = option_ids.iter().copied().collect();
        selected == question.correct_option_ids()
    }

    fn partial_score(&self, question: &Question, payload: &AnswerPayload, is_correct: bool) -> u64 {
        let AnswerPayload::Selection { option_ids } = payload else {
            return super::binary_score(is_correct);
        };

        let correct = question.correct_option_ids();
        if correct.is_empty() {
            return 0;
        }
        let incorrect_total = question.options.len() - correct.len();

        let selected: HashSet<_> = option_ids.iter().copied().collect();
        let hits = selected.intersection(&correct).count();
        let misses = selected.len() - hits;

        let found = hits as f64 / correct.len() as f64 * FULL_CORRECTNESS as f64;
        let penalty = if incorrect_total == 0 {
            0.
        } else {
            misses as f64 / incorrect_total as f64 * OVER_SELECTION_PENALTY
        };

        (found - penalty).max(0.) as u64
    }
}

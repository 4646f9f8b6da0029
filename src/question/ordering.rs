//! Ordering questions: every option is placed into a sequence
//!
//! Each option carries its correct 1-based position. Partial credit is the
//! share of options submitted at their correct position.

use std::collections::HashMap;

use super::{
    check_known_unique, percentage, AnswerError, AnswerPayload, Behavior, Question, QuestionType,
};

/// Rules for [`QuestionType::Ordering`]
#[derive(Debug, Clone, Copy)]
pub struct Ordering;

impl Ordering {
    /// Number of options submitted at their correct 1-based position
    fn placed_correctly(question: &Question, order: &[crate::identity::Id]) -> usize {
        let positions: HashMap<_, _> = question
            .options
            .iter()
            .filter_map(|o| o.correct_position.map(|p| (o.id, p)))
            .collect();
        order
            .iter()
            .enumerate()
            .filter(|(index, id)| positions.get(*id) == Some(&(*index + 1)))
            .count()
    }
}

impl Behavior for Ordering {
    fn validate(&self, question: &Question, payload: &AnswerPayload) -> Result<(), AnswerError> {
        let AnswerPayload::Order { order } = payload else {
            return Err(AnswerError::WrongShape {
                expected: QuestionType::Ordering,
            });
        };
        check_known_unique(question, order)?;
        if order.len() != question.options.len() {
            return Err(AnswerError::IncompleteOrder);
        }
        Ok(())
    }

    fn is_correct(&self, question: &Question, payload: &AnswerPayload) -> bool {
        let AnswerPayload::Order { order } = payload else {
            return false;
        };
        order.len() == question.options.len()
            && Self::placed_correctly(question, order) == question.options.len()
    }

    fn partial_score(&self, question: &Question, payload: &AnswerPayload, is_correct: bool) -> u64 {
        let AnswerPayload::Order { order } = payload else {
            return super::binary_score(is_correct);
        };
        percentage(
            Self::placed_correctly(question, order),
            question.options.len(),
        )
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::question::AnswerOption;

    fn question() -> Question {
        Question::new(QuestionType::Ordering, "Smallest to largest").with_options([
            AnswerOption::new("ant", false).at_position(1),
            AnswerOption::new("cat", false).at_position(2),
            AnswerOption::new("horse", false).at_position(3),
        ])
    }

    fn arrange(q: &Question, indices: &[usize]) -> AnswerPayload {
        AnswerPayload::Order {
            order: indices.iter().map(|&i| q.options[i].id).collect(),
        }
    }

    #[test]
    fn test_ordering_full_and_partial() {
        let q = question();
        let right = arrange(&q, &[0, 1, 2]);
        assert!(Ordering.is_correct(&q, &right));
        assert_eq!(Ordering.partial_score(&q, &right, true), 100);

        // only the first item is in place
        let swapped = arrange(&q, &[0, 2, 1]);
        assert!(!Ordering.is_correct(&q, &swapped));
        assert_eq!(Ordering.partial_score(&q, &swapped, false), 33);

        let reversed = arrange(&q, &[2, 1, 0]);
        assert_eq!(Ordering.partial_score(&q, &reversed, false), 33);

        let rotated = arrange(&q, &[1, 2, 0]);
        assert_eq!(Ordering.partial_score(&q, &rotated, false), 0);
    }

    #[test]
    fn test_ordering_must_cover_every_option() {
        let q = question();
        assert_eq!(
            Ordering.validate(&q, &arrange(&q, &[0, 1])),
            Err(AnswerError::IncompleteOrder)
        );
        assert_eq!(
            Ordering.validate(&q, &arrange(&q, &[0, 1, 1])),
            Err(AnswerError::DuplicateOption(q.options[1].id))
        );
        assert!(Ordering.validate(&q, &arrange(&q, &[2, 0, 1])).is_ok());
    }
}

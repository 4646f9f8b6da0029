//! Single choice questions: exactly one option is picked

use super::{AnswerError, AnswerPayload, Behavior, Question, QuestionType};

/// Rules for [`QuestionType::SingleChoice`]
#[derive(Debug, Clone, Copy)]
pub struct SingleChoice;

impl Behavior for SingleChoice {
    fn validate(&self, question: &Question, payload: &AnswerPayload) -> Result<(), AnswerError> {
        let AnswerPayload::Choice { option_id } = payload else {
            return Err(AnswerError::WrongShape {
                expected: QuestionType::SingleChoice,
            });
        };
        question
            .option(*option_id)
            .map(|_| ())
            .ok_or(AnswerError::UnknownOption(*option_id))
    }

    fn is_correct(&self, question: &Question, payload: &AnswerPayload) -> bool {
        payload
            .option_id()
            .and_then(|id| question.option(id))
            .is_some_and(|option| option.is_correct)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{identity::Id, question::AnswerOption};

    fn question() -> Question {
        Question::new(QuestionType::SingleChoice, "Capital of France?").with_options([
            AnswerOption::new("Paris", true),
            AnswerOption::new("Lyon", false),
        ])
    }

    #[test]
    fn test_single_choice_correctness() {
        let q = question();
        let paris = AnswerPayload::Choice {
            option_id: q.options[0].id,
        };
        let lyon = AnswerPayload::Choice {
            option_id: q.options[1].id,
        };
        assert!(SingleChoice.validate(&q, &paris).is_ok());
        assert!(SingleChoice.is_correct(&q, &paris));
        assert!(!SingleChoice.is_correct(&q, &lyon));
        assert_eq!(SingleChoice.partial_score(&q, &paris, true), 100);
        assert_eq!(SingleChoice.partial_score(&q, &lyon, false), 0);
    }

    #[test]
    fn test_single_choice_rejects_foreign_option() {
        let q = question();
        let stranger = Id::new();
        assert_eq!(
            SingleChoice.validate(
                &q,
                &AnswerPayload::Choice {
                    option_id: stranger
                }
            ),
            Err(AnswerError::UnknownOption(stranger))
        );
    }

    #[test]
    fn test_single_choice_rejects_other_shapes() {
        let q = question();
        assert_eq!(
            SingleChoice.validate(&q, &AnswerPayload::Selection { option_ids: vec![] }),
            Err(AnswerError::WrongShape {
                expected: QuestionType::SingleChoice
            })
        );
    }
}

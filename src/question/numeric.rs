//! Numeric questions: a typed value is accepted within a tolerance window

use super::{AnswerError, AnswerPayload, Behavior, Question, QuestionType};

/// Rules for [`QuestionType::Numeric`]
#[derive(Debug, Clone, Copy)]
pub struct Numeric;

impl Behavior for Numeric {
    fn validate(&self, question: &Question, payload: &AnswerPayload) -> Result<(), AnswerError> {
        let AnswerPayload::Number { value } = payload else {
            return Err(AnswerError::WrongShape {
                expected: QuestionType::Numeric,
            });
        };
        if !value.is_some_and(f64::is_finite) {
            return Err(AnswerError::MissingValue);
        }
        if question.correct_number.is_none() {
            return Err(AnswerError::MissingCorrectNumber);
        }
        Ok(())
    }

    fn is_correct(&self, question: &Question, payload: &AnswerPayload) -> bool {
        let (AnswerPayload::Number { value: Some(value) }, Some(expected)) =
            (payload, question.correct_number)
        else {
            return false;
        };
        (value - expected).abs() <= question.tolerance.unwrap_or(0.)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn number(value: f64) -> AnswerPayload {
        AnswerPayload::Number { value: Some(value) }
    }

    #[test]
    fn test_numeric_tolerance_window() {
        let q = Question::new(QuestionType::Numeric, "Boiling point of water?")
            .with_number(100., Some(2.5));
        assert!(Numeric.is_correct(&q, &number(100.)));
        assert!(Numeric.is_correct(&q, &number(97.5)));
        assert!(Numeric.is_correct(&q, &number(102.5)));
        assert!(!Numeric.is_correct(&q, &number(102.6)));
        assert_eq!(Numeric.partial_score(&q, &number(99.), true), 100);
        assert_eq!(Numeric.partial_score(&q, &number(50.), false), 0);
    }

    #[test]
    fn test_numeric_default_tolerance_is_exact() {
        let q = Question::new(QuestionType::Numeric, "Legs on a spider?").with_number(8., None);
        assert!(Numeric.is_correct(&q, &number(8.)));
        assert!(!Numeric.is_correct(&q, &number(8.001)));
    }

    #[test]
    fn test_numeric_validation() {
        let q = Question::new(QuestionType::Numeric, "Half of five?").with_number(2.5, Some(0.01));
        assert!(Numeric.validate(&q, &number(3.)).is_ok());
        assert_eq!(
            Numeric.validate(&q, &AnswerPayload::Number { value: None }),
            Err(AnswerError::MissingValue)
        );
        assert_eq!(
            Numeric.validate(&q, &number(f64::NAN)),
            Err(AnswerError::MissingValue)
        );

        let unset = Question::new(QuestionType::Numeric, "Unset");
        assert_eq!(
            Numeric.validate(&unset, &number(1.)),
            Err(AnswerError::MissingCorrectNumber)
        );
    }
}

//! Points awarded at reveal time
//!
//! A scored answer earns a correctness component (0 to 100, decided by the
//! question type) plus a speed bonus that depends only on how many answers
//! arrived before it. Scoring is a pure function of its inputs.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    constants::scoring::{MIN_SPEED_BONUS, SPEED_BONUS_STEP},
    identity::Id,
    ledger::Answer,
    question::Question,
};

/// The points assigned to one answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoredAnswer {
    /// The answer row being scored
    pub answer_id: Id,
    /// The participant whose total grows by `score`
    pub participant_id: Id,
    /// Points awarded
    pub score: u64,
}

/// Speed bonus for the answer at `rank` (1-based)
///
/// The first answer earns 10 points per participant; each later rank earns
/// 10 points less, never dropping below 10.
pub fn speed_bonus(rank: usize, participant_count: usize) -> u64 {
    let max_bonus = (participant_count as u64).saturating_mul(SPEED_BONUS_STEP);
    let lost = (rank.saturating_sub(1) as u64).saturating_mul(SPEED_BONUS_STEP);
    max_bonus.saturating_sub(lost).max(MIN_SPEED_BONUS)
}

/// Scores every answer to a question
///
/// # Arguments
///
/// * `answers` - All answers submitted for the question
/// * `participant_count` - Number of participants in the session
/// * `question` - The question being revealed
///
/// # Returns
///
/// One entry per answer, ordered from the earliest to the latest answer.
pub fn score(
    answers: &[Answer],
    participant_count: usize,
    question: &Question,
) -> Vec<ScoredAnswer> {
    answers
        .iter()
        .sorted_by_key(|answer| answer.answered_at)
        .enumerate()
        .map(|(index, answer)| ScoredAnswer {
            answer_id: answer.id,
            participant_id: answer.participant_id,
            score: question.partial_score(&answer.payload, answer.is_correct)
                + speed_bonus(index + 1, participant_count),
        })
        .collect_vec()
}

//! Submitted answers
//!
//! Each participant has at most one answer per question. Submitting again
//! while the question is open overwrites the previous answer, so the last
//! submission before the reveal is the one that gets scored.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tracing::debug;
use web_time::SystemTime;

use crate::{
    catalog::Catalog,
    engine::Engine,
    error::{Error, Result, StoreError},
    identity::{Id, Identity},
    question::AnswerPayload,
    session::{ParticipantResult, Status},
    store::Store,
};

/// One participant's answer to one question of a session
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Unique identifier of the answer row
    pub id: Id,
    /// The session answered in
    pub session_id: Id,
    /// Who answered
    pub participant_id: Id,
    /// The question answered
    pub question_id: Id,
    /// The submitted value
    pub payload: AnswerPayload,
    /// The picked option, for single choice answers
    pub option_id: Option<Id>,
    /// Whether the answer was fully correct when submitted
    pub is_correct: bool,
    /// Points awarded at reveal, 0 before
    pub score: u64,
    /// When the answer was last submitted
    pub answered_at: SystemTime,
}

impl<S: Store, C: Catalog> Engine<S, C> {
    /// Records a participant's answer to the open question
    ///
    /// # Returns
    ///
    /// The stored answer, with its correctness already decided.
    ///
    /// # Errors
    ///
    /// * `Error::SessionNotFound` - Unknown session
    /// * `Error::SessionNotAcceptingAnswers` - No question is open
    /// * `Error::ParticipantNotFound` - The identity has not joined
    /// * `Error::Answer` - The payload does not fit the question
    #[tracing::instrument(skip(self, identity, payload), fields(%identity))]
    pub fn submit_answer(
        &self,
        session_id: Id,
        identity: &Identity,
        payload: AnswerPayload,
    ) -> Result<Answer> {
        self.serialized(session_id, || {
            let session = self.load_session(session_id)?;
            if session.status != Status::Question {
                return Err(Error::SessionNotAcceptingAnswers);
            }
            let participant = self
                .store
                .participant_by_identity(session_id, identity)?
                .ok_or(Error::ParticipantNotFound)?;
            let question_id = session
                .current_question_id()
                .ok_or(Error::InvalidQuestionState)?;
            let question = self
                .catalog
                .question(question_id)?
                .ok_or(Error::QuestionNotFound)?;

            let is_correct = question.evaluate(&payload)?;
            let answer = self
                .store
                .upsert_answer(Answer {
                    id: Id::new(),
                    session_id,
                    participant_id: participant.id,
                    question_id,
                    option_id: payload.option_id(),
                    payload,
                    is_correct,
                    score: 0,
                    answered_at: SystemTime::now(),
                })
                .map_err(|e| match e {
                    StoreError::Conflict => Error::SessionNotAcceptingAnswers,
                    e => e.into(),
                })?;
            debug!(
                %session_id,
                participant_id = %participant.id,
                %question_id,
                is_correct,
                "answer recorded"
            );
            Ok(answer)
        })
    }

    /// Reports a participant's outcome for the current question
    ///
    /// Before the reveal only the running total is known. After it, the
    /// scored answer is reported, or `answered: false` if there is none.
    ///
    /// # Errors
    ///
    /// * `Error::SessionNotFound` - Unknown session
    /// * `Error::ParticipantNotFound` - The identity has not joined
    pub fn participant_result(
        &self,
        session_id: Id,
        identity: &Identity,
    ) -> Result<ParticipantResult> {
        let session = self.load_session(session_id)?;
        let participant = self
            .store
            .participant_by_identity(session_id, identity)?
            .ok_or(Error::ParticipantNotFound)?;

        let Some(question_id) = session
            .current_question_id()
            .filter(|_| session.status.shows_answers())
        else {
            return Ok(ParticipantResult::unanswered(participant.total_score));
        };

        Ok(
            match self.store.answer(session_id, participant.id, question_id)? {
                Some(answer) => ParticipantResult {
                    answered: true,
                    option_id: answer.option_id,
                    is_correct: Some(answer.is_correct),
                    score: Some(answer.score),
                    total_score: participant.total_score,
                },
                None => ParticipantResult::unanswered(participant.total_score),
            },
        )
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::{
        sync::{Barrier, mpsc},
        thread,
        time::Duration,
    };

    use itertools::Itertools;

    use super::*;
    use crate::{
        engine::tests::{fixture, single_choice, web},
        question::AnswerError,
        room::RoomMode,
    };

    fn pick(question: &crate::question::Question, index: usize) -> AnswerPayload {
        AnswerPayload::Choice {
            option_id: question.options[index].id,
        }
    }

    #[test]
    fn test_answers_only_while_question_open() {
        let f = fixture(vec![single_choice("q")], RoomMode::Web);
        f.engine.join_room(f.room.code, web("p"), "P").unwrap();
        let s = f.engine.create_session(f.quiz, f.room.id, f.host).unwrap();
        let q = &f.questions[0];

        assert_eq!(
            f.engine.submit_answer(s.id, &web("p"), pick(q, 0)),
            Err(Error::SessionNotAcceptingAnswers)
        );
        f.engine.start(s.id, f.host).unwrap();
        assert!(f.engine.submit_answer(s.id, &web("p"), pick(q, 0)).is_ok());
        f.engine.reveal(s.id, f.host).unwrap();
        assert_eq!(
            f.engine.submit_answer(s.id, &web("p"), pick(q, 1)),
            Err(Error::SessionNotAcceptingAnswers)
        );
    }

    #[test]
    fn test_unknown_participant_rejected() {
        let f = fixture(vec![single_choice("q")], RoomMode::Web);
        let s = f.engine.create_session(f.quiz, f.room.id, f.host).unwrap();
        f.engine.start(s.id, f.host).unwrap();
        assert_eq!(
            f.engine
                .submit_answer(s.id, &web("ghost"), pick(&f.questions[0], 0)),
            Err(Error::ParticipantNotFound)
        );
    }

    #[test]
    fn test_payload_validated_against_current_question() {
        let f = fixture(vec![single_choice("q")], RoomMode::Web);
        f.engine.join_room(f.room.code, web("p"), "P").unwrap();
        let s = f.engine.create_session(f.quiz, f.room.id, f.host).unwrap();
        f.engine.start(s.id, f.host).unwrap();

        let stranger = Id::new();
        assert_eq!(
            f.engine.submit_answer(
                s.id,
                &web("p"),
                AnswerPayload::Choice {
                    option_id: stranger
                }
            ),
            Err(Error::Answer(AnswerError::UnknownOption(stranger)))
        );
        assert_eq!(f.engine.state(s.id).unwrap().answer_count, 0);
    }

    #[test]
    fn test_resubmission_overwrites() {
        let f = fixture(vec![single_choice("q")], RoomMode::Web);
        f.engine.join_room(f.room.code, web("p"), "P").unwrap();
        let s = f.engine.create_session(f.quiz, f.room.id, f.host).unwrap();
        f.engine.start(s.id, f.host).unwrap();
        let q = &f.questions[0];

        let first = f.engine.submit_answer(s.id, &web("p"), pick(q, 0)).unwrap();
        assert!(first.is_correct);
        let second = f.engine.submit_answer(s.id, &web("p"), pick(q, 1)).unwrap();
        assert!(!second.is_correct);
        assert_eq!(second.id, first.id);
        assert_eq!(f.engine.state(s.id).unwrap().answer_count, 1);

        f.engine.reveal(s.id, f.host).unwrap();
        let result = f.engine.participant_result(s.id, &web("p")).unwrap();
        assert_eq!(result.is_correct, Some(false));
        assert_eq!(result.score, Some(10));
        assert_eq!(result.option_id, Some(q.options[1].id));
    }

    #[test]
    fn test_participant_result_before_and_after_reveal() {
        let f = fixture(vec![single_choice("q")], RoomMode::Web);
        f.engine.join_room(f.room.code, web("p"), "P").unwrap();
        f.engine.join_room(f.room.code, web("idle"), "Idle").unwrap();
        let s = f.engine.create_session(f.quiz, f.room.id, f.host).unwrap();
        f.engine.start(s.id, f.host).unwrap();
        f.engine
            .submit_answer(s.id, &web("p"), pick(&f.questions[0], 0))
            .unwrap();

        let before = f.engine.participant_result(s.id, &web("p")).unwrap();
        assert_eq!(before, ParticipantResult::unanswered(0));

        f.engine.reveal(s.id, f.host).unwrap();
        let after = f.engine.participant_result(s.id, &web("p")).unwrap();
        assert!(after.answered);
        assert_eq!(after.score, Some(120));
        assert_eq!(after.total_score, 120);

        let idle = f.engine.participant_result(s.id, &web("idle")).unwrap();
        assert_eq!(idle, ParticipantResult::unanswered(0));

        f.engine.next_question(s.id, f.host).unwrap();
        let finished = f.engine.participant_result(s.id, &web("p")).unwrap();
        assert_eq!(finished.score, Some(120));
    }

    #[test]
    fn test_room_close_waits_for_running_submission() {
        let f = fixture(vec![single_choice("q")], RoomMode::Web);
        let s = f.engine.create_session(f.quiz, f.room.id, f.host).unwrap();
        f.engine.start(s.id, f.host).unwrap();
        let (entered, inside) = mpsc::channel();

        let seen_inside = thread::scope(|scope| {
            let submission = scope.spawn(|| {
                f.engine.serialized(s.id, || {
                    entered.send(()).unwrap();
                    thread::sleep(Duration::from_millis(50));
                    Ok(f.engine.load_session(s.id)?.status)
                })
            });
            inside.recv().unwrap();
            let closed = f.engine.close_room(f.room.id, f.host).unwrap();
            assert_eq!(closed.finished_sessions, vec![s.id]);
            submission.join().unwrap()
        });

        assert_eq!(seen_inside, Ok(Status::Question));
        assert_eq!(f.engine.state(s.id).unwrap().status, Status::Finished);
    }

    #[test]
    fn test_no_answer_lands_after_room_close() {
        let f = fixture(vec![single_choice("q")], RoomMode::Web);
        let players = (0..8).map(|i| format!("p{i}")).collect_vec();
        for token in &players {
            f.engine.join_room(f.room.code, web(token), token).unwrap();
        }
        let s = f.engine.create_session(f.quiz, f.room.id, f.host).unwrap();
        f.engine.start(s.id, f.host).unwrap();
        let session_id = s.id;
        let q = &f.questions[0];
        let barrier = Barrier::new(players.len() + 1);

        let accepted = thread::scope(|scope| {
            let submitters = players
                .iter()
                .map(|token| {
                    let barrier = &barrier;
                    let engine = &f.engine;
                    scope.spawn(move || {
                        barrier.wait();
                        engine.submit_answer(session_id, &web(token), pick(q, 0))
                    })
                })
                .collect_vec();
            barrier.wait();
            f.engine.close_room(f.room.id, f.host).unwrap();
            submitters
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|result| match result {
                    Ok(_) => true,
                    Err(e) => {
                        assert_eq!(e, &Error::SessionNotAcceptingAnswers);
                        false
                    }
                })
                .count()
        });

        assert_eq!(f.engine.state(s.id).unwrap().answer_count, accepted);
        assert_eq!(
            f.engine.submit_answer(s.id, &web("p0"), pick(q, 1)),
            Err(Error::SessionNotAcceptingAnswers)
        );
    }

    #[test]
    fn test_concurrent_resubmissions_keep_one_row() {
        let f = fixture(vec![single_choice("q")], RoomMode::Web);
        f.engine.join_room(f.room.code, web("p"), "P").unwrap();
        let s = f.engine.create_session(f.quiz, f.room.id, f.host).unwrap();
        f.engine.start(s.id, f.host).unwrap();
        let session_id = s.id;
        let q = &f.questions[0];
        let barrier = Barrier::new(8);

        let ids = thread::scope(|scope| {
            (0..8)
                .map(|i| {
                    let barrier = &barrier;
                    let engine = &f.engine;
                    scope.spawn(move || {
                        barrier.wait();
                        engine
                            .submit_answer(session_id, &web("p"), pick(q, i % 2))
                            .unwrap()
                            .id
                    })
                })
                .collect_vec()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect_vec()
        });

        assert!(ids.iter().all_equal());
        assert_eq!(f.engine.state(s.id).unwrap().answer_count, 1);
    }

    #[test]
    fn test_reveal_racing_submissions_scores_every_stored_answer() {
        let f = fixture(vec![single_choice("q")], RoomMode::Web);
        let players = (0..8).map(|i| format!("p{i}")).collect_vec();
        for token in &players {
            f.engine.join_room(f.room.code, web(token), token).unwrap();
        }
        let s = f.engine.create_session(f.quiz, f.room.id, f.host).unwrap();
        f.engine.start(s.id, f.host).unwrap();
        let session_id = s.id;
        let q = &f.questions[0];
        let barrier = Barrier::new(players.len() + 1);

        thread::scope(|scope| {
            for token in &players {
                let barrier = &barrier;
                let engine = &f.engine;
                scope.spawn(move || {
                    barrier.wait();
                    let result = engine.submit_answer(session_id, &web(token), pick(q, 0));
                    assert!(matches!(
                        result,
                        Ok(_) | Err(Error::SessionNotAcceptingAnswers)
                    ));
                });
            }
            barrier.wait();
            f.engine.reveal(s.id, f.host).unwrap();
        });

        let state = f.engine.state(s.id).unwrap();
        let stored = f.engine.store().answers_for_question(s.id, q.id).unwrap();
        assert_eq!(stored.len(), state.answer_count);
        for answer in &stored {
            assert!(answer.score > 0);
            let participant = state
                .participants
                .iter()
                .find(|p| p.id == answer.participant_id)
                .unwrap();
            assert_eq!(participant.total_score, answer.score);
        }
        let scored = state.participants.iter().filter(|p| p.total_score > 0).count();
        assert_eq!(scored, stored.len());
    }

    #[test]
    fn test_locks_released_after_rejected_submission() {
        let f = fixture(vec![single_choice("q")], RoomMode::Web);
        f.engine.join_room(f.room.code, web("p"), "P").unwrap();
        let s = f.engine.create_session(f.quiz, f.room.id, f.host).unwrap();
        f.engine.finish(s.id, f.host).unwrap();

        for _ in 0..3 {
            assert_eq!(
                f.engine.submit_answer(s.id, &web("p"), pick(&f.questions[0], 0)),
                Err(Error::SessionNotAcceptingAnswers)
            );
        }
        assert_eq!(
            f.engine.submit_answer(Id::new(), &web("p"), pick(&f.questions[0], 0)),
            Err(Error::SessionNotFound)
        );
        assert_eq!(f.engine.locks_in_use(), 0);
    }
}

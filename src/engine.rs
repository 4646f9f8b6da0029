//! The session state machine
//!
//! [`Engine`] owns the store, the catalog and the runtime options, and
//! exposes every operation of the system as a method. Sessions move
//! `waiting → question → revealed → question → … → finished`; `finished`
//! can also be forced from any other state.
//!
//! Mutating operations on one session (or, for session creation and
//! membership, one room) are serialized through a registry of per-key
//! locks. Reads never take these locks.
//!
//! The room, roster, ledger and leaderboard operations live next to their
//! entity types in their own modules as further `impl Engine` blocks.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use itertools::Itertools;
use web_time::SystemTime;

use crate::{
    catalog::Catalog,
    config::Options,
    error::{Error, Result, StoreError},
    identity::Id,
    join_code::JoinCode,
    roster::Participant,
    scoring,
    session::{ParticipantView, QuestionView, Session, SessionState, SessionSummary, Status},
    store::{RevealOutcome, Store},
};

/// A registry of per-key locks
///
/// An entry only lives while someone holds or waits for it, so the map
/// never outgrows the number of operations in flight.
#[derive(Debug, Default)]
struct Locks {
    inner: Mutex<HashMap<Id, Arc<Mutex<()>>>>,
}

impl Locks {
    fn entries(&self) -> MutexGuard<'_, HashMap<Id, Arc<Mutex<()>>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, key: Id) -> Held<'_> {
        let lock = self.entries().entry(key).or_default().clone();
        Held {
            locks: self,
            key,
            lock,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries().len()
    }
}

/// A claim on one entry of [`Locks`], released on drop
struct Held<'a> {
    locks: &'a Locks,
    key: Id,
    lock: Arc<Mutex<()>>,
}

impl Held<'_> {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Held<'_> {
    fn drop(&mut self) {
        let mut entries = self.locks.entries();
        // the map and this claim are the only owners left
        if entries
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 2)
        {
            entries.remove(&self.key);
        }
    }
}

/// The quiz room engine
///
/// Generic over its [`Store`] and [`Catalog`] so deployments can plug in
/// their own persistence.
#[derive(Debug)]
pub struct Engine<S, C> {
    pub(crate) store: S,
    pub(crate) catalog: C,
    pub(crate) options: Options,
    locks: Locks,
}

impl<S: Store, C: Catalog> Engine<S, C> {
    /// Creates an engine
    ///
    /// # Errors
    ///
    /// Returns the validation report if `options` are out of range.
    pub fn new(store: S, catalog: C, options: Options) -> Result<Self, garde::Report> {
        garde::Validate::validate(&options)?;
        Ok(Self {
            store,
            catalog,
            options,
            locks: Locks::default(),
        })
    }

    /// The store the engine writes to
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The catalog questions are read from
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// The runtime options
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Runs `f` while holding the lock for `key`
    pub(crate) fn serialized<T>(&self, key: Id, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let held = self.locks.acquire(key);
        let _guard = held.lock();
        f()
    }

    /// Finishes every unfinished session of a room
    ///
    /// Must run under the room lock so no session can be created in the
    /// meantime. Each session's own lock is taken too, so an operation
    /// already running on it completes before the session ends.
    pub(crate) fn finish_room_sessions(&self, room_id: Id) -> Result<Vec<Id>> {
        let held = self
            .store
            .sessions_in_room(room_id)?
            .into_iter()
            .filter(|s| s.status.is_active())
            .map(|s| s.id)
            .sorted()
            .map(|id| self.locks.acquire(id))
            .collect_vec();
        let _guards = held.iter().map(Held::lock).collect_vec();
        Ok(self.store.finish_active_in_room(room_id)?)
    }

    /// Number of lock entries currently in use
    #[cfg(test)]
    pub(crate) fn locks_in_use(&self) -> usize {
        self.locks.len()
    }

    pub(crate) fn load_session(&self, session_id: Id) -> Result<Session> {
        self.store
            .session(session_id)?
            .ok_or(Error::SessionNotFound)
    }

    fn authorize(session: &Session, actor: Id) -> Result<()> {
        if session.host_id == actor {
            Ok(())
        } else {
            Err(Error::NotHost)
        }
    }

    /// Creates a session for a quiz inside a room
    ///
    /// Any other unfinished session of the room is finished first, and
    /// every current member of the room becomes a participant.
    ///
    /// # Errors
    ///
    /// * `Error::RoomNotFound` / `Error::QuizNotFound` - Unknown room or quiz
    /// * `Error::NotHost` - `host_id` owns neither the room nor the quiz
    /// * `Error::RoomClosed` - The room was closed
    /// * `Error::EmptyQuiz` - No question of the quiz is eligible in this room
    /// * `Error::CodesExhausted` - No free session code was found
    #[tracing::instrument(skip(self))]
    pub fn create_session(&self, quiz_id: Id, room_id: Id, host_id: Id) -> Result<Session> {
        self.serialized(room_id, || {
            let room = self.store.room(room_id)?.ok_or(Error::RoomNotFound)?;
            if room.host_id != host_id {
                return Err(Error::NotHost);
            }
            if !room.is_open() {
                return Err(Error::RoomClosed);
            }
            let quiz = self.catalog.quiz(quiz_id)?.ok_or(Error::QuizNotFound)?;
            if quiz.host_id != host_id {
                return Err(Error::NotHost);
            }

            let question_ids = self
                .catalog
                .questions(quiz_id)?
                .into_iter()
                .filter(|q| room.mode.allows(q.kind, &self.options))
                .map(|q| q.id)
                .collect_vec();
            if question_ids.is_empty() {
                return Err(Error::EmptyQuiz);
            }

            for finished in self.finish_room_sessions(room_id)? {
                tracing::info!(session_id = %finished, "session finished by a newer session");
            }

            let code = JoinCode::generate_unique(|code| {
                Ok::<_, Error>(self.store.session_code_in_use(code)?)
            })?;
            let session = Session {
                id: Id::new(),
                quiz_id,
                room_id,
                host_id,
                code,
                status: Status::Waiting,
                current_question: 0,
                question_ids,
                created_at: SystemTime::now(),
            };
            let participants = self
                .store
                .members(room_id)?
                .into_iter()
                .map(|member| Participant::for_member(session.id, &member))
                .collect_vec();
            let enrolled = participants.len();
            self.store.insert_session(session.clone(), participants)?;

            tracing::info!(
                session_id = %session.id,
                code = %session.code,
                questions = session.total_questions(),
                participants = enrolled,
                "session created"
            );
            Ok(session)
        })
    }

    /// Opens the first question
    ///
    /// # Errors
    ///
    /// * `Error::NotHost` - `actor` does not own the session
    /// * `Error::AlreadyStarted` - The session is not waiting
    #[tracing::instrument(skip(self))]
    pub fn start(&self, session_id: Id, actor: Id) -> Result<Session> {
        self.serialized(session_id, || {
            let session = self.load_session(session_id)?;
            Self::authorize(&session, actor)?;
            self.open_first_question(session)
        })
    }

    fn open_first_question(&self, mut session: Session) -> Result<Session> {
        if session.status != Status::Waiting {
            return Err(Error::AlreadyStarted);
        }
        session.current_question = 1;
        session.status = Status::Question;
        self.store
            .update_session(&session, Status::Waiting)
            .map_err(|e| match e {
                StoreError::Conflict => Error::AlreadyStarted,
                e => e.into(),
            })?;
        Self::log_transition(&session);
        Ok(session)
    }

    /// Closes the current question and scores its answers
    ///
    /// Scores, participant totals and the status change are written as one
    /// unit; if that fails nothing is applied and the call can be retried.
    ///
    /// # Errors
    ///
    /// * `Error::NotHost` - `actor` does not own the session
    /// * `Error::NoActiveQuestion` - No question is open
    /// * `Error::Store` - The score batch could not be written
    #[tracing::instrument(skip(self))]
    pub fn reveal(&self, session_id: Id, actor: Id) -> Result<Session> {
        self.serialized(session_id, || {
            let session = self.load_session(session_id)?;
            Self::authorize(&session, actor)?;
            if session.status != Status::Question {
                return Err(Error::NoActiveQuestion);
            }
            let question_id = session
                .current_question_id()
                .ok_or(Error::InvalidQuestionState)?;
            let question = self
                .catalog
                .question(question_id)?
                .ok_or(Error::QuestionNotFound)?;

            let answers = self.store.answers_for_question(session_id, question_id)?;
            let participant_count = self.store.participant_count(session_id)?;
            let scores = scoring::score(&answers, participant_count, &question);

            match self.store.apply_reveal(session_id, question_id, &scores) {
                Ok(RevealOutcome::Applied) => {}
                Ok(RevealOutcome::AlreadyApplied) => {
                    tracing::debug!(%session_id, %question_id, "scores were already applied");
                }
                Err(StoreError::Conflict) => return Err(Error::NoActiveQuestion),
                Err(e) => return Err(e.into()),
            }

            let session = self.load_session(session_id)?;
            tracing::debug!(%session_id, answers = scores.len(), "answers scored");
            Self::log_transition(&session);
            Ok(session)
        })
    }

    /// Moves on from a revealed question
    ///
    /// Starts the session when it is still waiting. Finishes it when the
    /// revealed question was the last one.
    ///
    /// # Errors
    ///
    /// * `Error::NotHost` - `actor` does not own the session
    /// * `Error::MustRevealFirst` - The current question is still open
    /// * `Error::AlreadyFinished` - The session is over
    #[tracing::instrument(skip(self))]
    pub fn next_question(&self, session_id: Id, actor: Id) -> Result<Session> {
        self.serialized(session_id, || {
            let mut session = self.load_session(session_id)?;
            Self::authorize(&session, actor)?;
            match session.status {
                Status::Waiting => return self.open_first_question(session),
                Status::Question => return Err(Error::MustRevealFirst),
                Status::Finished => return Err(Error::AlreadyFinished),
                Status::Revealed => {}
            }

            if session.on_last_question() {
                session.status = Status::Finished;
            } else {
                session.current_question += 1;
                session.status = Status::Question;
            }
            self.store
                .update_session(&session, Status::Revealed)
                .map_err(|e| self.lost_race(session_id, e))?;
            Self::log_transition(&session);
            Ok(session)
        })
    }

    /// Ends the session regardless of its progress
    ///
    /// # Errors
    ///
    /// * `Error::NotHost` - `actor` does not own the session
    /// * `Error::AlreadyFinished` - The session is over
    #[tracing::instrument(skip(self))]
    pub fn finish(&self, session_id: Id, actor: Id) -> Result<Session> {
        self.serialized(session_id, || {
            let mut session = self.load_session(session_id)?;
            Self::authorize(&session, actor)?;
            if session.status == Status::Finished {
                return Err(Error::AlreadyFinished);
            }
            let previous = session.status;
            session.status = Status::Finished;
            self.store
                .update_session(&session, previous)
                .map_err(|e| self.lost_race(session_id, e))?;
            Self::log_transition(&session);
            Ok(session)
        })
    }

    /// Turns a lost conditional write into the error for the state the
    /// session actually reached
    fn lost_race(&self, session_id: Id, error: StoreError) -> Error {
        if error != StoreError::Conflict {
            return error.into();
        }
        match self.load_session(session_id) {
            Ok(session) => match session.status {
                Status::Finished => Error::AlreadyFinished,
                Status::Question => Error::MustRevealFirst,
                Status::Waiting | Status::Revealed => Error::NoActiveQuestion,
            },
            Err(e) => e,
        }
    }

    fn log_transition(session: &Session) {
        tracing::info!(
            session_id = %session.id,
            status = %session.status,
            current_question = session.current_question,
            total_questions = session.total_questions(),
            "session transitioned"
        );
    }

    /// Builds a read-only snapshot of a session
    ///
    /// Correctness metadata of the current question is only included once
    /// it has been revealed.
    ///
    /// # Errors
    ///
    /// * `Error::SessionNotFound` - Unknown session
    /// * `Error::QuestionNotFound` - The current question left the catalog
    pub fn state(&self, session_id: Id) -> Result<SessionState> {
        let session = self.load_session(session_id)?;
        let quiz_title = self
            .catalog
            .quiz(session.quiz_id)?
            .map(|quiz| quiz.title)
            .unwrap_or_default();

        let (question, answer_count) = match session.current_question_id() {
            Some(question_id) if session.status != Status::Waiting => {
                let question = self
                    .catalog
                    .question(question_id)?
                    .ok_or(Error::QuestionNotFound)?;
                (
                    Some(QuestionView::new(&question, session.status.shows_answers())),
                    self.store.answer_count(session_id, question_id)?,
                )
            }
            _ => (None, 0),
        };

        let participants = self
            .store
            .participants(session_id)?
            .into_iter()
            .sorted_by(|a, b| b.total_score.cmp(&a.total_score))
            .map(|p| ParticipantView {
                id: p.id,
                nickname: p.nickname,
                total_score: p.total_score,
            })
            .collect_vec();

        Ok(SessionState {
            session_id,
            room_id: session.room_id,
            code: session.code,
            quiz_title,
            status: session.status,
            current_question: session.current_question,
            total_questions: session.total_questions(),
            question,
            participants,
            answer_count,
        })
    }

    /// Looks up an unfinished session by its join code
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` if no unfinished session uses the code.
    pub fn session_by_code(&self, code: JoinCode) -> Result<Session> {
        self.store
            .session_by_code(code)?
            .ok_or(Error::SessionNotFound)
    }

    /// Lists a host's unfinished sessions, newest first
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store fails.
    pub fn active_sessions(&self, host_id: Id) -> Result<Vec<SessionSummary>> {
        self.summaries(host_id, true)
    }

    /// Lists all of a host's sessions, newest first
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store fails.
    pub fn sessions(&self, host_id: Id) -> Result<Vec<SessionSummary>> {
        self.summaries(host_id, false)
    }

    fn summaries(&self, host_id: Id, active_only: bool) -> Result<Vec<SessionSummary>> {
        self.store
            .sessions_by_host(host_id)?
            .into_iter()
            .filter(|s| !active_only || s.status.is_active())
            .map(|s| {
                Ok(SessionSummary {
                    quiz_title: self
                        .catalog
                        .quiz(s.quiz_id)?
                        .map(|quiz| quiz.title)
                        .unwrap_or_default(),
                    participant_count: self.store.participant_count(s.id)?,
                    id: s.id,
                    code: s.code,
                    status: s.status,
                    created_at: s.created_at,
                })
            })
            .collect()
    }
}

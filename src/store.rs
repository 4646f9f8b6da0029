//! Persistence contract and an in-memory implementation
//!
//! The state machine never talks to a database directly; it goes through
//! the [`Store`] trait. Implementations must provide natural-key lookups
//! (session by code, participant by identity, answer by its triple),
//! counts, a conditional session update and one transactional primitive,
//! [`Store::apply_reveal`], which assigns scores, bumps totals and marks the
//! session revealed as a single unit.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use itertools::Itertools;

use crate::{
    error::StoreError,
    identity::{Id, Identity},
    join_code::JoinCode,
    ledger::Answer,
    room::{Member, Room, RoomStatus},
    roster::Participant,
    scoring::ScoredAnswer,
    session::{Session, Status},
};

/// What [`Store::apply_reveal`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Scores were written and the session moved to revealed
    Applied,
    /// Scores for this (session, question) were written before; nothing changed
    AlreadyApplied,
}

/// Persistence operations needed by the engine
///
/// Lists are returned in insertion order unless stated otherwise.
pub trait Store: Send + Sync {
    /// Inserts a room; fails with `Duplicate` if an active room uses the code
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    fn insert_room(&self, room: Room) -> Result<(), StoreError>;

    /// Overwrites a room
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    fn update_room(&self, room: &Room) -> Result<(), StoreError>;

    /// Looks up a room by id
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn room(&self, room_id: Id) -> Result<Option<Room>, StoreError>;

    /// Looks up an active room by code
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn room_by_code(&self, code: JoinCode) -> Result<Option<Room>, StoreError>;

    /// Inserts a member; fails with `Duplicate` if the identity is already in the room
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    fn insert_member(&self, member: Member) -> Result<(), StoreError>;

    /// Overwrites a member
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    fn update_member(&self, member: &Member) -> Result<(), StoreError>;

    /// Looks up a member by id
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn member(&self, member_id: Id) -> Result<Option<Member>, StoreError>;

    /// Looks up a room member by identity
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn member_by_identity(
        &self,
        room_id: Id,
        identity: &Identity,
    ) -> Result<Option<Member>, StoreError>;

    /// Lists the members of a room in join order
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn members(&self, room_id: Id) -> Result<Vec<Member>, StoreError>;

    /// Inserts a session together with its initial participants
    ///
    /// Fails with `Duplicate` if another non-finished session uses the code.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails; nothing is written then.
    fn insert_session(
        &self,
        session: Session,
        participants: Vec<Participant>,
    ) -> Result<(), StoreError>;

    /// Overwrites a session if its stored status is still `expected`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the status changed in between.
    fn update_session(&self, session: &Session, expected: Status) -> Result<(), StoreError>;

    /// Looks up a session by id
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn session(&self, session_id: Id) -> Result<Option<Session>, StoreError>;

    /// Looks up a non-finished session by code
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn session_by_code(&self, code: JoinCode) -> Result<Option<Session>, StoreError>;

    /// Returns whether a non-finished session uses the code
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn session_code_in_use(&self, code: JoinCode) -> Result<bool, StoreError>;

    /// Moves every non-finished session of the room to finished
    ///
    /// # Returns
    ///
    /// The ids of the sessions that were finished.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    fn finish_active_in_room(&self, room_id: Id) -> Result<Vec<Id>, StoreError>;

    /// Lists the sessions of a room, newest first
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn sessions_in_room(&self, room_id: Id) -> Result<Vec<Session>, StoreError>;

    /// Lists the sessions of a host, newest first
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn sessions_by_host(&self, host_id: Id) -> Result<Vec<Session>, StoreError>;

    /// Inserts a participant; fails with `Duplicate` if the identity already joined
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    fn insert_participant(&self, participant: Participant) -> Result<(), StoreError>;

    /// Overwrites a participant's profile (the score is left untouched)
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    fn update_participant(&self, participant: &Participant) -> Result<(), StoreError>;

    /// Looks up a session participant by identity
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn participant_by_identity(
        &self,
        session_id: Id,
        identity: &Identity,
    ) -> Result<Option<Participant>, StoreError>;

    /// Lists the participants of a session in join order
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn participants(&self, session_id: Id) -> Result<Vec<Participant>, StoreError>;

    /// Counts the participants of a session
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn participant_count(&self, session_id: Id) -> Result<usize, StoreError>;

    /// Inserts or overwrites the answer for its (session, participant, question)
    ///
    /// An overwrite keeps the id of the existing row. Nothing is written
    /// unless the session is still open on the answer's question.
    ///
    /// # Returns
    ///
    /// The stored answer.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the question is no longer open, or
    /// another [`StoreError`] if the write fails.
    fn upsert_answer(&self, answer: Answer) -> Result<Answer, StoreError>;

    /// Looks up the answer of a participant for a question
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn answer(
        &self,
        session_id: Id,
        participant_id: Id,
        question_id: Id,
    ) -> Result<Option<Answer>, StoreError>;

    /// Lists the answers for a question, earliest first
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn answers_for_question(
        &self,
        session_id: Id,
        question_id: Id,
    ) -> Result<Vec<Answer>, StoreError>;

    /// Counts the answers for a question
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn answer_count(&self, session_id: Id, question_id: Id) -> Result<usize, StoreError>;

    /// Applies the scores of a reveal as one unit
    ///
    /// Writes every answer's score, adds it to the participant's total and
    /// moves the session to revealed. Nothing is written unless the session
    /// is still open on `question_id`. Repeating the call for the same
    /// (session, question) changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the session is not open on the
    /// question, or another [`StoreError`] if the write fails.
    fn apply_reveal(
        &self,
        session_id: Id,
        question_id: Id,
        scores: &[ScoredAnswer],
    ) -> Result<RevealOutcome, StoreError>;
}

type AnswerKey = (Id, Id, Id);

#[derive(Debug, Clone)]
struct StoredAnswer {
    answer: Answer,
    seq: u64,
}

#[derive(Debug, Default)]
struct Tables {
    rooms: Vec<Room>,
    members: Vec<Member>,
    sessions: Vec<Session>,
    participants: Vec<Participant>,
    answers: HashMap<AnswerKey, StoredAnswer>,
    revealed: HashSet<(Id, Id)>,
    seq: u64,
}

impl Tables {
    fn session_mut(&mut self, session_id: Id) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    fn is_open_on(&self, session_id: Id, question_id: Id) -> bool {
        self.sessions.iter().any(|s| {
            s.id == session_id
                && s.status == Status::Question
                && s.current_question_id() == Some(question_id)
        })
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// A complete [`Store`] kept in process memory
///
/// All tables sit behind one mutex, so every trait method is atomic.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: Mutex::default(),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: while unavailable every write fails
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writable(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(self.tables())
        } else {
            Err(StoreError::Unavailable("store is offline".to_owned()))
        }
    }
}

fn newest_first(sessions: impl Iterator<Item = Session>) -> Vec<Session> {
    // later inserts win ties on equal timestamps
    sessions
        .enumerate()
        .sorted_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)))
        .map(|(_, s)| s)
        .collect_vec()
}

impl Store for MemoryStore {
    fn insert_room(&self, room: Room) -> Result<(), StoreError> {
        let mut tables = self.writable()?;
        if tables
            .rooms
            .iter()
            .any(|r| r.id == room.id || (r.status == RoomStatus::Active && r.code == room.code))
        {
            return Err(StoreError::Duplicate);
        }
        tables.rooms.push(room);
        Ok(())
    }

    fn update_room(&self, room: &Room) -> Result<(), StoreError> {
        let mut tables = self.writable()?;
        let stored = tables
            .rooms
            .iter_mut()
            .find(|r| r.id == room.id)
            .ok_or(StoreError::Conflict)?;
        *stored = room.clone();
        Ok(())
    }

    fn room(&self, room_id: Id) -> Result<Option<Room>, StoreError> {
        Ok(self.tables().rooms.iter().find(|r| r.id == room_id).cloned())
    }

    fn room_by_code(&self, code: JoinCode) -> Result<Option<Room>, StoreError> {
        Ok(self
            .tables()
            .rooms
            .iter()
            .find(|r| r.status == RoomStatus::Active && r.code == code)
            .cloned())
    }

    fn insert_member(&self, member: Member) -> Result<(), StoreError> {
        let mut tables = self.writable()?;
        if tables.members.iter().any(|m| {
            m.id == member.id || (m.room_id == member.room_id && m.identity == member.identity)
        }) {
            return Err(StoreError::Duplicate);
        }
        tables.members.push(member);
        Ok(())
    }

    fn update_member(&self, member: &Member) -> Result<(), StoreError> {
        let mut tables = self.writable()?;
        let stored = tables
            .members
            .iter_mut()
            .find(|m| m.id == member.id)
            .ok_or(StoreError::Conflict)?;
        *stored = member.clone();
        Ok(())
    }

    fn member(&self, member_id: Id) -> Result<Option<Member>, StoreError> {
        Ok(self
            .tables()
            .members
            .iter()
            .find(|m| m.id == member_id)
            .cloned())
    }

    fn member_by_identity(
        &self,
        room_id: Id,
        identity: &Identity,
    ) -> Result<Option<Member>, StoreError> {
        Ok(self
            .tables()
            .members
            .iter()
            .find(|m| m.room_id == room_id && &m.identity == identity)
            .cloned())
    }

    fn members(&self, room_id: Id) -> Result<Vec<Member>, StoreError> {
        Ok(self
            .tables()
            .members
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect_vec())
    }

    fn insert_session(
        &self,
        session: Session,
        participants: Vec<Participant>,
    ) -> Result<(), StoreError> {
        let mut tables = self.writable()?;
        if tables
            .sessions
            .iter()
            .any(|s| s.id == session.id || (s.status.is_active() && s.code == session.code))
        {
            return Err(StoreError::Duplicate);
        }
        let unique = participants
            .iter()
            .map(|p| &p.identity)
            .all_unique();
        if !unique || participants.iter().any(|p| p.session_id != session.id) {
            return Err(StoreError::Conflict);
        }
        tables.sessions.push(session);
        tables.participants.extend(participants);
        Ok(())
    }

    fn update_session(&self, session: &Session, expected: Status) -> Result<(), StoreError> {
        let mut tables = self.writable()?;
        let stored = tables
            .session_mut(session.id)
            .ok_or(StoreError::Conflict)?;
        if stored.status != expected {
            return Err(StoreError::Conflict);
        }
        *stored = session.clone();
        Ok(())
    }

    fn session(&self, session_id: Id) -> Result<Option<Session>, StoreError> {
        Ok(self
            .tables()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned())
    }

    fn session_by_code(&self, code: JoinCode) -> Result<Option<Session>, StoreError> {
        Ok(self
            .tables()
            .sessions
            .iter()
            .find(|s| s.status.is_active() && s.code == code)
            .cloned())
    }

    fn session_code_in_use(&self, code: JoinCode) -> Result<bool, StoreError> {
        Ok(self
            .tables()
            .sessions
            .iter()
            .any(|s| s.status.is_active() && s.code == code))
    }

    fn finish_active_in_room(&self, room_id: Id) -> Result<Vec<Id>, StoreError> {
        let mut tables = self.writable()?;
        Ok(tables
            .sessions
            .iter_mut()
            .filter(|s| s.room_id == room_id && s.status.is_active())
            .map(|s| {
                s.status = Status::Finished;
                s.id
            })
            .collect_vec())
    }

    fn sessions_in_room(&self, room_id: Id) -> Result<Vec<Session>, StoreError> {
        let tables = self.tables();
        Ok(newest_first(
            tables
                .sessions
                .iter()
                .filter(|s| s.room_id == room_id)
                .cloned(),
        ))
    }

    fn sessions_by_host(&self, host_id: Id) -> Result<Vec<Session>, StoreError> {
        let tables = self.tables();
        Ok(newest_first(
            tables
                .sessions
                .iter()
                .filter(|s| s.host_id == host_id)
                .cloned(),
        ))
    }

    fn insert_participant(&self, participant: Participant) -> Result<(), StoreError> {
        let mut tables = self.writable()?;
        if tables.participants.iter().any(|p| {
            p.id == participant.id
                || (p.session_id == participant.session_id && p.identity == participant.identity)
        }) {
            return Err(StoreError::Duplicate);
        }
        tables.participants.push(participant);
        Ok(())
    }

    fn update_participant(&self, participant: &Participant) -> Result<(), StoreError> {
        let mut tables = self.writable()?;
        let stored = tables
            .participants
            .iter_mut()
            .find(|p| p.id == participant.id)
            .ok_or(StoreError::Conflict)?;
        stored.nickname.clone_from(&participant.nickname);
        stored.member_id = participant.member_id;
        Ok(())
    }

    fn participant_by_identity(
        &self,
        session_id: Id,
        identity: &Identity,
    ) -> Result<Option<Participant>, StoreError> {
        Ok(self
            .tables()
            .participants
            .iter()
            .find(|p| p.session_id == session_id && &p.identity == identity)
            .cloned())
    }

    fn participants(&self, session_id: Id) -> Result<Vec<Participant>, StoreError> {
        Ok(self
            .tables()
            .participants
            .iter()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect_vec())
    }

    fn participant_count(&self, session_id: Id) -> Result<usize, StoreError> {
        Ok(self
            .tables()
            .participants
            .iter()
            .filter(|p| p.session_id == session_id)
            .count())
    }

    fn upsert_answer(&self, mut answer: Answer) -> Result<Answer, StoreError> {
        let mut tables = self.writable()?;
        if !tables.is_open_on(answer.session_id, answer.question_id) {
            return Err(StoreError::Conflict);
        }
        let seq = tables.next_seq();
        let key = (answer.session_id, answer.participant_id, answer.question_id);
        if let Some(existing) = tables.answers.get(&key) {
            answer.id = existing.answer.id;
        }
        tables.answers.insert(
            key,
            StoredAnswer {
                answer: answer.clone(),
                seq,
            },
        );
        Ok(answer)
    }

    fn answer(
        &self,
        session_id: Id,
        participant_id: Id,
        question_id: Id,
    ) -> Result<Option<Answer>, StoreError> {
        Ok(self
            .tables()
            .answers
            .get(&(session_id, participant_id, question_id))
            .map(|stored| stored.answer.clone()))
    }

    fn answers_for_question(
        &self,
        session_id: Id,
        question_id: Id,
    ) -> Result<Vec<Answer>, StoreError> {
        Ok(self
            .tables()
            .answers
            .values()
            .filter(|s| s.answer.session_id == session_id && s.answer.question_id == question_id)
            .sorted_by_key(|s| (s.answer.answered_at, s.seq))
            .map(|s| s.answer.clone())
            .collect_vec())
    }

    fn answer_count(&self, session_id: Id, question_id: Id) -> Result<usize, StoreError> {
        Ok(self
            .tables()
            .answers
            .values()
            .filter(|s| s.answer.session_id == session_id && s.answer.question_id == question_id)
            .count())
    }

    fn apply_reveal(
        &self,
        session_id: Id,
        question_id: Id,
        scores: &[ScoredAnswer],
    ) -> Result<RevealOutcome, StoreError> {
        let mut tables = self.writable()?;
        if tables.revealed.contains(&(session_id, question_id)) {
            return Ok(RevealOutcome::AlreadyApplied);
        }

        let open = tables.is_open_on(session_id, question_id);
        let known = scores.iter().all(|scored| {
            tables
                .answers
                .get(&(session_id, scored.participant_id, question_id))
                .is_some_and(|stored| stored.answer.id == scored.answer_id)
        });
        if !open || !known {
            return Err(StoreError::Conflict);
        }

        for scored in scores {
            if let Some(stored) =
                tables
                    .answers
                    .get_mut(&(session_id, scored.participant_id, question_id))
            {
                stored.answer.score = scored.score;
            }
            if let Some(participant) = tables
                .participants
                .iter_mut()
                .find(|p| p.id == scored.participant_id)
            {
                participant.total_score += scored.score;
            }
        }
        if let Some(session) = tables.session_mut(session_id) {
            session.status = Status::Revealed;
        }
        tables.revealed.insert((session_id, question_id));
        Ok(RevealOutcome::Applied)
    }
}

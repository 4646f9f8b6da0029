//! Participants of a session
//!
//! A participant is a person's scoring record inside one session. Room
//! members are enrolled in bulk when a session is created; anyone arriving
//! later is added lazily with a zero score and can answer the question that
//! is currently open.

use serde::{Deserialize, Serialize};
use tracing::debug;
use web_time::SystemTime;

use crate::{
    catalog::Catalog,
    engine::Engine,
    error::{Error, Result, StoreError},
    identity::{Id, Identity},
    nickname,
    room::Member,
    store::Store,
};

/// A person's scoring record within one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique identifier of the participant
    pub id: Id,
    /// The session played
    pub session_id: Id,
    /// The room membership this participant came from, if any
    pub member_id: Option<Id>,
    /// Durable identity used to recognize the participant again
    #[serde(skip_serializing)]
    pub identity: Identity,
    /// Display name
    pub nickname: String,
    /// Points accumulated in this session
    pub total_score: u64,
    /// When the participant joined the session
    pub joined_at: SystemTime,
}

impl Participant {
    /// Creates a participant with a zero score
    pub fn new(
        session_id: Id,
        member_id: Option<Id>,
        identity: Identity,
        nickname: String,
    ) -> Self {
        Self {
            id: Id::new(),
            session_id,
            member_id,
            identity,
            nickname,
            total_score: 0,
            joined_at: SystemTime::now(),
        }
    }

    /// Creates the participant record of a room member
    pub fn for_member(session_id: Id, member: &Member) -> Self {
        Self::new(
            session_id,
            Some(member.id),
            member.identity.clone(),
            member.nickname.clone(),
        )
    }
}

impl<S: Store, C: Catalog> Engine<S, C> {
    /// Joins a session directly, or rejoins it with the same identity
    ///
    /// # Returns
    ///
    /// The participant and whether it already existed.
    ///
    /// # Errors
    ///
    /// * `Error::SessionNotFound` - Unknown session
    /// * `Error::AlreadyFinished` - The session is over
    /// * `Error::Nickname` - The nickname was rejected
    #[tracing::instrument(skip(self, identity), fields(%identity))]
    pub fn join_session(
        &self,
        session_id: Id,
        identity: Identity,
        nickname: &str,
    ) -> Result<(Participant, bool)> {
        let session = self.load_session(session_id)?;
        if !session.status.is_active() {
            return Err(Error::AlreadyFinished);
        }
        let nickname = nickname::clean(nickname)?;

        if let Some(mut existing) = self.store.participant_by_identity(session_id, &identity)? {
            if existing.nickname != nickname {
                existing.nickname = nickname;
                self.store.update_participant(&existing)?;
            }
            return Ok((existing, true));
        }
        let participant = Participant::new(session_id, None, identity, nickname);
        self.enrol(participant)
    }

    /// Adds a room member to a session that is already running
    ///
    /// Does nothing but return the existing record if the member's identity
    /// already takes part.
    ///
    /// # Errors
    ///
    /// * `Error::SessionNotFound` - Unknown session
    /// * `Error::AlreadyFinished` - The session is over
    #[tracing::instrument(skip(self, member), fields(member_id = %member.id))]
    pub fn add_late_participant(&self, session_id: Id, member: &Member) -> Result<Participant> {
        let session = self.load_session(session_id)?;
        if !session.status.is_active() {
            return Err(Error::AlreadyFinished);
        }
        if let Some(existing) = self
            .store
            .participant_by_identity(session_id, &member.identity)?
        {
            return Ok(existing);
        }
        self.enrol(Participant::for_member(session_id, member))
            .map(|(participant, _)| participant)
    }

    /// Inserts a participant, falling back to the record a concurrent join created
    fn enrol(&self, participant: Participant) -> Result<(Participant, bool)> {
        match self.store.insert_participant(participant.clone()) {
            Ok(()) => {
                debug!(
                    session_id = %participant.session_id,
                    participant_id = %participant.id,
                    "participant joined"
                );
                Ok((participant, false))
            }
            Err(StoreError::Duplicate) => self
                .store
                .participant_by_identity(participant.session_id, &participant.identity)?
                .map(|existing| (existing, true))
                .ok_or(Error::Store(StoreError::Duplicate)),
            Err(e) => Err(e.into()),
        }
    }

    /// Looks up a session participant by identity
    ///
    /// # Errors
    ///
    /// Returns `Error::ParticipantNotFound` if the identity never joined.
    pub fn participant(&self, session_id: Id, identity: &Identity) -> Result<Participant> {
        self.store
            .participant_by_identity(session_id, identity)?
            .ok_or(Error::ParticipantNotFound)
    }

    /// Lists the participants of a session in join order
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store fails.
    pub fn participants(&self, session_id: Id) -> Result<Vec<Participant>> {
        Ok(self.store.participants(session_id)?)
    }
}

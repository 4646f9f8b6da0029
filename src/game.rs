//! Host and participant actions with live updates
//!
//! [`Game`] is the control surface embedding applications call. Every
//! action maps onto one [`Engine`] operation and, once that operation has
//! succeeded, publishes the matching [`Event`] through the [`Hub`]. Failures
//! to publish are never reported to the caller; the engine's result is the
//! only outcome of an action.

use std::sync::Arc;

use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    Event,
    catalog::Catalog,
    engine::Engine,
    error::Result,
    hub::{ConnectionId, Hub, Target, Tunnel},
    identity::{Id, Identity},
    join_code::JoinCode,
    ledger::Answer,
    question::AnswerPayload,
    room::{Closed, Joined, Member},
    roster::Participant,
    session::{ParticipantView, Session, Status},
    store::Store,
};

/// Pacing commands only the host may send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostAction {
    /// Open the first question
    Start,
    /// Close and score the current question
    Reveal,
    /// Open the next question, or finish after the last one
    Next,
    /// End the session now
    Finish,
}

/// An engine paired with the hub its changes are announced on
#[derive_where(Clone)]
pub struct Game<S, C> {
    engine: Arc<Engine<S, C>>,
    hub: Arc<Hub>,
}

impl<S: Store, C: Catalog> Game<S, C> {
    /// Creates a game surface
    pub fn new(engine: Arc<Engine<S, C>>, hub: Arc<Hub>) -> Self {
        Self { engine, hub }
    }

    /// The underlying engine, for reads
    pub fn engine(&self) -> &Engine<S, C> {
        &self.engine
    }

    /// The hub events are published on
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Registers a connection for a session's or a room's events
    pub fn subscribe(&self, target: Target, tunnel: impl Tunnel + 'static) -> ConnectionId {
        self.hub.register(target, tunnel)
    }

    /// Removes a connection registered with [`Game::subscribe`]
    pub fn unsubscribe(&self, target: Target, connection: ConnectionId) -> bool {
        self.hub.unregister(target, connection)
    }

    /// Starts a session of a quiz in a room
    ///
    /// A session the room was still running is finished and announced as
    /// such.
    pub fn create_session(&self, quiz_id: Id, room_id: Id, host_id: Id) -> Result<Session> {
        let previous = self.engine.current_session(room_id)?;
        let session = self.engine.create_session(quiz_id, room_id, host_id)?;
        if let Some(previous) = previous {
            self.announce(previous.id);
        }
        Ok(session)
    }

    /// Applies a host command to a session
    pub fn host_action(&self, session_id: Id, actor: Id, action: HostAction) -> Result<Session> {
        let session = match action {
            HostAction::Start => self.engine.start(session_id, actor),
            HostAction::Reveal => self.engine.reveal(session_id, actor),
            HostAction::Next => self.engine.next_question(session_id, actor),
            HostAction::Finish => self.engine.finish(session_id, actor),
        }?;
        self.announce(session.id);
        Ok(session)
    }

    /// Joins a room and tells the lobby and the running session about it
    pub fn join_room(&self, code: JoinCode, identity: Identity, nickname: &str) -> Result<Joined> {
        let joined = self.engine.join_room(code, identity, nickname)?;
        let room = Target::Room(joined.member.room_id);
        if !joined.is_rejoin {
            self.hub
                .publish(room, &Event::MemberJoined(joined.member.clone()));
        } else if joined.renamed {
            self.hub
                .publish(room, &Event::MemberUpdated(joined.member.clone()));
        }
        if !joined.is_rejoin
            && let Some(participant) = &joined.participant
        {
            self.participant_joined(participant);
        }
        Ok(joined)
    }

    /// Joins a session directly
    pub fn join_session(
        &self,
        session_id: Id,
        identity: Identity,
        nickname: &str,
    ) -> Result<(Participant, bool)> {
        let (participant, existed) = self.engine.join_session(session_id, identity, nickname)?;
        if !existed {
            self.participant_joined(&participant);
        }
        Ok((participant, existed))
    }

    /// Renames a member
    pub fn update_nickname(
        &self,
        member_id: Id,
        identity: &Identity,
        nickname: &str,
    ) -> Result<Member> {
        let member = self.engine.update_nickname(member_id, identity, nickname)?;
        self.hub.publish(
            Target::Room(member.room_id),
            &Event::MemberUpdated(member.clone()),
        );
        Ok(member)
    }

    /// Records an answer and tells the session the answer count changed
    pub fn submit_answer(
        &self,
        session_id: Id,
        identity: &Identity,
        payload: AnswerPayload,
    ) -> Result<Answer> {
        let answer = self.engine.submit_answer(session_id, identity, payload)?;
        self.hub
            .publish(Target::Session(session_id), &Event::AnswerReceived { session_id });
        Ok(answer)
    }

    /// Closes a room, announcing the end of its running session
    pub fn close_room(&self, room_id: Id, actor: Id) -> Result<Closed> {
        let closed = self.engine.close_room(room_id, actor)?;
        for session_id in &closed.finished_sessions {
            self.announce(*session_id);
        }
        self.hub
            .publish(Target::Room(room_id), &Event::RoomClosed { room_id });
        Ok(closed)
    }

    fn participant_joined(&self, participant: &Participant) {
        let view = ParticipantView {
            id: participant.id,
            nickname: participant.nickname.clone(),
            total_score: participant.total_score,
        };
        self.hub.publish(
            Target::Session(participant.session_id),
            &Event::ParticipantJoined(view),
        );
    }

    /// Publishes the current state of a session to its own and its room's
    /// connections
    fn announce(&self, session_id: Id) {
        match self.status_event(session_id) {
            Ok(Some((room_id, event))) => {
                self.hub
                    .publish_all(&[Target::Session(session_id), Target::Room(room_id)], &event);
            }
            Ok(None) => {}
            Err(error) => {
                warn!(%session_id, %error, "session state could not be announced");
            }
        }
    }

    fn status_event(&self, session_id: Id) -> Result<Option<(Id, Event)>> {
        let state = self.engine.state(session_id)?;
        let room_id = state.room_id;
        let event = match state.status {
            Status::Waiting => return Ok(None),
            Status::Question if state.current_question == 1 => Event::QuizStarted(Box::new(state)),
            Status::Question => Event::Question(Box::new(state)),
            Status::Revealed => Event::Revealed(Box::new(state)),
            Status::Finished => {
                let leaderboard = self
                    .engine
                    .leaderboard(session_id)?
                    .top(self.engine.options().leaderboard_limit);
                Event::Finished {
                    state: Box::new(state),
                    leaderboard,
                }
            }
        };
        Ok(Some((room_id, event)))
    }
}

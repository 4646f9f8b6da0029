//! Rooms and their members
//!
//! A room is a persistent lobby owned by a host. People join it once with a
//! nickname and stay members across every session the host runs in it.
//! Joining is idempotent per identity so reconnecting clients get their old
//! membership back.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use web_time::SystemTime;

use crate::{
    catalog::Catalog,
    config::Options,
    engine::Engine,
    error::{Error, Result},
    identity::{Id, Identity},
    join_code::JoinCode,
    nickname,
    question::QuestionType,
    roster::Participant,
    session::Session,
    store::Store,
};

/// How participants reach the room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomMode {
    /// Browser clients with a reconnect token
    #[default]
    Web,
    /// Telegram users talking to the bot
    Bot,
}

impl RoomMode {
    /// Returns whether questions of this type can be played in the room
    pub fn allows(self, kind: QuestionType, options: &Options) -> bool {
        match self {
            Self::Web => true,
            Self::Bot => options.allowed_in_bot(kind),
        }
    }
}

/// Whether the room still accepts members and sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Open for members and sessions
    #[default]
    Active,
    /// Closed by the host; terminal
    Closed,
}

/// A lobby owned by a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Unique identifier of the room
    pub id: Id,
    /// Code people use to join
    pub code: JoinCode,
    /// The host that owns the room
    pub host_id: Id,
    /// How participants reach the room
    pub mode: RoomMode,
    /// Whether the room is still open
    pub status: RoomStatus,
    /// When the room was created
    pub created_at: SystemTime,
}

impl Room {
    /// Creates an active room
    pub fn new(host_id: Id, mode: RoomMode, code: JoinCode) -> Self {
        Self {
            id: Id::new(),
            code,
            host_id,
            mode,
            status: RoomStatus::Active,
            created_at: SystemTime::now(),
        }
    }

    /// Returns whether the room accepts members and sessions
    pub fn is_open(&self) -> bool {
        self.status == RoomStatus::Active
    }
}

/// A person who joined a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Unique identifier of the member
    pub id: Id,
    /// The room joined
    pub room_id: Id,
    /// Durable identity used to recognize the member again
    #[serde(skip_serializing)]
    pub identity: Identity,
    /// Display name
    pub nickname: String,
    /// When the member first joined
    pub joined_at: SystemTime,
}

impl Member {
    /// Creates a member that joins now
    pub fn new(room_id: Id, identity: Identity, nickname: String) -> Self {
        Self {
            id: Id::new(),
            room_id,
            identity,
            nickname,
            joined_at: SystemTime::now(),
        }
    }
}

/// What happened when someone joined a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    /// The member record, new or existing
    pub member: Member,
    /// Whether the identity was already a member
    pub is_rejoin: bool,
    /// Whether an existing member's nickname changed
    pub renamed: bool,
    /// The participant created or found in the room's running session
    pub participant: Option<Participant>,
}

/// What closing a room ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closed {
    /// The closed room
    pub room: Room,
    /// Sessions that were finished along with it
    pub finished_sessions: Vec<Id>,
}

impl<S: Store, C: Catalog> Engine<S, C> {
    /// Opens a new room for a host
    ///
    /// # Errors
    ///
    /// * `Error::CodesExhausted` - No free room code was found
    /// * `Error::Store` - The store failed
    #[tracing::instrument(skip(self))]
    pub fn create_room(&self, host_id: Id, mode: RoomMode) -> Result<Room> {
        let code = JoinCode::generate_unique(|code| {
            Ok::<_, Error>(self.store.room_by_code(code)?.is_some())
        })?;
        let room = Room::new(host_id, mode, code);
        self.store.insert_room(room.clone())?;
        info!(room_id = %room.id, code = %room.code, ?mode, "room created");
        Ok(room)
    }

    /// Looks up a room by id
    ///
    /// # Errors
    ///
    /// Returns `Error::RoomNotFound` for unknown rooms.
    pub fn room(&self, room_id: Id) -> Result<Room> {
        self.store.room(room_id)?.ok_or(Error::RoomNotFound)
    }

    /// Looks up an open room by code
    ///
    /// # Errors
    ///
    /// Returns `Error::RoomNotFound` if no open room uses the code.
    pub fn room_by_code(&self, code: JoinCode) -> Result<Room> {
        self.store.room_by_code(code)?.ok_or(Error::RoomNotFound)
    }

    /// Lists the members of a room in join order
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store fails.
    pub fn members(&self, room_id: Id) -> Result<Vec<Member>> {
        Ok(self.store.members(room_id)?)
    }

    /// Joins a room, or rejoins it with the same identity
    ///
    /// A rejoin returns the existing member and updates its nickname if it
    /// changed. If a session is running in the room the member also becomes
    /// a participant of it.
    ///
    /// # Errors
    ///
    /// * `Error::RoomNotFound` - No open room uses the code
    /// * `Error::Nickname` - The nickname was rejected
    #[tracing::instrument(skip(self, identity), fields(%identity))]
    pub fn join_room(&self, code: JoinCode, identity: Identity, nickname: &str) -> Result<Joined> {
        let room = self.room_by_code(code)?;
        self.serialized(room.id, || {
            let existing = self.store.member_by_identity(room.id, &identity)?;
            let nickname = self.pick_nickname(room.id, nickname, existing.as_ref())?;

            let (member, is_rejoin, renamed) = match existing {
                Some(mut member) => {
                    let renamed = member.nickname != nickname;
                    if renamed {
                        member.nickname = nickname;
                        self.store.update_member(&member)?;
                    }
                    (member, true, renamed)
                }
                None => {
                    let member = Member::new(room.id, identity, nickname);
                    self.store.insert_member(member.clone())?;
                    (member, false, false)
                }
            };
            debug!(room_id = %room.id, member_id = %member.id, is_rejoin, "member joined");

            let participant = match self.current_session(room.id)? {
                Some(session) => Some(self.add_late_participant(session.id, &member)?),
                None => None,
            };
            Ok(Joined {
                member,
                is_rejoin,
                renamed,
                participant,
            })
        })
    }

    /// Finds the membership of a web client by its reconnect token
    ///
    /// # Errors
    ///
    /// * `Error::RoomNotFound` - No open room uses the code
    /// * `Error::MemberNotFound` - The token never joined the room
    pub fn reconnect(&self, code: JoinCode, token: &str) -> Result<Member> {
        let room = self.room_by_code(code)?;
        self.store
            .member_by_identity(room.id, &Identity::Web(token.to_owned()))?
            .ok_or(Error::MemberNotFound)
    }

    /// Renames a member; only the member's own identity may do this
    ///
    /// The nickname of the member's participant in the running session is
    /// updated as well.
    ///
    /// # Errors
    ///
    /// * `Error::MemberNotFound` - Unknown member
    /// * `Error::NotMember` - `identity` belongs to someone else
    /// * `Error::Nickname` - The nickname was rejected
    #[tracing::instrument(skip(self, identity))]
    pub fn update_nickname(
        &self,
        member_id: Id,
        identity: &Identity,
        nickname: &str,
    ) -> Result<Member> {
        let member = self.store.member(member_id)?.ok_or(Error::MemberNotFound)?;
        self.serialized(member.room_id, || {
            let mut member = self.store.member(member_id)?.ok_or(Error::MemberNotFound)?;
            if &member.identity != identity {
                return Err(Error::NotMember);
            }
            member.nickname = nickname::clean(nickname)?;
            self.store.update_member(&member)?;

            if let Some(session) = self.current_session(member.room_id)?
                && let Some(mut participant) = self
                    .store
                    .participant_by_identity(session.id, &member.identity)?
            {
                participant.nickname.clone_from(&member.nickname);
                self.store.update_participant(&participant)?;
            }
            debug!(member_id = %member.id, "member renamed");
            Ok(member)
        })
    }

    /// Closes a room and finishes its running session
    ///
    /// # Errors
    ///
    /// * `Error::RoomNotFound` - Unknown room
    /// * `Error::NotHost` - `actor` does not own the room
    /// * `Error::RoomClosed` - The room is already closed
    #[tracing::instrument(skip(self))]
    pub fn close_room(&self, room_id: Id, actor: Id) -> Result<Closed> {
        self.serialized(room_id, || {
            let mut room = self.room(room_id)?;
            if room.host_id != actor {
                return Err(Error::NotHost);
            }
            if !room.is_open() {
                return Err(Error::RoomClosed);
            }
            let finished_sessions = self.finish_room_sessions(room_id)?;
            room.status = RoomStatus::Closed;
            self.store.update_room(&room)?;
            info!(%room_id, finished = finished_sessions.len(), "room closed");
            Ok(Closed {
                room,
                finished_sessions,
            })
        })
    }

    /// Returns the newest unfinished session of a room
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store fails.
    pub fn current_session(&self, room_id: Id) -> Result<Option<Session>> {
        Ok(self
            .store
            .sessions_in_room(room_id)?
            .into_iter()
            .find(|s| s.status.is_active()))
    }

    /// Cleans the requested nickname, or generates one if it is blank and
    /// random nicknames are enabled
    fn pick_nickname(
        &self,
        room_id: Id,
        requested: &str,
        existing: Option<&Member>,
    ) -> Result<String> {
        if !requested.trim().is_empty() {
            return Ok(nickname::clean(requested)?);
        }
        if let Some(member) = existing {
            return Ok(member.nickname.clone());
        }
        match self.options.random_nicknames {
            Some(style) => {
                let members = self.store.members(room_id)?;
                Ok(style.get_unique_name(|candidate| {
                    members.iter().any(|m| m.nickname == candidate)
                }))
            }
            None => Ok(nickname::clean(requested)?),
        }
    }
}

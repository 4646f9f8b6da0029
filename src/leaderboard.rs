//! Ranked standings of a session
//!
//! Participants are ranked by total score, highest first. Equal scores keep
//! join order, so whoever joined first ranks higher. Positions are 1-based
//! and never shared.

use std::collections::HashMap;

use itertools::Itertools;
use serde::Serialize;

use crate::{
    catalog::Catalog,
    engine::Engine,
    error::Result,
    identity::{Id, Identity},
    roster::Participant,
    store::Store,
    TruncatedVec,
};

/// One row of the leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    /// 1-based rank
    pub position: usize,
    /// The ranked participant
    pub participant_id: Id,
    /// Display name
    pub nickname: String,
    /// Points accumulated so far
    pub total_score: u64,
    /// Identity of the participant, never sent to clients
    #[serde(skip)]
    pub identity: Identity,
}

/// The full ranking of a session's participants
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    standings: Vec<Standing>,
    #[serde(skip)]
    by_participant: HashMap<Id, usize>,
}

impl Leaderboard {
    /// Ranks participants given in join order
    pub fn new(participants: Vec<Participant>) -> Self {
        let standings = participants
            .into_iter()
            .sorted_by(|a, b| b.total_score.cmp(&a.total_score))
            .enumerate()
            .map(|(index, p)| Standing {
                position: index + 1,
                participant_id: p.id,
                nickname: p.nickname,
                total_score: p.total_score,
                identity: p.identity,
            })
            .collect_vec();
        let by_participant = standings
            .iter()
            .enumerate()
            .map(|(index, s)| (s.participant_id, index))
            .collect();
        Self {
            standings,
            by_participant,
        }
    }

    /// All standings, best first
    pub fn standings(&self) -> &[Standing] {
        &self.standings
    }

    /// Number of ranked participants
    pub fn len(&self) -> usize {
        self.standings.len()
    }

    /// Returns whether nobody is ranked
    pub fn is_empty(&self) -> bool {
        self.standings.is_empty()
    }

    /// The standing of a participant
    pub fn standing(&self, participant_id: Id) -> Option<&Standing> {
        self.by_participant
            .get(&participant_id)
            .and_then(|&index| self.standings.get(index))
    }

    /// The standing of whoever holds `identity`
    pub fn standing_of(&self, identity: &Identity) -> Option<&Standing> {
        self.standings.iter().find(|s| &s.identity == identity)
    }

    /// The best `limit` standings, keeping the total count
    pub fn top(&self, limit: usize) -> TruncatedVec<Standing> {
        TruncatedVec::new(self.standings.iter().cloned(), limit, self.standings.len())
    }
}

impl<S: Store, C: Catalog> Engine<S, C> {
    /// Ranks the participants of a session
    ///
    /// # Errors
    ///
    /// * `Error::SessionNotFound` - Unknown session
    pub fn leaderboard(&self, session_id: Id) -> Result<Leaderboard> {
        self.load_session(session_id)?;
        Ok(Leaderboard::new(self.store.participants(session_id)?))
    }
}

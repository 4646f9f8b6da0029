//! Per-session poll loops
//!
//! The [`Tracker`] keeps one task per session that has chat players or a
//! chat host. Every poll interval the task reads the session state and
//! compares `(status, current_question, answer_count)` with what it saw
//! last. Only a difference leads to notifications:
//!
//! * a newly opened question is sent to every player,
//! * a reveal sends each player their own result,
//! * the end of the session sends the final standings, forgets the players'
//!   conversation state and stops the task,
//! * any change refreshes the host's panel.
//!
//! Each task owns a child of the tracker's cancellation token, so a single
//! session can be dropped on its own and [`Tracker::stop`] ends them all.

use std::{
    collections::{BTreeSet, HashMap},
    ops::ControlFlow,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use derive_where::derive_where;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    UserId,
    notify::{FinalNotice, HostPanel, Notification, Notifier, QuestionNotice, ResultNotice},
    state::{Prompt, Step, UserStates},
};
use crate::{
    catalog::Catalog,
    config::Options,
    engine::Engine,
    error::{Error, Result},
    identity::{Id, Identity},
    leaderboard::Leaderboard,
    session::{ParticipantResult, SessionState, Status},
    store::Store,
};

/// The read side of the engine the tracker polls
pub trait SessionSource: Send + Sync + 'static {
    /// A snapshot of a session
    fn state(&self, session_id: Id) -> Result<SessionState>;

    /// A participant's outcome for the current question
    fn participant_result(&self, session_id: Id, identity: &Identity) -> Result<ParticipantResult>;

    /// The ranked participants of a session
    fn leaderboard(&self, session_id: Id) -> Result<Leaderboard>;
}

impl<S, C> SessionSource for Engine<S, C>
where
    S: Store + 'static,
    C: Catalog + 'static,
{
    fn state(&self, session_id: Id) -> Result<SessionState> {
        Engine::state(self, session_id)
    }

    fn participant_result(&self, session_id: Id, identity: &Identity) -> Result<ParticipantResult> {
        Engine::participant_result(self, session_id, identity)
    }

    fn leaderboard(&self, session_id: Id) -> Result<Leaderboard> {
        Engine::leaderboard(self, session_id)
    }
}

/// What a poll looks at to decide whether anything happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observed {
    status: Status,
    current_question: usize,
    answer_count: usize,
}

impl Observed {
    fn of(state: &SessionState) -> Self {
        Self {
            status: state.status,
            current_question: state.current_question,
            answer_count: state.answer_count,
        }
    }
}

#[derive(Debug)]
struct Tracked {
    players: BTreeSet<UserId>,
    host: Option<UserId>,
    observed: Option<Observed>,
    token: CancellationToken,
}

#[derive_where(Debug)]
struct Inner<Src, N> {
    #[derive_where(skip)]
    source: Arc<Src>,
    #[derive_where(skip)]
    notifier: Arc<N>,
    states: Arc<UserStates>,
    poll_interval: Duration,
    leaderboard_limit: usize,
    root: CancellationToken,
    sessions: Mutex<HashMap<Id, Tracked>>,
}

/// Supervisor of the per-session poll tasks
#[derive_where(Clone, Debug)]
pub struct Tracker<Src, N> {
    inner: Arc<Inner<Src, N>>,
}

impl<Src: SessionSource, N: Notifier> Tracker<Src, N> {
    /// Creates a tracker that polls at the configured interval
    pub fn new(
        source: Arc<Src>,
        notifier: Arc<N>,
        states: Arc<UserStates>,
        options: &Options,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                notifier,
                states,
                poll_interval: options.poll_interval,
                leaderboard_limit: options.leaderboard_limit,
                root: CancellationToken::new(),
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Starts sending session updates to a player
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime and the session was not
    /// tracked yet.
    pub fn track_participant(&self, session_id: Id, user: UserId) {
        self.inner.with_session(session_id, |tracked| {
            tracked.players.insert(user);
        });
    }

    /// Sends the host panel of a session to a host chat
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime and the session was not
    /// tracked yet.
    pub fn set_host_remote(&self, session_id: Id, host: UserId) {
        self.inner.with_session(session_id, |tracked| {
            tracked.host = Some(host);
        });
    }

    /// Sends a player whatever the session currently shows
    ///
    /// Used right after someone (re)joins so they do not wait for the next
    /// change. Does nothing for players the tracker does not follow.
    pub async fn sync_participant(&self, session_id: Id, user: UserId) {
        self.inner.sync_participant(session_id, user).await;
    }

    /// Returns whether a session has a running poll task
    pub fn is_tracking(&self, session_id: Id) -> bool {
        self.inner.sessions().contains_key(&session_id)
    }

    /// Number of sessions with a running poll task
    pub fn tracked_sessions(&self) -> usize {
        self.inner.sessions().len()
    }

    /// Stops following a session
    pub fn untrack(&self, session_id: Id) {
        self.inner.remove(session_id);
    }

    /// Stops every poll task
    pub fn stop(&self) {
        self.inner.root.cancel();
        self.inner.sessions().clear();
        info!("session tracker stopped");
    }
}

impl<Src: SessionSource, N: Notifier> Inner<Src, N> {
    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<Id, Tracked>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session(self: &Arc<Self>, session_id: Id, f: impl FnOnce(&mut Tracked)) {
        let mut sessions = self.sessions();
        let tracked = sessions.entry(session_id).or_insert_with(|| {
            let token = self.root.child_token();
            tokio::spawn(Arc::clone(self).run(session_id, token.clone()));
            debug!(%session_id, "session tracking started");
            Tracked {
                players: BTreeSet::new(),
                host: None,
                observed: None,
                token,
            }
        });
        f(tracked);
    }

    fn remove(&self, session_id: Id) {
        if let Some(tracked) = self.sessions().remove(&session_id) {
            tracked.token.cancel();
            debug!(%session_id, "session tracking stopped");
        }
    }

    async fn run(self: Arc<Self>, session_id: Id, token: CancellationToken) {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    if self.poll(session_id).await.is_break() {
                        break;
                    }
                }
            }
        }
    }

    async fn poll(&self, session_id: Id) -> ControlFlow<()> {
        let state = match self.source.state(session_id) {
            Ok(state) => state,
            Err(Error::SessionNotFound) => {
                self.remove(session_id);
                return ControlFlow::Break(());
            }
            Err(error) => {
                warn!(%session_id, %error, "session poll failed");
                return ControlFlow::Continue(());
            }
        };
        let now = Observed::of(&state);

        let (previous, players, host) = {
            let mut sessions = self.sessions();
            let Some(tracked) = sessions.get_mut(&session_id) else {
                return ControlFlow::Break(());
            };
            let previous = tracked.observed.replace(now);
            (previous, tracked.players.clone(), tracked.host)
        };
        if previous == Some(now) {
            return ControlFlow::Continue(());
        }

        let moved = previous.is_none_or(|p| {
            p.status != now.status || p.current_question != now.current_question
        });
        if moved {
            match now.status {
                Status::Question
                    if previous.is_none_or(|p| p.current_question != now.current_question) =>
                {
                    for user in &players {
                        self.send_question(&state, *user).await;
                    }
                }
                Status::Revealed if previous.is_some_and(|p| p.status == Status::Question) => {
                    for user in &players {
                        self.send_result(&state, *user).await;
                    }
                }
                Status::Finished => {
                    self.send_final(session_id, &players).await;
                    if let Some(host) = host {
                        self.send(host, HostPanel::from(&state).into()).await;
                    }
                    self.remove(session_id);
                    return ControlFlow::Break(());
                }
                _ => {}
            }
        }

        if let Some(host) = host {
            self.send(host, HostPanel::from(&state).into()).await;
        }
        ControlFlow::Continue(())
    }

    async fn sync_participant(&self, session_id: Id, user: UserId) {
        let followed = self
            .sessions()
            .get(&session_id)
            .is_some_and(|tracked| tracked.players.contains(&user));
        if !followed {
            return;
        }
        let state = match self.source.state(session_id) {
            Ok(state) => state,
            Err(error) => {
                warn!(%session_id, %error, "participant sync failed");
                return;
            }
        };
        match state.status {
            Status::Question => self.send_question(&state, user).await,
            Status::Revealed => self.send_result(&state, user).await,
            Status::Waiting | Status::Finished => {}
        }
    }

    async fn send_question(&self, state: &SessionState, user: UserId) {
        let Some(question) = &state.question else {
            return;
        };
        let prompt = Prompt {
            session_id: state.session_id,
            question_id: question.id,
            current_question: state.current_question,
            total_questions: state.total_questions,
        };
        self.states.update(user, |conversation| {
            conversation.step = Step::InSession {
                session_id: state.session_id,
            };
            conversation.prompt = Some(prompt);
            conversation.selected.clear();
        });
        let notice = QuestionNotice {
            session_id: state.session_id,
            current_question: state.current_question,
            total_questions: state.total_questions,
            question: question.clone(),
        };
        self.send(user, notice.into()).await;
    }

    async fn send_result(&self, state: &SessionState, user: UserId) {
        let result = match self
            .source
            .participant_result(state.session_id, &Identity::Telegram(user))
        {
            Ok(result) => result,
            Err(error) => {
                debug!(session_id = %state.session_id, user, %error, "no result for user");
                return;
            }
        };
        let notice = ResultNotice {
            session_id: state.session_id,
            current_question: state.current_question,
            total_questions: state.total_questions,
            question: state.question.clone(),
            result,
        };
        self.send(user, notice.into()).await;
    }

    async fn send_final(&self, session_id: Id, players: &BTreeSet<UserId>) {
        let leaderboard = match self.source.leaderboard(session_id) {
            Ok(leaderboard) => leaderboard,
            Err(error) => {
                warn!(%session_id, %error, "final standings unavailable");
                Leaderboard::default()
            }
        };
        let top = leaderboard.top(self.leaderboard_limit);
        for user in players {
            let notice = FinalNotice {
                session_id,
                leaderboard: top.clone(),
                position: leaderboard
                    .standing_of(&Identity::Telegram(*user))
                    .map(|standing| standing.position),
            };
            self.send(*user, notice.into()).await;
            self.states.clear(*user);
        }
    }

    async fn send(&self, user: UserId, notification: Notification) {
        if let Err(error) = self.notifier.notify(user, notification).await {
            warn!(user, %error, "notification not delivered");
        }
    }
}

//! Best-effort fan-out of events to live connections
//!
//! Connections register against a session or a room and receive every
//! [`Event`] published to that target as a JSON text message. Delivery is
//! at-most-once: a connection whose write fails is dropped from the hub and
//! closed, and nothing is queued for it. Clients recover missed events by
//! fetching the session state again.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use enum_map::{Enum, EnumMap};
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::{Event, identity::Id};

/// Failure to write to a connection
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TunnelError {
    /// The other side went away
    #[error("connection closed")]
    Closed,
    /// The transport rejected the write
    #[error("write failed: {0}")]
    Write(String),
}

/// A push-capable connection to one client
///
/// Implementations must not block for long in [`Tunnel::send_message`]; the
/// hub calls it once per connection in turn for every published event.
pub trait Tunnel: Send + Sync {
    /// Sends one serialized event
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be handed to the client,
    /// after which the hub drops the connection.
    fn send_message(&self, message: &str) -> Result<(), TunnelError>;

    /// Closes the connection
    fn close(&self);
}

/// A tunnel feeding a tokio channel, for transports that run their own
/// writer task
#[derive(Debug)]
pub struct ChannelTunnel {
    sender: Mutex<Option<UnboundedSender<String>>>,
}

impl ChannelTunnel {
    /// Wraps an existing sender
    pub fn new(sender: UnboundedSender<String>) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Creates a tunnel together with the receiving end of its channel
    pub fn channel() -> (Self, UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl Tunnel for ChannelTunnel {
    fn send_message(&self, message: &str) -> Result<(), TunnelError> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .ok_or(TunnelError::Closed)?
            .send(message.to_owned())
            .map_err(|_| TunnelError::Closed)
    }

    fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// The kind of entity a connection listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum Scope {
    /// Host and participant screens of one session
    Session,
    /// Everyone in a room lobby
    Room,
}

/// Where an event is published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Target {
    /// Connections of one session
    #[display("session {_0}")]
    Session(Id),
    /// Connections of one room
    #[display("room {_0}")]
    Room(Id),
}

impl Target {
    fn parts(self) -> (Scope, Id) {
        match self {
            Self::Session(id) => (Scope::Session, id),
            Self::Room(id) => (Scope::Room, id),
        }
    }
}

/// Handle of one registered connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub struct ConnectionId(u64);

type Connections = HashMap<Id, HashMap<ConnectionId, Arc<dyn Tunnel>>>;

/// Registry of live connections per session and per room
#[derive(Default)]
pub struct Hub {
    targets: EnumMap<Scope, RwLock<Connections>>,
    next_connection: AtomicU64,
}

impl Hub {
    /// Creates an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    fn connections(&self, scope: Scope) -> &RwLock<Connections> {
        &self.targets[scope]
    }

    /// Adds a connection to a target
    pub fn register(&self, target: Target, tunnel: impl Tunnel + 'static) -> ConnectionId {
        let connection = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let (scope, id) = target.parts();
        let total = {
            let mut connections = self
                .connections(scope)
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let set = connections.entry(id).or_default();
            set.insert(connection, Arc::new(tunnel));
            set.len()
        };
        debug!(%target, %connection, total, "connection registered");
        connection
    }

    /// Removes a connection from a target and closes it
    ///
    /// Returns whether the connection was still registered.
    pub fn unregister(&self, target: Target, connection: ConnectionId) -> bool {
        let (scope, id) = target.parts();
        let removed = {
            let mut connections = self
                .connections(scope)
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let removed = connections
                .get_mut(&id)
                .and_then(|set| set.remove(&connection));
            if connections.get(&id).is_some_and(HashMap::is_empty) {
                connections.remove(&id);
            }
            removed
        };
        match removed {
            Some(tunnel) => {
                tunnel.close();
                debug!(%target, %connection, "connection unregistered");
                true
            }
            None => false,
        }
    }

    /// Number of live connections of a target
    pub fn connection_count(&self, target: Target) -> usize {
        let (scope, id) = target.parts();
        self.connections(scope)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map_or(0, HashMap::len)
    }

    /// Sends an event to every connection of a target
    ///
    /// The connection set is copied before writing so that a slow client
    /// never holds the registry lock. Connections that fail are removed and
    /// closed afterwards.
    ///
    /// # Returns
    ///
    /// The number of connections the event was delivered to.
    pub fn publish(&self, target: Target, event: &Event) -> usize {
        let (scope, id) = target.parts();
        let snapshot = self
            .connections(scope)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|set| {
                set.iter()
                    .map(|(connection, tunnel)| (*connection, Arc::clone(tunnel)))
                    .collect_vec()
            })
            .unwrap_or_default();
        if snapshot.is_empty() {
            return 0;
        }

        let message = match event.to_message() {
            Ok(message) => message,
            Err(error) => {
                warn!(%target, event = event.name(), %error, "event could not be encoded");
                return 0;
            }
        };

        let (delivered, failed): (Vec<_>, Vec<_>) = snapshot
            .into_iter()
            .map(|(connection, tunnel)| (connection, tunnel.send_message(&message)))
            .partition(|(_, result)| result.is_ok());

        for (connection, result) in &failed {
            if let Err(error) = result {
                warn!(%target, %connection, %error, event = event.name(), "pruning connection");
            }
        }
        if !failed.is_empty() {
            let pruned = {
                let mut connections = self
                    .connections(scope)
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                let pruned = connections
                    .get_mut(&id)
                    .map(|set| {
                        failed
                            .iter()
                            .filter_map(|(connection, _)| set.remove(connection))
                            .collect_vec()
                    })
                    .unwrap_or_default();
                if connections.get(&id).is_some_and(HashMap::is_empty) {
                    connections.remove(&id);
                }
                pruned
            };
            for tunnel in pruned {
                tunnel.close();
            }
        }

        delivered.len()
    }

    /// Publishes the same event to several targets
    pub fn publish_all(&self, targets: &[Target], event: &Event) -> usize {
        targets
            .iter()
            .map(|target| self.publish(*target, event))
            .sum()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug, Clone, Default)]
    pub(crate) struct MockTunnel {
        pub(crate) messages: Arc<Mutex<VecDeque<String>>>,
        pub(crate) closed: Arc<Mutex<bool>>,
        pub(crate) failing: bool,
    }

    impl MockTunnel {
        pub(crate) fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        pub(crate) fn received(&self) -> Vec<serde_json::Value> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .map(|m| serde_json::from_str(m).unwrap())
                .collect()
        }

        pub(crate) fn types(&self) -> Vec<String> {
            self.received()
                .into_iter()
                .map(|m| m["type"].as_str().unwrap().to_owned())
                .collect()
        }

        pub(crate) fn is_closed(&self) -> bool {
            *self.closed.lock().unwrap()
        }
    }

    impl Tunnel for MockTunnel {
        fn send_message(&self, message: &str) -> Result<(), TunnelError> {
            if self.failing {
                return Err(TunnelError::Write("broken pipe".to_owned()));
            }
            self.messages.lock().unwrap().push_back(message.to_owned());
            Ok(())
        }

        fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn closed_event() -> Event {
        Event::RoomClosed { room_id: Id::new() }
    }

    #[test]
    fn test_publish_reaches_only_its_target() {
        let hub = Hub::new();
        let session = Id::new();
        let listener = MockTunnel::default();
        let other = MockTunnel::default();
        hub.register(Target::Session(session), listener.clone());
        hub.register(Target::Session(Id::new()), other.clone());
        hub.register(Target::Room(session), other.clone());

        let delivered = hub.publish(Target::Session(session), &closed_event());

        assert_eq!(delivered, 1);
        assert_eq!(listener.types(), ["room_closed"]);
        assert!(other.received().is_empty());
    }

    #[test]
    fn test_failing_connection_is_pruned_and_closed() {
        let hub = Hub::new();
        let target = Target::Room(Id::new());
        let healthy = MockTunnel::default();
        let broken = MockTunnel::failing();
        hub.register(target, healthy.clone());
        hub.register(target, broken.clone());
        assert_eq!(hub.connection_count(target), 2);

        assert_eq!(hub.publish(target, &closed_event()), 1);
        assert_eq!(hub.connection_count(target), 1);
        assert!(broken.is_closed());
        assert!(!healthy.is_closed());

        assert_eq!(hub.publish(target, &closed_event()), 1);
        assert_eq!(healthy.received().len(), 2);
    }

    #[test]
    fn test_unregister_closes_once() {
        let hub = Hub::new();
        let target = Target::Session(Id::new());
        let tunnel = MockTunnel::default();
        let connection = hub.register(target, tunnel.clone());

        assert!(hub.unregister(target, connection));
        assert!(tunnel.is_closed());
        assert!(!hub.unregister(target, connection));
        assert_eq!(hub.connection_count(target), 0);
        assert_eq!(hub.publish(target, &closed_event()), 0);
    }

    #[test]
    fn test_publish_without_listeners() {
        let hub = Hub::new();
        assert_eq!(hub.publish(Target::Room(Id::new()), &closed_event()), 0);
    }

    #[test]
    fn test_publish_all() {
        let hub = Hub::new();
        let id = Id::new();
        let tunnel = MockTunnel::default();
        hub.register(Target::Session(id), tunnel.clone());
        hub.register(Target::Room(id), tunnel.clone());

        let delivered = hub.publish_all(&[Target::Session(id), Target::Room(id)], &closed_event());
        assert_eq!(delivered, 2);
        assert_eq!(tunnel.received().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_register_and_publish_interleave() {
        let hub = Arc::new(Hub::new());
        let target = Target::Session(Id::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(24));

        let registrations = (0..16)
            .map(|i| {
                let hub = Arc::clone(&hub);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    if i % 4 == 0 {
                        hub.register(target, MockTunnel::failing());
                        None
                    } else {
                        let tunnel = MockTunnel::default();
                        hub.register(target, tunnel.clone());
                        Some(tunnel)
                    }
                })
            })
            .collect_vec();
        let publishers = (0..8)
            .map(|_| {
                let hub = Arc::clone(&hub);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    (0..10)
                        .map(|_| hub.publish(target, &closed_event()))
                        .max()
                        .unwrap_or_default()
                })
            })
            .collect_vec();

        let mut healthy = Vec::new();
        for registration in registrations {
            healthy.extend(registration.await.unwrap());
        }
        for publisher in publishers {
            assert!(publisher.await.unwrap() <= healthy.len());
        }

        let room_id = Id::new();
        let last = Event::RoomClosed { room_id };
        assert_eq!(hub.publish(target, &last), healthy.len());
        assert_eq!(hub.connection_count(target), healthy.len());
        for tunnel in &healthy {
            let received = tunnel.received();
            assert!(received.len() <= 81);
            assert_eq!(received.last().unwrap()["data"]["room_id"], room_id.to_string());
        }
    }

    #[test]
    fn test_channel_tunnel() {
        let (tunnel, mut receiver) = ChannelTunnel::channel();
        tunnel.send_message("hello").unwrap();
        assert_eq!(receiver.try_recv().unwrap(), "hello");

        tunnel.close();
        assert_eq!(tunnel.send_message("late"), Err(TunnelError::Closed));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_channel_tunnel_dropped_receiver() {
        let (tunnel, receiver) = ChannelTunnel::channel();
        drop(receiver);
        assert_eq!(tunnel.send_message("lost"), Err(TunnelError::Closed));
    }

    #[test]
    fn test_target_display() {
        let id = Id::new();
        assert_eq!(Target::Room(id).to_string(), format!("room {id}"));
    }
}

//! Client boundary: responses, notifications and the broadcaster.
//!
//! Transports implement [`Client`] for each connected peer. The engine never
//! owns a client strongly except while it is registered with the
//! [`Broadcaster`]; commands only hold a weak reference to their originator.

use std::collections::BTreeMap;
use std::sync::Arc;

use nodal_core::{Atom, ObjectKind, Path, Properties, Uri};
use parking_lot::RwLock;
use serde::Serialize;

/// Opaque identifier of a connected client, unique per engine.
pub type ClientId = u64;

/// A state change pushed to registered clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// An object exists (created, or described in reply to a get).
    Put {
        /// Object path.
        path: Path,
        /// Object kind.
        kind: ObjectKind,
        /// Object properties.
        properties: Properties,
    },
    /// Properties of an object changed.
    Delta {
        /// Object path.
        path: Path,
        /// Removed properties.
        remove: Properties,
        /// Added properties.
        add: Properties,
    },
    /// An object was renamed.
    Move {
        /// Previous path.
        old: Path,
        /// New path.
        new: Path,
    },
    /// An object and its subtree were removed.
    Delete {
        /// Removed path.
        path: Path,
    },
    /// Two ports were connected.
    Connect {
        /// Output port.
        tail: Path,
        /// Input port.
        head: Path,
    },
    /// Two ports were disconnected.
    Disconnect {
        /// Output port.
        tail: Path,
        /// Input port.
        head: Path,
    },
    /// One predicate of an object was replaced.
    SetProperty {
        /// Object path.
        subject: Path,
        /// Predicate.
        predicate: Uri,
        /// New value.
        value: Atom,
    },
}

/// A peer that receives responses and notifications.
///
/// Called from the post-processor thread only, never from the real-time
/// thread. Implementations should not block for long: a slow client delays
/// every later response.
pub trait Client: Send + Sync {
    /// Stable identifier for this client.
    fn id(&self) -> ClientId;

    /// The request `id` succeeded.
    fn respond_ok(&self, id: i32);

    /// The request `id` failed.
    fn respond_error(&self, id: i32, message: &str);

    /// A state change the client subscribed to.
    fn notify(&self, notification: &Notification);
}

/// Registry of subscribed clients, fanning out notifications.
///
/// Shared between the pre-processor (which registers clients) and the
/// post-processor (which broadcasts), and injected into both.
#[derive(Default)]
pub struct Broadcaster {
    clients: RwLock<BTreeMap<ClientId, Arc<dyn Client>>>,
}

impl Broadcaster {
    /// Creates an empty broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `client`. Returns `false` if it was already registered.
    pub fn register(&self, client: Arc<dyn Client>) -> bool {
        let id = client.id();
        let fresh = self.clients.write().insert(id, client).is_none();
        tracing::info!("client_register: {id} (fresh: {fresh})");
        fresh
    }

    /// Unsubscribes the client with `id`. Returns `false` if it was unknown.
    pub fn unregister(&self, id: ClientId) -> bool {
        let removed = self.clients.write().remove(&id).is_some();
        tracing::info!("client_unregister: {id} (was registered: {removed})");
        removed
    }

    /// Whether a client with `id` is subscribed.
    pub fn is_registered(&self, id: ClientId) -> bool {
        self.clients.read().contains_key(&id)
    }

    /// Number of subscribed clients.
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Whether no client is subscribed.
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Sends `notification` to every subscribed client except `except`.
    ///
    /// Clients are called after the registry lock is released, so a client
    /// may unregister itself from inside [`Client::notify`].
    pub fn send(&self, notification: &Notification, except: Option<ClientId>) {
        let targets: Vec<Arc<dyn Client>> = self
            .clients
            .read()
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .map(|(_, client)| Arc::clone(client))
            .collect();
        for client in targets {
            client.notify(notification);
        }
    }

    // ── Notification helpers ──

    /// Broadcasts that an object exists.
    pub fn put(&self, path: Path, kind: ObjectKind, properties: Properties) {
        self.send(
            &Notification::Put {
                path,
                kind,
                properties,
            },
            None,
        );
    }

    /// Broadcasts a property delta.
    pub fn delta(&self, path: Path, remove: Properties, add: Properties) {
        self.send(&Notification::Delta { path, remove, add }, None);
    }

    /// Broadcasts a rename.
    pub fn move_object(&self, old: Path, new: Path) {
        self.send(&Notification::Move { old, new }, None);
    }

    /// Broadcasts a removal.
    pub fn delete(&self, path: Path) {
        self.send(&Notification::Delete { path }, None);
    }

    /// Broadcasts a new connection.
    pub fn connect(&self, tail: Path, head: Path) {
        self.send(&Notification::Connect { tail, head }, None);
    }

    /// Broadcasts a removed connection.
    pub fn disconnect(&self, tail: Path, head: Path) {
        self.send(&Notification::Disconnect { tail, head }, None);
    }

    /// Broadcasts a property change to everyone but its originator, which
    /// already knows the value it set.
    pub fn set_property(
        &self,
        subject: Path,
        predicate: Uri,
        value: Atom,
        origin: Option<ClientId>,
    ) {
        self.send(
            &Notification::SetProperty {
                subject,
                predicate,
                value,
            },
            origin,
        );
    }
}

impl core::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("clients", &self.clients.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

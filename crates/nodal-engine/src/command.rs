//! The command record that travels through all three pipeline stages.
//!
//! A [`Command`] is created by a decoder, owned by exactly one stage at a
//! time, and moves between stages inside a `Box` so that the real-time queue
//! only ever transfers a pointer.
//!
//! ```text
//!            pre_process              execute               post_process
//! Pending ──────────────▶ PreProcessed ──────▶ Executed ─────────────▶ PostProcessed
//!    │                                                                   ▲
//!    └────────────▶ Rejected ────────────────────────────────────────────┘
//!                   (skipped by execute, still responded to)
//! ```

use std::sync::{Arc, Weak};

use nodal_core::{
    Atom, Edge, GraphObject, ObjectKind, Path, Properties, Snapshot, Uri,
};

use crate::client::{Client, ClientId, Notification};
use crate::error::CommandError;

/// Engine time in samples since the engine started.
pub type FrameTime = u64;

/// Lifecycle state of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Freshly decoded, not yet resolved.
    Pending,
    /// Resolved and validated; waiting for the real-time stage.
    PreProcessed,
    /// Failed resolution or validation. Terminal except for the response.
    Rejected,
    /// Ran on the real-time thread (possibly recording an execution error).
    Executed,
    /// Responded to and broadcast. Terminal.
    PostProcessed,
}

/// How a [`Payload::Put`] treats an occupied path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PutMode {
    /// Fail with a duplicate-path error.
    #[default]
    Create,
    /// Pick the first free numeric suffix for the final symbol.
    Unique,
}

/// What a command asks the engine to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Create an object.
    Put {
        /// Requested path.
        path: Path,
        /// Kind of object.
        kind: ObjectKind,
        /// Initial properties.
        properties: Properties,
        /// Collision policy.
        mode: PutMode,
    },
    /// Remove, then add, properties of an existing object.
    Delta {
        /// Object to edit.
        subject: Path,
        /// Properties to remove (wildcard values remove every value).
        remove: Properties,
        /// Properties to add.
        add: Properties,
    },
    /// Replace every value of one predicate.
    SetProperty {
        /// Object to edit.
        subject: Path,
        /// Predicate.
        predicate: Uri,
        /// New value.
        value: Atom,
    },
    /// Rename an object and its subtree within the same parent.
    Move {
        /// Current path.
        old: Path,
        /// New path.
        new: Path,
    },
    /// Remove an object and its subtree.
    Delete {
        /// Object to remove.
        path: Path,
    },
    /// Connect an output port to an input port.
    Connect {
        /// Output port.
        tail: Path,
        /// Input port.
        head: Path,
    },
    /// Remove one connection.
    Disconnect {
        /// Output port.
        tail: Path,
        /// Input port.
        head: Path,
    },
    /// Remove every connection in `graph` touching `path` or its subtree.
    DisconnectAll {
        /// Graph owning the connections.
        graph: Path,
        /// Port or block whose connections go.
        path: Path,
    },
    /// Put an internal block into learn mode.
    Learn {
        /// Block path.
        path: Path,
    },
    /// Describe an object and its subtree to the requester.
    Get {
        /// Root of the description.
        subject: Path,
    },
    /// Subscribe the originating client to notifications.
    RegisterClient,
    /// Unsubscribe the originating client.
    UnregisterClient,
}

impl Payload {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Put { .. } => "put",
            Self::Delta { .. } => "delta",
            Self::SetProperty { .. } => "set_property",
            Self::Move { .. } => "move",
            Self::Delete { .. } => "delete",
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::DisconnectAll { .. } => "disconnect_all",
            Self::Learn { .. } => "learn",
            Self::Get { .. } => "get",
            Self::RegisterClient => "register_client",
            Self::UnregisterClient => "unregister_client",
        }
    }

    /// Main path the payload refers to, if any.
    pub fn subject(&self) -> Option<&Path> {
        match self {
            Self::Put { path, .. }
            | Self::Delete { path }
            | Self::Learn { path }
            | Self::DisconnectAll { path, .. } => Some(path),
            Self::Delta { subject, .. }
            | Self::SetProperty { subject, .. }
            | Self::Get { subject } => Some(subject),
            Self::Move { old, .. } => Some(old),
            Self::Connect { tail, .. } | Self::Disconnect { tail, .. } => Some(tail),
            Self::RegisterClient | Self::UnregisterClient => None,
        }
    }
}

/// Pending replacement of a graph's live arc list.
pub(crate) struct ArcUpdate {
    pub(crate) graph: Arc<GraphObject>,
    /// Staged in stage 1, taken by stage 2.
    pub(crate) next: Option<Arc<Snapshot<Vec<Edge>>>>,
    /// Displaced by stage 2, dropped in stage 3.
    pub(crate) retired: Option<Arc<Snapshot<Vec<Edge>>>>,
}

impl ArcUpdate {
    pub(crate) fn new(graph: Arc<GraphObject>, next: Arc<Snapshot<Vec<Edge>>>) -> Self {
        Self {
            graph,
            next: Some(next),
            retired: None,
        }
    }

    /// Publishes the staged list. Moves the `Arc`s, never clones them.
    #[inline]
    pub(crate) fn publish(&mut self) {
        if let Some(next) = self.next.take() {
            self.retired = Some(match self.graph.arcs().publish(next) {
                Ok(displaced) | Err(displaced) => displaced,
            });
        }
    }
}

/// Everything stage 1 resolved for stage 2 and stage 3.
///
/// Stage 2 only reads through these handles and moves `Arc`s between
/// fields; every allocation and deallocation happens on either side of it.
#[derive(Default)]
pub(crate) enum Prepared {
    #[default]
    Nothing,
    Put {
        object: Arc<GraphObject>,
    },
    Properties {
        object: Arc<GraphObject>,
        next: Option<Arc<Snapshot<Properties>>>,
        value: Option<f32>,
        retired: Option<Arc<Snapshot<Properties>>>,
    },
    Moved {
        renamed: Vec<(Path, Path)>,
    },
    Deleted {
        removed: Vec<Arc<GraphObject>>,
        arcs: Vec<ArcUpdate>,
        /// Epoch of the cycle that executed the delete.
        epoch: u64,
    },
    Arcs {
        update: ArcUpdate,
        /// `(tail, head)` paths of every removed connection.
        removed: Vec<(Path, Path)>,
    },
    Learn {
        block: Arc<GraphObject>,
    },
    Described {
        objects: Vec<Notification>,
    },
}

/// One client request and its lifecycle. See the module documentation.
pub struct Command {
    id: i32,
    timestamp: FrameTime,
    client: Option<Weak<dyn Client>>,
    client_id: Option<ClientId>,
    payload: Payload,
    state: State,
    error: Option<CommandError>,
    seq: u64,
    pub(crate) prepared: Prepared,
}

impl Command {
    /// Creates an engine-internal command with no originating client.
    pub fn new(id: i32, timestamp: FrameTime, payload: Payload) -> Self {
        Self {
            id,
            timestamp,
            client: None,
            client_id: None,
            payload,
            state: State::Pending,
            error: None,
            seq: 0,
            prepared: Prepared::Nothing,
        }
    }

    /// Creates a command on behalf of `client`.
    ///
    /// Only a weak reference is kept; if the client is gone by the time the
    /// command is pre-processed, the command is cancelled.
    pub fn from_client(
        client: &Arc<dyn Client>,
        id: i32,
        timestamp: FrameTime,
        payload: Payload,
    ) -> Self {
        let mut command = Self::new(id, timestamp, payload);
        command.client = Some(Arc::downgrade(client));
        command.client_id = Some(client.id());
        command
    }

    /// Request id, echoed in the response.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Execution time: as requested, or later if stage 1 had to schedule
    /// it behind an earlier command on the same objects.
    pub fn timestamp(&self) -> FrameTime {
        self.timestamp
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Failure recorded by stage 1 or stage 2.
    pub fn error(&self) -> Option<&CommandError> {
        self.error.as_ref()
    }

    /// What was requested.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Stage-1 completion order; breaks timestamp ties.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Id of the originating client, if any.
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    /// The originating client, if it is still alive.
    pub fn client(&self) -> Option<Arc<dyn Client>> {
        self.client.as_ref().and_then(Weak::upgrade)
    }

    /// Whether the command was sent by a client that has since gone away.
    pub(crate) fn is_orphaned(&self) -> bool {
        self.client
            .as_ref()
            .is_some_and(|client| client.strong_count() == 0)
    }

    /// Ordering key for the real-time stage.
    #[inline]
    pub(crate) fn order_key(&self) -> (FrameTime, u64) {
        (self.timestamp, self.seq)
    }

    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    /// Moves the command later. Never earlier.
    pub(crate) fn delay_until(&mut self, at: FrameTime) {
        self.timestamp = self.timestamp.max(at);
    }

    pub(crate) fn transition(&mut self, to: State) {
        debug_assert!(
            matches!(
                (self.state, to),
                (State::Pending, State::PreProcessed | State::Rejected)
                    | (State::PreProcessed, State::Executed)
                    | (State::Executed | State::Rejected, State::PostProcessed)
            ),
            "illegal transition {:?} -> {to:?}",
            self.state
        );
        self.state = to;
    }

    /// Records a stage-1 failure and moves to [`State::Rejected`].
    pub(crate) fn reject(&mut self, error: CommandError) {
        self.error = Some(error);
        self.prepared = Prepared::Nothing;
        self.transition(State::Rejected);
    }

    /// Records a stage-2 failure. The state still becomes `Executed`.
    #[inline]
    pub(crate) fn fail(&mut self, error: CommandError) {
        self.error = Some(error);
    }
}

impl core::fmt::Debug for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("timestamp", &self.timestamp)
            .field("seq", &self.seq)
            .field("state", &self.state)
            .field("payload", &self.payload)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_command_is_pending() {
        let cmd = Command::new(
            7,
            480,
            Payload::Delete {
                path: Path::new("/g").unwrap(),
            },
        );
        assert_eq!(cmd.id(), 7);
        assert_eq!(cmd.timestamp(), 480);
        assert_eq!(cmd.state(), State::Pending);
        assert!(cmd.error().is_none());
        assert!(cmd.client().is_none());
        assert!(!cmd.is_orphaned());
    }

    #[test]
    fn reject_records_error() {
        let mut cmd = Command::new(1, 0, Payload::RegisterClient);
        cmd.reject(CommandError::bad_request("nope"));
        assert_eq!(cmd.state(), State::Rejected);
        assert_eq!(cmd.error().map(|e| e.message.as_ref()), Some("nope"));
        cmd.transition(State::PostProcessed);
        assert_eq!(cmd.state(), State::PostProcessed);
    }

    #[test]
    #[should_panic(expected = "illegal transition")]
    #[cfg(debug_assertions)]
    fn rejected_cannot_execute() {
        let mut cmd = Command::new(1, 0, Payload::RegisterClient);
        cmd.reject(CommandError::bad_request("nope"));
        cmd.transition(State::Executed);
    }

    #[test]
    fn payload_subject() {
        let tail = Path::new("/g/a/out").unwrap();
        let payload = Payload::Connect {
            tail: tail.clone(),
            head: Path::new("/g/b/in").unwrap(),
        };
        assert_eq!(payload.subject(), Some(&tail));
        assert_eq!(payload.name(), "connect");
        assert_eq!(Payload::RegisterClient.subject(), None);
    }
}

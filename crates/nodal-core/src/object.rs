//! Graph objects: graphs, blocks and ports.
//!
//! A [`GraphObject`] never points at its parent or children; hierarchy is
//! derived from its [`Path`] by the [`Store`](crate::Store). What an object
//! *does* own is the small amount of state the real-time thread reads and
//! writes while a cycle runs:
//!
//! | State | Kind | Written by |
//! |-------|------|------------|
//! | `active` | all | execute of Put (set) and Delete (clear) |
//! | `value` | ports | execute of SetProperty / Delta / Put |
//! | `learning` | internal blocks | execute of Learn |
//! | `properties` | all | execute publishes a staged snapshot |
//! | `arcs` | graphs | execute publishes a staged snapshot |
//!
//! Flags and values are atomics; collections are [`Staged`] snapshots, so
//! the real-time side never locks or allocates. Each object also remembers
//! the frame time its creation is scheduled for, which the pre-processor
//! uses to keep later commands on it from running first.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::atom::{Uri, uris};
use crate::path::Path;
use crate::properties::Properties;
use crate::staged::{Snapshot, Staged};

/// Built-in block types implemented by the engine itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalKind {
    /// Emits a control value (learnable).
    Control,
    /// Emits note events.
    Note,
    /// Emits a trigger on a matching note.
    Trigger,
    /// Emits transport time.
    Time,
}

/// What a block is backed by.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BlockKind {
    /// A block implemented inside the engine.
    Internal {
        /// Which internal block.
        internal: InternalKind,
    },
    /// A block backed by an externally loaded plugin.
    Plugin {
        /// Plugin identifier.
        uri: Uri,
    },
}

/// Signal flow direction of a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    /// Receives signal.
    Input,
    /// Produces signal.
    Output,
}

/// The role of an object in the hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectKind {
    /// A container of blocks, ports and subgraphs.
    Graph,
    /// A processing unit with ports.
    Block {
        /// Backend of the block.
        block: BlockKind,
    },
    /// A connection point on a block or graph.
    Port {
        /// Direction of the port.
        direction: PortDirection,
    },
}

impl ObjectKind {
    /// Shorthand for an internal block kind.
    pub fn internal(internal: InternalKind) -> Self {
        Self::Block {
            block: BlockKind::Internal { internal },
        }
    }

    /// Shorthand for a plugin block kind.
    pub fn plugin(uri: impl Into<Uri>) -> Self {
        Self::Block {
            block: BlockKind::Plugin { uri: uri.into() },
        }
    }

    /// Shorthand for an input port kind.
    pub fn input() -> Self {
        Self::Port {
            direction: PortDirection::Input,
        }
    }

    /// Shorthand for an output port kind.
    pub fn output() -> Self {
        Self::Port {
            direction: PortDirection::Output,
        }
    }

    /// Lower-case kind name used in messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Block { .. } => "block",
            Self::Port { .. } => "port",
        }
    }

    /// Whether this is a graph.
    pub fn is_graph(&self) -> bool {
        matches!(self, Self::Graph)
    }

    /// Whether this is a port.
    pub fn is_port(&self) -> bool {
        matches!(self, Self::Port { .. })
    }

    /// Whether this is a block backed by an internal implementation.
    pub fn is_internal_block(&self) -> bool {
        matches!(
            self,
            Self::Block {
                block: BlockKind::Internal { .. }
            }
        )
    }

    /// Port direction, if this is a port.
    pub fn direction(&self) -> Option<PortDirection> {
        match self {
            Self::Port { direction } => Some(*direction),
            _ => None,
        }
    }

    /// Whether an object of this kind may have a direct child of kind `child`.
    ///
    /// Graphs hold anything; blocks hold only ports; ports hold nothing.
    pub fn can_contain(&self, child: &ObjectKind) -> bool {
        match self {
            Self::Graph => true,
            Self::Block { .. } => child.is_port(),
            Self::Port { .. } => false,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A directed connection between an output port and an input port.
///
/// Arcs hold the port objects themselves, so renaming a block never
/// invalidates them; the current paths are read on demand.
#[derive(Clone)]
pub struct Edge {
    /// Output port the signal leaves.
    pub tail: Arc<GraphObject>,
    /// Input port the signal enters.
    pub head: Arc<GraphObject>,
}

impl Edge {
    /// Whether this edge connects exactly `tail` to `head`.
    pub fn connects(&self, tail: &Arc<GraphObject>, head: &Arc<GraphObject>) -> bool {
        Arc::ptr_eq(&self.tail, tail) && Arc::ptr_eq(&self.head, head)
    }

    /// Whether either endpoint is `path` or lies below it.
    pub fn touches(&self, path: &Path) -> bool {
        let tail = self.tail.path();
        let head = self.head.path();
        tail == *path || tail.is_descendant_of(path) || head == *path || head.is_descendant_of(path)
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Edge({} -> {})", self.tail.path(), self.head.path())
    }
}

/// A node of the object hierarchy. See the module documentation.
pub struct GraphObject {
    path: ArcSwap<Path>,
    kind: ObjectKind,
    properties: Staged<Properties>,
    active: AtomicBool,
    value: AtomicU32,
    learning: AtomicBool,
    arcs: Staged<Vec<Edge>>,
    created_at: AtomicU64,
}

impl GraphObject {
    /// Creates an inactive object.
    ///
    /// Ports take their initial value from the `nodal:value` property.
    pub fn new(path: Path, kind: ObjectKind, properties: Properties) -> Self {
        let value = properties
            .get(uris::VALUE)
            .and_then(|v| v.as_f32())
            .unwrap_or(0.0);
        Self {
            path: ArcSwap::from_pointee(path),
            kind,
            properties: Staged::new(properties),
            active: AtomicBool::new(false),
            value: AtomicU32::new(value.to_bits()),
            learning: AtomicBool::new(false),
            arcs: Staged::new(Vec::new()),
            created_at: AtomicU64::new(0),
        }
    }

    /// Current path. Changes only when the [`Store`](crate::Store) renames it.
    pub fn path(&self) -> Path {
        Path::clone(&self.path.load())
    }

    pub(crate) fn set_path(&self, path: Path) {
        self.path.store(Arc::new(path));
    }

    /// Kind of the object.
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Frame time the command creating this object executes at.
    pub fn created_at(&self) -> u64 {
        self.created_at.load(Ordering::Acquire)
    }

    /// Records when the creating command is scheduled to execute.
    pub fn set_created_at(&self, at: u64) {
        self.created_at.store(at, Ordering::Release);
    }

    // --- Real-time state ---

    /// Whether the object takes part in processing.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Activates or deactivates the object (real-time safe).
    #[inline]
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Current port value.
    #[inline]
    pub fn value(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Sets the port value (real-time safe).
    #[inline]
    pub fn set_value(&self, value: f32) {
        self.value.store(value.to_bits(), Ordering::Release);
    }

    /// Whether the block is waiting to learn a control binding.
    #[inline]
    pub fn is_learning(&self) -> bool {
        self.learning.load(Ordering::Acquire)
    }

    /// Starts or stops learn mode (real-time safe).
    #[inline]
    pub fn set_learning(&self, learning: bool) {
        self.learning.store(learning, Ordering::Release);
    }

    // --- Snapshot state ---

    /// Staged/live property cell.
    pub fn properties(&self) -> &Staged<Properties> {
        &self.properties
    }

    /// Live properties.
    pub fn live_properties(&self) -> Arc<Snapshot<Properties>> {
        self.properties.load()
    }

    /// Staged/live arc list. Only graphs carry arcs.
    pub fn arcs(&self) -> &Staged<Vec<Edge>> {
        &self.arcs
    }
}

impl fmt::Debug for GraphObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphObject")
            .field("path", &self.path())
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

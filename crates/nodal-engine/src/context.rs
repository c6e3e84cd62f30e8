//! Shared collaborators injected into the pipeline stages.

use std::sync::Arc;

use nodal_core::{EpochClock, GraphObject, ObjectKind, Path, Properties, Reclaimer, Store};

use crate::client::Broadcaster;
use crate::processor::SampleClock;

/// Everything the non-real-time stages share.
///
/// Nothing here is global: each engine (and each test) builds its own
/// context and hands clones of it to the stages.
#[derive(Clone)]
pub struct Context {
    /// Object hierarchy. Locked by the non-real-time stages only.
    pub store: Arc<Store>,
    /// Registered clients.
    pub broadcaster: Arc<Broadcaster>,
    /// Removed objects awaiting destruction.
    pub reclaimer: Arc<Reclaimer>,
    /// Cycle counter advanced by the real-time stage.
    pub epoch: EpochClock,
    /// Sample position advanced by the real-time stage.
    pub clock: SampleClock,
}

impl Context {
    /// Creates a context whose store holds an active root graph.
    pub fn new() -> Self {
        let root = Arc::new(GraphObject::new(
            Path::root(),
            ObjectKind::Graph,
            Properties::new(),
        ));
        root.set_active(true);
        Self {
            store: Arc::new(Store::with_root(root)),
            broadcaster: Arc::new(Broadcaster::new()),
            reclaimer: Arc::new(Reclaimer::new()),
            epoch: EpochClock::new(),
            clock: SampleClock::new(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

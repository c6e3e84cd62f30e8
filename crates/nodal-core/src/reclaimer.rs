//! Epoch-based deferred destruction.
//!
//! Objects removed from the [`Store`](crate::Store) may still be referenced by
//! the real-time thread for the rest of the cycle in which they were removed.
//! The [`Reclaimer`] keeps them alive, tagged with the [`EpochClock`] reading at
//! removal time, until a housekeeping [`sweep`](Reclaimer::sweep) observes
//! that at least one full cycle has completed since.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::object::GraphObject;

/// Count of completed processing cycles.
///
/// The real-time thread advances it once at the end of every cycle; everyone
/// else only reads it. Cloning shares the same counter.
#[derive(Clone, Debug, Default)]
pub struct EpochClock {
    cycles: Arc<AtomicU64>,
}

impl EpochClock {
    /// Creates a clock at epoch 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current epoch.
    #[inline]
    pub fn current(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Marks the end of a cycle (real-time thread only). Returns the new epoch.
    #[inline]
    pub fn advance(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::AcqRel) + 1
    }
}

struct Retired {
    /// Only held, never read; dropping the entry releases it.
    _object: Arc<GraphObject>,
    epoch: u64,
}

/// Holds removed objects until destroying them is safe.
///
/// Never touched by the real-time thread.
#[derive(Default)]
pub struct Reclaimer {
    retired: Mutex<Vec<Retired>>,
}

impl Reclaimer {
    /// Creates an empty reclaimer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of removed objects, tagging them with `epoch`.
    ///
    /// Epochs must be passed in non-decreasing order, which holds as long as
    /// they are read from one [`EpochClock`].
    pub fn retire(&self, objects: impl IntoIterator<Item = Arc<GraphObject>>, epoch: u64) {
        let mut retired = self.retired.lock();
        debug_assert!(retired.last().is_none_or(|r| r.epoch <= epoch));
        let before = retired.len();
        retired.extend(objects.into_iter().map(|object| Retired {
            _object: object,
            epoch,
        }));
        tracing::debug!(
            "reclaimer_retire: {} objects at epoch {epoch}",
            retired.len() - before
        );
    }

    /// Destroys every entry retired before `current_epoch`. Returns how many.
    ///
    /// An entry retired at epoch `E` survives every sweep with
    /// `current_epoch <= E` and is released by the first sweep at `E + 1` or
    /// later. Objects still referenced elsewhere are freed when that last
    /// reference goes away.
    pub fn sweep(&self, current_epoch: u64) -> usize {
        let expired: Vec<Retired> = {
            let mut retired = self.retired.lock();
            let split = retired.partition_point(|r| r.epoch < current_epoch);
            retired.drain(..split).collect()
        };
        let count = expired.len();
        if count > 0 {
            tracing::debug!("reclaimer_sweep: freeing {count} objects at epoch {current_epoch}");
        }
        // Dropped outside the lock.
        drop(expired);
        count
    }

    /// Number of objects awaiting destruction.
    pub fn pending(&self) -> usize {
        self.retired.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;
    use crate::path::Path;
    use crate::properties::Properties;

    fn object(path: &str) -> Arc<GraphObject> {
        Arc::new(GraphObject::new(
            Path::new(path).unwrap(),
            ObjectKind::Graph,
            Properties::new(),
        ))
    }

    #[test]
    fn clock_advances() {
        let clock = EpochClock::new();
        let shared = clock.clone();
        assert_eq!(clock.advance(), 1);
        assert_eq!(shared.current(), 1);
    }

    #[test]
    fn object_outlives_its_removal_epoch() {
        let reclaimer = Reclaimer::new();
        let obj = object("/g");
        let weak = Arc::downgrade(&obj);
        reclaimer.retire([obj], 5);

        assert_eq!(reclaimer.sweep(4), 0);
        assert_eq!(reclaimer.sweep(5), 0);
        assert!(weak.upgrade().is_some());

        assert_eq!(reclaimer.sweep(6), 1);
        assert!(weak.upgrade().is_none());
        assert_eq!(reclaimer.pending(), 0);
    }

    #[test]
    fn sweep_only_releases_old_entries() {
        let reclaimer = Reclaimer::new();
        reclaimer.retire([object("/a"), object("/b")], 1);
        reclaimer.retire([object("/c")], 3);
        assert_eq!(reclaimer.sweep(2), 2);
        assert_eq!(reclaimer.pending(), 1);
        assert_eq!(reclaimer.sweep(4), 1);
    }
}

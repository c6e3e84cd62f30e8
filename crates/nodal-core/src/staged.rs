//! Two-sided snapshot cell bridging the non-real-time and real-time stages.
//!
//! A [`Staged<T>`] holds two views of the same value:
//!
//! - the **staged** view, edited by the pre-processor under a mutex. Each edit
//!   clones the newest staged snapshot, so consecutive edits compose even
//!   before any of them has been published.
//! - the **live** view, an [`ArcSwap`] the real-time thread replaces with
//!   [`publish()`](Staged::publish). Publishing never allocates or frees: the
//!   displaced snapshot is handed back to the caller, which carries it to the
//!   post-processor to be dropped there.
//!
//! Each staged edit also records the frame time it is scheduled to go live
//! at. Callers never schedule an edit earlier than the one before it on the
//! same cell ([`staged_at()`](Staged::staged_at) tells them the bound), so
//! generation order and execution order agree. `publish` still refuses to
//! move backwards and reports a stale snapshot as an `Err`.

use core::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

/// An immutable, generation-stamped value.
#[derive(Debug)]
pub struct Snapshot<T> {
    generation: u64,
    value: T,
}

impl<T> Snapshot<T> {
    /// Generation number; higher is newer.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

struct Head<T> {
    snapshot: Arc<Snapshot<T>>,
    at: u64,
}

/// See the module documentation.
pub struct Staged<T> {
    staged: Mutex<Head<T>>,
    live: ArcSwap<Snapshot<T>>,
    live_generation: AtomicU64,
}

impl<T: Clone> Staged<T> {
    /// Creates a cell whose staged and live views both hold `value`.
    pub fn new(value: T) -> Self {
        let initial = Arc::new(Snapshot {
            generation: 0,
            value,
        });
        Self {
            staged: Mutex::new(Head {
                snapshot: Arc::clone(&initial),
                at: 0,
            }),
            live: ArcSwap::new(initial),
            live_generation: AtomicU64::new(0),
        }
    }

    /// Builds the next snapshot from the newest staged one (non-real-time),
    /// to be published at frame time `at`.
    ///
    /// `at` must not be earlier than [`staged_at()`](Self::staged_at). The
    /// returned snapshot is not visible to readers of the live view until it
    /// is passed to [`publish()`](Self::publish).
    pub fn stage(&self, at: u64, edit: impl FnOnce(&mut T)) -> Arc<Snapshot<T>> {
        let mut head = self.staged.lock();
        debug_assert!(at >= head.at, "staged at {at}, before {}", head.at);
        let mut value = head.snapshot.value.clone();
        edit(&mut value);
        let next = Arc::new(Snapshot {
            generation: head.snapshot.generation + 1,
            value,
        });
        head.snapshot = Arc::clone(&next);
        head.at = head.at.max(at);
        next
    }
}

impl<T> Staged<T> {
    /// Makes `next` the live snapshot unless a newer one is already live.
    ///
    /// Real-time safe: one atomic load, one `ArcSwap` swap, no allocation.
    /// Returns `Ok` with the displaced snapshot, or `Err(next)` if `next` was
    /// stale and nothing changed. Either way the caller must drop what it gets
    /// back off the real-time thread. Only one thread may publish to a given
    /// cell.
    pub fn publish(&self, next: Arc<Snapshot<T>>) -> Result<Arc<Snapshot<T>>, Arc<Snapshot<T>>> {
        if next.generation <= self.live_generation.load(Ordering::Acquire) {
            return Err(next);
        }
        self.live_generation
            .store(next.generation, Ordering::Release);
        Ok(self.live.swap(next))
    }

    /// Current live snapshot.
    pub fn load(&self) -> Arc<Snapshot<T>> {
        self.live.load_full()
    }

    /// Newest staged snapshot, published or not.
    pub fn staged(&self) -> Arc<Snapshot<T>> {
        Arc::clone(&self.staged.lock().snapshot)
    }

    /// Frame time the newest staged snapshot is scheduled for.
    pub fn staged_at(&self) -> u64 {
        self.staged.lock().at
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for Staged<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Staged")
            .field("live", &self.live.load().value)
            .finish_non_exhaustive()
    }
}

//! Path-indexed object store.
//!
//! [`Store`] owns every live [`GraphObject`] in a single ordered map keyed by
//! [`Path`]. Because paths order segment by segment, an object and all of its
//! descendants occupy one contiguous key range starting at the object itself:
//!
//! ```text
//! /             <- root
//! /main
//! /main/osc         ┐
//! /main/osc/freq    │ subtree of /main/osc
//! /main/osc/out     ┘
//! /main/osc1        <- first key past the subtree
//! ```
//!
//! Subtree operations ([`remove`](StoreGuard::remove),
//! [`rename`](StoreGuard::rename), [`children_range`](StoreGuard::children_range))
//! therefore cost one ordered seek plus the size of the subtree.
//!
//! # Locking
//!
//! All access goes through one same-thread-reentrant lock, so a pipeline stage
//! that already holds a [`StoreGuard`] can call back into the store without
//! deadlocking. Only non-real-time threads ever take this lock.

use core::cell::RefCell;
use core::ops::Bound;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use thiserror::Error;

use crate::object::GraphObject;
use crate::path::{Path, Symbol};

type ObjectMap = BTreeMap<Path, Arc<GraphObject>>;

/// Errors returned by structural store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// An object already exists at this path.
    #[error("an object already exists at {0}")]
    DuplicatePath(Path),

    /// No object exists at this path.
    #[error("no object at {0}")]
    NotFound(Path),

    /// A rename would land on an occupied path.
    #[error("rename target {0} is already occupied")]
    PathCollision(Path),

    /// A subtree cannot be moved below itself.
    #[error("cannot move {from} into its own subtree at {to}")]
    InvalidMove {
        /// Subtree being moved.
        from: Path,
        /// Requested destination.
        to: Path,
    },
}

/// The object store. See the module documentation.
#[derive(Default)]
pub struct Store {
    objects: ReentrantMutex<RefCell<ObjectMap>>,
}

/// Exclusive (but re-enterable) access to the [`Store`].
///
/// Holding a guard makes a sequence of operations atomic with respect to
/// other threads.
pub struct StoreGuard<'a> {
    objects: ReentrantMutexGuard<'a, RefCell<ObjectMap>>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding only `root`.
    pub fn with_root(root: Arc<GraphObject>) -> Self {
        let mut objects = ObjectMap::new();
        objects.insert(root.path(), root);
        Self {
            objects: ReentrantMutex::new(RefCell::new(objects)),
        }
    }

    /// Takes the store lock. Re-entrant on the same thread.
    pub fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            objects: self.objects.lock(),
        }
    }

    /// See [`StoreGuard::get`].
    pub fn get(&self, path: &Path) -> Option<Arc<GraphObject>> {
        self.lock().get(path)
    }

    /// See [`StoreGuard::contains`].
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    /// See [`StoreGuard::add`].
    pub fn add(&self, object: Arc<GraphObject>) -> Result<(), StoreError> {
        self.lock().add(object)
    }

    /// See [`StoreGuard::remove`].
    pub fn remove(&self, top: &Path) -> Result<Vec<Arc<GraphObject>>, StoreError> {
        self.lock().remove(top)
    }

    /// See [`StoreGuard::rename`].
    pub fn rename(&self, top: &Path, new_path: &Path) -> Result<Vec<(Path, Path)>, StoreError> {
        self.lock().rename(top, new_path)
    }

    /// See [`StoreGuard::children_range`].
    pub fn children_range(&self, parent: &Path) -> Vec<Arc<GraphObject>> {
        self.lock().children_range(parent)
    }

    /// See [`StoreGuard::children`].
    pub fn children(&self, parent: &Path) -> Vec<Arc<GraphObject>> {
        self.lock().children(parent)
    }

    /// See [`StoreGuard::child_name_offset`].
    pub fn child_name_offset(&self, parent: &Path, symbol: &Symbol, allow_zero: bool) -> u32 {
        self.lock().child_name_offset(parent, symbol, allow_zero)
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every path, in store order.
    pub fn paths(&self) -> Vec<Path> {
        self.lock().paths()
    }
}

impl StoreGuard<'_> {
    /// Looks up an object. Absence is a normal outcome, not an error.
    pub fn get(&self, path: &Path) -> Option<Arc<GraphObject>> {
        self.objects.borrow().get(path).cloned()
    }

    /// Whether an object exists at `path`.
    pub fn contains(&self, path: &Path) -> bool {
        self.objects.borrow().contains_key(path)
    }

    /// Inserts `object` at its own path.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicatePath`] if the path is taken.
    pub fn add(&self, object: Arc<GraphObject>) -> Result<(), StoreError> {
        let mut objects = self.objects.borrow_mut();
        match objects.entry(object.path()) {
            Entry::Occupied(entry) => Err(StoreError::DuplicatePath(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!("store_add: {} ({})", entry.key(), object.kind());
                entry.insert(object);
                Ok(())
            }
        }
    }

    /// Every proper descendant of `parent`, in path order.
    pub fn children_range(&self, parent: &Path) -> Vec<Arc<GraphObject>> {
        self.objects
            .borrow()
            .range::<Path, _>((Bound::Excluded(parent), Bound::Unbounded))
            .take_while(|(path, _)| path.is_descendant_of(parent))
            .map(|(_, object)| Arc::clone(object))
            .collect()
    }

    /// Immediate children of `parent`, in path order.
    pub fn children(&self, parent: &Path) -> Vec<Arc<GraphObject>> {
        self.objects
            .borrow()
            .range::<Path, _>((Bound::Excluded(parent), Bound::Unbounded))
            .take_while(|(path, _)| path.is_descendant_of(parent))
            .filter(|(path, _)| path.is_child_of(parent))
            .map(|(_, object)| Arc::clone(object))
            .collect()
    }

    /// Extracts `top` and its whole subtree in one step.
    ///
    /// The objects are returned, never dropped here: the caller hands them to
    /// the [`Reclaimer`](crate::Reclaimer). `top` comes first, followed by
    /// its descendants in path order.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if nothing lives at `top`.
    pub fn remove(&self, top: &Path) -> Result<Vec<Arc<GraphObject>>, StoreError> {
        let mut objects = self.objects.borrow_mut();
        if !objects.contains_key(top) {
            return Err(StoreError::NotFound(top.clone()));
        }
        let keys = subtree_keys(&objects, top);
        let removed: Vec<_> = keys.iter().filter_map(|k| objects.remove(k)).collect();
        tracing::debug!("store_remove: {top} ({} objects)", removed.len());
        Ok(removed)
    }

    /// Moves `top` and its subtree so that `top` ends up at `new_path`.
    ///
    /// Every object keeps its identity; only its key and recorded path change.
    /// Either every object moves or none does. Returns the `(old, new)` path
    /// of every moved object, `top` first.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if nothing lives at `top`.
    /// - [`StoreError::InvalidMove`] if `new_path` is below `top`.
    /// - [`StoreError::PathCollision`] if any resulting path is occupied.
    pub fn rename(&self, top: &Path, new_path: &Path) -> Result<Vec<(Path, Path)>, StoreError> {
        let mut objects = self.objects.borrow_mut();
        if !objects.contains_key(top) {
            return Err(StoreError::NotFound(top.clone()));
        }
        if new_path == top {
            return Ok(Vec::new());
        }
        if new_path.is_descendant_of(top) {
            return Err(StoreError::InvalidMove {
                from: top.clone(),
                to: new_path.clone(),
            });
        }

        let moves: Vec<(Path, Path)> = subtree_keys(&objects, top)
            .into_iter()
            .filter_map(|old| old.rebase(top, new_path).map(|new| (old, new)))
            .collect();
        if let Some((_, taken)) = moves.iter().find(|(_, new)| objects.contains_key(new)) {
            return Err(StoreError::PathCollision(taken.clone()));
        }

        let moved: Vec<(Path, Arc<GraphObject>)> = moves
            .iter()
            .filter_map(|(old, new)| objects.remove(old).map(|object| (new.clone(), object)))
            .collect();
        for (new, object) in moved {
            object.set_path(new.clone());
            objects.insert(new, object);
        }
        tracing::debug!("store_rename: {top} → {new_path} ({} objects)", moves.len());
        Ok(moves)
    }

    /// Smallest numeric suffix `n` such that `parent/<symbol><n>` is free.
    ///
    /// Suffix `0` means the bare symbol. With `allow_zero == false` the search
    /// starts at `1`, so the result always differs from the bare symbol.
    pub fn child_name_offset(&self, parent: &Path, symbol: &Symbol, allow_zero: bool) -> u32 {
        let objects = self.objects.borrow();
        let mut offset = u32::from(!allow_zero);
        while objects.contains_key(&parent.child(&symbol.with_suffix(offset))) {
            offset += 1;
        }
        offset
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every path, in store order.
    pub fn paths(&self) -> Vec<Path> {
        self.objects.borrow().keys().cloned().collect()
    }
}

/// `top` and every key of its subtree, in order.
fn subtree_keys(objects: &ObjectMap, top: &Path) -> Vec<Path> {
    objects
        .range::<Path, _>((Bound::Included(top), Bound::Unbounded))
        .take_while(|(path, _)| *path == top || path.is_descendant_of(top))
        .map(|(path, _)| path.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{InternalKind, ObjectKind};
    use crate::properties::Properties;

    fn p(s: &str) -> Path {
        Path::new(s).unwrap()
    }

    fn obj(path: &str, kind: ObjectKind) -> Arc<GraphObject> {
        Arc::new(GraphObject::new(p(path), kind, Properties::new()))
    }

    fn sample_store() -> Store {
        let store = Store::new();
        store.add(obj("/", ObjectKind::Graph)).unwrap();
        store.add(obj("/main", ObjectKind::Graph)).unwrap();
        store
            .add(obj("/main/osc", ObjectKind::internal(InternalKind::Control)))
            .unwrap();
        store.add(obj("/main/osc/out", ObjectKind::output())).unwrap();
        store.add(obj("/main/osc1", ObjectKind::plugin("urn:osc"))).unwrap();
        store.add(obj("/main/osc1/in", ObjectKind::input())).unwrap();
        store.add(obj("/aux", ObjectKind::Graph)).unwrap();
        store
    }

    fn paths(objects: &[Arc<GraphObject>]) -> Vec<String> {
        objects.iter().map(|o| o.path().to_string()).collect()
    }

    #[test]
    fn lists_every_path_in_order() {
        let store = sample_store();
        let listed: Vec<String> = store.paths().iter().map(ToString::to_string).collect();
        assert_eq!(
            listed,
            ["/", "/aux", "/main", "/main/osc", "/main/osc/out", "/main/osc1", "/main/osc1/in"]
        );
        assert_eq!(store.paths(), store.lock().paths());
    }

    #[test]
    fn add_rejects_duplicates() {
        let store = sample_store();
        let err = store.add(obj("/main", ObjectKind::Graph)).unwrap_err();
        assert_eq!(err, StoreError::DuplicatePath(p("/main")));
    }

    #[test]
    fn get_missing_is_none() {
        let store = sample_store();
        assert!(store.get(&p("/nope")).is_none());
        assert!(store.get(&p("/main/osc/out")).is_some());
    }

    #[test]
    fn children_range_is_exactly_the_subtree() {
        let store = sample_store();
        assert_eq!(
            paths(&store.children_range(&p("/main/osc"))),
            ["/main/osc/out"]
        );
        assert_eq!(
            paths(&store.children_range(&p("/main"))),
            ["/main/osc", "/main/osc/out", "/main/osc1", "/main/osc1/in"]
        );
        assert_eq!(paths(&store.children(&p("/main"))), ["/main/osc", "/main/osc1"]);
        assert!(store.children_range(&p("/aux")).is_empty());
    }

    #[test]
    fn remove_takes_whole_subtree() {
        let store = sample_store();
        let removed = store.remove(&p("/main/osc")).unwrap();
        assert_eq!(paths(&removed), ["/main/osc", "/main/osc/out"]);
        assert!(store.get(&p("/main/osc")).is_none());
        assert!(store.get(&p("/main/osc/out")).is_none());
        assert!(store.get(&p("/main/osc1")).is_some());
        assert_eq!(
            store.remove(&p("/main/osc")).unwrap_err(),
            StoreError::NotFound(p("/main/osc"))
        );
    }

    #[test]
    fn rename_keeps_identity() {
        let store = sample_store();
        let before = store.get(&p("/main/osc/out")).unwrap();
        let moves = store.rename(&p("/main/osc"), &p("/main/lfo")).unwrap();
        assert_eq!(moves.len(), 2);

        let after = store.get(&p("/main/lfo/out")).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.path(), p("/main/lfo/out"));
        assert!(store.get(&p("/main/osc")).is_none());
        assert!(store.get(&p("/main/osc1/in")).is_some());
    }

    #[test]
    fn rename_collision_changes_nothing() {
        let store = sample_store();
        let err = store.rename(&p("/main/osc"), &p("/main/osc1")).unwrap_err();
        assert_eq!(err, StoreError::PathCollision(p("/main/osc1")));
        assert!(store.get(&p("/main/osc/out")).is_some());
        assert_eq!(store.len(), 7);
    }

    #[test]
    fn rename_into_own_subtree_is_rejected() {
        let store = sample_store();
        let err = store.rename(&p("/main"), &p("/main/sub")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidMove { .. }));
    }

    #[test]
    fn child_name_offset_skips_used_suffixes() {
        let store = sample_store();
        let osc = Symbol::new("osc").unwrap();
        let lfo = Symbol::new("lfo").unwrap();
        assert_eq!(store.child_name_offset(&p("/main"), &lfo, true), 0);
        assert_eq!(store.child_name_offset(&p("/main"), &lfo, false), 1);
        assert_eq!(store.child_name_offset(&p("/main"), &osc, true), 2);
        assert_eq!(store.child_name_offset(&p("/main"), &osc, false), 2);
        assert_eq!(store.child_name_offset(&p("/aux"), &osc, true), 0);
    }

    #[test]
    fn lock_is_reentrant() {
        let store = sample_store();
        let outer = store.lock();
        let inner = store.lock();
        assert!(inner.get(&p("/main")).is_some());
        assert!(outer.contains(&p("/aux")));
    }
}

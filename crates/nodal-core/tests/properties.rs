//! Property-based tests for the path-indexed store.
//!
//! Paths are drawn from a small alphabet with deliberately awkward
//! neighbours (`a`, `a0`, `a_b`, `ab`) so that string order and segment
//! order disagree often.

use std::collections::BTreeSet;
use std::sync::Arc;

use nodal_core::{GraphObject, ObjectKind, Path, Properties, Store, StoreError};
use proptest::prelude::*;

const SEGMENTS: &[&str] = &["a", "a0", "a_b", "ab", "b", "z"];

fn path_strategy() -> impl Strategy<Value = Path> {
    prop::collection::vec(prop::sample::select(SEGMENTS), 1..4)
        .prop_map(|segments| Path::new(format!("/{}", segments.join("/"))).unwrap())
}

fn paths_strategy() -> impl Strategy<Value = Vec<Path>> {
    prop::collection::vec(path_strategy(), 1..24).prop_map(|paths| {
        paths
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    })
}

fn build(paths: &[Path]) -> Store {
    let store = Store::new();
    for path in paths {
        store
            .add(Arc::new(GraphObject::new(
                path.clone(),
                ObjectKind::Graph,
                Properties::new(),
            )))
            .unwrap();
    }
    store
}

fn subtree(paths: &[Path], top: &Path) -> Vec<Path> {
    paths
        .iter()
        .filter(|p| *p == top || p.is_descendant_of(top))
        .cloned()
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Every object's descendants sit directly after it in store order.
    #[test]
    fn descendants_are_contiguous(paths in paths_strategy()) {
        let store = build(&paths);
        let order = store.lock().paths();
        for (i, top) in order.iter().enumerate() {
            let count = order.iter().filter(|p| p.is_descendant_of(top)).count();
            for p in &order[i + 1..=i + count] {
                prop_assert!(p.is_descendant_of(top), "{} breaks the run after {}", p, top);
            }
        }
    }

    /// `children_range(P)` yields exactly the proper descendants, in order.
    #[test]
    fn children_range_is_exact(paths in paths_strategy()) {
        let store = build(&paths);
        for top in &paths {
            let got: Vec<Path> = store.children_range(top).iter().map(|o| o.path()).collect();
            let want: Vec<Path> = paths
                .iter()
                .filter(|p| p.is_descendant_of(top))
                .cloned()
                .collect();
            prop_assert_eq!(got, want);
        }
    }

    /// After `remove(P)`, nothing at or below P resolves and everything else does.
    #[test]
    fn remove_takes_exactly_the_subtree(paths in paths_strategy(), pick in any::<prop::sample::Index>()) {
        let store = build(&paths);
        let top = pick.get(&paths).clone();
        let removed: Vec<Path> = store.remove(&top).unwrap().iter().map(|o| o.path()).collect();

        let gone = subtree(&paths, &top);
        prop_assert_eq!(&removed, &gone);
        for p in &paths {
            prop_assert_eq!(store.get(p).is_some(), !gone.contains(p), "{}", p);
        }
    }

    /// `rename(P, P')` maps every `P/rel` to `P'/rel` with the same instance,
    /// or changes nothing on collision.
    #[test]
    fn rename_maps_subtree(
        paths in paths_strategy(),
        pick in any::<prop::sample::Index>(),
        symbol in prop::sample::select(SEGMENTS),
    ) {
        let store = build(&paths);
        let top = pick.get(&paths).clone();
        let Some(parent) = top.parent() else { return Ok(()); };
        let target = parent.child_str(symbol).unwrap();
        prop_assume!(target != top);

        let before: Vec<(Path, Arc<GraphObject>)> = paths
            .iter()
            .map(|p| (p.clone(), store.get(p).unwrap()))
            .collect();

        match store.rename(&top, &target) {
            Ok(mapping) => {
                prop_assert_eq!(mapping.len(), subtree(&paths, &top).len());
                for (old, object) in &before {
                    let now = old.rebase(&top, &target).unwrap_or_else(|| old.clone());
                    let found = store.get(&now).unwrap();
                    prop_assert!(Arc::ptr_eq(&found, object), "{} -> {}", old, now);
                    prop_assert_eq!(object.path(), now);
                }
                prop_assert_eq!(store.len(), paths.len());
            }
            Err(StoreError::PathCollision(_)) => {
                for (old, object) in &before {
                    prop_assert!(Arc::ptr_eq(&store.get(old).unwrap(), object));
                    prop_assert_eq!(&object.path(), old);
                }
            }
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }
}

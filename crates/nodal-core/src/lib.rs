//! Nodal Core - object model and storage for the nodal engine
//!
//! This crate holds everything the engine knows about the object hierarchy,
//! independent of how commands reach it.
//!
//! # Core Abstractions
//!
//! ## Hierarchy
//!
//! - [`Path`] / [`Symbol`] - Validated, segment-ordered object paths
//! - [`GraphObject`] - A graph, block or port, with its real-time state
//! - [`ObjectKind`] - Graph, block (internal or plugin) or port
//! - [`Edge`] - A connection between two ports, owned by a graph
//!
//! ## Values
//!
//! - [`Atom`] - Typed property value
//! - [`Properties`] - Ordered-insertion multimap of predicate to value
//! - [`Staged`] - Snapshot cell edited off the real-time thread and published on it
//!
//! ## Storage
//!
//! - [`Store`] - Path-indexed ordered map with atomic subtree remove/rename
//! - [`Reclaimer`] / [`EpochClock`] - Deferred destruction of removed objects
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use nodal_core::{GraphObject, ObjectKind, Path, Properties, Store};
//!
//! let store = Store::new();
//! let root = Path::root();
//! store.add(Arc::new(GraphObject::new(root.clone(), ObjectKind::Graph, Properties::new())))?;
//! let main = root.child_str("main")?;
//! store.add(Arc::new(GraphObject::new(main.clone(), ObjectKind::Graph, Properties::new())))?;
//!
//! assert_eq!(store.children_range(&root).len(), 1);
//! let removed = store.remove(&main)?;
//! assert_eq!(removed.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod atom;
pub mod object;
pub mod path;
pub mod properties;
pub mod reclaimer;
pub mod staged;
pub mod store;

pub use atom::{Atom, Uri, uris};
pub use object::{BlockKind, Edge, GraphObject, InternalKind, ObjectKind, PortDirection};
pub use path::{Path, PathError, Symbol};
pub use properties::Properties;
pub use reclaimer::{EpochClock, Reclaimer};
pub use staged::{Snapshot, Staged};
pub use store::{Store, StoreError, StoreGuard};

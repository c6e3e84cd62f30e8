//! Nodal Engine - the three-stage command pipeline
//!
//! Client requests become [`Command`]s that pass through three stages on
//! three execution contexts:
//!
//! | Stage | Thread | Driver | Does |
//! |-------|--------|--------|------|
//! | pre-process | `nodal-pre` | [`PreProcessor`] | resolve paths, validate, edit the store, stage snapshots |
//! | execute | host real-time callback | [`Processor`] | publish snapshots, flip object state, in timestamp order |
//! | post-process | `nodal-post` | [`PostProcessor`] | respond, broadcast, retire removed objects |
//!
//! Stages are joined by two bounded wait-free SPSC queues (`rtrb`). The
//! execute stage never locks, allocates, frees or logs.
//!
//! # Example
//!
//! ```rust
//! use nodal_core::{ObjectKind, Path, Properties};
//! use nodal_engine::{Command, Context, Payload, Pipeline, PutMode, State};
//!
//! let context = Context::new();
//! let mut pipeline = Pipeline::new(&context, 64, 64);
//!
//! let put = Payload::Put {
//!     path: Path::new("/main")?,
//!     kind: ObjectKind::Graph,
//!     properties: Properties::new(),
//!     mode: PutMode::Create,
//! };
//! assert_eq!(pipeline.pre.process(Command::new(1, 0, put))?, Some(State::PreProcessed));
//! assert_eq!(pipeline.processor.run_cycle(64), 1);
//! assert_eq!(pipeline.post.drain(), 1);
//!
//! let main = context.store.get(&Path::new("/main")?).ok_or("missing")?;
//! assert!(main.is_active());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod command;
pub mod context;
pub mod engine;
pub mod error;
pub mod post_process;
pub mod pre_process;
pub mod processor;
pub mod signal;

pub use client::{Broadcaster, Client, ClientId, Notification};
pub use command::{Command, FrameTime, Payload, PutMode, State};
pub use context::Context;
pub use engine::{CommandSender, Engine, EngineBuilder, Housekeeping, Pipeline};
pub use error::{CommandError, EngineError, ErrorKind};
pub use post_process::PostProcessor;
pub use pre_process::PreProcessor;
pub use processor::{CycleStats, Processor, SampleClock, StatsSnapshot};
pub use signal::Signal;

//! Stage 1: resolve and validate commands against the store.
//!
//! Runs on the single pre-processor thread. Everything a command will need
//! on the real-time thread is looked up, validated and allocated here, under
//! the store lock:
//!
//! - referenced paths are resolved to objects (or the command is rejected)
//! - structural store changes (add, remove, rename) are applied
//! - property and arc edits are staged as new snapshots
//!
//! A rejected command has changed nothing. It still travels through the
//! real-time queue, so its error response keeps its place in the response
//! order.
//!
//! # Scheduling
//!
//! Snapshots compose in stage-1 order, so a command is never allowed to run
//! before an earlier-staged command it builds on. Its timestamp is raised,
//! if needed, to:
//!
//! - the creation time of every object it refers to
//! - the staged time of every property or arc list it edits
//!
//! With that, execution order per object equals staging order and no
//! connection can reach the real-time stage before its endpoints are live.
//!
//! Commands stamped more than two cycles ahead count against a budget of
//! one real-time queue's worth; beyond that they wait here, in timestamp
//! order, until the [`SampleClock`](crate::SampleClock) catches up.

use std::cmp::{Ordering as KeyOrdering, Reverse};
use std::collections::BinaryHeap;
use std::iter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use nodal_core::{
    Atom, Edge, GraphObject, ObjectKind, Path, PortDirection, Properties, StoreGuard, Symbol, uris,
};
use rtrb::{Producer, PushError};

use crate::client::Notification;
use crate::command::{ArcUpdate, Command, FrameTime, Payload, Prepared, PutMode, State};
use crate::context::Context;
use crate::error::{CommandError, EngineError, ErrorKind};

/// How long the thread loop waits for a command before re-checking shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sleep between attempts while the real-time queue is full, and between
/// checks while commands are held.
const BACKOFF: Duration = Duration::from_millis(1);

/// Commands due within this many cycles are sent without using the budget.
const DUE_HORIZON_CYCLES: u64 = 2;

/// A command waiting in stage 1, ordered by `(timestamp, seq)`.
struct Held(Box<Command>);

impl PartialEq for Held {
    fn eq(&self, other: &Self) -> bool {
        self.0.order_key() == other.0.order_key()
    }
}

impl Eq for Held {}

impl PartialOrd for Held {
    fn partial_cmp(&self, other: &Self) -> Option<KeyOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Held {
    fn cmp(&self, other: &Self) -> KeyOrdering {
        self.0.order_key().cmp(&other.0.order_key())
    }
}

/// The stage-1 driver, owning the producer side of the real-time queue.
pub struct PreProcessor {
    context: Context,
    to_rt: Producer<Box<Command>>,
    completed: u64,
    /// Future commands allowed in flight at once.
    budget: usize,
    /// Timestamps of sent commands that were not yet due, earliest first.
    outstanding: BinaryHeap<Reverse<FrameTime>>,
    held: BinaryHeap<Reverse<Held>>,
}

impl PreProcessor {
    pub(crate) fn new(context: Context, to_rt: Producer<Box<Command>>, budget: usize) -> Self {
        Self {
            context,
            to_rt,
            completed: 0,
            budget,
            outstanding: BinaryHeap::with_capacity(budget),
            held: BinaryHeap::new(),
        }
    }

    /// Runs stage 1 on `command`.
    ///
    /// Returns `None` if the command was cancelled because its client went
    /// away. Otherwise the command is `PreProcessed` or `Rejected` and
    /// carries its completion sequence number.
    pub fn pre_process(&mut self, mut command: Box<Command>) -> Option<Box<Command>> {
        if command.is_orphaned() {
            tracing::warn!(
                "pre_process: cancelled {} #{} (client gone)",
                command.payload().name(),
                command.id()
            );
            return None;
        }

        match prepare(&self.context, &command) {
            Ok(Scheduled { prepared, at }) => {
                if at > command.timestamp() {
                    tracing::debug!(
                        "pre_process: {} #{} delayed from {} to {at}",
                        command.payload().name(),
                        command.id(),
                        command.timestamp()
                    );
                    command.delay_until(at);
                }
                command.prepared = prepared;
                command.transition(State::PreProcessed);
                tracing::debug!(
                    "pre_process: {} #{} at {}",
                    command.payload().name(),
                    command.id(),
                    command.timestamp()
                );
            }
            Err(err) => {
                tracing::warn!(
                    "pre_process: rejected {} #{}: {err}",
                    command.payload().name(),
                    command.id()
                );
                command.reject(err);
            }
        }

        self.completed += 1;
        command.set_seq(self.completed);
        Some(command)
    }

    /// Hands a pre-processed command to the real-time stage without
    /// blocking.
    ///
    /// A command too far in the future to fit the budget is held instead
    /// (see [`release_held()`](Self::release_held)). Otherwise it is pushed
    /// onto the real-time queue, and handed back if the queue is full.
    pub fn enqueue(&mut self, command: Box<Command>) -> Result<(), Box<Command>> {
        self.retire_due();
        if self.held.is_empty() && self.admits(command.timestamp()) {
            return self.send(command);
        }
        self.held.push(Reverse(Held(command)));
        self.release_held();
        Ok(())
    }

    /// Sends held commands that now fit, earliest first. Returns how many.
    pub fn release_held(&mut self) -> usize {
        self.retire_due();
        let mut released = 0;
        while let Some(Reverse(Held(next))) = self.held.peek()
            && self.admits(next.timestamp())
        {
            let Some(Reverse(Held(command))) = self.held.pop() else {
                break;
            };
            if let Err(back) = self.send(command) {
                self.held.push(Reverse(Held(back)));
                break;
            }
            released += 1;
        }
        if released > 0 {
            tracing::debug!("pre_process: released {released} held commands");
        }
        released
    }

    /// Commands waiting in stage 1 for the real-time stage to catch up.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    fn is_due(&self, timestamp: FrameTime) -> bool {
        let clock = &self.context.clock;
        let horizon = DUE_HORIZON_CYCLES * FrameTime::from(clock.block());
        timestamp < clock.now().saturating_add(horizon)
    }

    fn admits(&self, timestamp: FrameTime) -> bool {
        self.is_due(timestamp) || self.outstanding.len() < self.budget
    }

    /// Forgets sent commands whose cycle has started.
    fn retire_due(&mut self) {
        let now = self.context.clock.now();
        while self.outstanding.peek().is_some_and(|Reverse(at)| *at < now) {
            self.outstanding.pop();
        }
    }

    fn send(&mut self, command: Box<Command>) -> Result<(), Box<Command>> {
        let timestamp = command.timestamp();
        let due = self.is_due(timestamp);
        self.to_rt.push(command).map_err(|PushError::Full(back)| back)?;
        if !due {
            self.outstanding.push(Reverse(timestamp));
        }
        Ok(())
    }

    /// Runs stage 1 and enqueues the result.
    ///
    /// Returns the state the command left stage 1 in, or `None` if it was
    /// cancelled. Fails if the real-time queue is full, in which case the
    /// command is dropped.
    pub fn process(&mut self, command: Command) -> Result<Option<State>, EngineError> {
        let Some(command) = self.pre_process(Box::new(command)) else {
            return Ok(None);
        };
        let state = command.state();
        self.enqueue(command)
            .map_err(|_| EngineError::QueueFull("real-time"))?;
        Ok(Some(state))
    }

    /// Thread body: pre-processes inbound commands until shutdown or until
    /// every sender is gone. Back-pressures while the real-time queue is full.
    pub(crate) fn run(mut self, inbound: Receiver<Command>, running: Arc<AtomicBool>) {
        tracing::info!("pre_processor: started");
        while running.load(Ordering::Acquire) {
            let wait = if self.held.is_empty() {
                POLL_INTERVAL
            } else {
                BACKOFF
            };
            let command = match inbound.recv_timeout(wait) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => {
                    self.release_held();
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let Some(mut command) = self.pre_process(Box::new(command)) else {
                continue;
            };
            let mut warned = false;
            while let Err(back) = self.enqueue(command) {
                if !running.load(Ordering::Acquire) {
                    tracing::info!("pre_processor: stopped with a command in flight");
                    return;
                }
                if !warned {
                    tracing::warn!("pre_processor: real-time queue full, backing off");
                    warned = true;
                }
                command = back;
                thread::sleep(BACKOFF);
            }
        }
        if !self.held.is_empty() {
            tracing::warn!("pre_processor: {} held commands dropped", self.held.len());
        }
        tracing::info!("pre_processor: stopped");
    }
}

/// A prepared command and the time it may execute.
struct Scheduled {
    prepared: Prepared,
    at: FrameTime,
}

impl Scheduled {
    fn at(at: FrameTime, prepared: Prepared) -> Self {
        Self { prepared, at }
    }
}

/// Latest of `requested` and every bound.
fn not_before(requested: FrameTime, bounds: impl IntoIterator<Item = FrameTime>) -> FrameTime {
    bounds.into_iter().fold(requested, FrameTime::max)
}

/// Per-payload stage-1 handlers. Nothing is mutated until every check for
/// the payload has passed.
fn prepare(context: &Context, command: &Command) -> Result<Scheduled, CommandError> {
    let store = context.store.lock();
    let requested = command.timestamp();
    match command.payload() {
        Payload::Put {
            path,
            kind,
            properties,
            mode,
        } => prepare_put(&store, requested, path, kind, properties, *mode),

        Payload::Delta {
            subject,
            remove,
            add,
        } => {
            let object = resolve(&store, subject)?;
            let value = match add.get(uris::VALUE) {
                Some(atom) if object.kind().is_port() => Some(port_value(subject, atom)?),
                _ => None,
            };
            let at = property_time(requested, &object);
            let next = object.properties().stage(at, |props| props.apply(remove, add));
            Ok(Scheduled::at(
                at,
                Prepared::Properties {
                    object,
                    next: Some(next),
                    value,
                    retired: None,
                },
            ))
        }

        Payload::SetProperty {
            subject,
            predicate,
            value,
        } => {
            let object = resolve(&store, subject)?;
            let numeric = if *predicate == uris::VALUE && object.kind().is_port() {
                Some(port_value(subject, value)?)
            } else {
                None
            };
            let at = property_time(requested, &object);
            let next = object
                .properties()
                .stage(at, |props| props.set(predicate.clone(), value.clone()));
            Ok(Scheduled::at(
                at,
                Prepared::Properties {
                    object,
                    next: Some(next),
                    value: numeric,
                    retired: None,
                },
            ))
        }

        Payload::Move { old, new } => {
            if old.is_root() {
                return Err(CommandError::bad_request("the root graph cannot be moved"));
            }
            resolve(&store, old)?;
            if old.parent() != new.parent() {
                return Err(CommandError::bad_request(format!(
                    "cannot move {old} to {new}: parent differs"
                )));
            }
            let renamed = store.rename(old, new)?;
            Ok(Scheduled::at(requested, Prepared::Moved { renamed }))
        }

        Payload::Delete { path } => prepare_delete(&store, requested, path),

        Payload::Connect { tail, head } => {
            let tail_port = resolve_port(&store, tail, PortDirection::Output)?;
            let head_port = resolve_port(&store, head, PortDirection::Input)?;
            let graph = owning_graph(&store, tail, head)?;
            let existing = graph.arcs().staged();
            if existing.iter().any(|e| e.connects(&tail_port, &head_port)) {
                return Err(CommandError::new(
                    ErrorKind::Exists,
                    format!("{tail} is already connected to {head}"),
                ));
            }
            let at = not_before(
                requested,
                [
                    tail_port.created_at(),
                    head_port.created_at(),
                    graph.arcs().staged_at(),
                ],
            );
            let edge = Edge {
                tail: tail_port,
                head: head_port,
            };
            let next = graph.arcs().stage(at, |arcs| arcs.push(edge));
            Ok(Scheduled::at(
                at,
                Prepared::Arcs {
                    update: ArcUpdate::new(graph, next),
                    removed: Vec::new(),
                },
            ))
        }

        Payload::Disconnect { tail, head } => {
            let tail_port = resolve(&store, tail)?;
            let head_port = resolve(&store, head)?;
            let graph = owning_graph(&store, tail, head)?;
            let existing = graph.arcs().staged();
            if !existing.iter().any(|e| e.connects(&tail_port, &head_port)) {
                return Err(CommandError::resolution(format!(
                    "{tail} is not connected to {head}"
                )));
            }
            let at = not_before(requested, [graph.arcs().staged_at()]);
            let next = graph
                .arcs()
                .stage(at, |arcs| arcs.retain(|e| !e.connects(&tail_port, &head_port)));
            Ok(Scheduled::at(
                at,
                Prepared::Arcs {
                    update: ArcUpdate::new(graph, next),
                    removed: vec![(tail.clone(), head.clone())],
                },
            ))
        }

        Payload::DisconnectAll { graph, path } => {
            let graph_object = resolve(&store, graph)?;
            if !graph_object.kind().is_graph() {
                return Err(CommandError::type_error(format!(
                    "{graph} is a {}, not a graph",
                    graph_object.kind()
                )));
            }
            resolve(&store, path)?;
            if path != graph && !path.is_descendant_of(graph) {
                return Err(CommandError::bad_request(format!(
                    "{path} is not inside {graph}"
                )));
            }
            let removed: Vec<(Path, Path)> = graph_object
                .arcs()
                .staged()
                .iter()
                .filter(|e| e.touches(path))
                .map(|e| (e.tail.path(), e.head.path()))
                .collect();
            let at = not_before(requested, [graph_object.arcs().staged_at()]);
            let next = graph_object
                .arcs()
                .stage(at, |arcs| arcs.retain(|e| !e.touches(path)));
            Ok(Scheduled::at(
                at,
                Prepared::Arcs {
                    update: ArcUpdate::new(graph_object, next),
                    removed,
                },
            ))
        }

        Payload::Learn { path } => {
            let block = resolve(&store, path)?;
            if !block.kind().is_internal_block() {
                return Err(CommandError::type_error(format!(
                    "{path} is not an internal block"
                )));
            }
            let at = not_before(requested, [block.created_at()]);
            Ok(Scheduled::at(at, Prepared::Learn { block }))
        }

        Payload::Get { subject } => {
            let mut objects = vec![resolve(&store, subject)?];
            objects.extend(store.children_range(subject));
            let objects = objects
                .iter()
                .map(|object| Notification::Put {
                    path: object.path(),
                    kind: object.kind().clone(),
                    properties: Properties::clone(&object.live_properties()),
                })
                .collect();
            Ok(Scheduled::at(requested, Prepared::Described { objects }))
        }

        Payload::RegisterClient => {
            let client = command
                .client()
                .ok_or_else(|| CommandError::bad_request("registration needs a client"))?;
            context.broadcaster.register(client);
            Ok(Scheduled::at(requested, Prepared::Nothing))
        }

        Payload::UnregisterClient => {
            let id = command
                .client_id()
                .ok_or_else(|| CommandError::bad_request("unregistration needs a client"))?;
            context.broadcaster.unregister(id);
            Ok(Scheduled::at(requested, Prepared::Nothing))
        }
    }
}

/// Property edits follow the object's creation and its last staged edit.
fn property_time(requested: FrameTime, object: &GraphObject) -> FrameTime {
    not_before(
        requested,
        [object.created_at(), object.properties().staged_at()],
    )
}

fn prepare_put(
    store: &StoreGuard<'_>,
    requested: FrameTime,
    path: &Path,
    kind: &ObjectKind,
    properties: &Properties,
    mode: PutMode,
) -> Result<Scheduled, CommandError> {
    let Some(parent_path) = path.parent() else {
        return Err(CommandError::new(
            ErrorKind::DuplicatePath,
            "the root graph always exists",
        ));
    };
    let parent = store.get(&parent_path).ok_or_else(|| {
        CommandError::resolution(format!("parent {parent_path} of {path} not found"))
    })?;
    if !parent.kind().can_contain(kind) {
        return Err(CommandError::type_error(format!(
            "{} {parent_path} cannot contain a {kind}",
            parent.kind()
        )));
    }
    if kind.is_port()
        && let Some(atom) = properties.get(uris::VALUE)
    {
        port_value(path, atom)?;
    }

    let path = match mode {
        PutMode::Create => path.clone(),
        PutMode::Unique => {
            let symbol =
                Symbol::new(path.symbol()).map_err(|e| CommandError::bad_request(e.to_string()))?;
            let offset = store.child_name_offset(&parent_path, &symbol, true);
            parent_path.child(&symbol.with_suffix(offset))
        }
    };

    let at = not_before(requested, [parent.created_at()]);
    let object = Arc::new(GraphObject::new(path, kind.clone(), properties.clone()));
    object.set_created_at(at);
    store.add(Arc::clone(&object))?;
    Ok(Scheduled::at(at, Prepared::Put { object }))
}

fn prepare_delete(
    store: &StoreGuard<'_>,
    requested: FrameTime,
    path: &Path,
) -> Result<Scheduled, CommandError> {
    if path.is_root() {
        return Err(CommandError::bad_request("the root graph cannot be deleted"));
    }
    let top = resolve(store, path)?;

    // Connections into the subtree are owned by graphs above it.
    let mut owners = Vec::new();
    let mut ancestor = path.parent();
    while let Some(current) = ancestor {
        if let Some(graph) = store.get(&current)
            && graph.kind().is_graph()
            && graph.arcs().staged().iter().any(|e| e.touches(path))
        {
            owners.push(graph);
        }
        ancestor = current.parent();
    }

    let subtree = iter::once(top).chain(store.children_range(path));
    let at = not_before(
        requested,
        subtree
            .flat_map(|object| {
                [
                    object.created_at(),
                    object.properties().staged_at(),
                    object.arcs().staged_at(),
                ]
            })
            .chain(owners.iter().map(|graph| graph.arcs().staged_at())),
    );

    let arcs = owners
        .into_iter()
        .map(|graph| {
            let next = graph
                .arcs()
                .stage(at, |edges| edges.retain(|e| !e.touches(path)));
            ArcUpdate::new(graph, next)
        })
        .collect();
    let removed = store.remove(path)?;
    Ok(Scheduled::at(
        at,
        Prepared::Deleted {
            removed,
            arcs,
            epoch: 0,
        },
    ))
}

fn resolve(store: &StoreGuard<'_>, path: &Path) -> Result<Arc<GraphObject>, CommandError> {
    store
        .get(path)
        .ok_or_else(|| CommandError::resolution(format!("no object at {path}")))
}

fn resolve_port(
    store: &StoreGuard<'_>,
    path: &Path,
    direction: PortDirection,
) -> Result<Arc<GraphObject>, CommandError> {
    let object = resolve(store, path)?;
    if object.kind().direction() == Some(direction) {
        return Ok(object);
    }
    let wanted = match direction {
        PortDirection::Input => "an input port",
        PortDirection::Output => "an output port",
    };
    Err(CommandError::type_error(format!("{path} is not {wanted}")))
}

/// Nearest graph at or above the common ancestor of two ports.
fn owning_graph(
    store: &StoreGuard<'_>,
    tail: &Path,
    head: &Path,
) -> Result<Arc<GraphObject>, CommandError> {
    let mut current = Some(tail.common_ancestor(head));
    while let Some(path) = current {
        if let Some(object) = store.get(&path)
            && object.kind().is_graph()
        {
            return Ok(object);
        }
        current = path.parent();
    }
    Err(CommandError::resolution(format!(
        "no graph contains both {tail} and {head}"
    )))
}

fn port_value(path: &Path, atom: &Atom) -> Result<f32, CommandError> {
    atom.as_f32().ok_or_else(|| {
        CommandError::type_error(format!(
            "value of {path} must be numeric, got {}",
            atom.type_name()
        ))
    })
}

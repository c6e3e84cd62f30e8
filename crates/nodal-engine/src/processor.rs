//! Stage 2: execute commands inside the real-time cycle.
//!
//! [`Processor::run_cycle`] is called once per audio block by the host's
//! real-time callback. It must never lock, allocate, free, log or block:
//!
//! - commands arrive through a wait-free SPSC queue and are parked in a
//!   pre-allocated buffer
//! - ordering is an in-place unstable sort on `(timestamp, seq)`, which is a
//!   total order because `seq` is unique
//! - execution only flips atomics and swaps pre-built snapshots; every
//!   displaced snapshot rides along in the command to stage 3
//! - executed commands leave through a second SPSC queue, each followed by a
//!   post on the counting signal
//!
//! A command is due when its timestamp falls before the end of the current
//! cycle window. Commands stamped in the past execute in the next cycle that
//! sees them.
//!
//! Every command in the real-time queue is moved into the pending buffer at
//! the start of a cycle, so a due command is never stuck behind ones that
//! are not. The buffer holds three queues' worth: stage 1 keeps at most one
//! queue's worth of future commands and one of nearly-due commands in
//! flight, watching the shared [`SampleClock`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use nodal_core::EpochClock;
use rtrb::{Consumer, Producer, PushError};

use crate::command::{Command, FrameTime, Prepared, State};
use crate::error::CommandError;
use crate::signal::Signal;

/// Pending buffer size, in multiples of the real-time queue capacity.
const PENDING_FACTOR: usize = 3;

/// Where the real-time stage is, in sample time.
///
/// The real-time thread advances it at the end of every cycle; stage 1 reads
/// it to decide how far ahead a command may be sent. Cloning shares it.
#[derive(Clone, Debug, Default)]
pub struct SampleClock {
    now: Arc<AtomicU64>,
    block: Arc<AtomicU32>,
}

impl SampleClock {
    /// A clock at sample 0 that has not run a cycle yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample time at the start of the next cycle.
    #[inline]
    pub fn now(&self) -> FrameTime {
        self.now.load(Ordering::Acquire)
    }

    /// Length of the last cycle in frames, 0 before the first one.
    #[inline]
    pub fn block(&self) -> u32 {
        self.block.load(Ordering::Acquire)
    }

    #[inline]
    fn advance(&self, now: FrameTime, nframes: u32) {
        self.block.store(nframes, Ordering::Release);
        self.now.store(now, Ordering::Release);
    }
}

/// Counters written by the real-time thread and read by housekeeping.
#[derive(Debug, Default)]
pub struct CycleStats {
    cycles: AtomicU64,
    executed: AtomicU64,
    deferred: AtomicU64,
}

/// Point-in-time copy of [`CycleStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Completed cycles.
    pub cycles: u64,
    /// Commands executed (including rejected ones passed through).
    pub executed: u64,
    /// Cycles that left due commands queued because stage 3 fell behind.
    pub deferred: u64,
}

impl CycleStats {
    /// Reads all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
        }
    }
}

/// The stage-2 driver. Owned by the real-time thread.
pub struct Processor {
    from_pre: Consumer<Box<Command>>,
    to_post: Producer<Box<Command>>,
    pending: VecDeque<Box<Command>>,
    pending_capacity: usize,
    /// Executed but not yet forwarded to stage 3.
    backlog: Option<Box<Command>>,
    signal: Arc<Signal>,
    epoch: EpochClock,
    clock: FrameTime,
    shared_clock: SampleClock,
    stats: Arc<CycleStats>,
}

impl Processor {
    pub(crate) fn new(
        from_pre: Consumer<Box<Command>>,
        to_post: Producer<Box<Command>>,
        capacity: usize,
        signal: Arc<Signal>,
        epoch: EpochClock,
        shared_clock: SampleClock,
    ) -> Self {
        let pending_capacity = capacity * PENDING_FACTOR;
        Self {
            from_pre,
            to_post,
            pending: VecDeque::with_capacity(pending_capacity),
            pending_capacity,
            backlog: None,
            signal,
            epoch,
            clock: shared_clock.now(),
            shared_clock,
            stats: Arc::new(CycleStats::default()),
        }
    }

    /// Runs one cycle of `nframes` samples. Returns how many commands were
    /// executed.
    pub fn run_cycle(&mut self, nframes: u32) -> usize {
        let cycle_end = self.clock + FrameTime::from(nframes);
        let epoch = self.epoch.current();

        if let Some(command) = self.backlog.take() {
            self.forward(command);
        }

        while self.pending.len() < self.pending_capacity {
            match self.from_pre.pop() {
                Ok(command) => self.pending.push_back(command),
                Err(_) => break,
            }
        }
        self.pending
            .make_contiguous()
            .sort_unstable_by_key(|command| command.order_key());

        let mut executed = 0;
        while self
            .pending
            .front()
            .is_some_and(|command| command.timestamp() < cycle_end)
        {
            if self.backlog.is_some() || self.to_post.is_full() {
                self.stats.deferred.fetch_add(1, Ordering::Relaxed);
                break;
            }
            let Some(mut command) = self.pending.pop_front() else {
                break;
            };
            execute(&mut command, epoch);
            executed += 1;
            self.forward(command);
        }

        self.clock = cycle_end;
        self.shared_clock.advance(cycle_end, nframes);
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        self.stats
            .executed
            .fetch_add(executed as u64, Ordering::Relaxed);
        self.epoch.advance();
        executed
    }

    fn forward(&mut self, command: Box<Command>) {
        match self.to_post.push(command) {
            Ok(()) => self.signal.post(),
            Err(PushError::Full(command)) => self.backlog = Some(command),
        }
    }

    /// Sample time at the start of the next cycle.
    pub fn sample_time(&self) -> FrameTime {
        self.clock
    }

    /// Commands received but not yet executed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Shared counters for housekeeping.
    pub fn stats(&self) -> Arc<CycleStats> {
        Arc::clone(&self.stats)
    }
}

/// Per-payload stage-2 handler. Real-time safe.
///
/// `epoch` is the cycle this runs in; deleted objects are tagged with it so
/// they outlive the cycle.
pub(crate) fn execute(command: &mut Command, epoch: u64) {
    if command.state() == State::Rejected {
        return;
    }
    let mut failure = None;
    match &mut command.prepared {
        Prepared::Nothing | Prepared::Moved { .. } | Prepared::Described { .. } => {}

        Prepared::Put { object } => object.set_active(true),

        Prepared::Properties {
            object,
            next,
            value,
            retired,
        } => {
            let published = match next.take().map(|next| object.properties().publish(next)) {
                Some(Ok(displaced)) => {
                    *retired = Some(displaced);
                    true
                }
                Some(Err(stale)) => {
                    *retired = Some(stale);
                    false
                }
                None => true,
            };
            // The value mirrors the property; a stale snapshot leaves both.
            if published && let Some(value) = *value {
                object.set_value(value);
            }
        }

        Prepared::Deleted {
            removed,
            arcs,
            epoch: removed_at,
        } => {
            for object in removed.iter() {
                object.set_active(false);
                object.set_learning(false);
            }
            for update in arcs.iter_mut() {
                update.publish();
            }
            *removed_at = epoch;
        }

        Prepared::Arcs { update, .. } => update.publish(),

        Prepared::Learn { block } => {
            if block.is_active() {
                block.set_learning(true);
            } else {
                failure = Some(CommandError::execution("block is not active"));
            }
        }
    }
    if let Some(failure) = failure {
        command.fail(failure);
    }
    command.transition(State::Executed);
}

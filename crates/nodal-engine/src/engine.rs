//! Engine assembly: queues, worker threads and housekeeping.
//!
//! ```text
//!  decode threads ──▶ inbound (MPSC, bounded)
//!                        │
//!                  [nodal-pre]  PreProcessor ──▶ rt queue (SPSC)
//!                                                   │
//!          host RT callback ──▶ Processor::run_cycle ┘──▶ post queue (SPSC) + Signal
//!                                                                │
//!                                               [nodal-post] PostProcessor
//! ```
//!
//! The [`Processor`] is returned to the caller rather than run on a thread
//! of ours: it belongs to whatever drives the audio cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, TrySendError};
use nodal_config::EngineConfig;
use rtrb::RingBuffer;

use crate::command::Command;
use crate::context::Context;
use crate::error::EngineError;
use crate::post_process::PostProcessor;
use crate::pre_process::PreProcessor;
use crate::processor::{CycleStats, Processor, StatsSnapshot};
use crate::signal::Signal;

/// The three stage drivers wired together, without any threads.
///
/// Tests drive these directly to run the pipeline deterministically.
pub struct Pipeline {
    /// Stage 1.
    pub pre: PreProcessor,
    /// Stage 2.
    pub processor: Processor,
    /// Stage 3.
    pub post: PostProcessor,
}

impl Pipeline {
    /// Creates the two SPSC queues and the signal between the stages.
    pub fn new(context: &Context, rt_capacity: usize, post_capacity: usize) -> Self {
        let (to_rt, from_pre) = RingBuffer::new(rt_capacity);
        let (to_post, from_rt) = RingBuffer::new(post_capacity);
        let signal = Arc::new(Signal::new());
        Self {
            pre: PreProcessor::new(context.clone(), to_rt, rt_capacity),
            processor: Processor::new(
                from_pre,
                to_post,
                rt_capacity,
                Arc::clone(&signal),
                context.epoch.clone(),
                context.clock.clone(),
            ),
            post: PostProcessor::new(context.clone(), from_rt, signal),
        }
    }
}

/// Cloneable handle decode threads use to feed the engine.
#[derive(Clone)]
pub struct CommandSender {
    inner: Sender<Command>,
}

impl CommandSender {
    /// Queues a command, waiting while the inbound queue is full.
    pub fn send(&self, command: Command) -> Result<(), EngineError> {
        self.inner
            .send(command)
            .map_err(|_| EngineError::Disconnected)
    }

    /// Queues a command without waiting.
    pub fn try_send(&self, command: Command) -> Result<(), EngineError> {
        self.inner.try_send(command).map_err(|err| match err {
            TrySendError::Full(_) => EngineError::QueueFull("inbound"),
            TrySendError::Disconnected(_) => EngineError::Disconnected,
        })
    }
}

/// Result of one [`Engine::housekeeping`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Housekeeping {
    /// Epoch the sweep ran at.
    pub epoch: u64,
    /// Objects destroyed by this sweep.
    pub freed: usize,
    /// Objects still waiting for a later sweep.
    pub awaiting: usize,
    /// Real-time counters.
    pub stats: StatsSnapshot,
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    context: Option<Context>,
}

impl EngineBuilder {
    /// Uses an existing context instead of a fresh one.
    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Validates the configuration, creates the queues and starts the
    /// non-real-time threads. The returned [`Processor`] must be driven by
    /// the caller's real-time callback.
    pub fn build(self) -> Result<(Engine, Processor), EngineError> {
        self.config.validate()?;
        let context = self.context.unwrap_or_default();
        let Pipeline {
            pre,
            processor,
            post,
        } = Pipeline::new(
            &context,
            self.config.rt_queue_capacity,
            self.config.post_queue_capacity,
        );
        let (inbound, receiver) = crossbeam_channel::bounded(self.config.inbound_capacity);
        let running = Arc::new(AtomicBool::new(true));

        let mut engine = Engine {
            context,
            inbound: Some(CommandSender { inner: inbound }),
            running: Arc::clone(&running),
            workers: Vec::with_capacity(2),
            stats: processor.stats(),
        };

        let pre_running = Arc::clone(&running);
        engine.spawn("nodal-pre", move || pre.run(receiver, pre_running))?;
        let post_running = Arc::clone(&running);
        engine.spawn("nodal-post", move || post.run(post_running))?;

        tracing::info!(
            "engine: started ({} Hz, block {}, rt queue {}, post queue {})",
            self.config.sample_rate,
            self.config.block_size,
            self.config.rt_queue_capacity,
            self.config.post_queue_capacity
        );
        Ok((engine, processor))
    }
}

/// A running engine: inbound queue, worker threads and shared context.
///
/// Dropping the engine stops and joins its threads.
pub struct Engine {
    context: Context,
    inbound: Option<CommandSender>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<CycleStats>,
}

impl Engine {
    /// Starts building an engine from `config`.
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            context: None,
        }
    }

    fn spawn(
        &mut self,
        name: &'static str,
        body: impl FnOnce() + Send + 'static,
    ) -> Result<(), EngineError> {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|source| {
                self.running.store(false, Ordering::Release);
                EngineError::Spawn { name, source }
            })?;
        self.workers.push(handle);
        Ok(())
    }

    /// A handle for decode threads.
    pub fn sender(&self) -> Result<CommandSender, EngineError> {
        self.inbound.clone().ok_or(EngineError::Disconnected)
    }

    /// Queues a command, waiting while the inbound queue is full.
    pub fn submit(&self, command: Command) -> Result<(), EngineError> {
        self.inbound
            .as_ref()
            .ok_or(EngineError::Disconnected)?
            .send(command)
    }

    /// Shared collaborators (store, broadcaster, reclaimer, clocks).
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Sweeps the reclaimer and reports counters. Call periodically from a
    /// non-real-time thread.
    pub fn housekeeping(&self) -> Housekeeping {
        let epoch = self.context.epoch.current();
        let freed = self.context.reclaimer.sweep(epoch);
        let report = Housekeeping {
            epoch,
            freed,
            awaiting: self.context.reclaimer.pending(),
            stats: self.stats.snapshot(),
        };
        tracing::debug!(
            "housekeeping: epoch {epoch}, freed {freed}, awaiting {}, executed {}, deferred {}",
            report.awaiting,
            report.stats.executed,
            report.stats.deferred
        );
        report
    }

    /// Stops accepting commands and joins the worker threads.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.workers.is_empty() && self.inbound.is_none() {
            return;
        }
        self.running.store(false, Ordering::Release);
        self.inbound = None;
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                tracing::warn!("engine: {name} thread panicked");
            }
        }
        tracing::info!("engine: stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

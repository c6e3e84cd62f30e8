//! Stage 3: respond, broadcast and release.
//!
//! Runs on the post-processor thread, woken by the counting [`Signal`] that
//! stage 2 posts once per executed command. Dropping the finished command
//! here frees every snapshot stage 2 displaced; objects removed from the
//! store are handed to the [`Reclaimer`](nodal_core::Reclaimer) instead,
//! because the real-time thread may still be inside the cycle that marked
//! them inert.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rtrb::Consumer;

use crate::client::Client;
use crate::command::{Command, Payload, Prepared, State};
use crate::context::Context;
use crate::error::ErrorKind;
use crate::signal::Signal;

/// How long the thread loop waits for a post before re-checking shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The stage-3 driver, owning the consumer side of the post queue.
pub struct PostProcessor {
    context: Context,
    from_rt: Consumer<Box<Command>>,
    signal: Arc<Signal>,
}

impl PostProcessor {
    pub(crate) fn new(
        context: Context,
        from_rt: Consumer<Box<Command>>,
        signal: Arc<Signal>,
    ) -> Self {
        Self {
            context,
            from_rt,
            signal,
        }
    }

    /// Post-processes the next executed command, if any.
    pub fn post_process_next(&mut self) -> bool {
        match self.from_rt.pop() {
            Ok(command) => {
                self.post_process(command);
                true
            }
            Err(_) => false,
        }
    }

    /// Post-processes every executed command currently queued. Returns how
    /// many there were.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.post_process_next() {
            self.signal.try_wait();
            count += 1;
        }
        count
    }

    /// Thread body: one command per signal post until shutdown, then
    /// whatever is left.
    pub(crate) fn run(mut self, running: Arc<AtomicBool>) {
        tracing::info!("post_processor: started");
        while running.load(Ordering::Acquire) {
            if self.signal.wait_timeout(POLL_INTERVAL) {
                self.post_process_next();
            }
        }
        let leftover = self.drain();
        tracing::info!("post_processor: stopped ({leftover} drained on exit)");
    }

    fn post_process(&self, mut command: Box<Command>) {
        let client = command.client();
        let prepared = std::mem::take(&mut command.prepared);

        if let Some(err) = command.error() {
            let message = match (err.kind, command.payload().subject()) {
                (ErrorKind::ExecutionError, Some(subject)) => format!("{err} at {subject}"),
                _ => err.to_string(),
            };
            tracing::debug!(
                "post_process: {} #{} failed: {message}",
                command.payload().name(),
                command.id()
            );
            if let Some(client) = &client {
                client.respond_error(command.id(), &message);
            }
        } else {
            tracing::debug!(
                "post_process: {} #{} ok",
                command.payload().name(),
                command.id()
            );
            if let Some(client) = &client {
                client.respond_ok(command.id());
            }
            self.broadcast(&command, prepared, client.as_ref());
        }

        command.transition(State::PostProcessed);
    }

    fn broadcast(
        &self,
        command: &Command,
        prepared: Prepared,
        client: Option<&Arc<dyn Client>>,
    ) {
        let broadcaster = &self.context.broadcaster;
        match (command.payload(), prepared) {
            (
                Payload::Put {
                    kind, properties, ..
                },
                Prepared::Put { object },
            ) => broadcaster.put(object.path(), kind.clone(), properties.clone()),

            (
                Payload::Delta {
                    subject,
                    remove,
                    add,
                },
                _,
            ) => broadcaster.delta(subject.clone(), remove.clone(), add.clone()),

            (
                Payload::SetProperty {
                    subject,
                    predicate,
                    value,
                },
                _,
            ) => broadcaster.set_property(
                subject.clone(),
                predicate.clone(),
                value.clone(),
                command.client_id(),
            ),

            (Payload::Move { old, new }, Prepared::Moved { renamed }) => {
                if !renamed.is_empty() {
                    broadcaster.move_object(old.clone(), new.clone());
                }
            }

            (Payload::Delete { path }, Prepared::Deleted { removed, epoch, .. }) => {
                broadcaster.delete(path.clone());
                self.context.reclaimer.retire(removed, epoch);
            }

            (Payload::Connect { tail, head }, _) => {
                broadcaster.connect(tail.clone(), head.clone());
            }

            (
                Payload::Disconnect { .. } | Payload::DisconnectAll { .. },
                Prepared::Arcs { removed, .. },
            ) => {
                for (tail, head) in removed {
                    broadcaster.disconnect(tail, head);
                }
            }

            (Payload::Get { .. }, Prepared::Described { objects }) => {
                if let Some(client) = client {
                    for description in &objects {
                        client.notify(description);
                    }
                }
            }

            _ => {}
        }
    }
}

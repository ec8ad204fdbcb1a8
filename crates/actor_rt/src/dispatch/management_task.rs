// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Select};
use tracing::{Level, event};

use crate::dispatch::{WorkerEvent, WorkerHandle};
use crate::error::Error;
use crate::state::ExecutorState;
use crate::work::{CallItem, PendingTable, WorkId, WorkItem};

enum WaitOutcome<T, H> {
    Done(crate::work::ResultItem<T, H>),
    SerializationFailed { work_id: WorkId, message: String },
    ShutdownAck,
    Wakeup,
    Broken,
}

/// Drives the state machine described in the design notes: fill the call queue, wait for exactly
/// one event, react to it, then check whether shutdown can now complete. Runs on its own
/// dedicated thread for the lifetime of one executor.
pub(crate) struct ManagementTask<M, T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    admission_rx: Receiver<(WorkId, WorkItem<M, T, H>)>,
    wakeup_rx: Receiver<()>,
    worker: Box<dyn WorkerHandle<M, T, H>>,
    state: Arc<ExecutorState>,
    pending: PendingTable<M, T, H>,
    order: VecDeque<WorkId>,
    termination_sent: bool,
}

impl<M, T, H> ManagementTask<M, T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        admission_rx: Receiver<(WorkId, WorkItem<M, T, H>)>,
        wakeup_rx: Receiver<()>,
        worker: Box<dyn WorkerHandle<M, T, H>>,
        state: Arc<ExecutorState>,
    ) -> Self {
        Self {
            admission_rx,
            wakeup_rx,
            worker,
            state,
            pending: PendingTable::new(),
            order: VecDeque::new(),
            termination_sent: false,
        }
    }

    pub(crate) fn run(mut self) {
        loop {
            self.fill_call_queue();

            match self.wait_for_event() {
                WaitOutcome::Broken => {
                    if self.termination_sent {
                        // We asked the worker to exit, so its process/thread disappearing is
                        // expected; wait for the real `ShutdownAck` on the events channel
                        // instead of treating this as a crash.
                        continue;
                    }
                    self.declare_broken();
                    return;
                }
                WaitOutcome::Done(result) => self.resolve(result),
                WaitOutcome::SerializationFailed { work_id, message } => {
                    self.resolve_serialization_failure(work_id, message);
                }
                WaitOutcome::Wakeup => {}
                WaitOutcome::ShutdownAck => {
                    if self.termination_sent {
                        event!(Level::DEBUG, "worker acknowledged clean shutdown");
                        self.worker.join();
                        return;
                    }

                    // A shutdown handshake observed while we never asked for one is a protocol
                    // violation; treat the worker as broken rather than trust it further.
                    event!(
                        Level::ERROR,
                        "worker sent a shutdown acknowledgement without a shutdown request"
                    );
                    self.declare_broken();
                    return;
                }
            }

            if !self.termination_sent
                && self.state.shutdown_requested()
                && self.pending.is_empty()
                && self.order.is_empty()
            {
                event!(Level::DEBUG, "pending work drained, sending termination signal");
                self.worker.send_call(None);
                self.termination_sent = true;
            }
        }
    }

    fn fill_call_queue(&mut self) {
        if self.termination_sent {
            return;
        }

        loop {
            while let Ok((id, item)) = self.admission_rx.try_recv() {
                self.order.push_back(id);
                self.pending.insert(id, item);
            }

            if !self.worker.call_queue_has_capacity() {
                return;
            }

            let Some(id) = self.order.pop_front() else {
                return;
            };

            let should_dispatch = self
                .pending
                .get(id)
                .expect("an id in `order` always has a matching pending entry")
                .resolver
                .set_running_or_notify_cancel();

            if !should_dispatch {
                self.pending.remove(id);
                continue;
            }

            let message = self
                .pending
                .get_mut(id)
                .expect("just confirmed present above")
                .take_message();

            self.worker.send_call(Some(CallItem { work_id: id, message }));
        }
    }

    fn wait_for_event(&self) -> WaitOutcome<T, H> {
        let mut select = Select::new();
        let events_idx = select.recv(self.worker.events());
        let sentinel_idx = select.recv(self.worker.liveness_sentinel());
        let wakeup_idx = select.recv(&self.wakeup_rx);

        let op = select.select();
        let index = op.index();

        if index == sentinel_idx {
            // The sentinel only ever carries a single signal; a disconnect on recv still means
            // "the worker is gone", so both outcomes of `recv` map to the same branch here.
            let _ = op.recv(self.worker.liveness_sentinel());
            WaitOutcome::Broken
        } else if index == events_idx {
            match op.recv(self.worker.events()) {
                Ok(WorkerEvent::Done(result)) => WaitOutcome::Done(result),
                Ok(WorkerEvent::ShutdownAck(_id)) => WaitOutcome::ShutdownAck,
                Ok(WorkerEvent::SerializationFailed { work_id, message }) => {
                    WaitOutcome::SerializationFailed { work_id, message }
                }
                Err(_) => WaitOutcome::Broken,
            }
        } else if index == wakeup_idx {
            let _ = op.recv(&self.wakeup_rx);
            WaitOutcome::Wakeup
        } else {
            unreachable!("select only ever reports one of the registered operations")
        }
    }

    fn resolve(&mut self, result: crate::work::ResultItem<T, H>) {
        let Some(item) = self.pending.remove(result.work_id) else {
            // Already purged, most likely by a broken-worker declaration that raced with this
            // result. Nothing left to resolve.
            return;
        };

        match result.payload {
            Ok(value) => item.resolver.set_result(value),
            Err(crate::work::HandlerFailure::Returned(handler_error)) => {
                item.resolver.set_exception(Error::Handler(handler_error));
            }
            Err(crate::work::HandlerFailure::Panicked(message)) => {
                item.resolver.set_exception(Error::HandlerPanicked(message));
            }
        }
    }

    /// A call item's message could not be encoded for the worker process. Only that one future
    /// fails; the worker never learns the item existed, so nothing else needs unwinding.
    fn resolve_serialization_failure(&mut self, work_id: WorkId, message: String) {
        if let Some(item) = self.pending.remove(work_id) {
            item.resolver.set_exception(Error::Serialization(message));
        }
    }

    fn declare_broken(&mut self) {
        event!(Level::ERROR, "worker is broken, failing all pending work");

        self.state.set_broken();
        self.state.request_shutdown();

        for item in self.pending.drain() {
            item.resolver.set_exception(Error::BrokenWorker);
        }
        self.order.clear();

        self.worker.force_terminate();
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod management_task;

pub(crate) use management_task::ManagementTask;

use crate::work::{CallItem, ResultItem, WorkId};

/// Identifies the worker that acknowledged a clean shutdown: a thread ordinal for the in-process
/// worker, the OS process id for the out-of-process worker.
pub(crate) type WorkerIdentity = u64;

/// What the worker side of the channel can tell the management task: a completed (or failed)
/// call, a clean-shutdown handshake, or (process variant only) a message that could not be
/// encoded for transport. Wakeups are a separate channel fed by callers of `post` and `shutdown`,
/// not part of this enum, since they never originate from the worker.
#[derive(Debug)]
pub(crate) enum WorkerEvent<T, H> {
    Done(ResultItem<T, H>),
    ShutdownAck(WorkerIdentity),
    /// A call item's message failed to encode before it ever reached the worker. Non-fatal: only
    /// this one future fails, the worker (and the rest of the pending work) is unaffected.
    SerializationFailed { work_id: WorkId, message: String },
}

/// The management task's view of a worker: enough to fill the call queue, to select on results
/// and liveness, and to tear the worker down.
///
/// Implemented once for the in-process thread worker and once for the out-of-process worker;
/// this is the seam the design notes call out as shared between both executor variants.
pub(crate) trait WorkerHandle<M, T, H>: Send {
    /// `true` while the call queue can still accept one more item without blocking.
    ///
    /// The management task is the call queue's only writer, so checking this before calling
    /// [`send_call`][Self::send_call] is race-free and lets the fill phase stay entirely
    /// non-blocking.
    fn call_queue_has_capacity(&self) -> bool;

    /// Hands one call item (or `None` as the termination signal) to the worker. Only called
    /// once [`call_queue_has_capacity`][Self::call_queue_has_capacity] has been observed `true`.
    fn send_call(&self, item: Option<CallItem<M>>);

    /// The channel the management task selects on for results and shutdown acks.
    fn events(&self) -> &crossbeam_channel::Receiver<WorkerEvent<T, H>>;

    /// Fires at most once, without a preceding `ShutdownAck`, if the worker disappears
    /// unexpectedly. For the thread worker this is `crossbeam_channel::never()`: handler panics
    /// are caught at the loop boundary, so the thread worker never triggers this.
    fn liveness_sentinel(&self) -> &crossbeam_channel::Receiver<()>;

    /// Waits for the worker to finish exiting after a clean shutdown handshake.
    fn join(self: Box<Self>);

    /// Forces the worker to stop immediately after a broken-worker declaration.
    fn force_terminate(&self);
}

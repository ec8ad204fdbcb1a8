// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;

use crate::future::ActorFutureResolver;

/// Monotonically increasing identifier assigned to a message at `post` time.
///
/// Work IDs are never reused within the lifetime of one executor.
pub(crate) type WorkId = u64;

/// A message admitted into an executor, still paired with the resolver for its future.
///
/// Lives only in the management task's [`PendingTable`]; never crosses the worker boundary.
pub(crate) struct WorkItem<M, T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    pub(crate) resolver: ActorFutureResolver<T, H>,
    pub(crate) message: Option<M>,
}

impl<M, T, H> WorkItem<M, T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(resolver: ActorFutureResolver<T, H>, message: M) -> Self {
        Self {
            resolver,
            message: Some(message),
        }
    }

    /// Takes the message out for dispatch. Called exactly once, right before the item is handed
    /// to the worker.
    pub(crate) fn take_message(&mut self) -> M {
        self.message
            .take()
            .expect("a work item's message is taken exactly once, at dispatch time")
    }
}

/// The message handed to the worker once its future has won the `set_running_or_notify_cancel`
/// race. `None` is the termination signal the management task sends to ask the worker to exit.
#[derive(Debug)]
pub(crate) struct CallItem<M> {
    pub(crate) work_id: WorkId,
    pub(crate) message: M,
}

/// How a call item failed in the worker: either `handle` returned an error, or (thread worker
/// only) it panicked. A panic can't be converted into the actor's own error type `H` in general,
/// so it is carried separately rather than forced into `H`.
#[derive(Debug)]
#[cfg_attr(feature = "process", derive(serde::Serialize, serde::Deserialize))]
pub(crate) enum HandlerFailure<H> {
    Returned(H),
    Panicked(String),
}

/// What the worker sends back for one call item. Crash detection is out of band (the liveness
/// sentinel), never carried as a `ResultItem`.
///
/// For the thread worker `H` is the actor's own error type, moved across an in-memory channel.
/// For the process worker `H` round-trips through `bincode`, so the reconstructed error is
/// structurally identical to the one the worker produced, not just a formatted description.
#[derive(Debug)]
pub(crate) struct ResultItem<T, H> {
    pub(crate) work_id: WorkId,
    pub(crate) payload: Result<T, HandlerFailure<H>>,
}

/// The single-writer map from work id to pending work item, owned exclusively by the management
/// task. Never locked: there is exactly one reader/writer, the management task's own thread.
pub(crate) struct PendingTable<M, T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    items: HashMap<WorkId, WorkItem<M, T, H>>,
}

impl<M, T, H> PendingTable<M, T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: WorkId, item: WorkItem<M, T, H>) {
        self.items.insert(id, item);
    }

    pub(crate) fn remove(&mut self, id: WorkId) -> Option<WorkItem<M, T, H>> {
        self.items.remove(&id)
    }

    pub(crate) fn get(&self, id: WorkId) -> Option<&WorkItem<M, T, H>> {
        self.items.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: WorkId) -> Option<&mut WorkItem<M, T, H>> {
        self.items.get_mut(&id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes and returns every pending item, leaving the table empty. Called once the worker is
    /// declared broken, so the caller can resolve each one with a broken-worker error.
    pub(crate) fn drain(&mut self) -> Vec<WorkItem<M, T, H>> {
        self.items.drain().map(|(_, item)| item).collect()
    }
}

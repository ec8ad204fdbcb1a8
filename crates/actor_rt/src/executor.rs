// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{Level, event};

use crate::actor::Actor;
use crate::constants::ERR_POISONED_LOCK;
use crate::dispatch::ManagementTask;
use crate::error::Error;
use crate::future::ActorFuture;
use crate::state::ExecutorState;
use crate::work::WorkItem;

/// The public façade of the actor-executor system: `post` a message, get back a future; call
/// `shutdown` when done. Produced by [`ThreadActor::executor`][crate::ThreadActor::executor] or,
/// with the `process` feature, [`ProcessActor::executor`][crate::ProcessActor::executor].
///
/// Dropping an `ActorExecutor` requests shutdown without blocking the dropping thread; call
/// [`shutdown(true)`][Self::shutdown] explicitly if you need to wait for in-flight work to
/// finish releasing its resources.
pub struct ActorExecutor<M, T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    admission_tx: crossbeam_channel::Sender<(u64, WorkItem<M, T, H>)>,
    wakeup_tx: crossbeam_channel::Sender<()>,
    state: Arc<ExecutorState>,
    management_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<M, T, H> ActorExecutor<M, T, H>
where
    M: Send + 'static,
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    pub(crate) fn spawn_thread<A>(args: A::Args, thread_name: &str) -> Self
    where
        A: Actor<Message = M, Output = T, Error = H>,
    {
        let worker = crate::workers::thread_worker::spawn::<A>(args, thread_name);
        Self::spawn_with_worker(worker)
    }

    #[cfg(feature = "process")]
    pub(crate) fn spawn_process<A>(
        args: A::Args,
        config: &crate::workers::process_worker::ProcessWorkerConfig,
    ) -> std::io::Result<Self>
    where
        A: Actor<Message = M, Output = T, Error = H>,
        A::Args: serde::Serialize + serde::de::DeserializeOwned,
        M: serde::Serialize + serde::de::DeserializeOwned,
        T: serde::Serialize + serde::de::DeserializeOwned,
        H: serde::Serialize + serde::de::DeserializeOwned,
    {
        let worker = crate::workers::process_worker::spawn::<A>(args, config)?;
        Ok(Self::spawn_with_worker(worker))
    }

    fn spawn_with_worker(worker: Box<dyn crate::dispatch::WorkerHandle<M, T, H>>) -> Self {
        let (admission_tx, admission_rx) = crossbeam_channel::unbounded();
        let (wakeup_tx, wakeup_rx) = crossbeam_channel::unbounded();
        let state = Arc::new(ExecutorState::default());

        let management_task = ManagementTask::new(admission_rx, wakeup_rx, worker, Arc::clone(&state));
        let management_thread = thread::Builder::new()
            .name("actor-rt-management".to_string())
            .spawn(move || management_task.run())
            .expect("failed to spawn actor_rt management thread");

        event!(Level::DEBUG, "actor executor started");

        Self {
            admission_tx,
            wakeup_tx,
            state,
            management_thread: Mutex::new(Some(management_thread)),
        }
    }

    /// Posts a message to the actor and returns a future for its eventual result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutdownRequested`] if [`shutdown`][Self::shutdown] was already called,
    /// or [`Error::BrokenWorker`] if the worker has already died.
    pub fn post(&self, message: M) -> Result<ActorFuture<T, H>, Error<H>> {
        if self.state.is_broken() {
            return Err(Error::BrokenWorker);
        }
        if self.state.shutdown_requested() {
            return Err(Error::ShutdownRequested);
        }

        let (future, resolver) = crate::future::new_pair();
        let work_id = self.state.next_work_id();
        let item = WorkItem::new(resolver, message);

        if self.admission_tx.send((work_id, item)).is_err() {
            return Err(Error::BrokenWorker);
        }

        // The wakeup sentinel is what lets the management task notice new work without busy
        // polling the admission channel.
        let _ = self.wakeup_tx.send(());

        Ok(future)
    }

    /// Requests that the executor stop accepting new work and, once all already-admitted work
    /// has completed, tear down its worker.
    ///
    /// Idempotent: calling this more than once has no additional effect. When `wait` is `true`,
    /// blocks until the management task and worker have both finished.
    pub fn shutdown(&self, wait: bool) {
        self.state.request_shutdown();
        let _ = self.wakeup_tx.send(());

        if wait {
            if let Some(handle) = self
                .management_thread
                .lock()
                .expect(ERR_POISONED_LOCK)
                .take()
            {
                let _ = handle.join();
            }
        }
    }
}

impl<M, T, H> Drop for ActorExecutor<M, T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    #[cfg_attr(test, mutants::skip)]
    fn drop(&mut self) {
        // We do not join here: a dropped executor must never block the dropping thread. The
        // management task observes `shutdown_requested` on its own and tears itself down once
        // draining completes, same as an explicit `shutdown(false)`.
        self.state.request_shutdown();
        let _ = self.wakeup_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error, Clone)]
    #[error("boom")]
    struct TestError;

    static_assertions::assert_impl_all!(ActorExecutor<i32, i32, TestError>: Send, Sync);
}

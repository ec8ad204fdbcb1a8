// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{Level, event};

use crate::actor::Actor;
use crate::dispatch::{WorkerEvent, WorkerHandle};
use crate::work::{CallItem, HandlerFailure, ResultItem};

/// Every in-process worker reports shutdown under the same synthetic identity; there is only
/// ever one thread per executor, so there is nothing to distinguish it from.
const THREAD_WORKER_IDENTITY: u64 = 0;

struct ThreadWorkerHandle<M, T, H> {
    call_tx: Sender<Option<CallItem<M>>>,
    events_rx: Receiver<WorkerEvent<T, H>>,
    never_rx: Receiver<()>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<M, T, H> WorkerHandle<M, T, H> for ThreadWorkerHandle<M, T, H>
where
    M: Send + 'static,
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    fn call_queue_has_capacity(&self) -> bool {
        self.call_tx.len() < self.call_tx.capacity().unwrap_or(1)
    }

    fn send_call(&self, item: Option<CallItem<M>>) {
        // A send error means the worker thread is gone; the management task will learn this
        // from `events()` disconnecting on its next wait phase.
        let _ = self.call_tx.send(item);
    }

    fn events(&self) -> &Receiver<WorkerEvent<T, H>> {
        &self.events_rx
    }

    fn liveness_sentinel(&self) -> &Receiver<()> {
        // The thread worker never needs an out-of-band crash signal: an unexpected exit (e.g. a
        // panic escaping the actor's constructor) drops `events_tx`, which the management task
        // already observes as a disconnect on `events()`.
        &self.never_rx
    }

    fn join(self: Box<Self>) {
        if let Some(handle) = self.join_handle.lock().expect(crate::constants::ERR_POISONED_LOCK).take() {
            let _ = handle.join();
        }
    }

    fn force_terminate(&self) {
        // Nothing to do: by the time the management task calls this, the worker thread has
        // already exited (that is precisely how its brokenness was detected).
    }
}

pub(crate) fn spawn<A>(
    args: A::Args,
    thread_name: &str,
) -> Box<dyn WorkerHandle<A::Message, A::Output, A::Error>>
where
    A: Actor,
{
    let (call_tx, call_rx) = crossbeam_channel::bounded(1);
    let (events_tx, events_rx) = crossbeam_channel::unbounded();

    let join_handle = thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || run_loop::<A>(args, &call_rx, &events_tx))
        .expect("failed to spawn actor worker thread");

    Box::new(ThreadWorkerHandle {
        call_tx,
        events_rx,
        never_rx: crossbeam_channel::never(),
        join_handle: Mutex::new(Some(join_handle)),
    })
}

fn run_loop<A>(
    args: A::Args,
    call_rx: &Receiver<Option<CallItem<A::Message>>>,
    events_tx: &Sender<WorkerEvent<A::Output, A::Error>>,
) where
    A: Actor,
{
    let mut actor = A::new(args);

    loop {
        let Ok(item) = call_rx.recv() else {
            return;
        };

        let Some(call) = item else {
            event!(Level::DEBUG, "thread worker received termination signal");
            let _ = events_tx.send(WorkerEvent::ShutdownAck(THREAD_WORKER_IDENTITY));
            return;
        };

        let payload = match catch_unwind(AssertUnwindSafe(|| actor.handle(call.message))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(HandlerFailure::Returned(err)),
            Err(panic_payload) => {
                let message = panic_message(&panic_payload);
                event!(Level::WARN, message = %message, "actor panicked while handling a message");
                Err(HandlerFailure::Panicked(message))
            }
        };

        if events_tx
            .send(WorkerEvent::Done(ResultItem {
                work_id: call.work_id,
                payload,
            }))
            .is_err()
        {
            return;
        }
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "actor panicked with a non-string payload".to_string()
    }
}

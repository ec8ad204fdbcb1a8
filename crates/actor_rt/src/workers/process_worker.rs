// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ffi::OsString;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Level, event};

use crate::actor::Actor;
use crate::constants::ERR_POISONED_LOCK;
use crate::dispatch::{WorkerEvent, WorkerHandle};
use crate::ipc::{InitRequest, WORKER_ROLE_ENV, WireRequest, WireResponse, encode, read_frame, write_encoded, write_frame};
use crate::work::{CallItem, HandlerFailure, ResultItem};

const DEFAULT_REAP_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Configuration for a spawned worker process, set via
/// [`ProcessActorExecutorBuilder`][crate::ProcessActorExecutorBuilder].
#[derive(Debug, Clone)]
pub(crate) struct ProcessWorkerConfig {
    /// The executable to re-exec as the worker. Defaults to the current executable.
    pub(crate) executable: Option<PathBuf>,
    /// Extra environment variables set on the worker process, in addition to
    /// [`WORKER_ROLE_ENV`][crate::ipc::WORKER_ROLE_ENV].
    pub(crate) extra_env: Vec<(OsString, OsString)>,
    /// How often the reaper thread polls the worker's liveness via `try_wait`.
    pub(crate) reap_poll_interval: Duration,
}

impl Default for ProcessWorkerConfig {
    fn default() -> Self {
        Self {
            executable: None,
            extra_env: Vec::new(),
            reap_poll_interval: DEFAULT_REAP_POLL_INTERVAL,
        }
    }
}

struct ProcessWorkerHandle<M, T, H> {
    call_tx: Sender<Option<CallItem<M>>>,
    events_rx: Receiver<WorkerEvent<T, H>>,
    sentinel_rx: Receiver<()>,
    child: Arc<Mutex<Child>>,
    pump_handle: Mutex<Option<JoinHandle<()>>>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    reaper_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<M, T, H> WorkerHandle<M, T, H> for ProcessWorkerHandle<M, T, H>
where
    M: Send + 'static,
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    fn call_queue_has_capacity(&self) -> bool {
        self.call_tx.len() < self.call_tx.capacity().unwrap_or(1)
    }

    fn send_call(&self, item: Option<CallItem<M>>) {
        // A send error means the pump thread is gone; the management task learns this from
        // `events()`/`liveness_sentinel()` on its next wait phase.
        let _ = self.call_tx.send(item);
    }

    fn events(&self) -> &Receiver<WorkerEvent<T, H>> {
        &self.events_rx
    }

    fn liveness_sentinel(&self) -> &Receiver<()> {
        &self.sentinel_rx
    }

    fn join(self: Box<Self>) {
        if let Some(handle) = self.pump_handle.lock().expect(ERR_POISONED_LOCK).take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.reader_handle.lock().expect(ERR_POISONED_LOCK).take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.reaper_handle.lock().expect(ERR_POISONED_LOCK).take() {
            let _ = handle.join();
        }
    }

    fn force_terminate(&self) {
        let mut guard = self.child.lock().expect(ERR_POISONED_LOCK);
        let _ = guard.kill();
        let _ = guard.try_wait();
        drop(guard);

        // Unblocks a pump thread parked on `call_rx.recv()` so it notices the pipe is gone
        // rather than leaking for the remaining life of the process.
        let _ = self.call_tx.send(None);
    }
}

/// Spawns a worker process running `A` and returns a handle to it.
///
/// Re-execs the current binary with [`WORKER_ROLE_ENV`] set to [`A::ROLE`][Actor::ROLE]; the
/// binary is expected to call [`crate::run_process_worker::<A>`] early in `main`, which hands
/// control to [`worker_process_main`] and never returns to the caller's own `main` body.
pub(crate) fn spawn<A>(
    args: A::Args,
    config: &ProcessWorkerConfig,
) -> io::Result<Box<dyn WorkerHandle<A::Message, A::Output, A::Error>>>
where
    A: Actor,
    A::Args: Serialize + DeserializeOwned,
    A::Message: Serialize + DeserializeOwned,
    A::Output: Serialize + DeserializeOwned,
    A::Error: Serialize + DeserializeOwned,
{
    let executable = match &config.executable {
        Some(path) => path.clone(),
        None => std::env::current_exe()?,
    };

    let mut command = Command::new(executable);
    command
        .env(WORKER_ROLE_ENV, A::ROLE)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped());
    for (key, value) in &config.extra_env {
        command.env(key, value);
    }
    let child = command.spawn()?;

    // Guards the handshake: if anything below fails, the child is killed and reaped rather than
    // left behind as an orphan. Defused once the handshake succeeds.
    let mut child = scopeguard::guard(child, |mut child| {
        let _ = child.kill();
        let _ = child.wait();
    });

    let mut stdin = child.stdin.take().expect("child spawned with piped stdin");
    let mut stdout = child.stdout.take().expect("child spawned with piped stdout");

    write_frame(&mut stdin, &InitRequest(args))?;

    let ack: WireResponse<A::Output, A::Error> = read_frame(&mut stdout)?;
    if !matches!(ack, WireResponse::InitAck) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "worker process sent an unexpected handshake response",
        ));
    }

    let (call_tx, call_rx) = crossbeam_channel::bounded(1);
    let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let (sentinel_tx, sentinel_rx) = crossbeam_channel::bounded(1);

    let child = Arc::new(Mutex::new(scopeguard::ScopeGuard::into_inner(child)));

    let pump_handle = {
        let events_tx = events_tx.clone();
        thread::Builder::new()
            .name("actor-rt-worker-pump".to_string())
            .spawn(move || {
                pump_loop::<A::Message, A::Output, A::Error>(&call_rx, &ack_rx, &events_tx, BufWriter::new(stdin));
            })
            .expect("failed to spawn actor_rt pump thread")
    };

    let reader_handle = {
        let events_tx = events_tx.clone();
        let sentinel_tx = sentinel_tx.clone();
        thread::Builder::new()
            .name("actor-rt-worker-reader".to_string())
            .spawn(move || {
                reader_loop::<A::Output, A::Error>(BufReader::new(stdout), &ack_tx, &events_tx, &sentinel_tx)
            })
            .expect("failed to spawn actor_rt reader thread")
    };

    let reaper_handle = {
        let child = Arc::clone(&child);
        let reap_poll_interval = config.reap_poll_interval;
        thread::Builder::new()
            .name("actor-rt-worker-reaper".to_string())
            .spawn(move || reaper_loop(&child, &sentinel_tx, reap_poll_interval))
            .expect("failed to spawn actor_rt reaper thread")
    };

    Ok(Box::new(ProcessWorkerHandle {
        call_tx,
        events_rx,
        sentinel_rx,
        child,
        pump_handle: Mutex::new(Some(pump_handle)),
        reader_handle: Mutex::new(Some(reader_handle)),
        reaper_handle: Mutex::new(Some(reaper_handle)),
    }))
}

/// Writes call frames to the worker's stdin, one at a time: the next item is only pulled off
/// `call_rx` once the worker's `Ack` for the previous one has arrived on `ack_rx`. This is what
/// makes the capacity-1 call queue invariant hold across a process boundary, the same way a
/// bounded channel of capacity one holds it in-process.
///
/// A message that fails to encode is reported as [`WorkerEvent::SerializationFailed`] for that
/// one work id and skipped - the worker never sees it and the pump moves on to the next item,
/// rather than the whole worker being declared broken over one bad message.
fn pump_loop<Msg, T, H, W>(
    call_rx: &Receiver<Option<CallItem<Msg>>>,
    ack_rx: &Receiver<()>,
    events_tx: &Sender<WorkerEvent<T, H>>,
    mut stdin: W,
) where
    Msg: Serialize,
    W: io::Write,
{
    loop {
        let Ok(item) = call_rx.recv() else {
            return;
        };

        match item {
            None => {
                let _ = write_frame(&mut stdin, &WireRequest::<Msg>::Terminate);
                return;
            }
            Some(call) => {
                let request = WireRequest::Call {
                    work_id: call.work_id,
                    message: call.message,
                };

                let bytes = match encode(&request) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        let WireRequest::Call { work_id, .. } = request else {
                            unreachable!("constructed as Call above")
                        };
                        event!(Level::WARN, error = %err, work_id, "message failed to encode for worker process");
                        if events_tx
                            .send(WorkerEvent::SerializationFailed {
                                work_id,
                                message: err.to_string(),
                            })
                            .is_err()
                        {
                            return;
                        }
                        continue;
                    }
                };

                if write_encoded(&mut stdin, &bytes).is_err() {
                    return;
                }

                if ack_rx.recv().is_err() {
                    return;
                }
            }
        }
    }
}

/// Reads response frames from the worker's stdout and demultiplexes them: `Ack` unblocks the
/// pump thread, `Done`/`ShutdownAck` become [`WorkerEvent`]s for the management task. Firing the
/// sentinel on a read error is what lets the management task notice a worker that dies mid-call
/// without the reaper thread's help.
fn reader_loop<Out, Err>(
    mut stdout: BufReader<ChildStdout>,
    ack_tx: &Sender<()>,
    events_tx: &Sender<WorkerEvent<Out, Err>>,
    sentinel_tx: &Sender<()>,
) where
    Out: DeserializeOwned,
    Err: DeserializeOwned,
{
    loop {
        let response: WireResponse<Out, Err> = match read_frame(&mut stdout) {
            Ok(response) => response,
            Err(err) => {
                event!(Level::WARN, error = %err, "worker process pipe closed unexpectedly");
                let _ = sentinel_tx.try_send(());
                return;
            }
        };

        match response {
            WireResponse::InitAck => {
                event!(Level::WARN, "worker process sent a duplicate handshake acknowledgement");
            }
            WireResponse::Ack { .. } => {
                if ack_tx.send(()).is_err() {
                    return;
                }
            }
            WireResponse::Done { work_id, payload } => {
                if events_tx.send(WorkerEvent::Done(ResultItem { work_id, payload })).is_err() {
                    return;
                }
            }
            WireResponse::ShutdownAck { pid } => {
                let _ = events_tx.send(WorkerEvent::ShutdownAck(u64::from(pid)));
                return;
            }
        }
    }
}

/// Polls rather than blocks on `wait()`, so [`ProcessWorkerHandle::force_terminate`]'s `kill()`
/// can always acquire the lock promptly instead of waiting behind an in-progress blocking wait.
fn reaper_loop(child: &Arc<Mutex<Child>>, sentinel_tx: &Sender<()>, poll_interval: Duration) {
    loop {
        thread::sleep(poll_interval);

        let exited = {
            let mut guard = child.lock().expect(ERR_POISONED_LOCK);
            !matches!(guard.try_wait(), Ok(None))
        };

        if exited {
            let _ = sentinel_tx.try_send(());
            return;
        }
    }
}

/// Entry point for a binary that hosts a [`crate::ProcessActor`] worker. Call this as the first
/// thing in `main`; if the current process was spawned as `A`'s worker, this never returns and
/// the process exits once the worker loop ends. Otherwise it returns immediately and the rest of
/// `main` runs as normal.
pub fn run_process_worker<A>()
where
    A: Actor,
    A::Args: DeserializeOwned,
    A::Message: DeserializeOwned,
    A::Output: Serialize,
    A::Error: Serialize,
{
    let Ok(role) = std::env::var(WORKER_ROLE_ENV) else {
        return;
    };
    if role != A::ROLE {
        return;
    }

    worker_process_main::<A>();
}

fn worker_process_main<A>() -> !
where
    A: Actor,
    A::Args: DeserializeOwned,
    A::Message: DeserializeOwned,
    A::Output: Serialize,
    A::Error: Serialize,
{
    let mut stdin = BufReader::new(io::stdin());
    let mut stdout = BufWriter::new(io::stdout());

    let init: InitRequest<A::Args> = match read_frame(&mut stdin) {
        Ok(init) => init,
        Err(err) => {
            event!(Level::ERROR, error = %err, "worker process failed to read its handshake");
            std::process::exit(70);
        }
    };

    let mut actor = A::new(init.0);

    if write_frame(&mut stdout, &WireResponse::<A::Output, A::Error>::InitAck).is_err() {
        std::process::exit(70);
    }

    loop {
        let request: WireRequest<A::Message> = match read_frame(&mut stdin) {
            Ok(request) => request,
            Err(_) => {
                // The controlling process is gone; nothing left to serve.
                std::process::exit(0);
            }
        };

        match request {
            WireRequest::Terminate => {
                let _ = write_frame(
                    &mut stdout,
                    &WireResponse::<A::Output, A::Error>::ShutdownAck { pid: std::process::id() },
                );
                std::process::exit(0);
            }
            WireRequest::Call { work_id, message } => {
                if write_frame(&mut stdout, &WireResponse::<A::Output, A::Error>::Ack { work_id }).is_err() {
                    std::process::exit(0);
                }

                // A handler panic here is not caught: it takes the worker process down, the same
                // way any other crash does, and the controller learns about it via the reaper
                // thread/pipe disconnect rather than a reported `HandlerFailure::Panicked`.
                let payload = actor.handle(message).map_err(HandlerFailure::Returned);

                if write_frame(&mut stdout, &WireResponse::Done { work_id, payload }).is_err() {
                    std::process::exit(0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::time::Duration;

    use serde::ser::Error as _;

    use super::*;

    /// A message that always fails to serialize, so the pump thread's encode-failure path can be
    /// exercised without a real worker process on the other end of the pipe.
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            Err(S::Error::custom("deliberately unserializable fixture message"))
        }
    }

    impl fmt::Debug for Unserializable {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("Unserializable")
        }
    }

    #[test]
    fn pump_reports_serialization_failure_without_blocking_the_queue() {
        let (call_tx, call_rx) = crossbeam_channel::bounded::<Option<CallItem<Unserializable>>>(1);
        let (_ack_tx, ack_rx) = crossbeam_channel::bounded::<()>(1);
        let (events_tx, events_rx) = crossbeam_channel::unbounded::<WorkerEvent<(), FixtureError>>();

        let handle = thread::spawn(move || {
            pump_loop(&call_rx, &ack_rx, &events_tx, Vec::<u8>::new());
        });

        call_tx
            .send(Some(CallItem {
                work_id: 42,
                message: Unserializable,
            }))
            .unwrap();

        match events_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(WorkerEvent::SerializationFailed { work_id, .. }) => assert_eq!(work_id, 42),
            other => panic!("unexpected event: {other:?}"),
        }

        call_tx.send(None).unwrap();
        handle.join().unwrap();
    }

    #[derive(Debug, Clone, thiserror::Error)]
    #[error("fixture error")]
    struct FixtureError;
}

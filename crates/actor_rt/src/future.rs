// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

use crate::constants::ERR_POISONED_LOCK;
use crate::error::Error;

type DoneCallback<T, H> = Box<dyn FnOnce(&ActorFuture<T, H>) + Send>;

enum State<T, H>
where
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    Pending,
    Running,
    Cancelled,
    Finished(Result<T, Error<H>>),
}

impl<T, H> State<T, H>
where
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Finished(_))
    }
}

struct Shared<T, H>
where
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    state: Mutex<State<T, H>>,
    condvar: Condvar,
    // `None` once the terminal callbacks have fired; any callback registered afterwards runs
    // immediately instead of being queued here.
    callbacks: Mutex<Option<Vec<DoneCallback<T, H>>>>,
}

/// A handle to the eventual result of one message posted to an [`ActorExecutor`][crate::ActorExecutor].
///
/// A future starts out `PENDING`, moves to `RUNNING` once the worker has taken it off the call
/// queue, and ends in either `FINISHED` (carrying a result or a handler error) or `CANCELLED` (if
/// [`cancel`][Self::cancel] won the race against dispatch). [`result`][Self::result] blocks the
/// calling thread until a terminal state is reached.
pub struct ActorFuture<T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<T, H>>,
}

impl<T, H> fmt::Debug for ActorFuture<T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock().expect(ERR_POISONED_LOCK);
        let label = match &*state {
            State::Pending => "Pending",
            State::Running => "Running",
            State::Cancelled => "Cancelled",
            State::Finished(Ok(_)) => "Finished(Ok)",
            State::Finished(Err(_)) => "Finished(Err)",
        };
        f.debug_struct("ActorFuture").field("state", &label).finish()
    }
}

impl<T, H> Clone for ActorFuture<T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, H> ActorFuture<T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    /// Returns `true` once the future has reached a terminal state (`FINISHED` or `CANCELLED`).
    #[must_use]
    pub fn done(&self) -> bool {
        self.shared.state.lock().expect(ERR_POISONED_LOCK).is_terminal()
    }

    /// Returns `true` if the worker has started (or finished) processing this message.
    #[must_use]
    pub fn running(&self) -> bool {
        matches!(*self.shared.state.lock().expect(ERR_POISONED_LOCK), State::Running)
    }

    /// Returns `true` if this future was cancelled before the worker began processing it.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        matches!(*self.shared.state.lock().expect(ERR_POISONED_LOCK), State::Cancelled)
    }

    /// Attempts to cancel the pending message.
    ///
    /// Returns `true` if the future was still `PENDING` and is now `CANCELLED`. Returns `false`
    /// if the message had already started running or had already finished - at that point
    /// cancellation is no longer possible.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.state.lock().expect(ERR_POISONED_LOCK);
        if matches!(*state, State::Pending) {
            *state = State::Cancelled;
            drop(state);
            self.shared.condvar.notify_all();
            self.fire_callbacks();
            true
        } else {
            false
        }
    }

    /// Blocks the calling thread until the future reaches a terminal state, then returns its
    /// outcome.
    pub fn result(&self) -> Result<T, Error<H>> {
        let mut state = self.shared.state.lock().expect(ERR_POISONED_LOCK);
        while !state.is_terminal() {
            state = self.shared.condvar.wait(state).expect(ERR_POISONED_LOCK);
        }
        match &*state {
            State::Cancelled => Err(Error::Cancelled),
            State::Finished(outcome) => outcome.clone(),
            State::Pending | State::Running => unreachable!("loop only exits on a terminal state"),
        }
    }

    /// Registers a callback to run once this future reaches a terminal state.
    ///
    /// If the future is already terminal, the callback runs immediately on the calling thread.
    /// Otherwise it runs on whichever thread performs the terminal transition (the management
    /// task for a result or handler error, or the thread that called [`cancel`][Self::cancel]).
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&Self) + Send + 'static,
    {
        let mut callbacks = self.shared.callbacks.lock().expect(ERR_POISONED_LOCK);
        match callbacks.as_mut() {
            Some(pending) => pending.push(Box::new(callback)),
            None => {
                drop(callbacks);
                callback(self);
            }
        }
    }

    fn fire_callbacks(&self) {
        let pending = self
            .shared
            .callbacks
            .lock()
            .expect(ERR_POISONED_LOCK)
            .take()
            .unwrap_or_default();
        for callback in pending {
            callback(self);
        }
    }
}

/// The management-task-only half of an [`ActorFuture`]'s shared state: the capability to move
/// the future through its state machine. Never exposed to callers of `post`.
pub(crate) struct ActorFutureResolver<T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<T, H>>,
}

impl<T, H> ActorFutureResolver<T, H>
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    /// The atomic race-arbitration point between dispatch and cancellation.
    ///
    /// Returns `true` (and transitions to `RUNNING`) if the future was still `PENDING`. Returns
    /// `false` if the future was already `CANCELLED` by the caller, in which case the work item
    /// must be discarded without ever reaching the worker.
    pub(crate) fn set_running_or_notify_cancel(&self) -> bool {
        let mut state = self.shared.state.lock().expect(ERR_POISONED_LOCK);
        match *state {
            State::Pending => {
                *state = State::Running;
                true
            }
            State::Cancelled => false,
            State::Running | State::Finished(_) => {
                unreachable!("a work item is only dispatched once, from PENDING")
            }
        }
    }

    pub(crate) fn set_result(&self, value: T) {
        self.finish(Ok(value));
    }

    pub(crate) fn set_exception(&self, error: Error<H>) {
        self.finish(Err(error));
    }

    fn finish(&self, outcome: Result<T, Error<H>>) {
        {
            let mut state = self.shared.state.lock().expect(ERR_POISONED_LOCK);
            *state = State::Finished(outcome);
        }
        self.shared.condvar.notify_all();
        self.as_future().fire_callbacks();
    }

    pub(crate) fn as_future(&self) -> ActorFuture<T, H> {
        ActorFuture {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Creates a fresh, `PENDING` future and its matching resolver.
pub(crate) fn new_pair<T, H>() -> (ActorFuture<T, H>, ActorFutureResolver<T, H>)
where
    T: Clone + Send + 'static,
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Pending),
        condvar: Condvar::new(),
        callbacks: Mutex::new(Some(Vec::new())),
    });
    (
        ActorFuture {
            shared: Arc::clone(&shared),
        },
        ActorFutureResolver { shared },
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;
    use std::thread;
    use std::time::Duration;

    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error, Clone)]
    #[error("boom")]
    struct TestError;

    static_assertions::assert_impl_all!(ActorFuture<i32, TestError>: Send, Sync, Clone);

    #[test]
    fn fresh_future_is_pending() {
        let (future, _resolver) = new_pair::<i32, TestError>();
        assert!(!future.done());
        assert!(!future.running());
        assert!(!future.cancelled());
    }

    #[test]
    fn cancel_before_dispatch_succeeds() {
        let (future, resolver) = new_pair::<i32, TestError>();
        assert!(future.cancel());
        assert!(future.cancelled());
        assert!(future.done());
        assert!(!resolver.set_running_or_notify_cancel());
        assert!(matches!(future.result(), Err(Error::Cancelled)));
    }

    #[test]
    fn cancel_after_running_fails() {
        let (future, resolver) = new_pair::<i32, TestError>();
        assert!(resolver.set_running_or_notify_cancel());
        assert!(!future.cancel());
        assert!(future.running());
    }

    #[test]
    fn set_result_resolves_pending_result_call() {
        let (future, resolver) = new_pair::<i32, TestError>();
        assert!(resolver.set_running_or_notify_cancel());

        let waiting_future = future.clone();
        let handle = thread::spawn(move || waiting_future.result());

        thread::sleep(Duration::from_millis(20));
        resolver.set_result(7);

        assert_eq!(handle.join().unwrap().unwrap(), 7);
    }

    #[test]
    fn set_exception_delivers_handler_error() {
        let (future, resolver) = new_pair::<i32, TestError>();
        assert!(resolver.set_running_or_notify_cancel());
        resolver.set_exception(Error::Handler(TestError));

        match future.result() {
            Err(Error::Handler(TestError)) => {}
            other => panic!("expected Handler error, got {other:?}"),
        }
    }

    #[test]
    fn result_can_be_read_more_than_once() {
        let (future, resolver) = new_pair::<i32, TestError>();
        assert!(resolver.set_running_or_notify_cancel());
        resolver.set_result(3);

        assert_eq!(future.result().unwrap(), 3);
        assert_eq!(future.result().unwrap(), 3);
    }

    #[test]
    fn done_callback_fires_after_completion() {
        let (future, resolver) = new_pair::<i32, TestError>();
        let seen = StdArc::new(AtomicUsize::new(0));

        let seen_clone = StdArc::clone(&seen);
        future.add_done_callback(move |f| {
            seen_clone.store(f.result().unwrap_or_default(), Ordering::SeqCst);
        });

        assert!(resolver.set_running_or_notify_cancel());
        resolver.set_result(9);

        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn done_callback_registered_late_fires_immediately() {
        let (future, resolver) = new_pair::<i32, TestError>();
        assert!(resolver.set_running_or_notify_cancel());
        resolver.set_result(11);

        let seen = StdArc::new(AtomicUsize::new(0));
        let seen_clone = StdArc::clone(&seen);
        future.add_done_callback(move |f| {
            seen_clone.store(f.result().unwrap(), Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 11);
    }
}

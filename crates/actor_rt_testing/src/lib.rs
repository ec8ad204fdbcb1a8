//! Test-only support shared by `actor_rt`'s test suite.
//!
//! This crate carries no domain knowledge of actors or executors; it only provides the watchdog
//! and logging scaffolding that keeps concurrency tests from hanging forever.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing_subscriber::util::SubscriberInitExt;

/// If something does not happen in a test within this time, the test will fail.
///
/// Conservative on purpose: this only exists to break out of a hung test, not to catch slow
/// but otherwise healthy code.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs `f` on a background thread and gives up on it (returning `None`) if it has not produced
/// a value within [`TEST_TIMEOUT`].
///
/// # Panics
///
/// Panics if the background thread fails to deliver its result for any reason other than a
/// timeout (i.e. if sending on the internal channel fails).
#[cfg_attr(test, mutants::skip)]
pub fn execute_or_abandon<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (sender, receiver) = mpsc::channel();

    thread::spawn(move || {
        let result = f();
        sender.send(result).unwrap();
    });

    receiver.recv_timeout(TEST_TIMEOUT).ok()
}

/// Runs `f` on the current thread, backed by a watchdog thread that aborts the process if `f`
/// has not finished within [`TEST_TIMEOUT`].
///
/// Use this instead of [`execute_or_abandon`] when `f` cannot be moved to another thread.
///
/// # Panics
///
/// Re-raises any panic from `f` once the watchdog has been disarmed.
#[cfg_attr(test, mutants::skip)]
pub fn execute_or_terminate_process<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let (done_tx, done_rx) = mpsc::channel();

    let watchdog = thread::Builder::new()
        .name("actor_rt test watchdog".to_string())
        .spawn(move || {
            if done_rx.recv_timeout(TEST_TIMEOUT) != Ok(()) {
                eprintln!("actor_rt test timed out, terminating process");
                #[expect(
                    clippy::exit,
                    reason = "the test process cannot make further progress past this point"
                )]
                std::process::exit(112);
            }
        })
        .unwrap();

    let result = catch_unwind(AssertUnwindSafe(f));

    done_tx.send(()).unwrap();
    watchdog.join().unwrap();

    result.unwrap()
}

/// Wires up a console logger for a single test process.
///
/// # Panics
///
/// Panics if logging was already configured for this process; run tests with a runner that
/// isolates each test into its own process (e.g. `cargo nextest run`).
#[cfg_attr(test, mutants::skip)]
pub fn log_to_console() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init()
        .expect("logging already configured for this process");
}

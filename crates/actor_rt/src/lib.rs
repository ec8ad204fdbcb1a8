// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A single-worker actor-executor: post messages to a dedicated thread or out-of-process worker
//! and get back a blocking future per message, processed strictly in submission order.
//!
//! [`ActorFuture`] is resolved by blocking on a condition variable, never polled - deliberately
//! not an [`std::future::Future`].
//!
//! ```
//! use actor_rt::{Actor, ThreadActor};
//! use thiserror::Error;
//!
//! #[derive(Debug, Clone, Error)]
//! #[error("counter actor never fails")]
//! struct Never;
//!
//! struct Counter {
//!     state: i64,
//! }
//!
//! impl Actor for Counter {
//!     type Args = i64;
//!     type Message = i64;
//!     type Output = i64;
//!     type Error = Never;
//!
//!     const ROLE: &'static str = "doctest::counter";
//!
//!     fn new(args: Self::Args) -> Self {
//!         Self { state: args }
//!     }
//!
//!     fn handle(&mut self, message: Self::Message) -> Result<Self::Output, Self::Error> {
//!         self.state += message;
//!         Ok(self.state)
//!     }
//! }
//!
//! let executor = Counter::executor(5);
//! let future = executor.post(10).unwrap();
//! assert_eq!(future.result().unwrap(), 15);
//! executor.shutdown(true);
//! ```

// Public API surface.
mod actor;
mod builder;
mod error;
mod executor;
mod future;

pub use actor::{Actor, ThreadActor};
pub use builder::ThreadActorExecutorBuilder;
pub use error::{Error, Result};
pub use executor::ActorExecutor;
pub use future::ActorFuture;

#[cfg(feature = "process")]
pub use actor::ProcessActor;
#[cfg(feature = "process")]
pub use builder::ProcessActorExecutorBuilder;
#[cfg(feature = "process")]
pub use workers::process_worker::run_process_worker;

// Internal to the crate.
mod constants;
mod dispatch;
mod state;
mod work;
mod workers;

#[cfg(feature = "process")]
mod ipc;

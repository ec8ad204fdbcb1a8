// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builder::ThreadActorExecutorBuilder;
use crate::executor::ActorExecutor;

/// A stateful message handler that runs exclusively inside its own worker (a dedicated thread or
/// a dedicated process), processing messages strictly in the order they are dispatched.
///
/// # Examples
///
/// ```
/// use actor_rt::{Actor, ThreadActor};
/// use thiserror::Error;
///
/// #[derive(Debug, Clone, Error)]
/// #[error("counter actor never fails")]
/// struct Never;
///
/// struct Counter {
///     state: i64,
/// }
///
/// impl Actor for Counter {
///     type Args = i64;
///     type Message = i64;
///     type Output = i64;
///     type Error = Never;
///
///     const ROLE: &'static str = "doctest::counter";
///
///     fn new(args: Self::Args) -> Self {
///         Self { state: args }
///     }
///
///     fn handle(&mut self, message: Self::Message) -> Result<Self::Output, Self::Error> {
///         self.state += message;
///         Ok(self.state)
///     }
/// }
///
/// let executor = Counter::executor(5);
/// let future = executor.post(10).unwrap();
/// assert_eq!(future.result().unwrap(), 15);
/// ```
pub trait Actor: Send + 'static {
    /// Arguments used to construct the actor, sent to the worker exactly once at startup.
    type Args: Send + Clone + 'static;
    /// The message type posted by callers.
    type Message: Send + 'static;
    /// The value returned by a successful `handle` call.
    type Output: Clone + Send + 'static;
    /// The error type returned by a failed `handle` call.
    type Error: std::error::Error + Clone + Send + Sync + 'static;

    /// Identifies this actor's worker role to a spawned process, via
    /// [`WORKER_ROLE_ENV`][crate::ipc::WORKER_ROLE_ENV]. Must be stable across binaries: unlike
    /// `std::any::type_name`, which bakes in the name of the crate a type happens to be compiled
    /// into, this is a name the implementer chooses, so the same value is produced whether the
    /// actor type is re-exec'd from its own binary or hosted by a separate worker binary that
    /// merely links against it.
    const ROLE: &'static str;

    /// Constructs the actor inside its worker. Called exactly once per executor.
    fn new(args: Self::Args) -> Self;

    /// Handles one message, mutating the actor's own state freely: the worker guarantees no two
    /// calls to `handle` ever overlap.
    fn handle(&mut self, message: Self::Message) -> Result<Self::Output, Self::Error>;
}

/// Runs an [`Actor`] on a dedicated thread within the current process.
pub trait ThreadActor: Actor {
    /// Constructs the actor on a dedicated worker thread and returns an executor for it.
    fn executor(args: Self::Args) -> ActorExecutor<Self::Message, Self::Output, Self::Error>
    where
        Self: Sized,
    {
        ActorExecutor::spawn_thread::<Self>(args, "actor-rt-worker")
    }

    /// Returns a builder for configuring the worker thread before spawning it.
    fn builder(args: Self::Args) -> ThreadActorExecutorBuilder<Self>
    where
        Self: Sized,
    {
        ThreadActorExecutorBuilder::new(args)
    }
}

impl<A> ThreadActor for A where A: Actor {}

/// Runs an [`Actor`] in a dedicated out-of-process worker, reached over piped stdio.
///
/// Requires every type the actor exchanges with its worker to round-trip through `serde`, since
/// they must cross a process boundary.
#[cfg(feature = "process")]
pub trait ProcessActor: Actor
where
    Self::Args: serde::Serialize + serde::de::DeserializeOwned,
    Self::Message: serde::Serialize + serde::de::DeserializeOwned,
    Self::Output: serde::Serialize + serde::de::DeserializeOwned,
    Self::Error: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Spawns a worker process running this actor and returns an executor for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the current executable cannot be re-spawned as a worker process.
    fn executor(
        args: Self::Args,
    ) -> std::io::Result<ActorExecutor<Self::Message, Self::Output, Self::Error>>
    where
        Self: Sized,
    {
        ActorExecutor::spawn_process::<Self>(args, &crate::workers::process_worker::ProcessWorkerConfig::default())
    }

    /// Returns a builder for configuring the worker process before spawning it.
    fn builder(args: Self::Args) -> crate::builder::ProcessActorExecutorBuilder<Self>
    where
        Self: Sized,
    {
        crate::builder::ProcessActorExecutorBuilder::new(args)
    }
}

#[cfg(feature = "process")]
impl<A> ProcessActor for A
where
    A: Actor,
    A::Args: serde::Serialize + serde::de::DeserializeOwned,
    A::Message: serde::Serialize + serde::de::DeserializeOwned,
    A::Output: serde::Serialize + serde::de::DeserializeOwned,
    A::Error: serde::Serialize + serde::de::DeserializeOwned,
{
}

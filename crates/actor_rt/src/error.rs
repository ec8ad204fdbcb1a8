// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// A specialized `Result` type for `actor_rt` operations that return an [`Error`][enum@Error]
/// on failure.
pub type Result<T, H> = std::result::Result<T, Error<H>>;

/// An error surfaced by an [`ActorExecutor`][crate::ActorExecutor] or an
/// [`ActorFuture`][crate::ActorFuture].
///
/// `H` is the actor's own handler error type (the `Err` side of `Actor::handle`'s return value).
/// Every other variant originates from the executor machinery itself rather than from the actor.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error<H>
where
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    /// `handle` returned an error.
    #[error("the actor raised an error while handling a message: {0}")]
    Handler(#[source] H),

    /// (thread worker only) `handle` panicked instead of returning. The worker itself survives;
    /// only this one message fails.
    #[error("the actor panicked while handling a message: {0}")]
    HandlerPanicked(String),

    /// The future was cancelled before its message was dispatched to the worker.
    #[error("the operation was cancelled before it reached the worker")]
    Cancelled,

    /// `post` was called after `shutdown` had already been requested on this executor.
    #[error("cannot post a new message: shutdown has already been requested")]
    ShutdownRequested,

    /// The worker died or became unreachable; the executor is no longer usable.
    #[error("the worker is broken and the executor can no longer accept or complete work")]
    BrokenWorker,

    /// A message, result, or error value could not be encoded or decoded for transport to or
    /// from an out-of-process worker.
    #[error("failed to serialize or deserialize a value for the out-of-process worker: {0}")]
    Serialization(String),
}

impl<H> Error<H>
where
    H: std::error::Error + Clone + Send + Sync + 'static,
{
    /// Returns `true` if this error represents a cancelled future.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if this error indicates the worker is broken.
    #[must_use]
    pub const fn is_broken_worker(&self) -> bool {
        matches!(self, Self::BrokenWorker)
    }
}

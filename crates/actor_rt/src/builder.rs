// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::actor::Actor;
use crate::executor::ActorExecutor;

/// Builds a thread-backed executor for `A`, with control over the worker thread's name.
///
/// Obtained via [`ThreadActor::builder`][crate::ThreadActor::builder]; most callers should use
/// [`ThreadActor::executor`][crate::ThreadActor::executor] instead, which applies sensible
/// defaults.
#[derive(Debug)]
pub struct ThreadActorExecutorBuilder<A>
where
    A: Actor,
{
    args: A::Args,
    thread_name: String,
}

impl<A> ThreadActorExecutorBuilder<A>
where
    A: Actor,
{
    pub(crate) fn new(args: A::Args) -> Self {
        Self {
            args,
            thread_name: "actor-rt-worker".to_string(),
        }
    }

    /// Names the dedicated worker thread. Defaults to `"actor-rt-worker"`.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Spawns the worker thread and builds the executor.
    #[must_use]
    pub fn build(self) -> ActorExecutor<A::Message, A::Output, A::Error> {
        ActorExecutor::spawn_thread::<A>(self.args, &self.thread_name)
    }
}

#[cfg(feature = "process")]
pub use process::ProcessActorExecutorBuilder;

#[cfg(feature = "process")]
mod process {
    use std::ffi::OsString;
    use std::io;
    use std::path::PathBuf;
    use std::time::Duration;

    use serde::Serialize;
    use serde::de::DeserializeOwned;

    use crate::actor::Actor;
    use crate::executor::ActorExecutor;
    use crate::workers::process_worker::ProcessWorkerConfig;

    /// Builds an out-of-process executor for `A`, with control over the worker executable,
    /// its environment, and how aggressively its liveness is polled.
    ///
    /// Obtained via [`ProcessActor::builder`][crate::ProcessActor::builder]; most callers should
    /// use [`ProcessActor::executor`][crate::ProcessActor::executor] instead, which applies
    /// sensible defaults (re-exec the current executable, no extra environment).
    #[derive(Debug)]
    pub struct ProcessActorExecutorBuilder<A>
    where
        A: Actor,
    {
        args: A::Args,
        config: ProcessWorkerConfig,
    }

    impl<A> ProcessActorExecutorBuilder<A>
    where
        A: Actor,
        A::Args: Serialize + DeserializeOwned,
        A::Message: Serialize + DeserializeOwned,
        A::Output: Serialize + DeserializeOwned,
        A::Error: Serialize + DeserializeOwned,
    {
        pub(crate) fn new(args: A::Args) -> Self {
            Self {
                args,
                config: ProcessWorkerConfig::default(),
            }
        }

        /// Overrides the executable re-exec'd as the worker process. Defaults to the current
        /// executable (`std::env::current_exe`).
        #[must_use]
        pub fn with_worker_executable(mut self, path: impl Into<PathBuf>) -> Self {
            self.config.executable = Some(path.into());
            self
        }

        /// Adds an environment variable set on the worker process, in addition to the role
        /// marker `run_process_worker` checks for.
        #[must_use]
        pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
            self.config.extra_env.push((key.into(), value.into()));
            self
        }

        /// Sets how often the reaper thread polls the worker process for exit via `try_wait`.
        /// Defaults to 25 milliseconds; shorter intervals detect a crash sooner at the cost of
        /// more frequent wakeups.
        #[must_use]
        pub fn with_reap_poll_interval(mut self, interval: Duration) -> Self {
            self.config.reap_poll_interval = interval;
            self
        }

        /// Spawns the worker process and builds the executor.
        ///
        /// # Errors
        ///
        /// Returns an error if the worker executable cannot be spawned.
        pub fn build(self) -> io::Result<ActorExecutor<A::Message, A::Output, A::Error>> {
            ActorExecutor::spawn_process::<A>(self.args, &self.config)
        }
    }
}

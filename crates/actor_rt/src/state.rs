// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Flags shared between callers of `post`/`shutdown` and the management task.
///
/// Reads and writes both use `SeqCst`: these flags are checked rarely (once per `post` call, and
/// once per management-task loop iteration), so there is no reason to reach for a weaker
/// ordering and risk a subtle bug for a negligible win.
#[derive(Debug, Default)]
pub(crate) struct ExecutorState {
    shutdown_requested: AtomicBool,
    broken: AtomicBool,
    next_work_id: AtomicU64,
}

impl ExecutorState {
    pub(crate) fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn set_broken(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }

    pub(crate) fn next_work_id(&self) -> u64 {
        self.next_work_id.fetch_add(1, Ordering::SeqCst)
    }
}

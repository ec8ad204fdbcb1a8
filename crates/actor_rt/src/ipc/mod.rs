// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod wire;

pub(crate) use wire::{InitRequest, WireRequest, WireResponse, encode, read_frame, write_encoded, write_frame};

/// Environment variable the controlling process sets (to the actor's [`Actor::ROLE`][crate::Actor::ROLE])
/// on the child it spawns, so [`crate::run_process_worker`] knows to run the worker loop instead
/// of the rest of the consuming binary's `main`.
pub(crate) const WORKER_ROLE_ENV: &str = "ACTOR_RT_WORKER";

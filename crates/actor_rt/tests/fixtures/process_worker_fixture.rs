// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Hosts the `Counter` fixture actor as an out-of-process worker. Re-exec'd by
//! `actor_rt::ProcessActor::executor`/`ActorExecutor::spawn_process` in the crash-detection
//! integration test; exits immediately when not invoked with the worker role marker set.

#[path = "../support/mod.rs"]
mod support;

fn main() {
    actor_rt::run_process_worker::<support::Counter>();
}

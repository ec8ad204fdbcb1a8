// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(feature = "process")]

#[path = "support/mod.rs"]
mod support;

use std::path::PathBuf;
use std::time::Duration;

use actor_rt::{Error, ProcessActor};
use actor_rt_testing::execute_or_abandon;

use support::{Counter, CounterArgs, CounterMessage, CounterOutput};

fn fixture_executable() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_actor_rt_process_worker_fixture"))
}

#[test]
fn basic_roundtrip_over_a_worker_process() {
    execute_or_abandon(|| {
        let executor = Counter::builder(CounterArgs { a: None, factor: 1 })
            .with_worker_executable(fixture_executable())
            .build()
            .expect("failed to spawn worker process");

        let started = executor.post(CounterMessage::Start).unwrap().result().unwrap();
        assert_eq!(started, CounterOutput::Started);

        let added = executor.post(CounterMessage::Add).unwrap().result().unwrap();
        assert_eq!(added, CounterOutput::Added(1003));

        executor.shutdown(true);
    })
    .unwrap();
}

#[test]
fn crash_is_detected_and_drains_pending_futures() {
    execute_or_abandon(|| {
        let executor = Counter::builder(CounterArgs { a: None, factor: 1 })
            .with_worker_executable(fixture_executable())
            .with_reap_poll_interval(Duration::from_millis(5))
            .build()
            .expect("failed to spawn worker process");

        // The first message in flight is the one that crashes the worker mid-call; the other
        // two are still sitting in the call queue/pending table when that happens.
        let crashing = executor.post(CounterMessage::Crash).unwrap();
        let pending_one = executor.post(CounterMessage::Wait(50)).unwrap();
        let pending_two = executor.post(CounterMessage::Wait(50)).unwrap();

        assert!(matches!(crashing.result(), Err(Error::BrokenWorker)));
        assert!(matches!(pending_one.result(), Err(Error::BrokenWorker)));
        assert!(matches!(pending_two.result(), Err(Error::BrokenWorker)));

        assert!(matches!(
            executor.post(CounterMessage::Start),
            Err(Error::BrokenWorker)
        ));
    })
    .unwrap();
}

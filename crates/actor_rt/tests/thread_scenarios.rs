// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[path = "support/mod.rs"]
mod support;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use actor_rt::{Error, ThreadActor};
use actor_rt_testing::execute_or_abandon;

use support::{Counter, CounterArgs, CounterError, CounterMessage, CounterOutput};

#[test]
fn basic_roundtrip() {
    execute_or_abandon(|| {
        let executor = Counter::executor(CounterArgs { a: None, factor: 1 });

        let started = executor.post(CounterMessage::Start).unwrap().result().unwrap();
        assert_eq!(started, CounterOutput::Started);

        let added = executor.post(CounterMessage::Add).unwrap().result().unwrap();
        assert_eq!(added, CounterOutput::Added(1003));

        executor.shutdown(true);
    })
    .unwrap();
}

#[test]
fn constructor_args_seed_initial_state() {
    execute_or_abandon(|| {
        let executor = Counter::executor(CounterArgs {
            a: Some(8),
            factor: 8,
        });

        let added = executor.post(CounterMessage::Add).unwrap().result().unwrap();
        assert_eq!(added, CounterOutput::Added(1064));

        executor.shutdown(true);
    })
    .unwrap();
}

#[test]
fn callbacks_fire_in_completion_order() {
    execute_or_abandon(|| {
        let executor = Counter::executor(CounterArgs { a: None, factor: 1 });
        let accumulator = Arc::new(AtomicI64::new(0));

        let futures = [1u64, 2, 3].map(|millis| executor.post(CounterMessage::Wait(millis)).unwrap());
        assert_eq!(accumulator.load(Ordering::SeqCst), 0);

        for future in &futures {
            let accumulator = Arc::clone(&accumulator);
            future.add_done_callback(move |f| {
                if let Ok(output) = f.result() {
                    if let Some(value) = output.waited_value() {
                        accumulator.fetch_add(i64::try_from(value).unwrap(), Ordering::SeqCst);
                    }
                }
            });
        }

        for future in &futures {
            future.result().unwrap();
        }

        assert_eq!(accumulator.load(Ordering::SeqCst), 6);
        executor.shutdown(true);
    })
    .unwrap();
}

#[test]
fn cancelling_before_dispatch_skips_the_handler() {
    execute_or_abandon(|| {
        let executor = Counter::executor(CounterArgs { a: None, factor: 1 });
        let accumulator = Arc::new(AtomicI64::new(0));

        let futures: Vec<_> = [1u64, 2, 3, 4]
            .into_iter()
            .map(|millis| executor.post(CounterMessage::Wait(millis)).unwrap())
            .collect();

        for future in &futures {
            let accumulator = Arc::clone(&accumulator);
            future.add_done_callback(move |f| {
                if let Ok(output) = f.result() {
                    if let Some(value) = output.waited_value() {
                        accumulator.fetch_add(i64::try_from(value).unwrap(), Ordering::SeqCst);
                    }
                }
            });
        }

        assert!(futures[2].cancel());

        for (index, future) in futures.iter().enumerate() {
            if index == 2 {
                assert!(matches!(future.result(), Err(Error::Cancelled)));
            } else {
                future.result().unwrap();
            }
        }

        assert_eq!(accumulator.load(Ordering::SeqCst), 1 + 2 + 4);
        executor.shutdown(true);
    })
    .unwrap();
}

#[test]
fn handler_errors_are_reported_without_breaking_the_worker() {
    execute_or_abandon(|| {
        let executor = Counter::executor(CounterArgs { a: None, factor: 1 });

        let result = executor.post(CounterMessage::Boom).unwrap().result();
        match result {
            Err(Error::Handler(CounterError::Boom(message))) => {
                assert!(message.contains("deliberate fixture failure"));
            }
            other => panic!("expected a handler error, got {other:?}"),
        }

        // The worker survives a handler error and keeps serving later messages.
        let started = executor.post(CounterMessage::Start).unwrap().result().unwrap();
        assert_eq!(started, CounterOutput::Started);

        executor.shutdown(true);
    })
    .unwrap();
}

#[test]
fn shutdown_rejects_further_posts() {
    execute_or_abandon(|| {
        let executor = Counter::executor(CounterArgs { a: None, factor: 1 });
        executor.shutdown(true);

        assert!(matches!(
            executor.post(CounterMessage::Start),
            Err(Error::ShutdownRequested)
        ));
    })
    .unwrap();
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A small reference actor shared by `actor_rt`'s integration tests and the out-of-process
//! worker fixture binary.

use std::thread;
use std::time::Duration;

use actor_rt::Actor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterArgs {
    pub a: Option<i64>,
    pub factor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CounterMessage {
    Start,
    Add,
    /// Sleeps for the given number of milliseconds (kept short so the ordering scenarios in
    /// the test suite run quickly) and returns it.
    Wait(u64),
    Boom,
    /// Exits the process immediately, emulating a worker crash rather than a caught panic.
    /// Only meaningful for an out-of-process worker; sent to a thread worker, this would take
    /// the test binary down with it.
    Crash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterOutput {
    Started,
    Added(i64),
    Waited(u64),
}

impl CounterOutput {
    pub fn waited_value(&self) -> Option<u64> {
        match self {
            Self::Waited(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CounterError {
    #[error("counter actor exploded on request: {0}")]
    Boom(String),
}

pub struct Counter {
    a: i64,
}

impl Actor for Counter {
    type Args = CounterArgs;
    type Message = CounterMessage;
    type Output = CounterOutput;
    type Error = CounterError;

    // Shared verbatim (via `#[path]`) by the in-process integration tests and the out-of-process
    // worker fixture binary, which are compiled as separate crates; a hand-written constant is
    // what keeps this stable across both, unlike `std::any::type_name`.
    const ROLE: &'static str = "actor_rt::tests::counter";

    fn new(args: Self::Args) -> Self {
        Self {
            a: args.a.unwrap_or(0) * args.factor,
        }
    }

    fn handle(&mut self, message: Self::Message) -> Result<Self::Output, Self::Error> {
        match message {
            CounterMessage::Start => {
                self.a = 3;
                Ok(CounterOutput::Started)
            }
            CounterMessage::Add => {
                for _ in 0..1000 {
                    self.a += 1;
                }
                Ok(CounterOutput::Added(self.a))
            }
            CounterMessage::Wait(millis) => {
                thread::sleep(Duration::from_millis(millis));
                Ok(CounterOutput::Waited(millis))
            }
            CounterMessage::Boom => Err(CounterError::Boom("deliberate fixture failure".to_string())),
            CounterMessage::Crash => std::process::exit(70),
        }
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub(crate) const ERR_POISONED_LOCK: &str =
    "a lock inside actor_rt was poisoned by a panicking thread - this executor is unusable";

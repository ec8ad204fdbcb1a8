// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub(crate) mod thread_worker;

#[cfg(feature = "process")]
pub(crate) mod process_worker;

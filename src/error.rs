// Copyright 2023, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Errors returned by the HAL.

use std::io;
use thiserror::Error;

/// Errors returned by [`EventRelay::start`](crate::relay::EventRelay::start).
#[derive(Error, Debug)]
pub enum StartError {
    /// The relay worker is already running.
    #[error("event relay is already running")]
    AlreadyRunning,
    /// The worker thread could not be created.
    #[error("failed to spawn the event relay worker: {0}")]
    AlreadyFailed(#[source] io::Error),
    /// The relay mutex was poisoned.
    #[error("event relay lock poisoned")]
    Poisoned,
}

/// Errors returned by [`EventRelay::stop`](crate::relay::EventRelay::stop).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StopError {
    /// The worker thread could not be joined, either because it panicked
    /// or because `stop` was called from the worker itself.
    #[error("failed to join the event relay worker")]
    JoinFailed,
    /// The relay mutex was poisoned.
    #[error("event relay lock poisoned")]
    Poisoned,
}

/// Errors returned by [`EventRelay::post`](crate::relay::EventRelay::post).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PostError {
    /// The relay mutex was poisoned.
    #[error("event relay lock poisoned")]
    Poisoned,
}

/// Errors returned by [`ObserverTlv::encode`](crate::polling_loop::ObserverTlv::encode).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// The record length does not fit in its 8-bit length field.
    #[error("polling frame record of {0} bytes exceeds the 255 bytes length field")]
    RecordTooLong(usize),
}

/// Errors reported by a [`Transport`](crate::hal::Transport).
#[derive(Error, Debug)]
pub enum TransportError {
    /// The underlying device is not available.
    #[error("transport unavailable")]
    Unavailable,
    /// The underlying device reported an I/O failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors returned by [`NfcHal`](crate::hal::NfcHal) operations.
#[derive(Error, Debug)]
pub enum HalError {
    /// The operation requires an open HAL.
    #[error("HAL is closed")]
    Closed,
    /// The HAL session mutex was poisoned.
    #[error("HAL lock poisoned")]
    Poisoned,
    /// The event relay could not be started.
    #[error("event relay start failed: {0}")]
    Relay(#[from] StartError),
    /// The event relay could not be shut down.
    #[error("event relay shutdown failed: {0}")]
    Shutdown(#[from] StopError),
    /// An event could not be handed to the relay.
    #[error("event post failed: {0}")]
    Event(#[from] PostError),
    /// The transport to the controller failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

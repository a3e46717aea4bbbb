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

//! ST21NFC NCI HAL core.
//!
//! Bridges the ST21NFC controller to the NFC stack:
//! - [`relay::EventRelay`] delivers HAL events to the stack callback from a
//!   dedicated thread, one at a time and in order.
//! - [`polling_loop::PollingLoopTranscoder`] rewrites the polling loop
//!   records reported by the controller in observer mode into Android
//!   polling frame notifications.
//! - [`hal::NfcHal`] ties both to the controller transport for one HAL
//!   session.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod hal;
pub mod packets;
pub mod polling_loop;
pub mod relay;

pub use config::{HalConfig, HwVersion, NfcMode, ObserveModeCapability};
pub use error::{EncodeError, HalError, PostError, StartError, StopError, TransportError};
pub use event::{NfcEvent, NfcStatus};
pub use hal::{DataCallback, NfcHal, ObserverState, Transport};
pub use polling_loop::{convert_timestamp, ObserverTlv, ObserverType, PollingLoopTranscoder};
pub use relay::{EventCallback, EventRelay};

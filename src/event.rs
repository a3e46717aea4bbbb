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

//! Events and status codes reported to the NFC stack.

/// HAL event reported through the stack callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum NfcEvent {
    OpenCplt = 0,
    CloseCplt = 1,
    PostInitCplt = 2,
    PreDiscoverCplt = 3,
    RequestControl = 4,
    ReleaseControl = 5,
    Error = 6,
    HciNetworkReset = 7,
}

/// Status attached to an [`NfcEvent`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum NfcStatus {
    Ok = 0,
    Failed = 1,
    ErrTransport = 2,
    ErrCmdTimeout = 3,
    Refused = 4,
}

impl From<NfcEvent> for u8 {
    fn from(event: NfcEvent) -> Self {
        event as u8
    }
}

impl From<NfcStatus> for u8 {
    fn from(status: NfcStatus) -> Self {
        status as u8
    }
}

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

//! Single-slot relay delivering HAL events to the NFC stack callback.
//!
//! Events may be produced from any driver thread. The relay hands each one
//! to a dedicated worker thread through a one-event mailbox, so the stack
//! callback is always invoked from the same thread, one event at a time, in
//! the order the events were posted. A poster only blocks while the previous
//! event has not yet been picked up by the worker.

use crate::error::{PostError, StartError, StopError};
use crate::event::{NfcEvent, NfcStatus};
use log::{debug, error, warn};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};

/// Name given to the relay worker thread.
const WORKER_NAME: &str = "nfc-hal-callback";

/// Stack callback receiving HAL events.
pub type EventCallback = Arc<dyn Fn(NfcEvent, NfcStatus) + Send + Sync>;

/// Event waiting in the mailbox.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct PendingEvent {
    event: NfcEvent,
    status: NfcStatus,
}

/// State shared between the posters and the worker.
/// An occupied mailbox is represented by `pending` being `Some`.
#[derive(Default)]
struct RelayState {
    pending: Option<PendingEvent>,
    running: bool,
    stop_requested: bool,
    worker: Option<ThreadId>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<RelayState>,
    cond: Condvar,
    callback: EventCallback,
}

/// Lock poisoning marker, converted into the error type of each operation.
struct Poisoned;

impl From<Poisoned> for StartError {
    fn from(_: Poisoned) -> Self {
        StartError::Poisoned
    }
}

impl From<Poisoned> for StopError {
    fn from(_: Poisoned) -> Self {
        StopError::Poisoned
    }
}

impl From<Poisoned> for PostError {
    fn from(_: Poisoned) -> Self {
        PostError::Poisoned
    }
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, RelayState>, Poisoned> {
        self.state.lock().map_err(|_| {
            error!("event relay lock poisoned");
            Poisoned
        })
    }

    fn wait<'a>(
        &self,
        state: MutexGuard<'a, RelayState>,
    ) -> Result<MutexGuard<'a, RelayState>, Poisoned> {
        self.cond.wait(state).map_err(|_| {
            error!("event relay condition wait failed");
            Poisoned
        })
    }

    fn deliver(&self, event: NfcEvent, status: NfcStatus) {
        debug!("delivering {:?} status {:?}", event, status);
        (self.callback)(event, status)
    }
}

/// Clears the running flag when the worker exits, including when the
/// stack callback panics, so that posters never wait on a dead worker.
struct WorkerExit<'a>(&'a Shared);

impl Drop for WorkerExit<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.state.lock() {
            state.running = false;
        }
        self.0.cond.notify_all();
    }
}

/// Worker routine: the only consumer of the mailbox.
fn run_worker(shared: &Shared) {
    let _exit = WorkerExit(shared);
    let Ok(mut state) = shared.lock() else { return };

    loop {
        while state.pending.is_none() && !state.stop_requested {
            state = match shared.wait(state) {
                Ok(state) => state,
                Err(Poisoned) => return,
            };
        }

        // Stop was requested and the mailbox is drained.
        let Some(PendingEvent { event, status }) = state.pending.take() else { break };

        // Release the mailbox before invoking the callback, which may
        // take an arbitrary amount of time.
        drop(state);
        shared.cond.notify_all();
        shared.deliver(event, status);

        state = match shared.lock() {
            Ok(state) => state,
            Err(Poisoned) => return,
        };
    }

    state.running = false;
    debug!("event relay worker exiting");
}

/// Relay serializing HAL events towards the NFC stack callback.
///
/// The relay is owned by a HAL session. It must be started before events
/// are delivered asynchronously; events posted while the relay is not
/// running are delivered synchronously on the posting thread.
pub struct EventRelay {
    shared: Arc<Shared>,
}

impl EventRelay {
    /// Create a stopped relay delivering events to `callback`.
    pub fn new(callback: EventCallback) -> EventRelay {
        EventRelay {
            shared: Arc::new(Shared {
                state: Mutex::new(RelayState::default()),
                cond: Condvar::new(),
                callback,
            }),
        }
    }

    /// Start the worker thread.
    pub fn start(&self) -> Result<(), StartError> {
        let mut state = self.shared.lock()?;
        if state.running || state.handle.is_some() {
            return Err(StartError::AlreadyRunning);
        }

        state.pending = None;
        state.stop_requested = false;
        state.running = true;

        let shared = Arc::clone(&self.shared);
        // The worker blocks on the state lock until the handle is recorded.
        match thread::Builder::new().name(WORKER_NAME.to_owned()).spawn(move || run_worker(&shared))
        {
            Ok(handle) => {
                state.worker = Some(handle.thread().id());
                state.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                error!("failed to spawn the event relay worker: {}", err);
                state.running = false;
                Err(StartError::AlreadyFailed(err))
            }
        }
    }

    /// Post an event to the stack callback.
    ///
    /// Blocks until the mailbox is free, then returns without waiting for
    /// the delivery. When called from the worker thread, i.e. from within the
    /// callback, the event is delivered inline before returning. When the
    /// relay is not running the event is delivered inline on the calling
    /// thread.
    pub fn post(&self, event: NfcEvent, status: NfcStatus) -> Result<(), PostError> {
        let mut state = self.shared.lock()?;

        if state.worker == Some(thread::current().id()) {
            drop(state);
            self.shared.deliver(event, status);
            return Ok(());
        }

        loop {
            if !state.running {
                drop(state);
                warn!("event relay is not running, delivering {:?} inline", event);
                self.shared.deliver(event, status);
                return Ok(());
            }
            if state.pending.is_none() {
                break;
            }
            state = self.shared.wait(state)?;
        }

        state.pending = Some(PendingEvent { event, status });
        drop(state);
        self.shared.cond.notify_all();
        Ok(())
    }

    /// Stop the worker thread, after it has delivered every event already
    /// handed to it. Calling `stop` on a relay that is not running is a no-op.
    pub fn stop(&self) -> Result<(), StopError> {
        let handle = {
            let mut state = self.shared.lock()?;
            if state.worker == Some(thread::current().id()) {
                error!("event relay cannot be stopped from its own worker");
                return Err(StopError::JoinFailed);
            }
            let Some(handle) = state.handle.take() else { return Ok(()) };
            state.stop_requested = true;
            handle
        };

        self.shared.cond.notify_all();
        let result = handle.join();

        let mut state = self.shared.lock()?;
        state.worker = None;
        state.running = false;
        drop(state);

        result.map_err(|_| {
            error!("event relay worker terminated abnormally");
            StopError::JoinFailed
        })
    }

    /// Whether the worker thread is accepting events.
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().map(|state| state.running).unwrap_or(false)
    }
}

impl Drop for EventRelay {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!("event relay dropped without clean shutdown: {}", err);
        }
    }
}

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

//! NFC HAL session.
//!
//! [`NfcHal`] owns the state of one HAL session: the transport to the
//! controller, the [`EventRelay`] delivering events to the NFC stack, and the
//! observer mode state. Operations on the I/O path (open, write, close,
//! core initialization, power cycle) are serialized by the session mutex.
//! Events are always posted after the session mutex is released, so that the
//! stack callback may call back into the HAL.

use crate::config::{HalConfig, NfcMode, ObserveModeCapability};
use crate::error::{HalError, TransportError};
use crate::event::{NfcEvent, NfcStatus};
use crate::packets::android::ObserveModeCommand;
use crate::packets::st;
use crate::polling_loop::PollingLoopTranscoder;
use crate::relay::{EventCallback, EventRelay};
use log::{debug, error, info, trace, warn, LevelFilter};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Stack callback receiving NCI packets.
pub type DataCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Transport to the NFC controller.
pub trait Transport: Send {
    /// Open the controller and start the I/O thread.
    fn open(&mut self) -> Result<(), TransportError>;
    /// Send an NCI packet to the controller.
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError>;
    /// Send the vendor configuration to the controller after core
    /// initialization.
    fn send_config(&mut self) -> Result<(), TransportError>;
    /// Close the controller.
    fn close(&mut self);
}

/// Observer mode state last requested by the NFC stack.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ObserverState {
    /// Observed technologies, or the legacy enable value.
    pub technologies: u8,
    /// Whether the state was set with a per-technology command.
    pub per_technology: bool,
}

impl ObserverState {
    /// Whether observer mode is enabled for any technology.
    pub fn enabled(&self) -> bool {
        self.technologies != 0
    }
}

struct Session<T> {
    transport: T,
    relay: Option<Arc<EventRelay>>,
    data_callback: Option<DataCallback>,
    open: bool,
    observer: ObserverState,
}

/// NFC HAL session.
pub struct NfcHal<T: Transport> {
    config: HalConfig,
    transcoder: PollingLoopTranscoder,
    session: Mutex<Session<T>>,
    logging: AtomicBool,
}

impl<T: Transport> NfcHal<T> {
    /// Create a closed HAL using `transport` to reach the controller.
    pub fn new(config: HalConfig, transport: T) -> NfcHal<T> {
        NfcHal {
            transcoder: PollingLoopTranscoder::new(config.hw_version),
            config,
            session: Mutex::new(Session {
                transport,
                relay: None,
                data_callback: None,
                open: false,
                observer: ObserverState::default(),
            }),
            logging: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session<T>>, HalError> {
        self.session.lock().map_err(|_| {
            error!("HAL session lock poisoned");
            HalError::Poisoned
        })
    }

    /// Current relay, used to post events outside of the session lock.
    fn relay(&self) -> Result<Arc<EventRelay>, HalError> {
        self.lock()?.relay.clone().ok_or(HalError::Closed)
    }

    /// Open the HAL. An already open session is closed first, without
    /// notifying the previous callback.
    ///
    /// On success `OpenCplt` is reported with status `Ok`. On failure
    /// `OpenCplt` is reported with status `Failed` and the error returned.
    pub fn open(
        &self,
        callback: EventCallback,
        data_callback: DataCallback,
    ) -> Result<(), HalError> {
        info!("opening HAL for {}", self.config.hw_version);
        let previous = {
            let mut session = self.lock()?;
            if session.open {
                debug!("closing the previous session");
                session.transport.close();
                session.open = false;
            }
            session.relay.take()
        };
        if let Some(previous) = previous {
            previous.stop()?;
        }

        let mut session = self.lock()?;
        let relay = Arc::new(EventRelay::new(callback.clone()));
        if let Err(err) = relay.start() {
            error!("failed to start the event relay: {}", err);
            drop(session);
            callback(NfcEvent::OpenCplt, NfcStatus::Failed);
            return Err(err.into());
        }

        session.relay = Some(relay.clone());
        session.data_callback = Some(data_callback);
        session.observer = ObserverState::default();

        if let Err(err) = session.transport.open() {
            error!("failed to open the transport: {}", err);
            drop(session);
            relay.post(NfcEvent::OpenCplt, NfcStatus::Failed)?;
            return Err(err.into());
        }

        session.open = true;
        drop(session);
        relay.post(NfcEvent::OpenCplt, NfcStatus::Ok)?;
        Ok(())
    }

    /// Write an NCI packet to the controller.
    ///
    /// Observer mode commands are rewritten into the commands supported by
    /// the firmware. Returns the number of bytes consumed, or 0 if the HAL is
    /// closed or the transport failed.
    pub fn write(&self, packet: &[u8]) -> usize {
        let Ok(mut session) = self.lock() else { return 0 };
        if !session.open {
            return 0;
        }

        let packet_out: Cow<'_, [u8]> = match ObserveModeCommand::parse(packet) {
            Some(cmd) => Cow::Owned(session.observe_mode_command(cmd, self.config.observe_mode)),
            None => Cow::Borrowed(packet),
        };

        match session.transport.send(&packet_out) {
            Ok(()) => packet.len(),
            Err(err) => {
                error!("failed to send {:02x?}: {}", packet_out, err);
                0
            }
        }
    }

    /// Send the vendor configuration once the NCI core is initialized.
    pub fn core_initialized(&self) -> Result<(), HalError> {
        let mut session = self.lock()?;
        if !session.open {
            return Err(HalError::Closed);
        }
        session.transport.send_config()?;
        Ok(())
    }

    /// Report the completion of the pre-discovery sequence; no vendor
    /// specific action is required.
    pub fn pre_discover(&self) -> Result<(), HalError> {
        self.relay()?.post(NfcEvent::PreDiscoverCplt, NfcStatus::Ok)?;
        Ok(())
    }

    /// Report a new `OpenCplt` event to the stack.
    pub fn power_cycle(&self) -> NfcStatus {
        let relay = match self.lock() {
            Ok(session) if session.open => session.relay.clone(),
            _ => None,
        };
        match relay.map(|relay| relay.post(NfcEvent::OpenCplt, NfcStatus::Ok)) {
            Some(Ok(())) => NfcStatus::Ok,
            _ => NfcStatus::Failed,
        }
    }

    /// Close the HAL.
    ///
    /// `CloseCplt` is reported before the event relay is stopped. A relay
    /// that cannot be stopped, e.g. when closing from the stack callback, is
    /// reported as [`HalError::Shutdown`] and kept in the session, so that
    /// the next `open` or the drop of the HAL stops it.
    pub fn close(&self, nfc_mode: NfcMode) -> Result<(), HalError> {
        info!("closing HAL, nfc_mode = {:?}", nfc_mode);
        let relay = {
            let mut session = self.lock()?;
            if !session.open {
                return Ok(());
            }
            session.transport.close();
            session.open = false;
            session.relay.take()
        };

        if let Some(relay) = relay {
            relay.post(NfcEvent::CloseCplt, NfcStatus::Ok)?;
            if let Err(err) = relay.stop() {
                error!("failed to stop the event relay: {}", err);
                let mut session = self.lock()?;
                if session.relay.is_none() {
                    session.relay = Some(relay);
                }
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Close the HAL on device power off, unless card emulation must stay
    /// enabled while switched off.
    pub fn close_for_power_off(&self) -> Result<(), HalError> {
        match self.config.nfc_mode {
            NfcMode::CardEmulationOnSwitchOff => Ok(()),
            mode => self.close(mode),
        }
    }

    /// Nothing needs to be reset on this controller.
    pub fn factory_reset(&self) {
        debug!("factory reset");
    }

    /// Enable or disable verbose logging.
    pub fn set_logging(&self, enable: bool) {
        self.logging.store(enable, Ordering::Relaxed);
        if enable && self.config.log_level < LevelFilter::Trace {
            log::set_max_level(LevelFilter::Trace);
        } else {
            log::set_max_level(self.config.log_level);
        }
    }

    /// Whether verbose logging is enabled.
    pub fn is_logging_enabled(&self) -> bool {
        self.logging.load(Ordering::Relaxed)
    }

    /// Observer mode state last requested by the stack.
    pub fn observer_mode(&self) -> ObserverState {
        self.lock().map(|session| session.observer).unwrap_or_default()
    }

    /// Whether the HAL is open.
    pub fn is_open(&self) -> bool {
        self.lock().map(|session| session.open).unwrap_or(false)
    }

    /// Process an NCI packet received from the controller.
    ///
    /// Firmware log notifications carry polling loop records: they are
    /// converted into polling frame notifications while observer mode is
    /// enabled, and swallowed otherwise. Other packets are forwarded
    /// unchanged.
    pub fn handle_notification(&self, packet: &[u8]) {
        let (callback, observer) = match self.lock() {
            Ok(session) if session.open => match session.data_callback.clone() {
                Some(callback) => (callback, session.observer),
                None => return,
            },
            _ => {
                warn!("dropping {} byte packet received while closed", packet.len());
                return;
            }
        };

        if !st::is_fw_log_notification(packet) {
            callback(packet);
            return;
        }
        if !observer.enabled() {
            trace!("ignoring firmware log notification");
            return;
        }

        let Some(&format) = packet.get(3) else { return };
        let mut buffer = vec![0u8; self.config.max_notification_size];
        let len = self.transcoder.transcode(
            format,
            packet,
            &mut buffer,
            self.config.max_notification_size,
        );
        if len > 0 {
            callback(&buffer[..len]);
        }
    }
}

impl<T> Session<T> {
    /// Build the controller command for an observer mode command of the
    /// stack, and record the requested state.
    fn observe_mode_command(
        &mut self,
        cmd: ObserveModeCommand,
        capability: ObserveModeCapability,
    ) -> Vec<u8> {
        debug!("observe mode command {:?} ({:?} firmware)", cmd, capability);
        match (cmd, capability) {
            (ObserveModeCommand::Query, ObserveModeCapability::Legacy) => {
                st::core_get_config_observer()
            }
            (ObserveModeCommand::Query, ObserveModeCapability::PerTechnology) => {
                st::rf_get_listen_observe_mode_state()
            }
            (ObserveModeCommand::Enable(enable), ObserveModeCapability::Legacy) => {
                self.observer = ObserverState { technologies: enable, per_technology: false };
                st::core_set_config_observer(enable)
            }
            (ObserveModeCommand::Enable(enable), ObserveModeCapability::PerTechnology) => {
                let technologies = if enable != 0 { st::ALL_TECHNOLOGIES } else { 0 };
                self.observer = ObserverState { technologies, per_technology: false };
                st::rf_set_listen_observe_mode_state(technologies)
            }
            (ObserveModeCommand::EnablePerTechnology(technologies), _) => {
                self.observer = ObserverState { technologies, per_technology: true };
                st::rf_set_listen_observe_mode_state(technologies)
            }
        }
    }
}

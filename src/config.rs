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

//! HAL configuration.

use crate::packets::nci;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;

/// Hardware version of the controller, as reported by the firmware
/// descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HwVersion {
    /// ST21NFCD.
    St21nfcd,
    /// ST54J / ST54K.
    St54j,
    /// ST54L.
    St54l,
    /// Any other hardware revision.
    Unknown(u8),
}

impl From<u8> for HwVersion {
    fn from(value: u8) -> Self {
        match value {
            0x04 => HwVersion::St21nfcd,
            0x05 => HwVersion::St54j,
            0x06 => HwVersion::St54l,
            _ => HwVersion::Unknown(value),
        }
    }
}

impl FromStr for HwVersion {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "st21nfcd" => Ok(HwVersion::St21nfcd),
            "st54j" | "st54k" => Ok(HwVersion::St54j),
            "st54l" => Ok(HwVersion::St54l),
            other => Err(format!("unknown hardware version '{}'", other)),
        }
    }
}

impl fmt::Display for HwVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HwVersion::St21nfcd => write!(f, "ST21NFCD"),
            HwVersion::St54j => write!(f, "ST54J"),
            HwVersion::St54l => write!(f, "ST54L"),
            HwVersion::Unknown(value) => write!(f, "unknown ({:#04x})", value),
        }
    }
}

/// Shape of the observer mode commands understood by the firmware.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObserveModeCapability {
    /// Observer mode is a configuration parameter, set with
    /// CORE_SET_CONFIG.
    Legacy,
    /// Observer mode is configured per technology with
    /// RF_SET_LISTEN_OBSERVE_MODE_STATE.
    PerTechnology,
}

impl From<u8> for ObserveModeCapability {
    fn from(value: u8) -> Self {
        match value {
            2 => ObserveModeCapability::PerTechnology,
            _ => ObserveModeCapability::Legacy,
        }
    }
}

/// Behavior of the controller while NFC is switched off.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NfcMode {
    /// The controller is powered down.
    Off,
    /// Card emulation stays enabled while NFC is switched off.
    CardEmulationOnSwitchOff,
    /// Card emulation stays enabled while the device is charging over USB.
    UsbCharging,
}

/// HAL configuration.
#[derive(Clone, Debug)]
pub struct HalConfig {
    /// Hardware version of the controller.
    pub hw_version: HwVersion,
    /// Observer mode command shape supported by the firmware.
    pub observe_mode: ObserveModeCapability,
    /// Largest notification forwarded to the NFC stack.
    pub max_notification_size: usize,
    /// Behavior of the controller while NFC is switched off.
    pub nfc_mode: NfcMode,
    /// Log level restored when verbose logging is disabled.
    pub log_level: LevelFilter,
}

impl Default for HalConfig {
    fn default() -> Self {
        HalConfig {
            hw_version: HwVersion::St54l,
            observe_mode: ObserveModeCapability::PerTechnology,
            max_notification_size: nci::MAX_PACKET_SIZE,
            nfc_mode: NfcMode::Off,
            log_level: LevelFilter::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hw_version_codes() {
        assert_eq!(HwVersion::from(0x05), HwVersion::St54j);
        assert_eq!(HwVersion::from(0x06), HwVersion::St54l);
        assert_eq!(HwVersion::from(0x42), HwVersion::Unknown(0x42));
        assert_eq!("ST54K".parse::<HwVersion>(), Ok(HwVersion::St54j));
        assert!("st99".parse::<HwVersion>().is_err());
    }

    #[test]
    fn observe_mode_capability() {
        assert_eq!(ObserveModeCapability::from(2), ObserveModeCapability::PerTechnology);
        assert_eq!(ObserveModeCapability::from(1), ObserveModeCapability::Legacy);
    }

    #[test]
    fn default_notification_ceiling() {
        assert_eq!(HalConfig::default().max_notification_size, 258);
    }
}

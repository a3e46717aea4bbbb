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

//! Packet parsers and serializers.

/// NCI packet framing.
pub mod nci {
    /// Size of the NCI control packet header.
    pub const HEADER_SIZE: usize = 3;
    /// Maximum payload size of a single NCI control packet.
    pub const MAX_PAYLOAD_SIZE: usize = 255;
    /// Maximum size of a single NCI control packet.
    pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

    /// Group identifier of the core commands.
    pub const GID_CORE: u8 = 0x0;
    /// Group identifier of the RF management commands.
    pub const GID_RF: u8 = 0x1;
    /// Group identifier of the proprietary commands.
    pub const GID_PROPRIETARY: u8 = 0xf;

    /// NCI message type.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    #[allow(missing_docs)]
    pub enum MessageType {
        Data = 0,
        Command = 1,
        Response = 2,
        Notification = 3,
    }

    /// Decoded NCI control packet header.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct PacketHeader {
        /// Message type.
        pub mt: MessageType,
        /// Packet boundary flag: set when the message continues in the
        /// next segment.
        pub incomplete: bool,
        /// Group identifier.
        pub gid: u8,
        /// Opcode identifier.
        pub oid: u8,
        /// Payload length.
        pub payload_length: u8,
    }

    impl PacketHeader {
        /// Parse the header at the start of `packet`.
        /// Returns `None` if the packet is too short or the message type
        /// is reserved.
        pub fn parse(packet: &[u8]) -> Option<PacketHeader> {
            let header = packet.get(..HEADER_SIZE)?;
            let mt = match (header[0] >> 5) & 0x7 {
                0 => MessageType::Data,
                1 => MessageType::Command,
                2 => MessageType::Response,
                3 => MessageType::Notification,
                _ => return None,
            };
            Some(PacketHeader {
                mt,
                incomplete: header[0] & 0x10 != 0,
                gid: header[0] & 0xf,
                oid: header[1] & 0x3f,
                payload_length: header[2],
            })
        }
    }
}

/// Android proprietary NCI extensions.
pub mod android {
    use super::nci;

    /// Opcode of the Android proprietary messages.
    pub const OID: u8 = 0x0c;
    /// Sub-opcode of the passive observer mode enable command.
    pub const PASSIVE_OBSERVE: u8 = 0x02;
    /// Sub-opcode of the polling loop frame notification.
    pub const POLLING_FRAME_NTF: u8 = 0x03;
    /// Sub-opcode of the passive observer mode query command.
    pub const QUERY_PASSIVE_OBSERVE: u8 = 0x04;
    /// Sub-opcode of the per-technology passive observer mode command.
    pub const PASSIVE_OBSERVE_PER_TECH: u8 = 0x05;

    /// Header of the polling loop frame notification. The length byte is
    /// rewritten as records are appended.
    pub const POLLING_FRAME_NTF_HEADER: [u8; 4] =
        [0x60 | nci::GID_PROPRIETARY, OID, 0x01, POLLING_FRAME_NTF];

    /// Observer mode command sent by the NFC stack.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum ObserveModeCommand {
        /// Query the current observer mode state.
        Query,
        /// Enable (non-zero) or disable (zero) observer mode for all
        /// technologies.
        Enable(u8),
        /// Enable observer mode for the technologies set in the bitmask.
        EnablePerTechnology(u8),
    }

    impl ObserveModeCommand {
        /// Recognize an observer mode command. Any other packet returns
        /// `None` and must be forwarded unchanged.
        pub fn parse(packet: &[u8]) -> Option<ObserveModeCommand> {
            const PREFIX: [u8; 2] = [0x20 | nci::GID_PROPRIETARY, OID];
            match packet {
                [a, b, 0x01, QUERY_PASSIVE_OBSERVE] if [*a, *b] == PREFIX => {
                    Some(ObserveModeCommand::Query)
                }
                [a, b, 0x02, PASSIVE_OBSERVE, enable] if [*a, *b] == PREFIX => {
                    Some(ObserveModeCommand::Enable(*enable))
                }
                [a, b, 0x02, PASSIVE_OBSERVE_PER_TECH, technologies] if [*a, *b] == PREFIX => {
                    Some(ObserveModeCommand::EnablePerTechnology(*technologies))
                }
                _ => None,
            }
        }
    }
}

/// ST21NFC controller specific messages.
pub mod st {
    use super::nci;

    /// Opcode of the firmware log notification carrying polling loop
    /// records.
    pub const FW_LOG_NTF_OID: u8 = 0x02;
    /// Configuration parameter holding the legacy observer mode state.
    pub const OBSERVER_CONFIG_PARAM: u8 = 0xa3;
    /// Technology bitmask enabling observer mode for NFC-A, NFC-B and NFC-F.
    pub const ALL_TECHNOLOGIES: u8 = 0x07;

    /// Whether the packet is a firmware log notification, which carries
    /// polling loop records when observer mode is enabled.
    pub fn is_fw_log_notification(packet: &[u8]) -> bool {
        matches!(
            nci::PacketHeader::parse(packet),
            Some(nci::PacketHeader {
                mt: nci::MessageType::Notification,
                gid: nci::GID_PROPRIETARY,
                oid: FW_LOG_NTF_OID,
                ..
            })
        )
    }

    /// CORE_GET_CONFIG_CMD reading the observer mode parameter.
    pub fn core_get_config_observer() -> Vec<u8> {
        vec![0x20 | nci::GID_CORE, 0x03, 0x02, 0x01, OBSERVER_CONFIG_PARAM]
    }

    /// CORE_SET_CONFIG_CMD writing the observer mode parameter.
    pub fn core_set_config_observer(enable: u8) -> Vec<u8> {
        vec![0x20 | nci::GID_CORE, 0x02, 0x04, 0x01, OBSERVER_CONFIG_PARAM, 0x01, enable]
    }

    /// RF_GET_LISTEN_OBSERVE_MODE_STATE_CMD.
    pub fn rf_get_listen_observe_mode_state() -> Vec<u8> {
        vec![0x20 | nci::GID_RF, 0x17, 0x00]
    }

    /// RF_SET_LISTEN_OBSERVE_MODE_STATE_CMD for the selected technologies.
    pub fn rf_set_listen_observe_mode_state(technologies: u8) -> Vec<u8> {
        vec![0x20 | nci::GID_RF, 0x16, 0x01, technologies]
    }
}

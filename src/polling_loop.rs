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

//! Conversion of ST polling loop records into Android polling frame
//! notifications.
//!
//! When observer mode is enabled the controller reports the RF activity it
//! observes through firmware log notifications. Each notification carries a
//! sequence of chip-native records, starting after a 6 byte prefix:
//!
//! ```text
//! +-----+-----+------------------------------+-----------------+
//! | tag | len | payload (len - 4 bytes)      | timestamp (BE)  |
//! +-----+-----+------------------------------+-----------------+
//! ```
//!
//! Field on/off and card emulation RX records are rewritten into the
//! Android polling frame format and concatenated under a single
//! `6F 0C <len> 03` notification header. Other records are dropped.

use crate::config::HwVersion;
use crate::error::EncodeError;
use crate::packets::{android, nci};
use bytes::BufMut;
use log::{debug, warn};

/// Offset of the first record in the notification.
const RECORD_AREA_OFFSET: usize = 6;
/// Size of the trailing timestamp of each record.
const TIMESTAMP_SIZE: usize = 4;
/// Size of the smallest record: tag, length and timestamp.
const MIN_RECORD_SIZE: usize = 2 + TIMESTAMP_SIZE;
/// Offset of the frame bytes in card emulation RX records.
const CE_FRAME_OFFSET: usize = 8;

const T_CE_RX: u8 = 0x09;
const T_FIELD_ON: u8 = 0x10;
const T_FIELD_OFF: u8 = 0x11;
const T_CE_RX_ERROR: u8 = 0x19;

/// Gain reported for remote field records, which carry no gain.
const NO_GAIN: u8 = 0xff;
/// Flag set on frames received as short frames.
const FLAG_SHORT_FRAME: u8 = 0x01;

/// Type of a polling frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ObserverType {
    RemoteField = 0x00,
    TypeA = 0x01,
    TypeB = 0x02,
    TypeF = 0x03,
    TypeV = 0x04,
    Unknown = 0x07,
}

impl ObserverType {
    /// Technology encoded in the low nibble of the RX record type byte.
    fn from_rx_type(rx_type: u8) -> ObserverType {
        match rx_type & 0xf {
            0x1..=0x6 | 0xb | 0xd => ObserverType::TypeA,
            0x7 | 0xc => ObserverType::TypeB,
            0x8 | 0x9 => ObserverType::TypeF,
            0xa => ObserverType::TypeV,
            _ => ObserverType::Unknown,
        }
    }
}

/// Polling frame record of the Android polling frame notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObserverTlv {
    /// Frame type.
    pub kind: ObserverType,
    /// Frame flags.
    pub flags: u8,
    /// Timestamp in microseconds.
    pub timestamp: u32,
    /// Receiver gain, or 0xff when not applicable.
    pub gain: u8,
    /// Frame bytes.
    pub value: Vec<u8>,
}

impl ObserverTlv {
    /// Value of the record length field: timestamp, gain and frame bytes.
    pub fn length(&self) -> usize {
        TIMESTAMP_SIZE + 1 + self.value.len()
    }

    /// Size of the encoded record.
    pub fn encoded_len(&self) -> usize {
        3 + self.length()
    }

    /// Append the encoded record to `buf`. Nothing is written when the
    /// record length does not fit in its length byte.
    pub fn encode(&self, buf: &mut impl BufMut) -> Result<(), EncodeError> {
        let length =
            u8::try_from(self.length()).map_err(|_| EncodeError::RecordTooLong(self.length()))?;
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.flags);
        buf.put_u8(length);
        buf.put_u32(self.timestamp);
        buf.put_u8(self.gain);
        buf.put_slice(&self.value);
        Ok(())
    }
}

/// Convert a raw controller timestamp into microseconds.
///
/// ST54L controllers count in units of 1024/259 µs, older controllers in
/// units of 128/28 µs. The chip generation is carried by bits 4 and 5 of
/// the notification format byte. The result is rounded to the nearest
/// microsecond and saturates at `u32::MAX`.
pub fn convert_timestamp(format: u8, raw: u32) -> u32 {
    let (num, den): (u64, u64) = if format & 0x30 == 0x30 { (1024, 259) } else { (128, 28) };
    let us = (u64::from(raw) * num * 2 + den) / (den * 2);
    u32::try_from(us).unwrap_or(u32::MAX)
}

/// Iterator over the chip-native records of a notification.
/// Stops at the first record exceeding the notification bounds.
struct Records<'a> {
    frame: &'a [u8],
    pos: usize,
}

impl<'a> Records<'a> {
    fn new(frame: &'a [u8]) -> Self {
        Records { frame, pos: RECORD_AREA_OFFSET }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let length = *self.frame.get(self.pos + 1)?;
        let end = self.pos + usize::from(length) + 2;
        let record = self.frame.get(self.pos..end)?;
        self.pos = end;
        Some(record)
    }
}

/// Transcoder for polling loop notifications.
///
/// The transcoder holds no state across calls; the hardware version only
/// selects the errata workarounds.
#[derive(Copy, Clone, Debug)]
pub struct PollingLoopTranscoder {
    hw_version: HwVersion,
}

impl PollingLoopTranscoder {
    /// Create a transcoder for the selected controller.
    pub fn new(hw_version: HwVersion) -> Self {
        PollingLoopTranscoder { hw_version }
    }

    /// Decode the polling frames contained in a notification.
    pub fn decode<'a>(
        &'a self,
        format: u8,
        frame: &'a [u8],
    ) -> impl Iterator<Item = ObserverTlv> + 'a {
        Records::new(frame).filter_map(move |record| self.decode_record(format, record))
    }

    /// Rewrite the polling loop records of `frame` into a polling frame
    /// notification written to `output`.
    ///
    /// Returns the size of the notification, or 0 when nothing must be
    /// forwarded: the frame contained no polling frame, or the notification
    /// would exceed `max_output` bytes. `output` is left untouched in both
    /// cases.
    pub fn transcode(
        &self,
        format: u8,
        frame: &[u8],
        output: &mut [u8],
        max_output: usize,
    ) -> usize {
        let mut notification: Vec<u8> = vec![];

        for tlv in self.decode(format, frame) {
            if notification.is_empty() {
                notification.put_slice(&android::POLLING_FRAME_NTF_HEADER);
            }
            let payload_length = notification.len() - nci::HEADER_SIZE + tlv.encoded_len();
            let Ok(payload_length) = u8::try_from(payload_length) else {
                warn!("dropping polling frame notification: payload exceeds 255 bytes");
                return 0;
            };
            if let Err(err) = tlv.encode(&mut notification) {
                warn!("dropping polling frame notification: {}", err);
                return 0;
            }
            notification[2] = payload_length;
        }

        if notification.is_empty() {
            return 0;
        }
        if notification.len() > max_output.min(output.len()) {
            warn!(
                "dropping polling frame notification: {} bytes exceed the {} bytes limit",
                notification.len(),
                max_output.min(output.len())
            );
            return 0;
        }

        output[..notification.len()].copy_from_slice(&notification);
        notification.len()
    }

    fn decode_record(&self, format: u8, record: &[u8]) -> Option<ObserverTlv> {
        if record.len() < MIN_RECORD_SIZE {
            debug!("ignoring truncated polling loop record {:02x?}", record);
            return None;
        }

        let (_, raw_timestamp) = record.split_at(record.len() - TIMESTAMP_SIZE);
        let raw_timestamp = u32::from_be_bytes(raw_timestamp.try_into().ok()?);
        let timestamp = convert_timestamp(format, raw_timestamp);

        match record[0] {
            tag @ (T_FIELD_ON | T_FIELD_OFF) => {
                debug!("field {}", if tag == T_FIELD_ON { "on" } else { "off" });
                Some(ObserverTlv {
                    kind: ObserverType::RemoteField,
                    flags: 0,
                    timestamp,
                    gain: NO_GAIN,
                    value: vec![u8::from(tag == T_FIELD_ON)],
                })
            }
            T_CE_RX | T_CE_RX_ERROR => self.decode_rx(record, timestamp),
            tag => {
                debug!("ignoring polling loop record with tag {:#04x}", tag);
                None
            }
        }
    }

    fn decode_rx(&self, record: &[u8], timestamp: u32) -> Option<ObserverTlv> {
        let rx_type = record[2];
        let error = record[5];
        let mut size = usize::from(record[1]).saturating_sub(2).max(CE_FRAME_OFFSET);

        // ST54J reports Type-A short frames with an incorrect real size,
        // the frame byte is one past the declared payload.
        if self.hw_version == HwVersion::St54j
            && rx_type & 0xf == 0x01
            && error == 0x00
            && record.get(6) == Some(&0x0f)
        {
            size = CE_FRAME_OFFSET + 1;
        }

        let value = match record.get(CE_FRAME_OFFSET..size) {
            Some(value) => value.to_vec(),
            None => {
                debug!("ignoring RX record with inconsistent size {:02x?}", record);
                return None;
            }
        };

        let mut kind = ObserverType::from_rx_type(rx_type);
        let flags = if rx_type & 0xf == 0x01 { FLAG_SHORT_FRAME } else { 0 };
        let first = value.first().copied();

        // Frames received with errors or whose first byte does not match
        // the expected poll command are reported as unknown.
        let invalid = match kind {
            ObserverType::TypeA => !matches!(first, Some(0x26 | 0x52)),
            ObserverType::TypeB => first != Some(0x05) && value.len() == 3,
            _ => false,
        };
        if error != 0 || invalid {
            kind = ObserverType::Unknown;
        }

        debug!("RX {:?} flags {:#04x} {:02x?}", kind, flags, value);
        Some(ObserverTlv { kind, flags, timestamp, gain: record[3] >> 4, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ST54L: u8 = 0x30;
    const ST54J: u8 = 0x10;

    /// Wrap records into a firmware log notification.
    fn notification(format: u8, records: &[&[u8]]) -> Vec<u8> {
        let mut frame = vec![0x6f, 0x02, 0x00, format, 0x00, 0x00];
        for record in records {
            frame.extend_from_slice(record);
        }
        frame[2] = (frame.len() - 3) as u8;
        frame
    }

    fn record(tag: u8, payload: &[u8], timestamp: u32) -> Vec<u8> {
        let mut record = vec![tag, (payload.len() + 4) as u8];
        record.extend_from_slice(payload);
        record.extend_from_slice(&timestamp.to_be_bytes());
        record
    }

    /// Card emulation RX record with the given type nibble, gain, error flag
    /// and frame bytes.
    fn rx_record(rx_type: u8, gain: u8, error: u8, data: &[u8], timestamp: u32) -> Vec<u8> {
        ce_record(T_CE_RX, rx_type, gain, error, data, timestamp)
    }

    fn ce_record(
        tag: u8,
        rx_type: u8,
        gain: u8,
        error: u8,
        data: &[u8],
        timestamp: u32,
    ) -> Vec<u8> {
        let mut payload = vec![rx_type, gain << 4, 0x00, error, 0x00, 0x00];
        payload.extend_from_slice(data);
        record(tag, &payload, timestamp)
    }

    fn transcode(hw: HwVersion, frame: &[u8]) -> Vec<u8> {
        let mut output = [0u8; 258];
        let len = PollingLoopTranscoder::new(hw).transcode(frame[3], frame, &mut output, 258);
        output[..len].to_vec()
    }

    #[test]
    fn empty_notification() {
        let frame = notification(ST54L, &[]);
        let mut output = [0xaau8; 258];
        let transcoder = PollingLoopTranscoder::new(HwVersion::St54l);
        assert_eq!(transcoder.transcode(ST54L, &frame, &mut output, 258), 0);
        assert!(output.iter().all(|b| *b == 0xaa));
    }

    #[test]
    fn field_on() {
        let frame = notification(ST54L, &[&record(T_FIELD_ON, &[], 0)]);
        assert_eq!(
            transcode(HwVersion::St54l, &frame),
            vec![0x6f, 0x0c, 0x0a, 0x03, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x00, 0xff, 0x01]
        );
    }

    #[test]
    fn field_off() {
        let frame = notification(ST54L, &[&record(T_FIELD_OFF, &[], 0)]);
        let output = transcode(HwVersion::St54l, &frame);
        assert_eq!(output.len(), 4 + 9);
        assert_eq!(output[4], ObserverType::RemoteField as u8);
        assert_eq!(output[12], 0x00);
    }

    #[test]
    fn type_a_short_frame() {
        let frame = notification(ST54L, &[&rx_record(0x01, 0x3, 0x00, &[0x26], 259)]);
        assert_eq!(
            transcode(HwVersion::St54l, &frame),
            vec![0x6f, 0x0c, 0x0a, 0x03, 0x01, 0x01, 0x06, 0x00, 0x00, 0x04, 0x00, 0x03, 0x26]
        );
    }

    #[test]
    fn type_a_unexpected_command() {
        let frame = notification(ST54L, &[&rx_record(0x01, 0x0, 0x00, &[0x93], 0)]);
        let output = transcode(HwVersion::St54l, &frame);
        assert_eq!(output[4], ObserverType::Unknown as u8);
        assert_eq!(output[12], 0x93);
    }

    #[test]
    fn rx_error_is_unknown() {
        let frame = notification(ST54L, &[&rx_record(0x08, 0x0, 0x01, &[0x00, 0xff], 0)]);
        let tlvs: Vec<_> =
            PollingLoopTranscoder::new(HwVersion::St54l).decode(ST54L, &frame).collect();
        assert_eq!(tlvs.len(), 1);
        assert_eq!(tlvs[0].kind, ObserverType::Unknown);
        assert_eq!(tlvs[0].value, vec![0x00, 0xff]);
    }

    #[test]
    fn rx_error_tag() {
        let record = ce_record(T_CE_RX_ERROR, 0x02, 0x3, 0x00, &[0x26], 259);
        let frame = notification(ST54L, &[&record]);
        assert_eq!(
            transcode(HwVersion::St54l, &frame),
            vec![0x6f, 0x0c, 0x0a, 0x03, 0x01, 0x00, 0x06, 0x00, 0x00, 0x04, 0x00, 0x03, 0x26]
        );

        let record = ce_record(T_CE_RX_ERROR, 0x02, 0x3, 0x01, &[0x26], 0);
        let frame = notification(ST54L, &[&record]);
        let tlvs: Vec<_> =
            PollingLoopTranscoder::new(HwVersion::St54l).decode(ST54L, &frame).collect();
        assert_eq!(tlvs.len(), 1);
        assert_eq!(tlvs[0].kind, ObserverType::Unknown);
        assert_eq!(tlvs[0].value, vec![0x26]);
    }

    #[test]
    fn type_b_command_check_only_applies_to_three_byte_frames() {
        let frame = notification(
            ST54L,
            &[
                &rx_record(0x07, 0x0, 0x00, &[0x06, 0x00], 0),
                &rx_record(0x07, 0x0, 0x00, &[0x06, 0x00, 0x08, 0x00], 0),
                &rx_record(0x0c, 0x0, 0x00, &[0x1d], 0),
                &rx_record(0x07, 0x0, 0x00, &[0x06, 0x00, 0x08], 0),
            ],
        );
        let kinds: Vec<_> = PollingLoopTranscoder::new(HwVersion::St54l)
            .decode(ST54L, &frame)
            .map(|tlv| tlv.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ObserverType::TypeB,
                ObserverType::TypeB,
                ObserverType::TypeB,
                ObserverType::Unknown,
            ]
        );
    }

    #[test]
    fn record_length_must_fit_in_a_byte() {
        let mut tlv = ObserverTlv {
            kind: ObserverType::Unknown,
            flags: 0,
            timestamp: 0x0102_0304,
            gain: 0x0,
            value: vec![0xab; 250],
        };
        let mut buf: Vec<u8> = vec![];
        assert_eq!(tlv.encode(&mut buf), Ok(()));
        assert_eq!(buf.len(), tlv.encoded_len());
        assert_eq!(buf[2], 0xff);
        assert_eq!(&buf[3..7], &[0x01, 0x02, 0x03, 0x04]);

        tlv.value.push(0xab);
        let mut buf: Vec<u8> = vec![];
        assert_eq!(tlv.encode(&mut buf), Err(EncodeError::RecordTooLong(256)));
        assert!(buf.is_empty());
    }

    #[test]
    fn technologies() {
        let frame = notification(
            ST54L,
            &[
                &rx_record(0x03, 0x1, 0x00, &[0x52], 10),
                &rx_record(0x07, 0x2, 0x00, &[0x05, 0x00, 0x08], 20),
                &rx_record(0x07, 0x2, 0x00, &[0x06, 0x00, 0x08], 30),
                &rx_record(0x08, 0x3, 0x00, &[0x06, 0x00, 0xff, 0xff, 0x01, 0x00], 40),
                &rx_record(0x0a, 0x4, 0x00, &[0x26, 0x01, 0x00], 50),
                &rx_record(0x0e, 0x5, 0x00, &[0x01], 60),
            ],
        );
        let kinds: Vec<_> = PollingLoopTranscoder::new(HwVersion::St54l)
            .decode(ST54L, &frame)
            .map(|tlv| (tlv.kind, tlv.gain))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ObserverType::TypeA, 0x1),
                (ObserverType::TypeB, 0x2),
                (ObserverType::Unknown, 0x2),
                (ObserverType::TypeF, 0x3),
                (ObserverType::TypeV, 0x4),
                (ObserverType::Unknown, 0x5),
            ]
        );
    }

    #[test]
    fn st54j_short_frame_workaround() {
        // RX record without frame byte, flagged with the incorrect real size.
        let payload = [0x01, 0x00, 0x00, 0x00, 0x0f, 0x00];
        let frame = notification(ST54J, &[&record(T_CE_RX, &payload, 0x2600_0000)]);

        let st54j: Vec<_> =
            PollingLoopTranscoder::new(HwVersion::St54j).decode(ST54J, &frame).collect();
        assert_eq!(st54j.len(), 1);
        assert_eq!(st54j[0].value, vec![0x26]);
        assert_eq!(st54j[0].kind, ObserverType::TypeA);

        let st54l: Vec<_> =
            PollingLoopTranscoder::new(HwVersion::St54l).decode(ST54J, &frame).collect();
        assert_eq!(st54l.len(), 1);
        assert!(st54l[0].value.is_empty());
        assert_eq!(st54l[0].kind, ObserverType::Unknown);
    }

    #[test]
    fn unknown_tags_are_dropped() {
        let frame = notification(
            ST54L,
            &[&record(0x42, &[0x01, 0x02], 0), &record(T_FIELD_ON, &[], 0), &record(0x20, &[], 0)],
        );
        let output = transcode(HwVersion::St54l, &frame);
        assert_eq!(output.len(), 13);
        assert_eq!(output[2], 10);

        let frame = notification(ST54L, &[&record(0x42, &[0x01, 0x02], 0)]);
        assert!(transcode(HwVersion::St54l, &frame).is_empty());
    }

    #[test]
    fn truncated_record_ends_scan() {
        let mut frame = notification(
            ST54L,
            &[&record(T_FIELD_ON, &[], 0), &record(T_FIELD_OFF, &[], 0)],
        );
        frame.truncate(frame.len() - 1);
        let output = transcode(HwVersion::St54l, &frame);
        assert_eq!(output.len(), 13);
        assert_eq!(output[12], 0x01);
    }

    #[test]
    fn cumulative_length() {
        let frame = notification(
            ST54L,
            &[&record(T_FIELD_ON, &[], 0), &rx_record(0x02, 0x0, 0x00, &[0x26, 0x00], 0)],
        );
        let output = transcode(HwVersion::St54l, &frame);
        assert_eq!(output.len(), 4 + 9 + 10);
        assert_eq!(output[2] as usize, output.len() - 3);
    }

    #[test]
    fn oversized_notification_is_dropped() {
        let field_on = record(T_FIELD_ON, &[], 0);
        let records: Vec<&[u8]> = (0..30).map(|_| field_on.as_slice()).collect();
        let frame = notification(ST54L, &records);

        let transcoder = PollingLoopTranscoder::new(HwVersion::St54l);
        let mut output = [0x55u8; 258];
        assert_eq!(transcoder.transcode(ST54L, &frame, &mut output, 258), 0);
        assert!(output.iter().all(|b| *b == 0x55));

        // The payload length cannot be represented even with a larger buffer.
        let mut output = [0x55u8; 1024];
        assert_eq!(transcoder.transcode(ST54L, &frame, &mut output, 1024), 0);
        assert!(output.iter().all(|b| *b == 0x55));

        // Limit below the ceiling.
        let frame = notification(ST54L, &[&field_on, &field_on]);
        assert_eq!(transcoder.transcode(ST54L, &frame, &mut output, 21), 0);
        assert_eq!(transcoder.transcode(ST54L, &frame, &mut output, 22), 22);
    }

    #[test]
    fn timestamp_units() {
        assert_eq!(convert_timestamp(ST54L, 0), 0);
        assert_eq!(convert_timestamp(ST54L, 259), 1024);
        assert_eq!(convert_timestamp(ST54L, 1), 4);
        assert_eq!(convert_timestamp(0x00, 28), 128);
        assert_eq!(convert_timestamp(0x00, 1), 5);
        assert_eq!(convert_timestamp(0x20, 7), 32);
        assert_eq!(convert_timestamp(ST54L, u32::MAX), u32::MAX);
    }

    #[test]
    fn timestamp_conversion_is_monotonic() {
        for format in [0x00, ST54L] {
            let samples = (0..10_000u32)
                .chain((0..32).map(|shift| 1u32 << shift))
                .chain([u32::MAX / 5, u32::MAX / 4, u32::MAX - 1, u32::MAX]);
            let mut samples: Vec<u32> = samples.collect();
            samples.sort_unstable();
            for pair in samples.windows(2) {
                assert!(convert_timestamp(format, pair[0]) <= convert_timestamp(format, pair[1]));
            }
        }
    }
}

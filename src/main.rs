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

//! Polling loop notification decoder.
//!
//! Converts a firmware log notification captured from an ST21NFC controller
//! into the polling frame notification forwarded to the NFC stack.

use anyhow::{anyhow, Context, Result};
use argh::FromArgs;
use log::info;
use st21nfc_hal::packets::nci;
use st21nfc_hal::{HwVersion, PollingLoopTranscoder};

#[derive(FromArgs, Debug)]
/// Polling loop notification decoder.
struct Opt {
    #[argh(option, default = "HwVersion::St54l")]
    /// controller hardware version (st21nfcd, st54j, st54l).
    hw: HwVersion,
    #[argh(option, default = "nci::MAX_PACKET_SIZE")]
    /// maximum size of the converted notification.
    max: usize,
    #[argh(option, from_str_fn(parse_byte))]
    /// override the format byte read from the notification.
    format: Option<u8>,
    #[argh(positional)]
    /// notification bytes in hexadecimal.
    notification: Vec<String>,
}

/// Parse hexadecimal bytes, ignoring whitespace and ':' separators.
fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    hex::decode(digits).context("invalid notification bytes")
}

/// Parse a byte given in decimal or, with a `0x` prefix, in hexadecimal.
fn parse_byte(value: &str) -> Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(digits) => u8::from_str_radix(digits, 16),
        None => value.parse(),
    };
    parsed.map_err(|err| format!("invalid byte '{}': {}", value, err))
}

fn run() -> Result<()> {
    let opt: Opt = argh::from_env();
    let packet = parse_hex(&opt.notification.join(""))?;
    let format = match opt.format {
        Some(format) => format,
        None => *packet.get(3).ok_or(anyhow!("notification too short"))?,
    };
    info!("decoding {} bytes for {} with format {:#04x}", packet.len(), opt.hw, format);

    let transcoder = PollingLoopTranscoder::new(opt.hw);
    for tlv in transcoder.decode(format, &packet) {
        println!(
            "{:?} flags={:#04x} timestamp={}us gain={:#04x} value={:02x?}",
            tlv.kind, tlv.flags, tlv.timestamp, tlv.gain, tlv.value
        );
    }

    let mut output = vec![0; opt.max];
    match transcoder.transcode(format, &packet, &mut output, opt.max) {
        0 => println!("nothing to forward"),
        len => println!("{:02x?}", &output[..len]),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    run()
}

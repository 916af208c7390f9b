//! MCP3004 SPI frame codec, kept separate from the driver so the bit
//! layout is testable without hardware.
//!
//! Frame: start bit, single-ended bit, 3-bit channel, then the converter
//! clocks out a null bit and 10 data bits MSB first.

use divert_traits::Channel;

fn channel_index(channel: Channel) -> u8 {
    match channel {
        Channel::Voltage => 0,
        Channel::GridCurrent => 1,
        Channel::DivertCurrent => 2,
    }
}

/// Three-byte request frame for a single-ended conversion.
pub fn request(channel: Channel) -> [u8; 3] {
    [0x01, 0x80 | (channel_index(channel) << 4), 0x00]
}

/// Extract the 10-bit result from the response frame.
pub fn decode(rx: &[u8; 3]) -> i32 {
    (i32::from(rx[1] & 0x03) << 8) | i32::from(rx[2])
}

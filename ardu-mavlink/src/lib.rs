pub mod decoder;
pub mod frame;
pub mod message;

pub use decoder::{ChecksumPolicy, Clock, DecoderStats, FrameDecoder};
pub use frame::{FrameError, FrameHeader, encode_frame};
pub use message::{Attitude, BaseMode, Envelope, GpsRawInt, Heartbeat, Message, Payload};

/// Start-of-frame marker of a MAVLink v2 frame.
pub const MAGIC: u8 = 0xFD;
pub const HEADER_LEN: usize = 10;
pub const CHECKSUM_LEN: usize = 2;
pub const MAX_FRAME_LEN: usize = HEADER_LEN + u8::MAX as usize + CHECKSUM_LEN;

const CRC_INIT: u16 = 0xFFFF;

fn crc_accumulate(crc: u16, byte: u8) -> u16 {
    let mut tmp = byte ^ (crc & 0xff) as u8;
    tmp ^= tmp << 4;
    let tmp = tmp as u16;
    (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4)
}

/// CRC-16/MCRF4XX (X.25) over `bytes`, finished with the message's CRC_EXTRA seed if one is given.
pub fn checksum(bytes: &[u8], crc_extra: Option<u8>) -> u16 {
    let crc = bytes.iter().fold(CRC_INIT, |acc, b| crc_accumulate(acc, *b));
    match crc_extra {
        Some(extra) => crc_accumulate(crc, extra),
        None => crc,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageId {
    Heartbeat = 0,
    GpsRawInt = 24,
    Attitude = 30,
}

impl MessageId {
    pub fn from_u16(id: u16) -> Option<Self> {
        Some(match id {
            0 => Self::Heartbeat,
            24 => Self::GpsRawInt,
            30 => Self::Attitude,
            _ => return None,
        })
    }

    /// Seed folded into the checksum so that sender and receiver agree on the message layout.
    pub fn crc_extra(self) -> u8 {
        match self {
            Self::Heartbeat => 50,
            Self::GpsRawInt => 24,
            Self::Attitude => 39,
        }
    }
}

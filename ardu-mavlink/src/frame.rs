use thiserror::Error;

use crate::{CHECKSUM_LEN, HEADER_LEN, MAGIC, MessageId, checksum};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Not enough bytes given. A frame header has 10 bytes.")]
    NotEnoughBytes,
    #[error("The given bytes do not start with the magic byte 0xfd.")]
    NoMagic,
    #[error("expected 2 checksum bytes, got {got}")]
    ChecksumLength { got: usize },
    #[error("checksum failed, got: 0x{got:04x}, expected: 0x{expected:04x}")]
    ChecksumMismatch { got: u16, expected: u16 },
    #[error("payload of {len} bytes does not fit in a frame")]
    PayloadTooLong { len: usize },
}

/**
 * Frame format (MAVLink v2):
 *
 * - 0xFD magic
 * - payload length
 * - incompatibility flags
 * - compatibility flags
 * - sequence number
 * - system id
 * - component id
 * - message id, 2 bytes little endian (a third id byte follows; it is written as 0 and ignored)
 * - N bytes of payload
 * - checksum, 2 bytes little endian
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_length: u8,
    pub incompatibility_flags: u8,
    pub compatibility_flags: u8,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub message_id: u16,
}

impl FrameHeader {
    /// Parse the fixed-size header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::NotEnoughBytes);
        }
        if bytes[0] != MAGIC {
            return Err(FrameError::NoMagic);
        }
        Ok(Self {
            payload_length: bytes[1],
            incompatibility_flags: bytes[2],
            compatibility_flags: bytes[3],
            sequence: bytes[4],
            system_id: bytes[5],
            component_id: bytes[6],
            message_id: u16::from_le_bytes([bytes[7], bytes[8]]),
        })
    }

    /// Length of the whole frame this header announces, checksum included.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.payload_length as usize + CHECKSUM_LEN
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(MAGIC);
        out.push(self.payload_length);
        out.push(self.incompatibility_flags);
        out.push(self.compatibility_flags);
        out.push(self.sequence);
        out.push(self.system_id);
        out.push(self.component_id);
        out.extend(self.message_id.to_le_bytes());
        out.push(0);
    }
}

fn frame_checksum(header: &FrameHeader, frame: &[u8], crc_extra: Option<u8>) -> u16 {
    checksum(&frame[1..HEADER_LEN + header.payload_length as usize], crc_extra)
}

/// Compute the checksum a sender would put at the end of `frame`, or `None`
/// when the message id has no known CRC_EXTRA seed.
/// `frame` must hold at least the header and the announced payload.
pub(crate) fn expected_checksum(header: &FrameHeader, frame: &[u8]) -> Option<u16> {
    let id = MessageId::from_u16(header.message_id)?;
    Some(frame_checksum(header, frame, Some(id.crc_extra())))
}

/// Build a wire frame. The payload length in `header` is replaced by the actual length of `payload`.
pub fn encode_frame(header: &FrameHeader, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let payload_length =
        u8::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLong { len: payload.len() })?;
    let header = FrameHeader {
        payload_length,
        ..*header
    };
    let mut out = Vec::with_capacity(header.frame_len());
    header.write_to(&mut out);
    out.extend_from_slice(payload);
    // without a known seed the checksum covers header and payload only
    let crc = expected_checksum(&header, &out).unwrap_or_else(|| frame_checksum(&header, &out, None));
    out.extend(crc.to_le_bytes());
    Ok(out)
}

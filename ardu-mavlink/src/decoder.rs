use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;

use crate::{
    CHECKSUM_LEN, HEADER_LEN, MAGIC,
    frame::{FrameError, FrameHeader, expected_checksum},
    message::Message,
};

/// Source of message timestamps, in milliseconds since the Unix epoch.
pub type Clock = fn() -> u64;

/// Default [`Clock`]. `SystemTime` is unavailable on `wasm32-unknown-unknown`,
/// so browser builds have to install their own clock.
pub fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// How hard the decoder looks at the two trailing checksum bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChecksumPolicy {
    /// Only require that the two bytes are there.
    #[default]
    LengthOnly,
    /// Verify the CRC for message ids we know the CRC_EXTRA of. Other ids pass.
    Crc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub processed_messages: usize,
    pub buffer_len: usize,
}

/// Turns an arbitrarily chunked byte stream into [`Message`]s.
///
/// Bytes that cannot start a frame are dropped. A frame failing the checksum
/// check costs one byte, after which the decoder looks for the next magic byte.
pub struct FrameDecoder {
    buf: Vec<u8>,
    processed: usize,
    policy: ChecksumPolicy,
    clock: Clock,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            processed: 0,
            policy: ChecksumPolicy::default(),
            clock: system_clock,
        }
    }

    pub fn with_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Append `chunk` and return every message completed by it, in wire order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Message> {
        self.extend(chunk);
        let mut messages = Vec::new();
        while let Some(msg) = self.next_message() {
            messages.push(msg);
        }
        messages
    }

    /// Append `chunk` without decoding anything yet.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pull the next complete message out of the buffer, if there is one.
    pub fn next_message(&mut self) -> Option<Message> {
        loop {
            let Some(start) = self.buf.iter().position(|b| *b == MAGIC) else {
                self.buf.clear();
                return None;
            };
            self.buf.drain(..start);

            // only fails while the header is incomplete
            let Ok(header) = FrameHeader::parse(&self.buf) else {
                return None;
            };
            let frame_len = header.frame_len();
            if self.buf.len() < frame_len {
                return None;
            }

            if let Err(err) = self.check(&header, &self.buf[..frame_len]) {
                warn!("dropping frame (msg id {}): {err}", header.message_id);
                self.buf.drain(..1);
                continue;
            }

            let payload_end = HEADER_LEN + header.payload_length as usize;
            let raw_payload = self.buf[HEADER_LEN..payload_end].to_vec();
            let checksum = u16::from_le_bytes([self.buf[payload_end], self.buf[payload_end + 1]]);
            self.buf.drain(..frame_len);
            self.processed += 1;
            return Some(Message::new(header, raw_payload, checksum, (self.clock)()));
        }
    }

    fn check(&self, header: &FrameHeader, frame: &[u8]) -> Result<(), FrameError> {
        let trailer = &frame[HEADER_LEN + header.payload_length as usize..];
        if trailer.len() != CHECKSUM_LEN {
            return Err(FrameError::ChecksumLength { got: trailer.len() });
        }
        if self.policy == ChecksumPolicy::Crc
            && let Some(expected) = expected_checksum(header, frame)
        {
            let got = u16::from_le_bytes([trailer[0], trailer[1]]);
            if got != expected {
                return Err(FrameError::ChecksumMismatch { got, expected });
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.processed = 0;
    }

    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            processed_messages: self.processed,
            buffer_len: self.buf.len(),
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        MAX_FRAME_LEN, checksum,
        frame::encode_frame,
        message::{Attitude, Heartbeat, Payload},
    };

    fn fixed_clock() -> u64 {
        1_000
    }

    fn decoder() -> FrameDecoder {
        FrameDecoder::new().with_clock(fixed_clock)
    }

    fn heartbeat_frame(seq: u8) -> Vec<u8> {
        let header = FrameHeader {
            sequence: seq,
            system_id: 1,
            component_id: 1,
            message_id: 0,
            ..Default::default()
        };
        let hb = Heartbeat {
            system_type: 2,
            autopilot: 3,
            custom_mode: 4,
            system_status: 5,
            mavlink_version: 3,
            ..Default::default()
        };
        encode_frame(&header, &hb.to_payload()).unwrap()
    }

    fn mixed_stream() -> Vec<u8> {
        let mut stream = vec![0x00, 0x13, 0x37];
        stream.extend(heartbeat_frame(0));
        stream.extend([0xaa, 0xbb]);
        let attitude = Attitude {
            time_boot_ms: 42,
            roll: 0.5,
            ..Default::default()
        };
        let header = FrameHeader {
            sequence: 1,
            system_id: 1,
            component_id: 1,
            message_id: 30,
            ..Default::default()
        };
        stream.extend(encode_frame(&header, &attitude.to_payload()).unwrap());
        let header = FrameHeader {
            sequence: 2,
            message_id: 300,
            ..Default::default()
        };
        stream.extend(encode_frame(&header, &[9, 8, 7]).unwrap());
        stream.extend(heartbeat_frame(3));
        stream
    }

    #[test]
    fn noise_only() {
        let mut decoder = decoder();
        let noise = [0x00, 0x01, 0x02, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70];
        assert!(decoder.feed(&noise).is_empty());
        assert_eq!(decoder.stats().buffer_len, 0);
        assert_eq!(decoder.stats().processed_messages, 0);
    }

    #[test]
    fn heartbeat_split_mid_header() {
        let mut decoder = decoder();
        // magic, len, incompat, compat, seq, sysid, compid, msgid(3), payload(9), checksum(2)
        let frame = [
            0xfd, 9, 0, 0, 42, 1, 1, 0, 0, 0, 6, 8, 0xc0, 4, 0, 0, 0, 3, 3, 0x12, 0x34,
        ];
        assert!(decoder.feed(&frame[..5]).is_empty());
        let messages = decoder.feed(&frame[5..]);
        assert_eq!(messages.len(), 1);

        let msg = &messages[0];
        assert_eq!(msg.envelope.message_id, 0);
        assert_eq!(msg.envelope.sequence, 42);
        assert_eq!(msg.envelope.system_id, 1);
        assert_eq!(msg.envelope.component_id, 1);
        assert_eq!(msg.envelope.timestamp, 1_000);
        assert_eq!(msg.envelope.raw_payload, &frame[10..19]);
        assert_eq!(msg.envelope.checksum, 0x3412);
        let Payload::Heartbeat(hb) = &msg.payload else {
            panic!("expected a heartbeat, got {:?}", msg.payload);
        };
        assert_eq!(hb.system_type, 6);
        assert_eq!(hb.autopilot, 8);
        assert_eq!(hb.base_mode.0, 0xc0);
        assert_eq!(hb.custom_mode, 4);
        assert_eq!(hb.system_status, 3);
        assert_eq!(decoder.stats().buffer_len, 0);
    }

    #[test]
    fn two_frames_in_one_chunk() {
        let mut decoder = decoder();
        let mut bytes = heartbeat_frame(7);
        bytes.extend(heartbeat_frame(8));
        let messages = decoder.feed(&bytes);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].envelope.sequence, 7);
        assert_eq!(messages[1].envelope.sequence, 8);
        assert_eq!(decoder.stats().processed_messages, 2);
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let stream = mixed_stream();
        let whole = decoder().feed(&stream);
        assert_eq!(whole.len(), 4);
        let names: Vec<_> = whole.iter().map(Message::name).collect();
        assert_eq!(names, ["HEARTBEAT", "ATTITUDE", "UNKNOWN", "HEARTBEAT"]);

        let mut decoder = decoder();
        let bytewise: Vec<_> = stream.iter().flat_map(|b| decoder.feed(&[*b])).collect();
        assert_eq!(bytewise, whole);

        for chunk_size in [2, 3, 7, 11, 20] {
            let mut decoder = self::decoder();
            let chunked: Vec<_> = stream.chunks(chunk_size).flat_map(|c| decoder.feed(c)).collect();
            assert_eq!(chunked, whole, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn unknown_message_keeps_payload() {
        let header = FrameHeader {
            message_id: 300,
            ..Default::default()
        };
        let frame = encode_frame(&header, &[9, 8, 7]).unwrap();
        let messages = decoder().feed(&frame);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, Payload::Unknown);
        assert_eq!(messages[0].envelope.message_id, 300);
        assert_eq!(messages[0].envelope.raw_payload, [9, 8, 7]);
    }

    #[test]
    fn heartbeat_round_trip() {
        let frame = heartbeat_frame(200);
        let messages = decoder().feed(&frame);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to_frame().unwrap(), frame);
    }

    #[test]
    fn hand_built_frame_round_trip() {
        let mut frame = vec![
            0xfd, 9, 0, 0, 42, 1, 1, 0, 0, 0, 6, 8, 0xc0, 4, 0, 0, 0, 3, 3,
        ];
        let crc = checksum(&frame[1..], Some(50));
        frame.extend(crc.to_le_bytes());

        let mut decoder = decoder().with_policy(ChecksumPolicy::Crc);
        let messages = decoder.feed(&frame);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].name(), "HEARTBEAT");
        assert_eq!(messages[0].to_frame().unwrap(), frame);
    }

    #[test]
    fn incomplete_frame_waits() {
        let mut decoder = decoder();
        let frame = heartbeat_frame(1);
        assert!(decoder.feed(&frame[..frame.len() - 1]).is_empty());
        assert_eq!(decoder.stats().buffer_len, frame.len() - 1);
        assert_eq!(decoder.feed(&frame[frame.len() - 1..]).len(), 1);
    }

    #[test]
    fn garbage_before_magic_is_dropped() {
        let mut decoder = decoder();
        let mut bytes = vec![1, 2, 3, 4];
        bytes.extend(&heartbeat_frame(1)[..6]);
        assert!(decoder.feed(&bytes).is_empty());
        assert_eq!(decoder.stats().buffer_len, 6);
    }

    #[test]
    fn buffer_stays_bounded() {
        let mut decoder = decoder();
        let header = FrameHeader {
            message_id: 1000,
            ..Default::default()
        };
        let frame = encode_frame(&header, &[0x55; 255]).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_LEN);
        let stream: Vec<u8> = frame.iter().copied().cycle().take(MAX_FRAME_LEN * 5 + 100).collect();
        let mut total = 0;
        for chunk in stream.chunks(97) {
            total += decoder.feed(chunk).len();
            assert!(decoder.stats().buffer_len <= MAX_FRAME_LEN);
        }
        assert_eq!(total, 5);
    }

    #[test]
    fn clear_resets_stats() {
        let mut decoder = decoder();
        let mut bytes = heartbeat_frame(1);
        bytes.extend(&heartbeat_frame(2)[..4]);
        assert_eq!(decoder.feed(&bytes).len(), 1);
        assert_eq!(
            decoder.stats(),
            DecoderStats {
                processed_messages: 1,
                buffer_len: 4
            }
        );
        decoder.clear();
        assert_eq!(decoder.stats(), DecoderStats::default());
    }

    #[test]
    fn lenient_policy_ignores_crc() {
        let mut frame = heartbeat_frame(1);
        let len = frame.len();
        frame[len - 1] ^= 0xff;
        assert_eq!(decoder().feed(&frame).len(), 1);
    }

    #[test]
    fn crc_policy_resyncs_after_corruption() {
        let mut decoder = decoder().with_policy(ChecksumPolicy::Crc);
        let mut corrupted = heartbeat_frame(1);
        corrupted[12] ^= 0x01;
        let mut bytes = corrupted;
        bytes.extend(heartbeat_frame(2));
        let messages = decoder.feed(&bytes);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].envelope.sequence, 2);
        assert_eq!(decoder.stats().processed_messages, 1);
        assert_eq!(decoder.stats().buffer_len, 0);
    }

    #[test]
    fn crc_policy_accepts_unknown_ids() {
        // SYS_STATUS is sent with its own seed (124), which the decoder doesn't know
        let header = FrameHeader {
            sequence: 9,
            message_id: 1,
            ..Default::default()
        };
        let mut frame = encode_frame(&header, &[1, 2, 3]).unwrap();
        let crc = checksum(&frame[1..13], Some(124));
        frame[13..].copy_from_slice(&crc.to_le_bytes());

        assert_eq!(decoder().feed(&frame).len(), 1);

        let mut decoder = decoder().with_policy(ChecksumPolicy::Crc);
        let messages = decoder.feed(&frame);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, Payload::Unknown);
        assert_eq!(messages[0].envelope.sequence, 9);
        assert_eq!(messages[0].envelope.checksum, crc);
        assert_eq!(decoder.stats().processed_messages, 1);
        assert_eq!(decoder.stats().buffer_len, 0);
    }

    #[test]
    fn crc_policy_rejects_wrong_seed_for_known_id() {
        let mut frame = heartbeat_frame(1);
        let crc = checksum(&frame[1..19], None);
        frame[19..].copy_from_slice(&crc.to_le_bytes());
        let mut decoder = decoder().with_policy(ChecksumPolicy::Crc);
        assert!(decoder.feed(&frame).is_empty());
        assert_eq!(decoder.stats().processed_messages, 0);
    }
}

use crate::{
    MessageId,
    frame::{FrameError, FrameHeader, encode_frame},
};

/// Header-derived fields every decoded message carries, whatever its type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: u16,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub incompatibility_flags: u8,
    pub compatibility_flags: u8,
    /// Milliseconds since the Unix epoch at which the frame was decoded.
    pub timestamp: u64,
    /// Payload bytes exactly as received (possibly truncated by the sender).
    pub raw_payload: Vec<u8>,
    pub checksum: u16,
}

impl Envelope {
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            payload_length: self.raw_payload.len() as u8,
            incompatibility_flags: self.incompatibility_flags,
            compatibility_flags: self.compatibility_flags,
            sequence: self.sequence,
            system_id: self.system_id,
            component_id: self.component_id,
            message_id: self.message_id,
        }
    }
}

/// `base_mode` bitfield of a heartbeat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BaseMode(pub u8);

impl BaseMode {
    pub const CUSTOM_MODE_ENABLED: u8 = 0x01;
    pub const TEST_ENABLED: u8 = 0x02;
    pub const AUTO_ENABLED: u8 = 0x04;
    pub const GUIDED_ENABLED: u8 = 0x08;
    pub const STABILIZE_ENABLED: u8 = 0x10;
    pub const HIL_ENABLED: u8 = 0x20;
    pub const MANUAL_INPUT_ENABLED: u8 = 0x40;
    pub const SAFETY_ARMED: u8 = 0x80;

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn is_armed(self) -> bool {
        self.contains(Self::SAFETY_ARMED)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Heartbeat {
    pub system_type: u8,
    pub autopilot: u8,
    pub base_mode: BaseMode,
    pub custom_mode: u32,
    pub system_status: u8,
    pub mavlink_version: u8,
}

impl Heartbeat {
    fn decode(p: &[u8; 9]) -> Self {
        Self {
            system_type: p[0],
            autopilot: p[1],
            base_mode: BaseMode(p[2]),
            custom_mode: u32::from_le_bytes([p[3], p[4], p[5], p[6]]),
            system_status: p[7],
            mavlink_version: p[8],
        }
    }

    pub fn to_payload(&self) -> [u8; 9] {
        let mode = self.custom_mode.to_le_bytes();
        [
            self.system_type,
            self.autopilot,
            self.base_mode.0,
            mode[0],
            mode[1],
            mode[2],
            mode[3],
            self.system_status,
            self.mavlink_version,
        ]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpsRawInt {
    pub time_usec: u64,
    pub fix_type: u8,
    /// Latitude in degrees * 1e7.
    pub lat: i32,
    /// Longitude in degrees * 1e7.
    pub lon: i32,
    /// Altitude in millimeters.
    pub alt: i32,
    pub eph: u16,
    pub epv: u16,
    pub vel: u16,
    pub cog: u16,
    pub satellites_visible: u8,
}

impl GpsRawInt {
    fn decode(p: &[u8; 30]) -> Self {
        Self {
            time_usec: u64::from_le_bytes([p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7]]),
            fix_type: p[8],
            lat: i32::from_le_bytes([p[9], p[10], p[11], p[12]]),
            lon: i32::from_le_bytes([p[13], p[14], p[15], p[16]]),
            alt: i32::from_le_bytes([p[17], p[18], p[19], p[20]]),
            eph: u16::from_le_bytes([p[21], p[22]]),
            epv: u16::from_le_bytes([p[23], p[24]]),
            vel: u16::from_le_bytes([p[25], p[26]]),
            cog: u16::from_le_bytes([p[27], p[28]]),
            satellites_visible: p[29],
        }
    }

    pub fn to_payload(&self) -> [u8; 30] {
        let mut p = [0; 30];
        p[0..8].copy_from_slice(&self.time_usec.to_le_bytes());
        p[8] = self.fix_type;
        p[9..13].copy_from_slice(&self.lat.to_le_bytes());
        p[13..17].copy_from_slice(&self.lon.to_le_bytes());
        p[17..21].copy_from_slice(&self.alt.to_le_bytes());
        p[21..23].copy_from_slice(&self.eph.to_le_bytes());
        p[23..25].copy_from_slice(&self.epv.to_le_bytes());
        p[25..27].copy_from_slice(&self.vel.to_le_bytes());
        p[27..29].copy_from_slice(&self.cog.to_le_bytes());
        p[29] = self.satellites_visible;
        p
    }

    pub fn latitude_deg(&self) -> f64 {
        self.lat as f64 / 1e7
    }

    pub fn longitude_deg(&self) -> f64 {
        self.lon as f64 / 1e7
    }

    pub fn altitude_m(&self) -> f64 {
        self.alt as f64 / 1000.0
    }
}

/// Angles in radians, rates in radians per second.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Attitude {
    pub time_boot_ms: u32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub rollspeed: f32,
    pub pitchspeed: f32,
    pub yawspeed: f32,
}

impl Attitude {
    fn decode(p: &[u8; 28]) -> Self {
        let f = |at: usize| f32::from_le_bytes([p[at], p[at + 1], p[at + 2], p[at + 3]]);
        Self {
            time_boot_ms: u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
            roll: f(4),
            pitch: f(8),
            yaw: f(12),
            rollspeed: f(16),
            pitchspeed: f(20),
            yawspeed: f(24),
        }
    }

    pub fn to_payload(&self) -> [u8; 28] {
        let mut p = [0; 28];
        p[0..4].copy_from_slice(&self.time_boot_ms.to_le_bytes());
        let values = [
            self.roll,
            self.pitch,
            self.yaw,
            self.rollspeed,
            self.pitchspeed,
            self.yawspeed,
        ];
        for (idx, value) in values.iter().enumerate() {
            let at = 4 + idx * 4;
            p[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        p
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Heartbeat(Heartbeat),
    GpsRawInt(GpsRawInt),
    Attitude(Attitude),
    /// A message id we have no decoder for; the bytes stay in [`Envelope::raw_payload`].
    Unknown,
}

/// Copy `payload` into a fixed-size buffer, zero-filling what the sender truncated.
fn padded<const N: usize>(payload: &[u8]) -> [u8; N] {
    let mut out = [0; N];
    let n = payload.len().min(N);
    out[..n].copy_from_slice(&payload[..n]);
    out
}

impl Payload {
    pub fn decode(message_id: u16, payload: &[u8]) -> Self {
        match MessageId::from_u16(message_id) {
            Some(MessageId::Heartbeat) => Self::Heartbeat(Heartbeat::decode(&padded(payload))),
            Some(MessageId::GpsRawInt) => Self::GpsRawInt(GpsRawInt::decode(&padded(payload))),
            Some(MessageId::Attitude) => Self::Attitude(Attitude::decode(&padded(payload))),
            None => {
                log::debug!("unknown message id: {message_id}");
                Self::Unknown
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Heartbeat(_) => "HEARTBEAT",
            Self::GpsRawInt(_) => "GPS_RAW_INT",
            Self::Attitude(_) => "ATTITUDE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub envelope: Envelope,
    pub payload: Payload,
}

impl Message {
    pub(crate) fn new(header: FrameHeader, raw_payload: Vec<u8>, checksum: u16, timestamp: u64) -> Self {
        let payload = Payload::decode(header.message_id, &raw_payload);
        Self {
            envelope: Envelope {
                message_id: header.message_id,
                sequence: header.sequence,
                system_id: header.system_id,
                component_id: header.component_id,
                incompatibility_flags: header.incompatibility_flags,
                compatibility_flags: header.compatibility_flags,
                timestamp,
                raw_payload,
                checksum,
            },
            payload,
        }
    }

    pub fn name(&self) -> &'static str {
        self.payload.name()
    }

    /// Encode the message again, from its envelope and raw payload.
    pub fn to_frame(&self) -> Result<Vec<u8>, FrameError> {
        encode_frame(&self.envelope.header(), &self.envelope.raw_payload)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn heartbeat_fields() {
        let payload = [2, 3, 0x81, 0x04, 0x03, 0x02, 0x01, 4, 3];
        let Payload::Heartbeat(hb) = Payload::decode(0, &payload) else {
            panic!("expected a heartbeat");
        };
        assert_eq!(hb.system_type, 2);
        assert_eq!(hb.autopilot, 3);
        assert!(hb.base_mode.is_armed());
        assert!(hb.base_mode.contains(BaseMode::CUSTOM_MODE_ENABLED));
        assert!(!hb.base_mode.contains(BaseMode::GUIDED_ENABLED));
        assert_eq!(hb.custom_mode, 0x01020304);
        assert_eq!(hb.system_status, 4);
        assert_eq!(hb.mavlink_version, 3);
        assert_eq!(hb.to_payload(), payload);
    }

    #[test]
    fn gps_raw_int_fields() {
        let gps = GpsRawInt {
            time_usec: 1_700_000_000_000_000,
            fix_type: 3,
            lat: 473_977_420,
            lon: -85_455_940,
            alt: 488_000,
            eph: 121,
            epv: 200,
            vel: 35,
            cog: 18_000,
            satellites_visible: 11,
        };
        let payload = gps.to_payload();
        assert_eq!(payload[8], 3);
        assert_eq!(payload[29], 11);
        assert_eq!(Payload::decode(24, &payload), Payload::GpsRawInt(gps));
        assert!((gps.latitude_deg() - 47.397742).abs() < 1e-9);
        assert!((gps.longitude_deg() + 8.545594).abs() < 1e-9);
        assert!((gps.altitude_m() - 488.0).abs() < 1e-9);
    }

    #[test]
    fn attitude_fields() {
        let attitude = Attitude {
            time_boot_ms: 123_456,
            roll: 0.1,
            pitch: -0.2,
            yaw: 3.0,
            rollspeed: 0.01,
            pitchspeed: 0.02,
            yawspeed: -0.03,
        };
        let payload = attitude.to_payload();
        assert_eq!(&payload[4..8], &0.1f32.to_le_bytes());
        assert_eq!(Payload::decode(30, &payload), Payload::Attitude(attitude));
    }

    #[test]
    fn truncated_payload_is_zero_filled() {
        // trailing zeroes of heartbeat dropped by the sender
        let Payload::Heartbeat(hb) = Payload::decode(0, &[6, 8]) else {
            panic!("expected a heartbeat");
        };
        assert_eq!(hb.system_type, 6);
        assert_eq!(hb.autopilot, 8);
        assert_eq!(hb.custom_mode, 0);
        assert_eq!(hb.system_status, 0);
    }

    #[test]
    fn unknown_id() {
        let payload = Payload::decode(77, &[1, 2, 3]);
        assert_eq!(payload, Payload::Unknown);
        assert_eq!(payload.name(), "UNKNOWN");
    }
}

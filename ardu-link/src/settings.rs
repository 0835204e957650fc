use ardu_mavlink::{ChecksumPolicy, FrameDecoder};

use crate::{history::MessageHistory, serial_manager::default_decoder};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_MESSAGE_LIMIT: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub baud_rate: u32,
    /// Port to open; `None` lets the backend choose.
    pub port_name: Option<String>,
    pub message_limit: usize,
    pub message_filter: Vec<String>,
    pub checksum: ChecksumPolicy,
    pub show_raw_data: bool,
    /// Open the port as soon as it is selected.
    pub auto_connect: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            port_name: None,
            message_limit: DEFAULT_MESSAGE_LIMIT,
            message_filter: vec![
                "HEARTBEAT".to_string(),
                "GPS_RAW_INT".to_string(),
                "ATTITUDE".to_string(),
            ],
            checksum: ChecksumPolicy::LengthOnly,
            show_raw_data: false,
            auto_connect: false,
        }
    }
}

impl Settings {
    pub fn decoder(&self) -> FrameDecoder {
        default_decoder().with_policy(self.checksum)
    }

    pub fn history(&self) -> MessageHistory {
        MessageHistory::new(self.message_limit).with_filter(self.message_filter.as_slice())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.message_limit, 1000);
        assert_eq!(settings.checksum, ChecksumPolicy::LengthOnly);
        assert!(!settings.auto_connect);
        assert!(!settings.show_raw_data);
        assert_eq!(settings.port_name, None);
        assert_eq!(settings.decoder().stats().processed_messages, 0);
        assert!(settings.history().is_empty());
    }
}

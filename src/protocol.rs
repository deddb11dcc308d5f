//! Tag-byte framing shared by the control and status topics.
//!
//! Every payload starts with a single tag byte; the rest of the payload is
//! the argument. Strings are UTF-8, the sample rate is a little-endian
//! 32-bit unsigned integer, and all other numeric arguments are a single
//! boolean byte. There is no acknowledgment or sequencing at this layer.

use crate::error::RemoteError;
use serde::Serialize;

/// Command tags, first byte of every payload.
pub mod tags {
    /// Ask the logger to re-send its complete state.
    pub const FULL_REPORT: u8 = 0x00;
    /// Current log file name, UTF-8.
    pub const FILENAME: u8 = 0x01;
    /// Logging enabled flag, one boolean byte.
    pub const ENABLED: u8 = 0x02;
    /// Device status bitmask, one byte.
    pub const STATUS: u8 = 0x03;
    /// Sample rate in Hz, little-endian u32.
    pub const SAMPLE_RATE: u8 = 0x04;
    /// SD-card reference held flag, one boolean byte.
    pub const SDCARD_REF: u8 = 0x05;
    /// Status broadcast enabled flag, one boolean byte.
    pub const BROADCAST: u8 = 0x06;
}

/// A decoded control or status payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    FullReport,
    Filename(String),
    Enabled(bool),
    Status(StatusFlags),
    SampleRate(u32),
    SdcardRef(bool),
    Broadcast(bool),
}

impl Frame {
    pub fn tag(&self) -> u8 {
        match self {
            Frame::FullReport => tags::FULL_REPORT,
            Frame::Filename(_) => tags::FILENAME,
            Frame::Enabled(_) => tags::ENABLED,
            Frame::Status(_) => tags::STATUS,
            Frame::SampleRate(_) => tags::SAMPLE_RATE,
            Frame::SdcardRef(_) => tags::SDCARD_REF,
            Frame::Broadcast(_) => tags::BROADCAST,
        }
    }

    /// Serialize into a wire payload, tag byte first.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = vec![self.tag()];
        match self {
            Frame::FullReport => {}
            Frame::Filename(name) => payload.extend_from_slice(name.as_bytes()),
            Frame::Enabled(on) | Frame::SdcardRef(on) | Frame::Broadcast(on) => {
                payload.push(*on as u8)
            }
            Frame::Status(flags) => payload.push(flags.0),
            Frame::SampleRate(hz) => payload.extend_from_slice(&hz.to_le_bytes()),
        }
        payload
    }

    /// Parse a wire payload. The tag byte determines how the remaining
    /// bytes are interpreted; anything that does not fit is rejected.
    pub fn decode(payload: &[u8]) -> Result<Frame, RemoteError> {
        let (&tag, arg) = payload
            .split_first()
            .ok_or_else(|| RemoteError::frame("empty payload"))?;

        match tag {
            tags::FULL_REPORT => {
                if !arg.is_empty() {
                    return Err(RemoteError::frame(format!(
                        "report request carries {} unexpected argument bytes",
                        arg.len()
                    )));
                }
                Ok(Frame::FullReport)
            }
            tags::FILENAME => {
                let name = String::from_utf8(arg.to_vec())
                    .map_err(|_| RemoteError::frame("filename is not valid UTF-8"))?;
                Ok(Frame::Filename(name))
            }
            tags::ENABLED => Ok(Frame::Enabled(bool_arg(arg)?)),
            tags::STATUS => match arg {
                [mask] => Ok(Frame::Status(StatusFlags(*mask))),
                _ => Err(RemoteError::frame(format!(
                    "status bitmask needs 1 argument byte, got {}",
                    arg.len()
                ))),
            },
            tags::SAMPLE_RATE => {
                let bytes: [u8; 4] = arg.try_into().map_err(|_| {
                    RemoteError::frame(format!(
                        "sample rate needs 4 argument bytes, got {}",
                        arg.len()
                    ))
                })?;
                Ok(Frame::SampleRate(u32::from_le_bytes(bytes)))
            }
            tags::SDCARD_REF => Ok(Frame::SdcardRef(bool_arg(arg)?)),
            tags::BROADCAST => Ok(Frame::Broadcast(bool_arg(arg)?)),
            unknown => Err(RemoteError::frame(format!("unknown tag 0x{:02X}", unknown))),
        }
    }
}

fn bool_arg(arg: &[u8]) -> Result<bool, RemoteError> {
    match arg {
        [value] => Ok(*value != 0),
        _ => Err(RemoteError::frame(format!(
            "boolean argument needs 1 byte, got {}",
            arg.len()
        ))),
    }
}

/// Eight independent device condition flags packed into one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusFlags(pub u8);

/// Bit-to-label mapping, lowest bit first.
pub const STATUS_LABELS: [(u8, &str); 8] = [
    (StatusFlags::LOGGING, "logging"),
    (StatusFlags::FILE_OPEN, "file-open"),
    (StatusFlags::SDCARD_MOUNTED, "sdcard-mounted"),
    (StatusFlags::IMU_READY, "imu-ready"),
    (StatusFlags::TIME_SYNCED, "time-synced"),
    (StatusFlags::BUFFER_FULL, "buffer-full"),
    (StatusFlags::LOW_BATTERY, "low-battery"),
    (StatusFlags::FAULT, "fault"),
];

impl StatusFlags {
    pub const LOGGING: u8 = 0x01;
    pub const FILE_OPEN: u8 = 0x02;
    pub const SDCARD_MOUNTED: u8 = 0x04;
    pub const IMU_READY: u8 = 0x08;
    pub const TIME_SYNCED: u8 = 0x10;
    pub const BUFFER_FULL: u8 = 0x20;
    pub const LOW_BATTERY: u8 = 0x40;
    pub const FAULT: u8 = 0x80;

    pub fn contains(&self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    /// Labels of all set flags, lowest bit first.
    pub fn labels(&self) -> Vec<&'static str> {
        STATUS_LABELS
            .iter()
            .filter(|(mask, _)| self.contains(*mask))
            .map(|(_, label)| *label)
            .collect()
    }

    /// Human-readable flag list, or "idle" when nothing is set.
    pub fn describe(&self) -> String {
        let labels = self.labels();
        if labels.is_empty() {
            "idle".to_string()
        } else {
            labels.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_report_request() {
        assert_eq!(Frame::decode(&[0x00]).unwrap(), Frame::FullReport);
    }

    #[test]
    fn test_decode_report_request_rejects_trailing_bytes() {
        assert!(Frame::decode(&[0x00, 0x01]).is_err());
    }

    #[test]
    fn test_decode_filename() {
        // 0x01 followed by UTF-8 string
        let raw = [0x01, b'r', b'u', b'n', b'0', b'7', b'.', b'l', b'o', b'g'];
        assert_eq!(
            Frame::decode(&raw).unwrap(),
            Frame::Filename("run07.log".to_string())
        );
    }

    #[test]
    fn test_decode_filename_rejects_invalid_utf8() {
        assert!(Frame::decode(&[0x01, 0xFF, 0xFE]).is_err());
    }

    #[test]
    fn test_decode_enabled() {
        assert_eq!(Frame::decode(&[0x02, 0x01]).unwrap(), Frame::Enabled(true));
        assert_eq!(Frame::decode(&[0x02, 0x00]).unwrap(), Frame::Enabled(false));
        // any non-zero byte counts as true
        assert_eq!(Frame::decode(&[0x02, 0x7F]).unwrap(), Frame::Enabled(true));
    }

    #[test]
    fn test_decode_boolean_rejects_wrong_length() {
        assert!(Frame::decode(&[0x02]).is_err());
        assert!(Frame::decode(&[0x02, 0x01, 0x01]).is_err());
    }

    #[test]
    fn test_decode_status_bitmask() {
        let frame = Frame::decode(&[0x03, 0x05]).unwrap();
        assert_eq!(frame, Frame::Status(StatusFlags(0x05)));
    }

    #[test]
    fn test_decode_sample_rate_little_endian() {
        // 0x04 followed by 200 Hz as LE u32
        let raw = [0x04, 0xC8, 0x00, 0x00, 0x00];
        assert_eq!(Frame::decode(&raw).unwrap(), Frame::SampleRate(200));
    }

    #[test]
    fn test_decode_sample_rate_rejects_wrong_length() {
        assert!(Frame::decode(&[0x04, 0xC8, 0x00]).is_err());
        assert!(Frame::decode(&[0x04, 0xC8, 0x00, 0x00, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        assert!(Frame::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        assert!(Frame::decode(&[0x07, 0x01]).is_err());
    }

    #[test]
    fn test_encode_report_request_is_bare_tag() {
        assert_eq!(Frame::FullReport.encode(), vec![0x00]);
    }

    #[test]
    fn test_encode_filename() {
        let encoded = Frame::Filename("a.log".to_string()).encode();
        assert_eq!(encoded[0], 0x01);
        assert_eq!(&encoded[1..], b"a.log");
    }

    #[test]
    fn test_encode_sample_rate() {
        assert_eq!(
            Frame::SampleRate(0x0102_0304).encode(),
            vec![0x04, 0x04, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn test_encode_booleans() {
        assert_eq!(Frame::Enabled(true).encode(), vec![0x02, 0x01]);
        assert_eq!(Frame::SdcardRef(false).encode(), vec![0x05, 0x00]);
        assert_eq!(Frame::Broadcast(true).encode(), vec![0x06, 0x01]);
    }

    #[test]
    fn test_status_labels_lowest_bit_first() {
        let flags = StatusFlags(StatusFlags::LOGGING | StatusFlags::SDCARD_MOUNTED);
        assert_eq!(flags.labels(), vec!["logging", "sdcard-mounted"]);
    }

    #[test]
    fn test_status_describe_idle_when_empty() {
        assert_eq!(StatusFlags(0).describe(), "idle");
    }

    #[test]
    fn test_status_describe_all_flags() {
        let all = StatusFlags(0xFF);
        assert_eq!(all.labels().len(), 8);
        assert!(all.describe().starts_with("logging"));
        assert!(all.describe().ends_with("fault"));
    }
}

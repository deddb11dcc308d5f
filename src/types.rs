use crate::protocol::{Frame, StatusFlags};
use chrono::NaiveDateTime;
use log::{error, info, warn};
use serde::Serialize;

/// Display tone of a scrollback line, mirrored into the process log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Warning,
    Error,
}

impl Tone {
    /// ANSI color prefix used when rendering the line.
    pub fn color_code(&self) -> &'static str {
        match self {
            Tone::Info => "\x1b[0m",
            Tone::Warning => "\x1b[33m",
            Tone::Error => "\x1b[31m",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrollbackEntry {
    pub timestamp: NaiveDateTime,
    pub message: String,
    pub tone: Tone,
}

/// Append-only session log. Entries are rendered to the terminal as they
/// arrive and kept in memory for the lifetime of the process.
pub struct Scrollback {
    entries: Vec<ScrollbackEntry>,
}

impl Scrollback {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, tone: Tone, message: impl Into<String>) {
        let entry = ScrollbackEntry {
            timestamp: chrono::Local::now().naive_local(),
            message: message.into(),
            tone,
        };

        println!(
            "{}{} {}\x1b[0m",
            tone.color_code(),
            entry.timestamp.format("%H:%M:%S"),
            entry.message
        );

        match tone {
            Tone::Info => info!("{}", entry.message),
            Tone::Warning => warn!("{}", entry.message),
            Tone::Error => error!("{}", entry.message),
        }

        self.entries.push(entry);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Tone::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Tone::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Tone::Error, message);
    }

    pub fn entries(&self) -> &[ScrollbackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Last reported values from the logger. Every field stays unset until the
/// device first reports it.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DeviceState {
    pub filename: Option<String>,
    pub enabled: Option<bool>,
    pub status: Option<StatusFlags>,
    pub sample_rate: Option<u32>,
    pub sdcard_ref: Option<bool>,
    pub broadcast: Option<bool>,
}

impl DeviceState {
    /// Fold a decoded status frame into the snapshot and produce the
    /// scrollback line describing it.
    pub fn apply(&mut self, frame: &Frame) -> (Tone, String) {
        match frame {
            Frame::FullReport => {
                // only meaningful on the control topic
                (Tone::Warning, "Unexpected report request".to_string())
            }
            Frame::Filename(name) => {
                self.filename = Some(name.clone());
                (Tone::Info, format!("Log file: {}", name))
            }
            Frame::Enabled(on) => {
                self.enabled = Some(*on);
                let line = if *on {
                    "Logging enabled"
                } else {
                    "Logging disabled"
                };
                (Tone::Info, line.to_string())
            }
            Frame::Status(flags) => {
                self.status = Some(*flags);
                let tone = if flags.contains(StatusFlags::FAULT) {
                    Tone::Error
                } else if flags.contains(StatusFlags::BUFFER_FULL | StatusFlags::LOW_BATTERY) {
                    Tone::Warning
                } else {
                    Tone::Info
                };
                (tone, format!("Device status: {}", flags.describe()))
            }
            Frame::SampleRate(hz) => {
                self.sample_rate = Some(*hz);
                (Tone::Info, format!("Sample rate: {} Hz", hz))
            }
            Frame::SdcardRef(held) => {
                self.sdcard_ref = Some(*held);
                let line = if *held {
                    "SD card reference held"
                } else {
                    "SD card reference released"
                };
                (Tone::Info, line.to_string())
            }
            Frame::Broadcast(on) => {
                self.broadcast = Some(*on);
                let line = if *on {
                    "Status broadcast enabled"
                } else {
                    "Status broadcast disabled"
                };
                (Tone::Info, line.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrollback_is_append_only_and_ordered() {
        let mut sb = Scrollback::new();
        sb.info("first");
        sb.error("second");
        sb.warning("third");

        let entries = sb.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].message, "second");
        assert_eq!(entries[2].message, "third");
        assert_eq!(entries[1].tone, Tone::Error);
        assert_eq!(entries[2].tone, Tone::Warning);
    }

    #[test]
    fn test_device_state_apply_updates_fields() {
        let mut state = DeviceState::default();

        state.apply(&Frame::Filename("run.log".to_string()));
        state.apply(&Frame::Enabled(true));
        state.apply(&Frame::SampleRate(400));
        state.apply(&Frame::SdcardRef(false));
        state.apply(&Frame::Broadcast(true));

        assert_eq!(state.filename.as_deref(), Some("run.log"));
        assert_eq!(state.enabled, Some(true));
        assert_eq!(state.sample_rate, Some(400));
        assert_eq!(state.sdcard_ref, Some(false));
        assert_eq!(state.broadcast, Some(true));
    }

    #[test]
    fn test_status_tone_escalation() {
        let mut state = DeviceState::default();

        let (tone, line) = state.apply(&Frame::Status(StatusFlags(StatusFlags::LOGGING)));
        assert_eq!(tone, Tone::Info);
        assert_eq!(line, "Device status: logging");

        let (tone, _) = state.apply(&Frame::Status(StatusFlags(StatusFlags::LOW_BATTERY)));
        assert_eq!(tone, Tone::Warning);

        let (tone, _) = state.apply(&Frame::Status(StatusFlags(
            StatusFlags::LOGGING | StatusFlags::FAULT,
        )));
        assert_eq!(tone, Tone::Error);
    }

    #[test]
    fn test_report_request_does_not_change_state() {
        let mut state = DeviceState::default();
        let (tone, _) = state.apply(&Frame::FullReport);
        assert_eq!(tone, Tone::Warning);
        assert!(state.filename.is_none());
        assert!(state.enabled.is_none());
    }
}

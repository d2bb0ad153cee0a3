// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! Unsolicited device event messages (`MINPIC=` lines).

use std::fmt;

use crate::codec::decode_with_ma;
use crate::enums::{DcFlags, DeviceEventCode, DeviceType};
use crate::error::{LifeSosError, Result};

/// An event reported by an enrolled device; sensor triggered, low battery,
/// heartbeat, and so on.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    pub event_code_value: u16,
    pub event_code: Option<DeviceEventCode>,
    pub device_type_value: u8,
    pub device_type: Option<DeviceType>,
    /// Unique identifier for the device (24-bit).
    pub device_id: u32,
    /// Selects the encoding scheme for analog fields.
    pub message_attribute: u8,
    pub device_characteristics: DcFlags,
    /// Multi-purpose field containing the RSSI reading and the magnet
    /// sensor flag. Prefer [`rssi_db`](Self::rssi_db),
    /// [`rssi_bars`](Self::rssi_bars) or the registry's closed/open state.
    pub current_status: u8,
    /// Current reading for a Special sensor, when present.
    pub current_reading: Option<f64>,
}

impl DeviceEvent {
    /// Parse a `MINPIC=` line. Field offsets are relative to the start of
    /// the line, skipping the prefix and header.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() < 25 || !text.is_ascii() {
            return Err(LifeSosError::InvalidResponse {
                details: format!("Event length is invalid: {:?}", text),
            });
        }
        let field = |range: std::ops::Range<usize>| -> Result<u32> {
            u32::from_str_radix(&text[range], 16).map_err(|_| LifeSosError::InvalidHexChar)
        };

        let event_code_value = field(7..11)? as u16;
        let device_type_value = field(11..13)? as u8;
        let device_id = field(13..19)?;
        let message_attribute = field(19..21)? as u8;
        let device_characteristics = DcFlags::from_bits_truncate(field(21..23)? as u8);
        let current_status = field(23..25)? as u8;
        // Trailing bytes carry an analog reading; the base unit appears to
        // send whatever was last buffered even for non-Special devices, so
        // the registry only applies it to Special sensors.
        let current_reading = if text.len() > 28 {
            decode_with_ma(message_attribute, field(27..29)? as u8)
        } else {
            None
        };

        Ok(Self {
            event_code_value,
            event_code: DeviceEventCode::from_value(event_code_value),
            device_type_value,
            device_type: DeviceType::from_value(device_type_value),
            device_id,
            message_attribute,
            device_characteristics,
            current_status,
            current_reading,
        })
    }

    /// Received signal strength, in dB (0-99).
    pub fn rssi_db(&self) -> u8 {
        self.current_status.saturating_sub(0x40).min(99)
    }

    /// Received signal strength, from 0 to 4 bars.
    pub fn rssi_bars(&self) -> u8 {
        match self.rssi_db() {
            0..=44 => 0,
            45..=59 => 1,
            60..=74 => 2,
            75..=89 => 3,
            _ => 4,
        }
    }
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceEvent: device_id={:06x}, type={:02x} ({:?}), event={:04x} ({:?}), rssi={}dB",
            self.device_id,
            self.device_type_value,
            self.device_type,
            self.event_code_value,
            self.event_code,
            self.rssi_db(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Header chars [0..7] are the "MINPIC=" prefix; the decoder's offsets
    // are relative to the full line.
    fn event_line(event: u16, device_type: u8, device_id: u32, ma: u8, status: u8) -> String {
        format!(
            "MINPIC={:04x}{:02x}{:06x}{:02x}{:02x}{:02x}",
            event, device_type, device_id, ma, 0x10, status
        )
    }

    #[test]
    fn test_parse_magnet_open_event() {
        let line = event_line(0x0a40, 0x40, 0x123456, 0x00, 0x62);
        let event = DeviceEvent::parse(&line).unwrap();
        assert_eq!(event.event_code, Some(DeviceEventCode::Open));
        assert_eq!(event.device_type, Some(DeviceType::DoorMagnet));
        assert_eq!(event.device_id, 0x123456);
        assert_eq!(event.current_reading, None);
        assert_eq!(event.rssi_db(), 0x22);
    }

    #[test]
    fn test_parse_with_reading() {
        // Two extra byte fields; the reading is the second one
        let line = format!("{}00{:02x}", event_line(0x0a24, 0x03, 0xaabbcc, 0x00, 0x50), 0x19u8);
        let event = DeviceEvent::parse(&line).unwrap();
        assert_eq!(event.event_code, Some(DeviceEventCode::Reading));
        assert_eq!(event.current_reading, Some(25.0));
    }

    #[test]
    fn test_parse_reading_sentinel_is_none() {
        let line = format!("{}0080", event_line(0x0a24, 0x03, 0xaabbcc, 0x00, 0x50));
        let event = DeviceEvent::parse(&line).unwrap();
        assert_eq!(event.current_reading, None);
    }

    #[test]
    fn test_too_short_rejected() {
        assert!(DeviceEvent::parse("MINPIC=0a40").is_err());
    }

    #[test]
    fn test_rssi_bars_buckets() {
        let mk = |status: u8| DeviceEvent::parse(&event_line(0x0a20, 0x50, 1, 0, status)).unwrap();
        assert_eq!(mk(0x40).rssi_bars(), 0); // 0 dB
        assert_eq!(mk(0x40 + 45).rssi_bars(), 1);
        assert_eq!(mk(0x40 + 60).rssi_bars(), 2);
        assert_eq!(mk(0x40 + 75).rssi_bars(), 3);
        assert_eq!(mk(0x40 + 90).rssi_bars(), 4);
        assert_eq!(mk(0xff).rssi_bars(), 4); // clamped to 99
    }
}

// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! Responses received from the base unit.
//!
//! Every response is traceable to exactly one command-name prefix in the
//! wire grammar; [`Response::parse`] dispatches on that prefix into a
//! closed sum of response kinds. Unknown prefixes are a parse failure.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::codec::{decode_with_ma, from_ascii_hex, is_ascii_hex, to_ascii_hex, MA_NONE};
use crate::constants::{
    DeviceCategory, ACTION_ADD, ACTION_DEL, ACTION_SET, CMD_CLEAR_STATUS, CMD_DATETIME,
    CMD_DEVBYIDX_PREFIX, CMD_DEVICE_PREFIX, CMD_ENTRY_DELAY, CMD_EVENT_LOG, CMD_EXIT_DELAY,
    CMD_OPMODE, CMD_ROMVER, CMD_SENSOR_LOG, CMD_SWITCH_PREFIX, MARKER_END, MARKER_START,
    RESPONSE_ERROR,
};
use crate::enums::{
    ContactIdEventCode, ContactIdEventQualifier, DcFlags, DeviceType, EsFlags, OperationMode,
    SsFlags, SwitchFlags, SwitchNumber, SwitchState,
};
use crate::error::{LifeSosError, Result};

/// Current date/time on the base unit.
#[derive(Debug, Clone, PartialEq)]
pub struct DateTimeResponse {
    pub was_set: bool,
    pub remote_datetime: NaiveDateTime,
}

/// Current operation mode on the base unit.
#[derive(Debug, Clone, PartialEq)]
pub struct OpModeResponse {
    pub was_set: bool,
    pub operation_mode_value: u8,
    pub operation_mode: Option<OperationMode>,
}

/// Information for a device along with the settings configured for it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfoResponse {
    pub command_name: String,
    pub device_category: DeviceCategory,
    /// Index of the device within its category (also known as the memory
    /// address). Only present in response to a get-by-zone command, and
    /// gets out of sync if any devices above it are deleted.
    pub index: Option<u8>,
    pub device_type_value: u8,
    pub device_type: Option<DeviceType>,
    pub device_id: u32,
    pub message_attribute: u8,
    pub device_characteristics: DcFlags,
    pub group_number: u8,
    pub unit_number: u8,
    pub enable_status: EsFlags,
    pub switches: SwitchFlags,
    /// Multi-purpose field containing RSSI and the magnet sensor flag.
    pub current_status: u8,
    /// Supervisory down count; a zero raises Loss of Supervision-RF.
    pub down_count: u8,
    pub current_reading: Option<f64>,
    pub high_limit: Option<f64>,
    pub low_limit: Option<f64>,
    pub special_status: Option<SsFlags>,
    pub control_high_limit: Option<f64>,
    pub control_low_limit: Option<f64>,
    /// True when the firmware provides separate control limits
    /// (LS-10/LS-20 only).
    pub control_limit_fields_exist: bool,
}

impl DeviceInfoResponse {
    /// For magnet sensors; `true` if closed, `false` if open.
    pub fn is_closed(&self) -> Option<bool> {
        if self.device_type == Some(DeviceType::DoorMagnet) {
            Some(self.current_status & 0x01 != 0)
        } else {
            None
        }
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

/// Whether a settings response came from an add or a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSettingsKind {
    Added,
    Changed,
}

/// Special-sensor fields of a settings response. These only appear in the
/// changed response and are left in wire encoding: this response type does
/// not carry a message attribute, so the receiver must decode them against
/// the device's stored attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSpecialFields {
    pub current_status: u8,
    pub down_count: u8,
    pub current_reading: u8,
    pub high_limit: u8,
    pub low_limit: u8,
    pub special_status: SsFlags,
    /// Encoded (high, low) control limits, when the firmware keeps them.
    pub control_limits: Option<(u8, u8)>,
}

/// Settings configured in the base unit for a device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettingsResponse {
    pub command_name: String,
    pub kind: DeviceSettingsKind,
    pub device_category: DeviceCategory,
    pub index: u8,
    pub group_number: u8,
    pub unit_number: u8,
    pub enable_status: EsFlags,
    pub switches: SwitchFlags,
    pub special: Option<EncodedSpecialFields>,
}

/// State of a switch on the base unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchResponse {
    pub switch_number: SwitchNumber,
    pub was_set: bool,
    pub switch_state_value: u8,
    pub switch_state: Option<SwitchState>,
    pub is_error: bool,
}

/// An entry from the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogResponse {
    pub event_qualifier_value: u8,
    pub event_qualifier: Option<ContactIdEventQualifier>,
    pub event_code_value: u16,
    pub event_code: Option<ContactIdEventCode>,
    pub device_category: DeviceCategory,
    pub group_number: Option<u8>,
    pub unit_number: Option<u8>,
    pub user_id: Option<u8>,
    /// Category of the device that originated the event; differs from
    /// `device_category` when the mode is changed via keypad or the
    /// ethernet interface.
    pub action: DeviceCategory,
    /// Date the event was logged; mm/dd, year omitted.
    pub logged_date: String,
    pub logged_time: NaiveTime,
    /// Index of the last entry in the event log.
    pub last_index: u16,
}

/// An entry from the Special sensor log.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorLogResponse {
    pub group_number: u8,
    pub unit_number: u8,
    /// Day of month the reading was logged.
    pub logged_day: u8,
    pub logged_time: NaiveTime,
    pub reading: Option<f64>,
    pub last_index: u16,
}

/// Response from a command issued to the base unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    DateTime(DateTimeResponse),
    OpMode(OpModeResponse),
    DeviceInfo(Box<DeviceInfoResponse>),
    DeviceSettings(DeviceSettingsResponse),
    /// The base unit is now listening for a new device to enroll.
    DeviceAdding { device_category: DeviceCategory },
    DeviceDeleted {
        device_category: DeviceCategory,
        index: u8,
    },
    /// No device at the specified index or zone.
    DeviceNotFound {
        command_name: String,
        device_category: DeviceCategory,
    },
    ClearedStatus,
    RomVersion { version: String },
    ExitDelay { was_set: bool, seconds: u8 },
    EntryDelay { was_set: bool, seconds: u8 },
    Switch(SwitchResponse),
    EventLog(Box<EventLogResponse>),
    EventLogNotFound,
    SensorLog(SensorLogResponse),
    SensorLogNotFound,
}

impl Response {
    /// The command name this response correlates to.
    pub fn command_name(&self) -> String {
        match self {
            Response::DateTime(_) => CMD_DATETIME.to_string(),
            Response::OpMode(_) => CMD_OPMODE.to_string(),
            Response::DeviceInfo(r) => r.command_name.clone(),
            Response::DeviceSettings(r) => r.command_name.clone(),
            Response::DeviceAdding { device_category } => {
                format!("{}{}", CMD_DEVICE_PREFIX, device_category.code())
            }
            Response::DeviceDeleted {
                device_category, ..
            } => format!("{}{}", CMD_DEVICE_PREFIX, device_category.code()),
            Response::DeviceNotFound { command_name, .. } => command_name.clone(),
            Response::ClearedStatus => CMD_CLEAR_STATUS.to_string(),
            Response::RomVersion { .. } => CMD_ROMVER.to_string(),
            Response::ExitDelay { .. } => CMD_EXIT_DELAY.to_string(),
            Response::EntryDelay { .. } => CMD_ENTRY_DELAY.to_string(),
            Response::Switch(r) => format!(
                "{}{}",
                CMD_SWITCH_PREFIX,
                to_ascii_hex(r.switch_number as u32, 1)
            ),
            Response::EventLog(_) | Response::EventLogNotFound => CMD_EVENT_LOG.to_string(),
            Response::SensorLog(_) | Response::SensorLogNotFound => CMD_SENSOR_LOG.to_string(),
        }
    }

    /// Parse a response line into the appropriate kind.
    ///
    /// Returns `Ok(None)` for an empty (no-op) response. An unrecognised
    /// command-name prefix is an error.
    pub fn parse(line: &str) -> Result<Option<Response>> {
        // Trim the markers and ensure only lowercase is used
        let mut text = line;
        if text.starts_with(MARKER_START) && text.ends_with(MARKER_END) && text.len() >= 2 {
            text = &text[1..text.len() - 1];
        }
        let text = text.to_lowercase();
        let text = text.as_str();

        if text.is_empty() {
            return Ok(None);
        }

        if let Some(rest) = text.strip_prefix(CMD_DATETIME) {
            return Ok(Some(Response::DateTime(parse_date_time(rest)?)));
        }
        if let Some(rest) = text.strip_prefix(CMD_OPMODE) {
            return Ok(Some(Response::OpMode(parse_op_mode(rest)?)));
        }
        // Two-char `l` command names must be tested before the bare device
        // and switch prefixes
        if let Some(_rest) = text.strip_prefix(CMD_CLEAR_STATUS) {
            return Ok(Some(Response::ClearedStatus));
        }
        if let Some(rest) = text.strip_prefix(CMD_EXIT_DELAY) {
            let (was_set, seconds) = parse_delay(rest)?;
            return Ok(Some(Response::ExitDelay { was_set, seconds }));
        }
        if let Some(rest) = text.strip_prefix(CMD_ENTRY_DELAY) {
            let (was_set, seconds) = parse_delay(rest)?;
            return Ok(Some(Response::EntryDelay { was_set, seconds }));
        }
        if let Some(rest) = text.strip_prefix(CMD_ROMVER) {
            return Ok(Some(Response::RomVersion {
                version: rest.to_string(),
            }));
        }
        if let Some(rest) = text.strip_prefix(CMD_EVENT_LOG) {
            if rest == RESPONSE_ERROR {
                return Ok(Some(Response::EventLogNotFound));
            }
            return Ok(Some(Response::EventLog(Box::new(parse_event_log(rest)?))));
        }
        if let Some(rest) = text.strip_prefix(CMD_SENSOR_LOG) {
            if rest == RESPONSE_ERROR {
                return Ok(Some(Response::SensorLogNotFound));
            }
            return Ok(Some(Response::SensorLog(parse_sensor_log(rest)?)));
        }
        if text.starts_with(CMD_DEVBYIDX_PREFIX) {
            return parse_device_by_index(text).map(Some);
        }
        if text.starts_with(CMD_DEVICE_PREFIX) {
            return parse_device(text).map(Some);
        }
        if text.starts_with(CMD_SWITCH_PREFIX) && text.len() >= 2 && is_ascii_hex(&text[1..2]) {
            return Ok(Some(Response::Switch(parse_switch(text)?)));
        }

        Err(LifeSosError::InvalidResponse {
            details: format!("Response not recognised: {}", text),
        })
    }
}

fn invalid(details: impl Into<String>) -> LifeSosError {
    LifeSosError::InvalidResponse {
        details: details.into(),
    }
}

fn hex_field(text: &str, range: std::ops::Range<usize>) -> Result<u32> {
    let slice = text
        .get(range.clone())
        .filter(|s| s.len() == range.len())
        .ok_or_else(|| invalid(format!("Response too short: {:?}", text)))?;
    from_ascii_hex(slice)
}

fn parse_date_time(text: &str) -> Result<DateTimeResponse> {
    let (was_set, text) = match text.strip_prefix(ACTION_SET) {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if text.len() < 11 {
        return Err(invalid("Date/Time response length is invalid"));
    }
    let num = |range: std::ops::Range<usize>| -> Result<u32> {
        text.get(range)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| invalid("Date/Time response is not numeric"))
    };
    // Layout is YYMMDDwHHMM; the weekday digit is redundant and skipped
    let year = 2000 + num(0..2)? as i32;
    let date = NaiveDate::from_ymd_opt(year, num(2..4)?, num(4..6)?)
        .ok_or_else(|| invalid("Date/Time response has invalid date"))?;
    let time = NaiveTime::from_hms_opt(num(7..9)?, num(9..11)?, 0)
        .ok_or_else(|| invalid("Date/Time response has invalid time"))?;
    Ok(DateTimeResponse {
        was_set,
        remote_datetime: date.and_time(time),
    })
}

fn parse_op_mode(text: &str) -> Result<OpModeResponse> {
    let (was_set, text) = match text.strip_prefix(ACTION_SET) {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = from_ascii_hex(text)? as u8;
    Ok(OpModeResponse {
        was_set,
        operation_mode_value: value,
        operation_mode: OperationMode::from_value(value),
    })
}

fn parse_delay(text: &str) -> Result<(bool, u8)> {
    let (was_set, text) = match text.strip_prefix(ACTION_SET) {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    Ok((was_set, from_ascii_hex(text)? as u8))
}

fn device_category_of(text: &str) -> Result<DeviceCategory> {
    text.chars()
        .nth(1)
        .and_then(DeviceCategory::from_code)
        .ok_or_else(|| invalid(format!("Unknown device category: {}", text)))
}

fn parse_device_by_index(text: &str) -> Result<Response> {
    let device_category = device_category_of(text)?;
    let command_name = text[0..2].to_string();
    // A literal error or an all-zero device type means no device at that
    // index
    if &text[2..] == RESPONSE_ERROR || text.get(2..4) == Some("00") {
        return Ok(Response::DeviceNotFound {
            command_name,
            device_category,
        });
    }
    parse_device_info(text, false)
}

fn parse_device(text: &str) -> Result<Response> {
    let device_category = device_category_of(text)?;
    let command_name = text[0..2].to_string();
    let action = match text.get(2..3) {
        Some(ACTION_ADD) => ACTION_ADD,
        Some(ACTION_DEL) => ACTION_DEL,
        Some(ACTION_SET) => ACTION_SET,
        _ => "",
    };
    let args = &text[2 + action.len()..];
    if args == RESPONSE_ERROR {
        return Ok(Response::DeviceNotFound {
            command_name,
            device_category,
        });
    }
    match action {
        ACTION_ADD => {
            if args.is_empty() {
                Ok(Response::DeviceAdding { device_category })
            } else {
                parse_device_settings(text, DeviceSettingsKind::Added)
            }
        }
        ACTION_SET => parse_device_settings(text, DeviceSettingsKind::Changed),
        ACTION_DEL => Ok(Response::DeviceDeleted {
            device_category,
            index: hex_field(args, 0..2)? as u8,
        }),
        _ => parse_device_info(text, true),
    }
}

fn parse_device_info(text: &str, with_index: bool) -> Result<Response> {
    let command_name = text[0..2].to_string();
    let device_category = device_category_of(text)?;
    let mut rest = &text[2..];
    let index = if with_index {
        let index = hex_field(rest, 0..2)? as u8;
        rest = &rest[2..];
        Some(index)
    } else {
        None
    };

    let device_type_value = hex_field(rest, 0..2)? as u8;
    let device_id = hex_field(rest, 2..8)?;
    let message_attribute = hex_field(rest, 8..10)? as u8;
    let device_characteristics = DcFlags::from_bits_truncate(hex_field(rest, 10..12)? as u8);
    // rest[12..14] is reserved
    let group_number = hex_field(rest, 14..16)? as u8;
    let unit_number = hex_field(rest, 16..18)? as u8;
    let enable_status = EsFlags::from_bits_truncate(hex_field(rest, 18..22)? as u16);
    let switches = SwitchFlags::from_bits_truncate(hex_field(rest, 22..26)? as u16);
    let current_status = hex_field(rest, 26..28)? as u8;
    let down_count = hex_field(rest, 28..30)? as u8;

    // Remaining fields used by the Special sensors
    let (current_reading, high_limit, low_limit, special_status) = if rest.len() > 30 {
        (
            decode_with_ma(message_attribute, hex_field(rest, 30..32)? as u8),
            decode_with_ma(message_attribute, hex_field(rest, 32..34)? as u8),
            decode_with_ma(message_attribute, hex_field(rest, 34..36)? as u8),
            Some(SsFlags::from_bits_truncate(hex_field(rest, 36..38)? as u8)),
        )
    } else {
        (None, None, None, None)
    };
    // Control limits don't exist on the LS-30; they're LS-10/LS-20 only
    let (control_high_limit, control_low_limit, control_limit_fields_exist) = if rest.len() > 38 {
        (
            decode_with_ma(message_attribute, hex_field(rest, 38..40)? as u8),
            decode_with_ma(message_attribute, hex_field(rest, 40..42)? as u8),
            true,
        )
    } else {
        (None, None, false)
    };

    Ok(Response::DeviceInfo(Box::new(DeviceInfoResponse {
        command_name,
        device_category,
        index,
        device_type_value,
        device_type: DeviceType::from_value(device_type_value),
        device_id,
        message_attribute,
        device_characteristics,
        group_number,
        unit_number,
        enable_status,
        switches,
        current_status,
        down_count,
        current_reading,
        high_limit,
        low_limit,
        special_status,
        control_high_limit,
        control_low_limit,
        control_limit_fields_exist,
    })))
}

fn parse_device_settings(text: &str, kind: DeviceSettingsKind) -> Result<Response> {
    let command_name = text[0..2].to_string();
    let device_category = device_category_of(text)?;
    let rest = &text[3..];

    let index = hex_field(rest, 0..2)? as u8;
    let group_number = hex_field(rest, 2..4)? as u8;
    let unit_number = hex_field(rest, 4..6)? as u8;
    let enable_status = EsFlags::from_bits_truncate(hex_field(rest, 6..10)? as u16);
    let switches = SwitchFlags::from_bits_truncate(hex_field(rest, 10..14)? as u16);

    let special = if rest.len() > 14 {
        let control_limits = if rest.len() > 26 {
            Some((hex_field(rest, 26..28)? as u8, hex_field(rest, 28..30)? as u8))
        } else {
            None
        };
        Some(EncodedSpecialFields {
            current_status: hex_field(rest, 14..16)? as u8,
            down_count: hex_field(rest, 16..18)? as u8,
            current_reading: hex_field(rest, 18..20)? as u8,
            high_limit: hex_field(rest, 20..22)? as u8,
            low_limit: hex_field(rest, 22..24)? as u8,
            special_status: SsFlags::from_bits_truncate(hex_field(rest, 24..26)? as u8),
            control_limits,
        })
    } else {
        None
    };

    Ok(Response::DeviceSettings(DeviceSettingsResponse {
        command_name,
        kind,
        device_category,
        index,
        group_number,
        unit_number,
        enable_status,
        switches,
        special,
    }))
}

fn parse_switch(text: &str) -> Result<SwitchResponse> {
    let switch_value = hex_field(text, 1..2)? as u8;
    let switch_number = SwitchNumber::from_value(switch_value)
        .ok_or_else(|| invalid(format!("Unknown switch number: {:x}", switch_value)))?;
    let rest = &text[2..];
    let (was_set, rest) = match rest.strip_prefix(ACTION_SET) {
        Some(r) => (true, r),
        None => (false, rest),
    };
    let switch_state_value = hex_field(rest, 0..1)? as u8;
    Ok(SwitchResponse {
        switch_number,
        was_set,
        switch_state_value,
        switch_state: SwitchState::from_value(switch_state_value),
        is_error: &rest[1..] == RESPONSE_ERROR,
    })
}

fn parse_event_log(text: &str) -> Result<EventLogResponse> {
    let event_qualifier_value = hex_field(text, 0..1)? as u8;
    let event_code_value = hex_field(text, 1..4)? as u16;
    let group_partition = hex_field(text, 4..6)? as u8;
    // text[6..7] is reserved
    let device_category = DeviceCategory::from_index(hex_field(text, 7..8)? as usize)
        .ok_or_else(|| invalid("Event log device category index out of range"))?;
    let zone_user = hex_field(text, 8..10)? as u8;
    let action = DeviceCategory::from_index(hex_field(text, 10..12)? as usize)
        .ok_or_else(|| invalid("Event log action category index out of range"))?;
    let logged_date = format!(
        "{}/{}",
        text.get(12..14).ok_or_else(|| invalid("Event log too short"))?,
        text.get(14..16).ok_or_else(|| invalid("Event log too short"))?
    );
    let hour: u32 = text
        .get(16..18)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("Event log time invalid"))?;
    let minute: u32 = text
        .get(18..20)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("Event log time invalid"))?;
    let logged_time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| invalid("Event log time invalid"))?;
    let last_index = hex_field(text, 20..23)? as u16;

    let (group_number, unit_number, user_id) = if device_category == DeviceCategory::BaseUnit {
        (None, None, if zone_user != 0 { Some(zone_user) } else { None })
    } else {
        (Some(group_partition), Some(zone_user), None)
    };

    Ok(EventLogResponse {
        event_qualifier_value,
        event_qualifier: ContactIdEventQualifier::from_value(event_qualifier_value),
        event_code_value,
        event_code: ContactIdEventCode::from_value(event_code_value),
        device_category,
        group_number,
        unit_number,
        user_id,
        action,
        logged_date,
        logged_time,
        last_index,
    })
}

fn parse_sensor_log(text: &str) -> Result<SensorLogResponse> {
    let group_number = hex_field(text, 0..2)? as u8;
    let unit_number = hex_field(text, 2..4)? as u8;
    let logged_day: u8 = text
        .get(4..6)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("Sensor log day invalid"))?;
    let hour: u32 = text
        .get(6..8)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("Sensor log time invalid"))?;
    let minute: u32 = text
        .get(8..10)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("Sensor log time invalid"))?;
    let logged_time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| invalid("Sensor log time invalid"))?;
    // The sensor log predates the AC power meters; readings are always
    // signed bytes regardless of the device's message attribute
    let reading = decode_with_ma(MA_NONE, hex_field(text, 10..12)? as u8);
    let last_index = hex_field(text, 12..15)? as u16;

    Ok(SensorLogResponse {
        group_number,
        unit_number,
        logged_day,
        logged_time,
        reading,
        last_index,
    })
}

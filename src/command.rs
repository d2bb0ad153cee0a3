// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! Commands issued to the base unit.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::codec::{encode_with_ma, to_ascii_hex};
use crate::constants::{
    DeviceCategory, ACTION_ADD, ACTION_DEL, ACTION_GET, ACTION_NONE, ACTION_SET, CMD_CLEAR_STATUS,
    CMD_DATETIME, CMD_DEVBYIDX_PREFIX, CMD_DEVICE_PREFIX, CMD_ENTRY_DELAY, CMD_EVENT_LOG,
    CMD_EXIT_DELAY, CMD_OPMODE, CMD_ROMVER, CMD_SENSOR_LOG, CMD_SWITCH_PREFIX,
};
use crate::enums::{EsFlags, OperationMode, SsFlags, SwitchFlags, SwitchNumber, SwitchState};

/// Control limit pair for Special devices on base units whose firmware
/// keeps the switch-control limits separate from the alarm limits.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlLimits {
    pub high: Option<f64>,
    pub low: Option<f64>,
}

/// The Special-sensor section of a change-device command.
///
/// The current status, down count and current reading are echoed from the
/// latest device snapshot; the limits are the values being set. Absent
/// limits serialize as the message attribute's sentinel byte. When
/// `control_limits` is present the two extra fields are appended, matching
/// base units that store them separately.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialSettings {
    pub current_status: u8,
    pub down_count: u8,
    pub message_attribute: u8,
    pub current_reading: Option<f64>,
    pub special_status: SsFlags,
    pub high_limit: Option<f64>,
    pub low_limit: Option<f64>,
    pub control_limits: Option<ControlLimits>,
}

/// A command to be issued to the base unit.
///
/// Each variant knows its command name (which doubles as the
/// response-correlation key), action verb and argument serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Does nothing; used as the keep-alive probe.
    NoOp,
    GetDateTime,
    /// Set the remote date/time; `None` uses the current local time.
    SetDateTime { value: Option<NaiveDateTime> },
    GetOpMode,
    SetOpMode { mode: OperationMode },
    /// Get a device by its index within a category.
    GetDeviceByIndex { category: DeviceCategory, index: u8 },
    /// Get a device by its zone assignment.
    GetDeviceByZone {
        category: DeviceCategory,
        group_number: u8,
        unit_number: u8,
    },
    /// Change settings for a device; `special` is present only for Special
    /// sensors.
    ChangeDevice {
        category: DeviceCategory,
        index: u8,
        group_number: u8,
        unit_number: u8,
        enable_status: EsFlags,
        switches: SwitchFlags,
        special: Option<SpecialSettings>,
    },
    /// Enroll a new device; the base unit starts listening for it.
    AddDevice { category: DeviceCategory },
    DeleteDevice { category: DeviceCategory, index: u8 },
    /// Clear the alarm/warning LEDs and stop the siren.
    ClearStatus,
    GetRomVersion,
    GetExitDelay,
    SetExitDelay { seconds: u8 },
    GetEntryDelay,
    SetEntryDelay { seconds: u8 },
    GetSwitch { switch_number: SwitchNumber },
    SetSwitch {
        switch_number: SwitchNumber,
        state: SwitchState,
    },
    GetEventLog { index: u16 },
    GetSensorLog { index: u16 },
}

impl Command {
    /// The command name; used both for wire framing and to correlate the
    /// response back to this command.
    pub fn name(&self) -> String {
        match self {
            Command::NoOp => String::new(),
            Command::GetDateTime | Command::SetDateTime { .. } => CMD_DATETIME.to_string(),
            Command::GetOpMode | Command::SetOpMode { .. } => CMD_OPMODE.to_string(),
            Command::GetDeviceByIndex { category, .. } => {
                format!("{}{}", CMD_DEVBYIDX_PREFIX, category.code())
            }
            Command::GetDeviceByZone { category, .. }
            | Command::ChangeDevice { category, .. }
            | Command::AddDevice { category }
            | Command::DeleteDevice { category, .. } => {
                format!("{}{}", CMD_DEVICE_PREFIX, category.code())
            }
            Command::ClearStatus => CMD_CLEAR_STATUS.to_string(),
            Command::GetRomVersion => CMD_ROMVER.to_string(),
            Command::GetExitDelay | Command::SetExitDelay { .. } => CMD_EXIT_DELAY.to_string(),
            Command::GetEntryDelay | Command::SetEntryDelay { .. } => CMD_ENTRY_DELAY.to_string(),
            Command::GetSwitch { switch_number } | Command::SetSwitch { switch_number, .. } => {
                format!(
                    "{}{}",
                    CMD_SWITCH_PREFIX,
                    to_ascii_hex(*switch_number as u32, 1)
                )
            }
            Command::GetEventLog { .. } => CMD_EVENT_LOG.to_string(),
            Command::GetSensorLog { .. } => CMD_SENSOR_LOG.to_string(),
        }
    }

    /// The action verb.
    pub fn action(&self) -> &'static str {
        match self {
            Command::NoOp | Command::ClearStatus => ACTION_NONE,
            Command::GetDateTime
            | Command::GetOpMode
            | Command::GetDeviceByIndex { .. }
            | Command::GetDeviceByZone { .. }
            | Command::GetRomVersion
            | Command::GetExitDelay
            | Command::GetEntryDelay
            | Command::GetSwitch { .. }
            | Command::GetEventLog { .. }
            | Command::GetSensorLog { .. } => ACTION_GET,
            Command::SetDateTime { .. }
            | Command::SetOpMode { .. }
            | Command::ChangeDevice { .. }
            | Command::SetExitDelay { .. }
            | Command::SetEntryDelay { .. }
            | Command::SetSwitch { .. } => ACTION_SET,
            Command::AddDevice { .. } => ACTION_ADD,
            Command::DeleteDevice { .. } => ACTION_DEL,
        }
    }

    /// Arguments for the command, in wire form.
    pub fn args(&self) -> String {
        match self {
            Command::NoOp
            | Command::GetDateTime
            | Command::GetOpMode
            | Command::ClearStatus
            | Command::GetRomVersion
            | Command::GetExitDelay
            | Command::GetEntryDelay
            | Command::GetSwitch { .. }
            | Command::AddDevice { .. } => String::new(),
            Command::SetDateTime { value } => {
                let value = value.unwrap_or_else(|| chrono::Local::now().naive_local());
                format!(
                    "{:02}{:02}{:02}{}{:02}{:02}",
                    value.year() % 100,
                    value.month(),
                    value.day(),
                    value.weekday().num_days_from_sunday(),
                    value.hour(),
                    value.minute()
                )
            }
            Command::SetOpMode { mode } => format!("{}", *mode as u8),
            Command::GetDeviceByIndex { index, .. } => to_ascii_hex(u32::from(*index), 2),
            Command::GetDeviceByZone {
                group_number,
                unit_number,
                ..
            } => format!("{:02x}{:02x}", group_number, unit_number),
            Command::ChangeDevice {
                index,
                group_number,
                unit_number,
                enable_status,
                switches,
                special,
                ..
            } => {
                let mut args = String::new();
                args.push_str(&to_ascii_hex(u32::from(*index), 2));
                args.push_str(&to_ascii_hex(u32::from(*group_number), 2));
                args.push_str(&to_ascii_hex(u32::from(*unit_number), 2));
                args.push_str(&to_ascii_hex(u32::from(enable_status.bits()), 4));
                args.push_str(&to_ascii_hex(u32::from(switches.bits()), 4));
                if let Some(special) = special {
                    let ma = special.message_attribute;
                    args.push_str(&to_ascii_hex(u32::from(special.current_status), 2));
                    args.push_str(&to_ascii_hex(u32::from(special.down_count), 2));
                    args.push_str(&to_ascii_hex(
                        u32::from(encode_with_ma(ma, special.current_reading)),
                        2,
                    ));
                    args.push_str(&to_ascii_hex(
                        u32::from(encode_with_ma(ma, special.high_limit)),
                        2,
                    ));
                    args.push_str(&to_ascii_hex(
                        u32::from(encode_with_ma(ma, special.low_limit)),
                        2,
                    ));
                    args.push_str(&to_ascii_hex(u32::from(special.special_status.bits()), 2));
                    if let Some(limits) = &special.control_limits {
                        args.push_str(&to_ascii_hex(
                            u32::from(encode_with_ma(ma, limits.high)),
                            2,
                        ));
                        args.push_str(&to_ascii_hex(u32::from(encode_with_ma(ma, limits.low)), 2));
                    }
                }
                args
            }
            Command::DeleteDevice { index, .. } => to_ascii_hex(u32::from(*index), 2),
            Command::SetExitDelay { seconds } | Command::SetEntryDelay { seconds } => {
                to_ascii_hex(u32::from(*seconds), 2)
            }
            Command::SetSwitch { state, .. } => to_ascii_hex(*state as u32, 1),
            Command::GetEventLog { index } | Command::GetSensorLog { index } => {
                to_ascii_hex(u32::from(*index), 3)
            }
        }
    }

    /// Format the command along with any arguments, ready to be sent.
    pub fn format(&self, password: &str) -> String {
        use crate::constants::{MARKER_END, MARKER_START};
        format!(
            "{}{}{}{}{}{}",
            MARKER_START,
            self.name(),
            self.action(),
            self.args(),
            password,
            MARKER_END
        )
    }
}

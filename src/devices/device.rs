// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! A device that has been enrolled on the base unit.

use std::fmt;

use crate::codec::decode_with_ma;
use crate::constants::DeviceCategory;
use crate::deviceevent::DeviceEvent;
use crate::enums::{DcFlags, DeviceEventCode, DeviceType, EsFlags, SsFlags, SwitchFlags};
use crate::response::{DeviceInfoResponse, DeviceSettingsResponse};

/// A device's zone assignment: group and unit number pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Zone {
    pub group_number: u8,
    pub unit_number: u8,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}-{:02x}", self.group_number, self.unit_number)
    }
}

/// State that only exists for the Special (analog sensor) category.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecialState {
    pub current_reading: Option<f64>,
    /// For LS-10/LS-20 base units this is the alarm high limit; on the
    /// LS-30 it is either the alarm or control high limit, as indicated
    /// by the special status ControlAlarm flag.
    pub high_limit: Option<f64>,
    pub low_limit: Option<f64>,
    pub special_status: Option<SsFlags>,
    /// Whether the base unit firmware keeps separate control limits
    /// (LS-10/LS-20 only). Captured at enrollment and fixed thereafter.
    pub control_limit_fields_exist: bool,
    pub control_high_limit: Option<f64>,
    pub control_low_limit: Option<f64>,
}

/// A single changed property, carrying its new value. One batch of these
/// is produced per wire message applied to a device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceChange {
    Zone(Zone),
    EnableStatus(EsFlags),
    Switches(SwitchFlags),
    IsClosed(Option<bool>),
    RssiDb(u8),
    CurrentReading(Option<f64>),
    HighLimit(Option<f64>),
    LowLimit(Option<f64>),
    SpecialStatus(Option<SsFlags>),
    ControlHighLimit(Option<f64>),
    ControlLowLimit(Option<f64>),
}

/// A device enrolled on the base unit.
///
/// Identity fields (id, category, type, message attribute,
/// characteristics) are fixed at enrollment. Everything else mutates
/// through exactly two inputs: a full device snapshot response, or an
/// unsolicited device event. Each such update produces one batched list
/// of [`DeviceChange`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    device_id: u32,
    category: DeviceCategory,
    device_type_value: u8,
    device_type: Option<DeviceType>,
    message_attribute: u8,
    characteristics: DcFlags,
    group_number: u8,
    unit_number: u8,
    enable_status: EsFlags,
    switches: SwitchFlags,
    is_closed: Option<bool>,
    rssi_db: u8,
    special: Option<SpecialState>,
}

impl Device {
    /// Construct from the first snapshot seen for this device.
    pub fn from_info(response: &DeviceInfoResponse) -> Self {
        let special = (response.device_category == DeviceCategory::Special).then(|| SpecialState {
            control_limit_fields_exist: response.control_limit_fields_exist,
            ..SpecialState::default()
        });
        let mut device = Self {
            device_id: response.device_id,
            category: response.device_category,
            device_type_value: response.device_type_value,
            device_type: response.device_type,
            message_attribute: response.message_attribute,
            characteristics: response.device_characteristics,
            group_number: response.group_number,
            unit_number: response.unit_number,
            enable_status: response.enable_status,
            switches: response.switches,
            is_closed: None,
            rssi_db: 0,
            special,
        };
        device.apply_info(response);
        device
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn category(&self) -> DeviceCategory {
        self.category
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        self.device_type
    }

    pub fn device_type_value(&self) -> u8 {
        self.device_type_value
    }

    /// Message attribute; selects the encoding for Special analog fields.
    pub fn message_attribute(&self) -> u8 {
        self.message_attribute
    }

    pub fn characteristics(&self) -> DcFlags {
        self.characteristics
    }

    pub fn zone(&self) -> Zone {
        Zone {
            group_number: self.group_number,
            unit_number: self.unit_number,
        }
    }

    pub fn group_number(&self) -> u8 {
        self.group_number
    }

    pub fn unit_number(&self) -> u8 {
        self.unit_number
    }

    pub fn enable_status(&self) -> EsFlags {
        self.enable_status
    }

    pub fn switches(&self) -> SwitchFlags {
        self.switches
    }

    /// For magnet sensors; `true` if closed, `false` if open.
    pub fn is_closed(&self) -> Option<bool> {
        self.is_closed
    }

    /// Received signal strength, in dB (0-99).
    pub fn rssi_db(&self) -> u8 {
        self.rssi_db
    }

    /// Received signal strength, from 0 to 4 bars.
    pub fn rssi_bars(&self) -> u8 {
        match self.rssi_db {
            0..=44 => 0,
            45..=59 => 1,
            60..=74 => 2,
            75..=89 => 3,
            _ => 4,
        }
    }

    /// Special sensor state; `None` for other categories.
    pub fn special(&self) -> Option<&SpecialState> {
        self.special.as_ref()
    }

    /// Apply a full device snapshot. Returns the batch of changes.
    pub fn apply_info(&mut self, response: &DeviceInfoResponse) -> Vec<DeviceChange> {
        let mut changes = Vec::new();
        self.set_zone(response.group_number, response.unit_number, &mut changes);
        self.set_enable_status(response.enable_status, &mut changes);
        self.set_switches(response.switches, &mut changes);
        self.set_is_closed(response.is_closed(), &mut changes);
        self.set_rssi_db(response.rssi_db(), &mut changes);

        if let Some(special) = self.special.as_mut() {
            let control = special
                .control_limit_fields_exist
                .then_some((response.control_high_limit, response.control_low_limit));
            Self::update_special(
                special,
                response.current_reading,
                Some((response.high_limit, response.low_limit)),
                response.special_status,
                control,
                &mut changes,
            );
        }
        changes
    }

    /// Apply a settings response (from a change or add acknowledgement).
    ///
    /// The special fields in this response kind are still wire-encoded --
    /// it carries no message attribute -- so they are decoded here against
    /// the attribute stored for this device.
    pub fn apply_settings(&mut self, response: &DeviceSettingsResponse) -> Vec<DeviceChange> {
        let mut changes = Vec::new();
        self.set_zone(response.group_number, response.unit_number, &mut changes);
        self.set_enable_status(response.enable_status, &mut changes);
        self.set_switches(response.switches, &mut changes);

        let ma = self.message_attribute;
        if let (Some(special), Some(fields)) = (self.special.as_mut(), response.special.as_ref()) {
            let control = match (special.control_limit_fields_exist, fields.control_limits) {
                (true, Some((high, low))) => Some((
                    decode_with_ma(ma, high),
                    decode_with_ma(ma, low),
                )),
                _ => None,
            };
            Self::update_special(
                special,
                decode_with_ma(ma, fields.current_reading),
                Some((
                    decode_with_ma(ma, fields.high_limit),
                    decode_with_ma(ma, fields.low_limit),
                )),
                Some(fields.special_status),
                control,
                &mut changes,
            );
        }
        changes
    }

    /// Apply an unsolicited device event. Returns the batch of changes.
    pub fn apply_event(&mut self, event: &DeviceEvent) -> Vec<DeviceChange> {
        let mut changes = Vec::new();

        // Magnet sensor open/close state only exists in the snapshot
        // response; for events it is derived from the Open/Close codes
        let is_closed = match event.event_code {
            Some(DeviceEventCode::Open) => Some(false),
            Some(DeviceEventCode::Close) => Some(true),
            _ => self.is_closed,
        };
        self.set_is_closed(is_closed, &mut changes);
        self.set_rssi_db(event.rssi_db(), &mut changes);

        if let Some(special) = self.special.as_mut() {
            Self::update_special(
                special,
                event.current_reading,
                None,
                None,
                None,
                &mut changes,
            );
        }
        changes
    }

    fn set_zone(&mut self, group_number: u8, unit_number: u8, changes: &mut Vec<DeviceChange>) {
        if self.group_number != group_number || self.unit_number != unit_number {
            self.group_number = group_number;
            self.unit_number = unit_number;
            changes.push(DeviceChange::Zone(self.zone()));
        }
    }

    fn set_enable_status(&mut self, enable_status: EsFlags, changes: &mut Vec<DeviceChange>) {
        if self.enable_status != enable_status {
            self.enable_status = enable_status;
            changes.push(DeviceChange::EnableStatus(enable_status));
        }
    }

    fn set_switches(&mut self, switches: SwitchFlags, changes: &mut Vec<DeviceChange>) {
        if self.switches != switches {
            self.switches = switches;
            changes.push(DeviceChange::Switches(switches));
        }
    }

    fn set_is_closed(&mut self, is_closed: Option<bool>, changes: &mut Vec<DeviceChange>) {
        if self.is_closed != is_closed {
            self.is_closed = is_closed;
            changes.push(DeviceChange::IsClosed(is_closed));
        }
    }

    fn set_rssi_db(&mut self, rssi_db: u8, changes: &mut Vec<DeviceChange>) {
        if self.rssi_db != rssi_db {
            self.rssi_db = rssi_db;
            changes.push(DeviceChange::RssiDb(rssi_db));
        }
    }

    // Shared special-field diff. `limits`/`status`/`control` are `None`
    // when the input carries no such fields (device events).
    fn update_special(
        special: &mut SpecialState,
        current_reading: Option<f64>,
        limits: Option<(Option<f64>, Option<f64>)>,
        status: Option<SsFlags>,
        control: Option<(Option<f64>, Option<f64>)>,
        changes: &mut Vec<DeviceChange>,
    ) {
        if special.current_reading != current_reading {
            special.current_reading = current_reading;
            changes.push(DeviceChange::CurrentReading(current_reading));
        }
        if let Some((high_limit, low_limit)) = limits {
            if special.high_limit != high_limit {
                special.high_limit = high_limit;
                changes.push(DeviceChange::HighLimit(high_limit));
            }
            if special.low_limit != low_limit {
                special.low_limit = low_limit;
                changes.push(DeviceChange::LowLimit(low_limit));
            }
        }
        if let Some(status) = status {
            if special.special_status != Some(status) {
                special.special_status = Some(status);
                changes.push(DeviceChange::SpecialStatus(Some(status)));
            }
        }
        if let Some((control_high, control_low)) = control {
            if special.control_high_limit != control_high {
                special.control_high_limit = control_high;
                changes.push(DeviceChange::ControlHighLimit(control_high));
            }
            if special.control_low_limit != control_low {
                special.control_low_limit = control_low;
                changes.push(DeviceChange::ControlLowLimit(control_low));
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device: device_id={:06x}, type={:02x} ({:?}), category={}, zone={}, rssi={}dB",
            self.device_id,
            self.device_type_value,
            self.device_type,
            self.category.description(),
            self.zone(),
            self.rssi_db,
        )?;
        if self.device_type == Some(DeviceType::DoorMagnet) {
            write!(f, ", is_closed={:?}", self.is_closed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;

    fn magnet_info() -> DeviceInfoResponse {
        let Response::DeviceInfo(info) =
            Response::parse("!kb40123456001000010244008000612 0&".replace(' ', "").as_str())
                .unwrap()
                .unwrap()
        else {
            panic!("wrong kind");
        };
        *info
    }

    fn special_info() -> DeviceInfoResponse {
        let text = "!ke0eaabbcc0010000101000000005010191e0540140a&";
        let Response::DeviceInfo(info) = Response::parse(text).unwrap().unwrap() else {
            panic!("wrong kind");
        };
        *info
    }

    #[test]
    fn test_construction_captures_identity() {
        let device = Device::from_info(&magnet_info());
        assert_eq!(device.device_id(), 0x123456);
        assert_eq!(device.category(), DeviceCategory::Burglar);
        assert_eq!(device.device_type(), Some(DeviceType::DoorMagnet));
        assert_eq!(device.is_closed(), Some(true));
        assert_eq!(device.zone().to_string(), "01-02");
        assert!(device.special().is_none());
    }

    #[test]
    fn test_snapshot_idempotent() {
        let info = magnet_info();
        let mut device = Device::from_info(&info);
        let changes = device.apply_info(&info);
        assert!(changes.is_empty(), "second application changed: {:?}", changes);

        let info = special_info();
        let mut device = Device::from_info(&info);
        assert!(device.apply_info(&info).is_empty());
    }

    #[test]
    fn test_magnet_open_event_flips_state_once() {
        let mut device = Device::from_info(&magnet_info());
        assert_eq!(device.is_closed(), Some(true));

        let event = DeviceEvent::parse("MINPIC=0a4040123456001061").unwrap();
        let changes = device.apply_event(&event);
        assert_eq!(device.is_closed(), Some(false));
        // rssi is unchanged (status 0x61 both times); exactly the one change
        assert_eq!(changes, vec![DeviceChange::IsClosed(Some(false))]);

        // Same event again produces nothing
        assert!(device.apply_event(&event).is_empty());
    }

    #[test]
    fn test_event_updates_rssi() {
        let mut device = Device::from_info(&magnet_info());
        let event = DeviceEvent::parse("MINPIC=0a4840123456001070").unwrap();
        let changes = device.apply_event(&event);
        assert!(changes.contains(&DeviceChange::RssiDb(0x30)));
        assert_eq!(device.rssi_db(), 0x30);
    }

    #[test]
    fn test_special_captures_control_limit_presence() {
        let device = Device::from_info(&special_info());
        let special = device.special().unwrap();
        assert!(special.control_limit_fields_exist);
        assert_eq!(special.current_reading, Some(25.0));
        assert_eq!(special.high_limit, Some(30.0));
        assert_eq!(special.low_limit, Some(5.0));
        assert_eq!(special.control_high_limit, Some(20.0));
        assert_eq!(special.control_low_limit, Some(10.0));
    }

    #[test]
    fn test_special_event_updates_reading_only() {
        let mut device = Device::from_info(&special_info());
        // Reading event with value 0x20 (32.0), status byte unchanged
        let event = DeviceEvent::parse("MINPIC=0a240eaabbcc0010500020").unwrap();
        let changes = device.apply_event(&event);
        assert!(changes.contains(&DeviceChange::CurrentReading(Some(32.0))));
        let special = device.special().unwrap();
        assert_eq!(special.current_reading, Some(32.0));
        // Limits untouched by events
        assert_eq!(special.high_limit, Some(30.0));
    }

    #[test]
    fn test_settings_decoded_with_stored_attribute() {
        let mut device = Device::from_info(&special_info());
        // Changed response: new high limit 0x23 (35.0), low sentinel (none)
        let text = "!ies000101000000005010192380140a&";
        let Response::DeviceSettings(settings) = Response::parse(text).unwrap().unwrap() else {
            panic!("wrong kind");
        };
        let changes = device.apply_settings(&settings);
        let special = device.special().unwrap();
        assert_eq!(special.high_limit, Some(35.0));
        assert_eq!(special.low_limit, None);
        assert!(changes.contains(&DeviceChange::HighLimit(Some(35.0))));
        assert!(changes.contains(&DeviceChange::LowLimit(None)));
    }

    #[test]
    fn test_zone_change_batches_single_entry() {
        let mut device = Device::from_info(&magnet_info());
        let mut info = magnet_info();
        info.group_number = 0x03;
        info.unit_number = 0x04;
        let changes = device.apply_info(&info);
        assert_eq!(
            changes,
            vec![DeviceChange::Zone(Zone {
                group_number: 3,
                unit_number: 4
            })]
        );
    }
}

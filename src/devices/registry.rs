// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! The collection that owns all enrolled devices.

use std::collections::HashMap;

use tracing::debug;

use crate::constants::DeviceCategory;
use crate::deviceevent::DeviceEvent;
use crate::devices::device::{Device, DeviceChange};
use crate::enums::DeviceEventCode;
use crate::error::{LifeSosError, Result};
use crate::response::{DeviceInfoResponse, DeviceSettingsResponse};

/// Outcome of feeding a device snapshot into the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    /// First time this device id was seen; a new device was created.
    Added,
    /// Existing device updated; the (possibly empty) change batch.
    Updated(Vec<DeviceChange>),
}

/// Owns every [`Device`] enrolled on the base unit, keyed by device id.
/// No device exists outside the registry once enrolled.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<u32, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: u32) -> Option<&Device> {
        self.devices.get(&device_id)
    }

    pub fn contains(&self, device_id: u32) -> bool {
        self.devices.contains_key(&device_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Number of devices per category.
    pub fn category_counts(&self) -> HashMap<DeviceCategory, usize> {
        let mut counts = HashMap::new();
        for device in self.devices.values() {
            *counts.entry(device.category()).or_insert(0) += 1;
        }
        counts
    }

    /// Create or update a device from a full snapshot response.
    pub fn upsert_from_info(&mut self, response: &DeviceInfoResponse) -> SnapshotOutcome {
        match self.devices.get_mut(&response.device_id) {
            Some(device) => SnapshotOutcome::Updated(device.apply_info(response)),
            None => {
                let device = Device::from_info(response);
                debug!("{}", device);
                self.devices.insert(response.device_id, device);
                SnapshotOutcome::Added
            }
        }
    }

    /// Apply a settings (changed/added acknowledgement) response to an
    /// existing device.
    pub fn apply_settings(
        &mut self,
        device_id: u32,
        response: &DeviceSettingsResponse,
    ) -> Result<Vec<DeviceChange>> {
        let device = self
            .devices
            .get_mut(&device_id)
            .ok_or(LifeSosError::DeviceNotFound { device_id })?;
        Ok(device.apply_settings(response))
    }

    /// Apply an unsolicited device event.
    ///
    /// Returns `None` when the device id is unknown; a normal race when
    /// the session has just connected and hasn't enumerated devices yet,
    /// or when the device was enrolled out-of-band (the base unit gives
    /// no notification for that). Otherwise returns the change batch and
    /// the recognised event code, if any.
    pub fn apply_event(
        &mut self,
        event: &DeviceEvent,
    ) -> Option<(Vec<DeviceChange>, Option<DeviceEventCode>)> {
        match self.devices.get_mut(&event.device_id) {
            Some(device) => Some((device.apply_event(event), event.event_code)),
            None => {
                debug!(
                    "Event for device not in our collection: id {:06x}",
                    event.device_id
                );
                None
            }
        }
    }

    /// Remove a device. The caller must already have confirmed the
    /// deletion over the wire.
    pub fn remove(&mut self, device_id: u32) -> Option<Device> {
        self.devices.remove(&device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;

    fn magnet_info() -> DeviceInfoResponse {
        let Response::DeviceInfo(info) = Response::parse("!kb401234560010000102440080006120&")
            .unwrap()
            .unwrap()
        else {
            panic!("wrong kind");
        };
        *info
    }

    #[test]
    fn test_upsert_adds_then_updates() {
        let mut registry = DeviceRegistry::new();
        let info = magnet_info();
        assert_eq!(registry.upsert_from_info(&info), SnapshotOutcome::Added);
        assert!(registry.contains(0x123456));
        assert_eq!(registry.len(), 1);

        // Idempotent re-application: zero change notifications
        assert_eq!(
            registry.upsert_from_info(&info),
            SnapshotOutcome::Updated(Vec::new())
        );
    }

    #[test]
    fn test_apply_event_unknown_device_is_noop() {
        let mut registry = DeviceRegistry::new();
        let event = DeviceEvent::parse("MINPIC=0a4040ffffff001061").unwrap();
        assert_eq!(registry.apply_event(&event), None);
    }

    #[test]
    fn test_apply_event_magnet_open() {
        let mut registry = DeviceRegistry::new();
        registry.upsert_from_info(&magnet_info());

        let event = DeviceEvent::parse("MINPIC=0a4040123456001061").unwrap();
        let (changes, code) = registry.apply_event(&event).unwrap();
        assert_eq!(changes, vec![DeviceChange::IsClosed(Some(false))]);
        assert_eq!(code, Some(DeviceEventCode::Open));
        assert_eq!(registry.get(0x123456).unwrap().is_closed(), Some(false));
    }

    #[test]
    fn test_apply_settings_unknown_device_errors() {
        let mut registry = DeviceRegistry::new();
        let Response::DeviceSettings(settings) = Response::parse("!ibs0201034400 8000&".replace(' ', "").as_str())
            .unwrap()
            .unwrap()
        else {
            panic!("wrong kind");
        };
        assert!(matches!(
            registry.apply_settings(0x123456, &settings),
            Err(LifeSosError::DeviceNotFound { .. })
        ));
    }

    #[test]
    fn test_remove() {
        let mut registry = DeviceRegistry::new();
        registry.upsert_from_info(&magnet_info());
        assert!(registry.remove(0x123456).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(0x123456).is_none());
    }

    #[test]
    fn test_category_counts() {
        let mut registry = DeviceRegistry::new();
        registry.upsert_from_info(&magnet_info());
        let counts = registry.category_counts();
        assert_eq!(counts.get(&DeviceCategory::Burglar), Some(&1));
        assert_eq!(counts.get(&DeviceCategory::Fire), None);
    }
}

// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! High-level management of the base unit.
//!
//! [`BaseUnit`] owns a [`ClientSession`], keeps the device registry and
//! derived properties in sync with both command responses and unsolicited
//! events, sequences startup discovery, and derives the arming state
//! (including the exit/entry delay transitions that only exist on this
//! side of the wire). Applications can use this for management and higher
//! level access, or the session types for direct protocol access.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::command::{Command, ControlLimits, SpecialSettings};
use crate::config::BaseUnitConfig;
use crate::constants::{DeviceCategory, DC_ALL};
use crate::contactid::ContactId;
use crate::deviceevent::DeviceEvent;
use crate::devices::registry::SnapshotOutcome;
use crate::devices::{Device, DeviceRegistry};
use crate::enums::{
    BaseUnitState, ContactIdEventCategory, ContactIdEventCode, ContactIdEventQualifier,
    DeviceEventCode, EsFlags, OperationMode, SsFlags, SwitchFlags, SwitchNumber, SwitchState,
    SWITCHES,
};
use crate::error::{LifeSosError, Result};
use crate::event::{BaseUnitChange, BaseUnitEvent, BaseUnitEventReceiver, SessionEvent};
use crate::response::{
    DeviceInfoResponse, DeviceSettingsKind, EventLogResponse, Response, SensorLogResponse,
};
use crate::session::ClientSession;

/// Scalar properties of the base unit, diffed by hand so each update
/// emits one batched change notification.
#[derive(Debug, Default)]
struct UnitProps {
    is_connected: bool,
    rom_version: Option<String>,
    operation_mode: Option<OperationMode>,
    state: Option<BaseUnitState>,
    exit_delay: Option<u8>,
    entry_delay: Option<u8>,
}

impl UnitProps {
    fn set_is_connected(&mut self, value: bool, changes: &mut Vec<BaseUnitChange>) {
        if self.is_connected != value {
            self.is_connected = value;
            changes.push(BaseUnitChange::IsConnected(value));
        }
    }

    fn set_rom_version(&mut self, value: Option<String>, changes: &mut Vec<BaseUnitChange>) {
        if self.rom_version != value {
            self.rom_version = value.clone();
            changes.push(BaseUnitChange::RomVersion(value));
        }
    }

    fn set_operation_mode(
        &mut self,
        value: Option<OperationMode>,
        changes: &mut Vec<BaseUnitChange>,
    ) {
        if self.operation_mode != value {
            self.operation_mode = value;
            changes.push(BaseUnitChange::OperationMode(value));
        }
    }

    fn set_state(&mut self, value: Option<BaseUnitState>, changes: &mut Vec<BaseUnitChange>) {
        if self.state != value {
            self.state = value;
            changes.push(BaseUnitChange::State(value));
        }
    }

    fn set_exit_delay(&mut self, value: Option<u8>, changes: &mut Vec<BaseUnitChange>) {
        if self.exit_delay != value {
            self.exit_delay = value;
            changes.push(BaseUnitChange::ExitDelay(value));
        }
    }

    fn set_entry_delay(&mut self, value: Option<u8>, changes: &mut Vec<BaseUnitChange>) {
        if self.entry_delay != value {
            self.entry_delay = value;
            changes.push(BaseUnitChange::EntryDelay(value));
        }
    }
}

struct BaseUnitInner {
    session: Arc<ClientSession>,
    devices: RwLock<DeviceRegistry>,
    props: RwLock<UnitProps>,
    switch_state: RwLock<HashMap<SwitchNumber, Option<bool>>>,
    event_tx: broadcast::Sender<BaseUnitEvent>,
    shutdown_rx: watch::Receiver<bool>,
    discovery_retries: u32,
}

/// Represents the base unit.
///
/// Provides all management of the LifeSOS alarm system: monitors attached
/// devices and events, issues commands, and reconnects automatically on
/// failure.
pub struct BaseUnit {
    inner: Arc<BaseUnitInner>,
    shutdown_tx: watch::Sender<bool>,
}

impl BaseUnit {
    /// Allow this many retries for each query when getting initial state.
    pub const RETRY_MAX: u32 = 3;

    pub fn new(config: BaseUnitConfig) -> Self {
        let session = Arc::new(ClientSession::new(&config));
        let (event_tx, _) = broadcast::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut switch_state = HashMap::new();
        for switch_number in SWITCHES {
            switch_state.insert(switch_number, None);
        }
        let inner = Arc::new(BaseUnitInner {
            session,
            devices: RwLock::new(DeviceRegistry::new()),
            props: RwLock::new(UnitProps::default()),
            switch_state: RwLock::new(switch_state),
            event_tx,
            shutdown_rx,
            discovery_retries: config.discovery_retries,
        });
        Self { inner, shutdown_tx }
    }

    /// Start monitoring the base unit: opens the connection (reconnecting
    /// as needed) and runs discovery after each successful connect.
    pub fn start(&self) {
        let inner = self.inner.clone();
        let mut events = inner.session.subscribe();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = events.recv() => event,
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                };
                match event {
                    Ok(event) => inner.clone().handle_session_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Event consumer lagged; {} events missed", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Base unit event loop stopped");
        });
        self.inner.session.start();
    }

    /// Stop monitoring the base unit.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.inner.session.close().await;
    }

    /// Subscribe to base unit events.
    pub fn subscribe(&self) -> BaseUnitEventReceiver {
        self.inner.event_tx.subscribe()
    }

    // --- Properties ---

    pub fn host(&self) -> &str {
        self.inner.session.host()
    }

    pub fn port(&self) -> u16 {
        self.inner.session.port()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.props.read().await.is_connected
    }

    /// ROM version reported by the base unit.
    pub async fn rom_version(&self) -> Option<String> {
        self.inner.props.read().await.rom_version.clone()
    }

    pub async fn operation_mode(&self) -> Option<OperationMode> {
        self.inner.props.read().await.operation_mode
    }

    /// Current state, including the transitional exit/entry delay states.
    /// Unknown until the first mode query after connecting.
    pub async fn state(&self) -> Option<BaseUnitState> {
        self.inner.props.read().await.state
    }

    /// Exit delay, in seconds.
    pub async fn exit_delay(&self) -> Option<u8> {
        self.inner.props.read().await.exit_delay
    }

    /// Entry delay, in seconds.
    pub async fn entry_delay(&self) -> Option<u8> {
        self.inner.props.read().await.entry_delay
    }

    /// Snapshot of a device by id.
    pub async fn device(&self, device_id: u32) -> Option<Device> {
        self.inner.devices.read().await.get(device_id).cloned()
    }

    /// Snapshot of all enrolled devices.
    pub async fn devices(&self) -> Vec<Device> {
        self.inner.devices.read().await.iter().cloned().collect()
    }

    /// Number of enrolled devices per category.
    pub async fn device_counts(&self) -> HashMap<DeviceCategory, usize> {
        self.inner.devices.read().await.category_counts()
    }

    /// Current state for each switch; `None` means unknown.
    pub async fn switch_state(&self) -> HashMap<SwitchNumber, Option<bool>> {
        self.inner.switch_state.read().await.clone()
    }

    // --- Commands ---

    /// Clear the alarm/warning LEDs on the base unit and stop the siren.
    pub async fn clear_status(&self, password: Option<&str>) -> Result<()> {
        self.inner
            .session
            .execute(Command::ClearStatus, password, None)
            .await?;
        Ok(())
    }

    /// Enroll a new device; the base unit starts listening for it.
    pub async fn add_device(&self, category: DeviceCategory) -> Result<()> {
        self.inner
            .session
            .execute(Command::AddDevice { category }, None, None)
            .await?;
        Ok(())
    }

    /// Change settings for a device.
    ///
    /// Special devices are routed through
    /// [`change_special_device`](Self::change_special_device) with their
    /// current analog settings preserved.
    pub async fn change_device(
        &self,
        device_id: u32,
        group_number: u8,
        unit_number: u8,
        enable_status: EsFlags,
        switches: SwitchFlags,
    ) -> Result<()> {
        let device = self
            .device(device_id)
            .await
            .ok_or(LifeSosError::DeviceNotFound { device_id })?;

        if let Some(special) = device.special() {
            let special = special.clone();
            return self
                .change_special_device(
                    device_id,
                    group_number,
                    unit_number,
                    enable_status,
                    switches,
                    special.special_status.unwrap_or(SsFlags::empty()),
                    special.high_limit,
                    special.low_limit,
                    special.control_high_limit,
                    special.control_low_limit,
                )
                .await;
        }

        let info = self.fetch_info_by_zone(&device).await?;
        let response = self
            .inner
            .session
            .execute(
                Command::ChangeDevice {
                    category: device.category(),
                    index: info.index.unwrap_or_default(),
                    group_number,
                    unit_number,
                    enable_status,
                    switches,
                    special: None,
                },
                None,
                None,
            )
            .await?;
        self.inner.apply_change_response(device_id, response).await
    }

    /// Change settings for a Special device, including its analog limits.
    #[allow(clippy::too_many_arguments)]
    pub async fn change_special_device(
        &self,
        device_id: u32,
        group_number: u8,
        unit_number: u8,
        enable_status: EsFlags,
        switches: SwitchFlags,
        special_status: SsFlags,
        high_limit: Option<f64>,
        low_limit: Option<f64>,
        control_high_limit: Option<f64>,
        control_low_limit: Option<f64>,
    ) -> Result<()> {
        let device = self
            .device(device_id)
            .await
            .ok_or(LifeSosError::DeviceNotFound { device_id })?;
        if device.special().is_none() {
            return Err(LifeSosError::NotSpecialDevice { device_id });
        }

        let info = self.fetch_info_by_zone(&device).await?;
        // Control limits are only sent when the firmware keeps them
        let control_limits = info.control_limit_fields_exist.then_some(ControlLimits {
            high: control_high_limit,
            low: control_low_limit,
        });
        let response = self
            .inner
            .session
            .execute(
                Command::ChangeDevice {
                    category: device.category(),
                    index: info.index.unwrap_or_default(),
                    group_number,
                    unit_number,
                    enable_status,
                    switches,
                    special: Some(SpecialSettings {
                        current_status: info.current_status,
                        down_count: info.down_count,
                        message_attribute: info.message_attribute,
                        current_reading: info.current_reading,
                        special_status,
                        high_limit,
                        low_limit,
                        control_limits,
                    }),
                },
                None,
                None,
            )
            .await?;
        self.inner.apply_change_response(device_id, response).await
    }

    /// Delete an enrolled device.
    pub async fn delete_device(&self, device_id: u32) -> Result<()> {
        let device = self
            .device(device_id)
            .await
            .ok_or(LifeSosError::DeviceNotFound { device_id })?;
        let info = self.fetch_info_by_zone(&device).await?;
        let response = self
            .inner
            .session
            .execute(
                Command::DeleteDevice {
                    category: device.category(),
                    index: info.index.unwrap_or_default(),
                },
                None,
                None,
            )
            .await?;
        match response {
            Response::DeviceDeleted { .. } => {
                self.inner.devices.write().await.remove(device_id);
                let _ = self
                    .inner
                    .event_tx
                    .send(BaseUnitEvent::DeviceDeleted { device_id });
                Ok(())
            }
            Response::DeviceNotFound { .. } => Err(LifeSosError::DeviceNotFound { device_id }),
            other => Err(LifeSosError::InvalidResponse {
                details: format!("Unexpected response to delete: {:?}", other),
            }),
        }
    }

    /// Get an entry from the event log, or `None` past the end.
    pub async fn get_event_log(&self, index: u16) -> Result<Option<EventLogResponse>> {
        let response = self
            .inner
            .session
            .execute(Command::GetEventLog { index }, None, None)
            .await?;
        match response {
            Response::EventLog(entry) => Ok(Some(*entry)),
            _ => Ok(None),
        }
    }

    /// Get an entry from the Special sensor log, or `None` past the end.
    pub async fn get_sensor_log(&self, index: u16) -> Result<Option<SensorLogResponse>> {
        let response = self
            .inner
            .session
            .execute(Command::GetSensorLog { index }, None, None)
            .await?;
        match response {
            Response::SensorLog(entry) => Ok(Some(entry)),
            _ => Ok(None),
        }
    }

    /// Set the date/time on the base unit; `None` uses the current local
    /// time.
    pub async fn set_datetime(&self, value: Option<chrono::NaiveDateTime>) -> Result<()> {
        self.inner
            .session
            .execute(Command::SetDateTime { value }, None, None)
            .await?;
        Ok(())
    }

    /// Set the operation mode on the base unit.
    pub async fn set_operation_mode(
        &self,
        mode: OperationMode,
        password: Option<&str>,
    ) -> Result<()> {
        self.inner
            .session
            .execute(Command::SetOpMode { mode }, password, None)
            .await?;
        Ok(())
    }

    /// Turn a switch on or off.
    pub async fn set_switch_state(&self, switch_number: SwitchNumber, on: bool) -> Result<()> {
        let state = if on { SwitchState::On } else { SwitchState::Off };
        self.inner
            .session
            .execute(
                Command::SetSwitch {
                    switch_number,
                    state,
                },
                None,
                None,
            )
            .await?;
        Ok(())
    }

    // Get-by-zone provides an accurate index for change/delete commands;
    // the index from discovery goes stale when devices above it are
    // deleted.
    async fn fetch_info_by_zone(&self, device: &Device) -> Result<DeviceInfoResponse> {
        let response = self
            .inner
            .session
            .execute(
                Command::GetDeviceByZone {
                    category: device.category(),
                    group_number: device.group_number(),
                    unit_number: device.unit_number(),
                },
                None,
                None,
            )
            .await?;
        match response {
            Response::DeviceInfo(info) => Ok(*info),
            Response::DeviceNotFound { .. } => Err(LifeSosError::DeviceNotFound {
                device_id: device.device_id(),
            }),
            other => Err(LifeSosError::InvalidResponse {
                details: format!("Unexpected response to device query: {:?}", other),
            }),
        }
    }
}

impl BaseUnitInner {
    async fn handle_session_event(self: Arc<Self>, event: SessionEvent) {
        match event {
            SessionEvent::ConnectionMade => {
                info!("Connected successfully");
                self.update_props(|props, changes| props.set_is_connected(true, changes))
                    .await;
                // Get initial state info and find devices
                let inner = self.clone();
                tokio::spawn(async move { inner.get_initial_state().await });
            }
            SessionEvent::ConnectionLost => {
                self.update_props(|props, changes| {
                    props.set_is_connected(false, changes);
                    // Mode is unknown until the next query succeeds
                    props.set_operation_mode(None, changes);
                    props.set_state(None, changes);
                })
                .await;
            }
            SessionEvent::Response { response, .. } => self.handle_response(response).await,
            SessionEvent::DeviceEvent(event) => self.handle_device_event(&event).await,
            SessionEvent::ContactId(contact_id) => self.handle_contact_id(&contact_id).await,
        }
    }

    async fn update_props(&self, f: impl FnOnce(&mut UnitProps, &mut Vec<BaseUnitChange>)) {
        let mut changes = Vec::new();
        {
            let mut props = self.props.write().await;
            f(&mut props, &mut changes);
        }
        if !changes.is_empty() {
            let _ = self
                .event_tx
                .send(BaseUnitEvent::PropertiesChanged { changes });
        }
    }

    async fn handle_response(&self, response: Response) {
        match response {
            Response::RomVersion { version } => {
                self.update_props(|props, changes| {
                    props.set_rom_version(Some(version), changes)
                })
                .await;
            }
            Response::OpMode(op) => {
                self.update_props(|props, changes| {
                    props.set_operation_mode(op.operation_mode, changes);
                    props.set_state(
                        op.operation_mode.map(BaseUnitState::from_operation_mode),
                        changes,
                    );
                })
                .await;
            }
            Response::ExitDelay { seconds, .. } => {
                self.update_props(|props, changes| {
                    props.set_exit_delay(Some(seconds), changes)
                })
                .await;
            }
            Response::EntryDelay { seconds, .. } => {
                self.update_props(|props, changes| {
                    props.set_entry_delay(Some(seconds), changes)
                })
                .await;
            }
            Response::DateTime(dt) => {
                if dt.was_set {
                    info!("Remote date/time was set to {}", dt.remote_datetime);
                }
            }
            Response::DeviceInfo(info) => {
                let outcome = self.devices.write().await.upsert_from_info(&info);
                match outcome {
                    SnapshotOutcome::Added => {
                        let _ = self.event_tx.send(BaseUnitEvent::DeviceAdded {
                            device_id: info.device_id,
                        });
                    }
                    SnapshotOutcome::Updated(changes) => {
                        if !changes.is_empty() {
                            let _ = self.event_tx.send(BaseUnitEvent::DeviceChanged {
                                device_id: info.device_id,
                                changes,
                            });
                        }
                    }
                }
            }
            Response::DeviceSettings(settings) if settings.kind == DeviceSettingsKind::Added => {
                // A new device enrolled; the settings payload is not enough,
                // so fetch the full snapshot
                let category = settings.device_category;
                let index = settings.index;
                let session = self.session.clone();
                tokio::spawn(async move {
                    if let Err(e) = session
                        .execute(Command::GetDeviceByIndex { category, index }, None, None)
                        .await
                    {
                        error!(
                            "Failed to get new {} device #{}: {}",
                            category.description(),
                            index,
                            e
                        );
                    }
                });
            }
            Response::Switch(switch) => {
                let state = switch.switch_state.map(|s| s == SwitchState::On);
                self.set_switch_state(switch.switch_number, state).await;
            }
            _ => {}
        }
    }

    async fn handle_device_event(&self, event: &DeviceEvent) {
        // There is a chance the device is unknown: either we connected and
        // haven't enumerated devices yet, or it was enrolled out-of-band
        // (the base unit gives no notification for that). Nothing to do in
        // either case.
        let applied = self.devices.write().await.apply_event(event);
        let Some((changes, event_code)) = applied else {
            return;
        };
        if !changes.is_empty() {
            let _ = self.event_tx.send(BaseUnitEvent::DeviceChanged {
                device_id: event.device_id,
                changes,
            });
        }
        if let Some(event_code) = event_code {
            let _ = self.event_tx.send(BaseUnitEvent::DeviceEvent {
                device_id: event.device_id,
                event_code,
            });
        }

        let device = match self.devices.read().await.get(event.device_id) {
            Some(device) => device.clone(),
            None => return,
        };
        let (operation_mode, state, exit_delay, entry_delay) = {
            let props = self.props.read().await;
            (
                props.operation_mode,
                props.state,
                props.exit_delay,
                props.entry_delay,
            )
        };

        match event_code {
            // A remote controller mode change normally takes effect
            // immediately, unless switching to Away with an exit delay
            // configured, in which case the Away transition is deferred
            // until the base unit confirms it
            Some(DeviceEventCode::Away) if operation_mode != Some(OperationMode::Away) => {
                let deferred = device.category() == DeviceCategory::Controller
                    && !device.enable_status().contains(EsFlags::BYPASS)
                    && device.enable_status().contains(EsFlags::DELAY)
                    && exit_delay.is_some_and(|delay| delay > 0);
                if deferred {
                    self.update_props(|props, changes| {
                        props.set_state(Some(BaseUnitState::AwayExitDelay), changes)
                    })
                    .await;
                } else {
                    self.update_props(|props, changes| {
                        props.set_operation_mode(Some(OperationMode::Away), changes);
                        props.set_state(Some(BaseUnitState::Away), changes);
                    })
                    .await;
                }
            }
            Some(DeviceEventCode::Home) => {
                self.update_props(|props, changes| {
                    props.set_operation_mode(Some(OperationMode::Home), changes);
                    props.set_state(Some(BaseUnitState::Home), changes);
                })
                .await;
            }
            Some(DeviceEventCode::Disarm) => {
                self.update_props(|props, changes| {
                    props.set_operation_mode(Some(OperationMode::Disarm), changes);
                    props.set_state(Some(BaseUnitState::Disarm), changes);
                })
                .await;
            }
            _ => {}
        }

        // A burglar sensor tripped while in Away mode with an entry delay
        // configured delays the alarm
        if matches!(
            event_code,
            Some(DeviceEventCode::Trigger) | Some(DeviceEventCode::Open)
        ) && operation_mode == Some(OperationMode::Away)
            && state != Some(BaseUnitState::AwayEntryDelay)
        {
            let delayed = device.category() == DeviceCategory::Burglar
                && !device.enable_status().contains(EsFlags::BYPASS)
                && device.enable_status().contains(EsFlags::DELAY)
                && !device.enable_status().contains(EsFlags::INACTIVITY)
                && entry_delay.is_some_and(|delay| delay > 0);
            if delayed {
                self.update_props(|props, changes| {
                    props.set_state(Some(BaseUnitState::AwayEntryDelay), changes)
                })
                .await;
            }
        }
    }

    async fn handle_contact_id(&self, contact_id: &ContactId) {
        // Skip when the event code is unrecognised
        let Some(event_code) = contact_id.event_code else {
            return;
        };

        match event_code {
            ContactIdEventCode::Away | ContactIdEventCode::AwayQuickArm => {
                self.update_props(|props, changes| {
                    props.set_operation_mode(Some(OperationMode::Away), changes);
                    props.set_state(Some(BaseUnitState::Away), changes);
                })
                .await;
            }
            ContactIdEventCode::Home => {
                self.update_props(|props, changes| {
                    props.set_operation_mode(Some(OperationMode::Home), changes);
                    props.set_state(Some(BaseUnitState::Home), changes);
                })
                .await;
            }
            ContactIdEventCode::Disarm => {
                self.update_props(|props, changes| {
                    props.set_operation_mode(Some(OperationMode::Disarm), changes);
                    props.set_state(Some(BaseUnitState::Disarm), changes);
                })
                .await;
            }
            ContactIdEventCode::MonitorMode => {
                self.update_props(|props, changes| {
                    props.set_operation_mode(Some(OperationMode::Monitor), changes);
                    props.set_state(Some(BaseUnitState::Monitor), changes);
                })
                .await;
            }
            _ => {
                // An alarm fired while the entry delay was pending returns
                // the state to Away
                if contact_id.event_category() == Some(ContactIdEventCategory::Alarm)
                    && contact_id.event_qualifier == Some(ContactIdEventQualifier::Event)
                    && self.props.read().await.state == Some(BaseUnitState::AwayEntryDelay)
                {
                    self.update_props(|props, changes| {
                        props.set_state(Some(BaseUnitState::Away), changes)
                    })
                    .await;
                }
            }
        }

        let _ = self
            .event_tx
            .send(BaseUnitEvent::Event(contact_id.clone()));
    }

    async fn set_switch_state(&self, switch_number: SwitchNumber, new_state: Option<bool>) {
        {
            let mut switch_state = self.switch_state.write().await;
            let old_state = switch_state.get(&switch_number).copied().flatten();
            if old_state == new_state {
                return;
            }
            switch_state.insert(switch_number, new_state);
        }
        debug!("Switch {:?} changed to {:?}", switch_number, new_state);
        let _ = self.event_tx.send(BaseUnitEvent::SwitchStateChanged {
            switch_number,
            state: new_state,
        });
    }

    /// Discover devices and get the initial state after connecting.
    async fn get_initial_state(&self) {
        info!("Discovering devices and getting initial state...");

        // ROM version may be useful for determining features supported by
        // the base unit, and helps when diagnosing issues
        self.execute_retry(Command::GetRomVersion, "Failed to get ROM version")
            .await;

        self.execute_retry(Command::GetOpMode, "Failed to get initial operation mode")
            .await;
        self.execute_retry(Command::GetExitDelay, "Failed to get exit delay")
            .await;
        self.execute_retry(Command::GetEntryDelay, "Failed to get entry delay")
            .await;

        // Iterate through all enrolled devices
        'categories: for category in DC_ALL {
            let Some(max_devices) = category.max_devices() else {
                continue;
            };
            for index in 0..max_devices {
                let response = self
                    .execute_retry(
                        Command::GetDeviceByIndex { category, index },
                        &format!(
                            "Failed to get {} device #{}",
                            category.description(),
                            index
                        ),
                    )
                    .await;
                match response {
                    Some(Response::DeviceNotFound { .. }) => break,
                    Some(_) => {}
                    None => {
                        if !self.session.is_connected() {
                            break 'categories;
                        }
                        break;
                    }
                }
            }
        }

        // Initial state for each switch
        for switch_number in SWITCHES {
            self.execute_retry(
                Command::GetSwitch { switch_number },
                &format!("Failed to get initial switch {:?} state", switch_number),
            )
            .await;
        }

        info!("Device discovery completed and got initial state");
    }

    // Execute a command, retrying on transient errors up to the attempt
    // limit. The serial cable between base unit and adapter is unshielded
    // on some installations, so the occasional garbled response is normal.
    async fn execute_retry(&self, command: Command, error_message: &str) -> Option<Response> {
        for attempt in 1..=self.discovery_retries {
            if *self.shutdown_rx.borrow() || !self.session.is_connected() {
                return None;
            }
            match self.session.execute(command.clone(), None, None).await {
                Ok(response) => return Some(response),
                Err(LifeSosError::NotConnected) | Err(LifeSosError::Disconnected) => {
                    // Connection went away; no point retrying
                    return None;
                }
                Err(e) => {
                    error!(
                        "{} [Attempt {}/{}]: {}",
                        error_message, attempt, self.discovery_retries, e
                    );
                }
            }
        }
        None
    }

    // Responses handled by the change flows directly rather than via the
    // event pump, so the registry update happens before the caller returns
    async fn apply_change_response(&self, device_id: u32, response: Response) -> Result<()> {
        match response {
            Response::DeviceSettings(settings) => {
                let changes = self
                    .devices
                    .write()
                    .await
                    .apply_settings(device_id, &settings)?;
                if !changes.is_empty() {
                    let _ = self
                        .event_tx
                        .send(BaseUnitEvent::DeviceChanged { device_id, changes });
                }
                Ok(())
            }
            Response::DeviceNotFound { .. } => Err(LifeSosError::DeviceNotFound { device_id }),
            other => Err(LifeSosError::InvalidResponse {
                details: format!("Unexpected response to change: {:?}", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;

    fn test_unit() -> BaseUnit {
        BaseUnit::new(BaseUnitConfig::default())
    }

    async fn seed_props(
        unit: &BaseUnit,
        mode: Option<OperationMode>,
        state: Option<BaseUnitState>,
        exit_delay: Option<u8>,
        entry_delay: Option<u8>,
    ) {
        let mut props = unit.inner.props.write().await;
        props.operation_mode = mode;
        props.state = state;
        props.exit_delay = exit_delay;
        props.entry_delay = entry_delay;
    }

    async fn seed_burglar_with_delay(unit: &BaseUnit) {
        // Burglar magnet with Delay set, Bypass and Inactivity clear
        let Response::DeviceInfo(info) = Response::parse("!kb401234560010000102440080006120&")
            .unwrap()
            .unwrap()
        else {
            panic!("wrong kind");
        };
        unit.inner.devices.write().await.upsert_from_info(&info);
    }

    async fn seed_controller_with_delay(unit: &BaseUnit) {
        // Remote controller, Delay set, Bypass clear
        let Response::DeviceInfo(info) = Response::parse("!kc10654321001000010144000000612 0&".replace(' ', "").as_str())
            .unwrap()
            .unwrap()
        else {
            panic!("wrong kind");
        };
        unit.inner.devices.write().await.upsert_from_info(&info);
    }

    #[tokio::test]
    async fn test_op_mode_response_updates_state() {
        let unit = test_unit();
        unit.inner
            .handle_response(Response::parse("!n02&").unwrap().unwrap())
            .await;
        assert_eq!(unit.operation_mode().await, Some(OperationMode::Away));
        assert_eq!(unit.state().await, Some(BaseUnitState::Away));
    }

    #[tokio::test]
    async fn test_rom_version_and_delays() {
        let unit = test_unit();
        unit.inner
            .handle_response(Response::parse("!vn1.00&").unwrap().unwrap())
            .await;
        unit.inner
            .handle_response(Response::parse("!l00f&").unwrap().unwrap())
            .await;
        unit.inner
            .handle_response(Response::parse("!l10a&").unwrap().unwrap())
            .await;
        assert_eq!(unit.rom_version().await.as_deref(), Some("1.00"));
        assert_eq!(unit.exit_delay().await, Some(15));
        assert_eq!(unit.entry_delay().await, Some(10));
    }

    #[tokio::test]
    async fn test_device_info_adds_device_and_emits_event() {
        let unit = test_unit();
        let mut events = unit.subscribe();
        unit.inner
            .handle_response(Response::parse("!kb401234560010000102440080006120&").unwrap().unwrap())
            .await;
        assert!(unit.device(0x123456).await.is_some());
        assert!(matches!(
            events.recv().await.unwrap(),
            BaseUnitEvent::DeviceAdded {
                device_id: 0x123456
            }
        ));
    }

    #[tokio::test]
    async fn test_magnet_open_event_emits_single_change_batch() {
        let unit = test_unit();
        seed_burglar_with_delay(&unit).await;
        let mut events = unit.subscribe();

        let event = DeviceEvent::parse("MINPIC=0a4040123456001061").unwrap();
        unit.inner.handle_device_event(&event).await;

        let BaseUnitEvent::DeviceChanged { device_id, changes } = events.recv().await.unwrap()
        else {
            panic!("expected change batch first");
        };
        assert_eq!(device_id, 0x123456);
        assert_eq!(
            changes,
            vec![crate::devices::DeviceChange::IsClosed(Some(false))]
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            BaseUnitEvent::DeviceEvent {
                event_code: DeviceEventCode::Open,
                ..
            }
        ));
        assert_eq!(
            unit.device(0x123456).await.unwrap().is_closed(),
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_entry_delay_dance() {
        let unit = test_unit();
        seed_burglar_with_delay(&unit).await;
        seed_props(
            &unit,
            Some(OperationMode::Away),
            Some(BaseUnitState::Away),
            Some(15),
            Some(15),
        )
        .await;

        // Burglar Trigger while Away with Delay set and entry delay > 0
        let event = DeviceEvent::parse("MINPIC=0a5840123456001061").unwrap();
        unit.inner.handle_device_event(&event).await;
        assert_eq!(unit.state().await, Some(BaseUnitState::AwayEntryDelay));
        // Operation mode itself is untouched
        assert_eq!(unit.operation_mode().await, Some(OperationMode::Away));

        // Alarm-category Event while pending: back to Away
        let contact_id = ContactId::parse("123418113101102b").unwrap();
        unit.inner.handle_contact_id(&contact_id).await;
        assert_eq!(unit.state().await, Some(BaseUnitState::Away));
    }

    #[tokio::test]
    async fn test_entry_delay_requires_flags() {
        let unit = test_unit();
        // Device with Delay flag clear: enable 0400 only
        let Response::DeviceInfo(info) = Response::parse("!kb401234560010000102040080006120&")
            .unwrap()
            .unwrap()
        else {
            panic!("wrong kind");
        };
        unit.inner.devices.write().await.upsert_from_info(&info);
        seed_props(
            &unit,
            Some(OperationMode::Away),
            Some(BaseUnitState::Away),
            Some(15),
            Some(15),
        )
        .await;

        let event = DeviceEvent::parse("MINPIC=0a5840123456001061").unwrap();
        unit.inner.handle_device_event(&event).await;
        assert_eq!(unit.state().await, Some(BaseUnitState::Away));
    }

    #[tokio::test]
    async fn test_exit_delay_defers_away_transition() {
        let unit = test_unit();
        seed_controller_with_delay(&unit).await;
        seed_props(
            &unit,
            Some(OperationMode::Disarm),
            Some(BaseUnitState::Disarm),
            Some(10),
            None,
        )
        .await;

        // Controller Away event with exit delay configured
        let event = DeviceEvent::parse("MINPIC=0a1010654321001061").unwrap();
        unit.inner.handle_device_event(&event).await;
        assert_eq!(unit.state().await, Some(BaseUnitState::AwayExitDelay));
        // Mode change deferred
        assert_eq!(unit.operation_mode().await, Some(OperationMode::Disarm));

        // Explicit confirmation arrives later
        unit.inner
            .handle_response(Response::parse("!n02&").unwrap().unwrap())
            .await;
        assert_eq!(unit.state().await, Some(BaseUnitState::Away));
        assert_eq!(unit.operation_mode().await, Some(OperationMode::Away));
    }

    #[tokio::test]
    async fn test_exit_delay_zero_is_immediate() {
        let unit = test_unit();
        seed_controller_with_delay(&unit).await;
        seed_props(
            &unit,
            Some(OperationMode::Disarm),
            Some(BaseUnitState::Disarm),
            Some(0),
            None,
        )
        .await;

        let event = DeviceEvent::parse("MINPIC=0a1010654321001061").unwrap();
        unit.inner.handle_device_event(&event).await;
        assert_eq!(unit.state().await, Some(BaseUnitState::Away));
        assert_eq!(unit.operation_mode().await, Some(OperationMode::Away));
    }

    #[tokio::test]
    async fn test_contact_id_mode_changes() {
        let unit = test_unit();
        // Disarm via ContactID 0x573: body "12341815730005xx"
        let contact_id = contact_with_code("573", "1");
        unit.inner.handle_contact_id(&contact_id).await;
        assert_eq!(unit.operation_mode().await, Some(OperationMode::Disarm));
        assert_eq!(unit.state().await, Some(BaseUnitState::Disarm));
    }

    fn contact_with_code(code: &str, qualifier: &str) -> ContactId {
        // account 1234, type 18, then qualifier + code + group 00 +
        // base unit category (5) + user 00
        let body15 = format!("123418{}{}00500", qualifier, code);
        let sum: u32 = body15
            .chars()
            .map(|c| {
                let d = c.to_digit(16).unwrap();
                if d != 0 {
                    d
                } else {
                    10
                }
            })
            .sum();
        let mut digit = 15 - (sum % 15);
        if digit == 0 {
            digit = 15;
        }
        let text = format!(
            "{}{}",
            body15,
            std::char::from_digit(digit, 16).unwrap()
        );
        ContactId::parse(&text).unwrap()
    }

    #[tokio::test]
    async fn test_switch_response_updates_state_once() {
        let unit = test_unit();
        let mut events = unit.subscribe();
        let response = Response::parse("!s64&").unwrap().unwrap();
        unit.inner.handle_response(response.clone()).await;
        assert!(matches!(
            events.recv().await.unwrap(),
            BaseUnitEvent::SwitchStateChanged {
                switch_number: SwitchNumber::Sw01,
                state: Some(true)
            }
        ));
        assert_eq!(
            unit.switch_state().await.get(&SwitchNumber::Sw01),
            Some(&Some(true))
        );
        // Unchanged state: no further event
        unit.inner.handle_response(response).await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_unknown_device_event_is_ignored() {
        let unit = test_unit();
        let mut events = unit.subscribe();
        let event = DeviceEvent::parse("MINPIC=0a4040ffffff001061").unwrap();
        unit.inner.handle_device_event(&event).await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_change_device_unknown_id_errors() {
        let unit = test_unit();
        let result = unit
            .change_device(0xdeadbf, 1, 1, EsFlags::empty(), SwitchFlags::empty())
            .await;
        assert!(matches!(result, Err(LifeSosError::DeviceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_change_special_device_rejects_other_categories() {
        let unit = test_unit();
        seed_burglar_with_delay(&unit).await;
        let result = unit
            .change_special_device(
                0x123456,
                1,
                1,
                EsFlags::empty(),
                SwitchFlags::empty(),
                SsFlags::empty(),
                None,
                None,
                None,
                None,
            )
            .await;
        assert!(matches!(
            result,
            Err(LifeSosError::NotSpecialDevice { .. })
        ));
    }
}

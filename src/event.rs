// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! Event types broadcast by sessions and the base unit handle.

use crate::command::Command;
use crate::contactid::ContactId;
use crate::deviceevent::DeviceEvent;
use crate::devices::DeviceChange;
use crate::enums::{BaseUnitState, DeviceEventCode, OperationMode, SwitchNumber};
use crate::response::Response;

/// Events emitted by a session.
///
/// Subscribe via `session.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<SessionEvent>`. Any number of
/// consumers may subscribe; slow consumers miss events rather than
/// blocking the receive loop.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// TCP connection established.
    ConnectionMade,
    /// TCP connection lost or closed.
    ConnectionLost,
    /// A response arrived. `command` is the command instance supplied on
    /// the call to execute, or `None` when the response was due to a
    /// command from another client sharing the adapter.
    Response {
        response: Response,
        command: Option<Command>,
    },
    /// An unsolicited event from an enrolled device.
    DeviceEvent(DeviceEvent),
    /// An alarm report using the ContactID protocol.
    ContactId(ContactId),
}

pub type EventSender = tokio::sync::broadcast::Sender<SessionEvent>;
pub type EventReceiver = tokio::sync::broadcast::Receiver<SessionEvent>;

/// Create a new session event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}

/// A changed base-unit property, carrying its new value.
#[derive(Debug, Clone, PartialEq)]
pub enum BaseUnitChange {
    IsConnected(bool),
    RomVersion(Option<String>),
    OperationMode(Option<OperationMode>),
    State(Option<BaseUnitState>),
    ExitDelay(Option<u8>),
    EntryDelay(Option<u8>),
}

/// Events emitted by a [`BaseUnit`](crate::baseunit::BaseUnit).
#[derive(Debug, Clone)]
pub enum BaseUnitEvent {
    /// A device was discovered or newly enrolled.
    DeviceAdded { device_id: u32 },
    /// A device was deleted after wire confirmation.
    DeviceDeleted { device_id: u32 },
    /// One batch of property changes for a device, from a single wire
    /// message.
    DeviceChanged {
        device_id: u32,
        changes: Vec<DeviceChange>,
    },
    /// A device raised a recognised event.
    DeviceEvent {
        device_id: u32,
        event_code: DeviceEventCode,
    },
    /// One batch of base-unit property changes.
    PropertiesChanged { changes: Vec<BaseUnitChange> },
    /// An alarm report with a recognised event code.
    Event(ContactId),
    /// A switch changed state; `None` means unknown.
    SwitchStateChanged {
        switch_number: SwitchNumber,
        state: Option<bool>,
    },
}

pub type BaseUnitEventSender = tokio::sync::broadcast::Sender<BaseUnitEvent>;
pub type BaseUnitEventReceiver = tokio::sync::broadcast::Receiver<BaseUnitEvent>;

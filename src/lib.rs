// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! # lifesos-lan-bridge
//!
//! Direct TCP/IP communication with LifeSOS alarm base units
//! (LS-10, LS-20, LS-30) through their serial-ethernet adapter.
//!
//! The library maintains a persistent connection, issues request/response
//! commands, decodes the unsolicited event messages the base unit emits,
//! and keeps an in-memory mirror of every enrolled device synchronized
//! with the remote unit. No external dependencies beyond tokio, thiserror,
//! tracing, bitflags and chrono.
//!
//! ## Quick Start
//!
//! ```no_run
//! use lifesos_lan_bridge::{BaseUnit, BaseUnitConfig, BaseUnitEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BaseUnitConfig::builder()
//!         .host("192.168.1.100")
//!         .port(1680)
//!         .password("")
//!         .build();
//!
//!     let unit = BaseUnit::new(config);
//!
//!     let mut events = unit.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             match event {
//!                 BaseUnitEvent::Event(contact_id) => println!("{}", contact_id),
//!                 other => println!("{:?}", other),
//!             }
//!         }
//!     });
//!
//!     unit.start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     unit.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! For protocol-level access without the management layer, use
//! [`ClientSession`] directly (or [`ServerSession`] when the ethernet
//! adapter is configured in TCP-client mode and dials us instead).

pub mod baseunit;
pub mod codec;
pub mod command;
pub mod config;
pub mod constants;
pub mod contactid;
pub mod deviceevent;
pub mod devices;
pub mod enums;
pub mod error;
pub mod event;
pub mod protocol;
pub mod response;
pub mod session;

// Re-exports for convenience
pub use baseunit::BaseUnit;
pub use command::{Command, ControlLimits, SpecialSettings};
pub use config::{BaseUnitConfig, BaseUnitConfigBuilder};
pub use constants::DeviceCategory;
pub use contactid::ContactId;
pub use deviceevent::DeviceEvent;
pub use devices::{Device, DeviceChange, DeviceRegistry, SpecialState, Zone};
pub use enums::{
    BaseUnitState, ContactIdEventCategory, ContactIdEventCode, ContactIdEventQualifier, DcFlags,
    DeviceEventCode, DeviceType, EsFlags, OperationMode, SsFlags, SwitchFlags, SwitchNumber,
    SwitchState,
};
pub use error::{LifeSosError, Result};
pub use event::{BaseUnitChange, BaseUnitEvent, EventReceiver, SessionEvent};
pub use protocol::{classify, FrameAssembler, Message};
pub use response::Response;
pub use session::{ClientSession, ServerSession, SessionState};

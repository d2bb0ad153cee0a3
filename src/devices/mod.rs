// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! Enrolled-device models and the registry that owns them.

pub mod device;
pub mod registry;

pub use device::{Device, DeviceChange, SpecialState, Zone};
pub use registry::DeviceRegistry;

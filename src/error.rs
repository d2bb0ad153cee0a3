// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

/// All errors that can occur in the lifesos-lan-bridge library.
#[derive(Debug, thiserror::Error)]
pub enum LifeSosError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not connected to the base unit")]
    NotConnected,

    #[error("Connection to the base unit was lost")]
    Disconnected,

    #[error("Command timeout: {command}")]
    CommandTimeout { command: String },

    #[error("Command already in flight: {command}")]
    CommandInFlight { command: String },

    #[error("Invalid response: {details}")]
    InvalidResponse { details: String },

    #[error("Invalid character in hex field")]
    InvalidHexChar,

    #[error("ContactID message checksum failure")]
    ChecksumMismatch,

    #[error("Received data contains bytes that cannot be decoded to ASCII")]
    NonAsciiData,

    #[error("Device not found: {device_id:06x}")]
    DeviceNotFound { device_id: u32 },

    #[error("Device {device_id:06x} is not a Special device")]
    NotSpecialDevice { device_id: u32 },

    #[error("Channel closed")]
    ChannelClosed,
}

impl LifeSosError {
    /// Whether this error is transient; the orchestration layer may retry
    /// the operation on a live connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LifeSosError::Io(_)
                | LifeSosError::CommandTimeout { .. }
                | LifeSosError::InvalidResponse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LifeSosError>;

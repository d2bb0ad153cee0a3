// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! Line framing and message classification.
//!
//! The ethernet adapter bridges the base unit's serial port, so inbound
//! data arrives as arbitrary byte chunks with CR/LF appearing somewhat
//! randomly at either the start or end of each message. [`FrameAssembler`]
//! turns those chunks back into whole lines; [`classify`] then routes each
//! line to the sub-protocol it belongs to.

use tracing::{debug, error};

use crate::constants::{CMD_SENSOR_LOG, MARKER_END, MARKER_START};
use crate::contactid::ContactId;
use crate::deviceevent::DeviceEvent;
use crate::error::{LifeSosError, Result};
use crate::response::Response;

/// One message out of the multiplexed inbound stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A response to a command issued by us or by another client sharing
    /// the adapter.
    Response(Response),
    /// An unsolicited event from an enrolled device.
    DeviceEvent(DeviceEvent),
    /// An alarm report using the ContactID protocol.
    ContactId(ContactId),
}

/// Reassembles CR/LF-delimited lines from arbitrary byte chunks.
///
/// Keeps the unterminated tail of the previous chunk and carries it into
/// the next call. State is per-connection; create a fresh assembler for
/// each new connection.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: String,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return the complete lines it yields, in arrival
    /// order. Empty segments are discarded.
    ///
    /// We should only ever receive ASCII text; anything else is garbage --
    /// usually a sign of a faulty cable between the base unit and the
    /// serial-ethernet adapter -- and rejects the whole chunk without
    /// touching the carry-over buffer.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        let text = std::str::from_utf8(chunk)
            .ok()
            .filter(|s| s.is_ascii())
            .ok_or(LifeSosError::NonAsciiData)?;

        self.buffer.push_str(text);

        let ends_with_delimiter = self
            .buffer
            .chars()
            .next_back()
            .is_some_and(|c| c == '\r' || c == '\n');

        let mut lines: Vec<String> = self
            .buffer
            .split(['\r', '\n'])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if ends_with_delimiter {
            self.buffer.clear();
        } else {
            // Last segment has no terminator yet; keep it for the next chunk
            self.buffer = lines.pop().unwrap_or_default();
        }

        Ok(lines)
    }
}

/// Classify a single line into the sub-protocol it belongs to.
///
/// Returns `None` for lines that are deliberately ignored as well as for
/// lines that fail to decode; a corrupt or unknown message must never
/// break the receive loop, so failures are logged here and swallowed.
pub fn classify(line: &str) -> Option<Message> {
    // Responses to commands, issued either by us or by another client
    // (when multiple connections are enabled on the adapter)
    if line.starts_with(MARKER_START) && line.ends_with(MARKER_END) {
        return match Response::parse(line) {
            Ok(Some(response)) => Some(Message::Response(response)),
            Ok(None) => None,
            Err(e) => {
                error!("Failed to parse response {:?}: {}", line, e);
                None
            }
        };
    }

    // Device events; sensor triggered, low battery, etc...
    if line.starts_with("MINPIC=") {
        return match DeviceEvent::parse(line) {
            Ok(event) => Some(Message::DeviceEvent(event)),
            Err(e) => {
                error!("Failed to parse device event {:?}: {}", line, e);
                None
            }
        };
    }

    // Events from devices that haven't been enrolled, plus display events
    // from the base unit; no interest in either
    if line.starts_with("XINPIC=") {
        return None;
    }

    // Ademco ContactID protocol
    if line.starts_with('(') && line.ends_with(')') {
        return match ContactId::parse(&line[1..line.len() - 1]) {
            Ok(contact_id) => Some(Message::ContactId(contact_id)),
            Err(e) => {
                error!("Failed to parse ContactID {:?}: {}", line, e);
                None
            }
        };
    }

    // New sensor log entry; superfluous given device events already carry
    // this information
    if line.starts_with(&format!("[{}", CMD_SENSOR_LOG)) && line.ends_with(']') {
        return None;
    }

    // Failure to trigger an X10 switch
    if line == "X10 ERR" {
        return None;
    }

    // Any unrecognised messages; ignored for forward compatibility
    debug!("Ignoring unrecognised message: {:?}", line);
    None
}

// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! The Ademco ContactID alarm-report sub-protocol.

use std::fmt;

use crate::constants::DeviceCategory;
use crate::enums::{ContactIdEventCategory, ContactIdEventCode, ContactIdEventQualifier};
use crate::error::{LifeSosError, Result};

/// A message using the Ademco ContactID protocol.
///
/// These arrive as 16 hex digits wrapped in parentheses, and carry the
/// alarm-report view of an event (the `MINPIC=` device events carry the
/// device-level view). The checksum is validated before any field is
/// decoded; a corrupt message never yields a partially-populated value.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactId {
    pub account_number: u16,
    /// Must be 0x18 (preferred) or 0x98 (optional).
    pub message_type: u8,
    pub event_qualifier_value: u8,
    pub event_qualifier: Option<ContactIdEventQualifier>,
    pub event_code_value: u16,
    pub event_code: Option<ContactIdEventCode>,
    pub device_category: DeviceCategory,
    /// Group number, for events not originating from the base unit.
    pub group_number: Option<u8>,
    /// Unit number within the group, for events not originating from the
    /// base unit.
    pub unit_number: Option<u8>,
    /// User id, for events originating from the base unit (zero = none).
    pub user_id: Option<u8>,
    pub checksum: u8,
}

impl ContactId {
    /// Parse the 16 hex digits between the parentheses.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() != 16 || !text.is_ascii() {
            return Err(LifeSosError::InvalidResponse {
                details: format!("ContactID message length is invalid: {:?}", text),
            });
        }

        // Verify checksum: digit values sum to a multiple of 15, counting
        // a zero digit as 10.
        let mut check_val: u32 = 0;
        for ch in text.chars() {
            let digit = ch
                .to_digit(16)
                .ok_or(LifeSosError::ChecksumMismatch)?;
            check_val += if digit != 0 { digit } else { 10 };
        }
        if check_val % 15 != 0 {
            return Err(LifeSosError::ChecksumMismatch);
        }

        let field = |range: std::ops::Range<usize>| -> Result<u32> {
            u32::from_str_radix(&text[range], 16).map_err(|_| LifeSosError::InvalidHexChar)
        };

        let account_number = field(0..4)? as u16;
        let message_type = field(4..6)? as u8;
        if message_type != 0x18 && message_type != 0x98 {
            return Err(LifeSosError::InvalidResponse {
                details: format!("ContactID message type is invalid: {:#04x}", message_type),
            });
        }
        let event_qualifier_value = field(6..7)? as u8;
        let event_code_value = field(7..10)? as u16;
        let group_partition = field(10..12)? as u8;
        // Ademco's protocol documents say zone/user uses the next 3
        // digits; LifeSOS instead uses the first digit for the device
        // category index and the remaining two for either unit number or
        // user id.
        let device_category = DeviceCategory::from_index(field(12..13)? as usize).ok_or(
            LifeSosError::InvalidResponse {
                details: "ContactID device category index out of range".to_string(),
            },
        )?;
        let zone_user = field(13..15)? as u8;
        let checksum = field(15..16)? as u8;

        let (group_number, unit_number, user_id) = if device_category == DeviceCategory::BaseUnit {
            (None, None, if zone_user != 0 { Some(zone_user) } else { None })
        } else {
            (Some(group_partition), Some(zone_user), None)
        };

        Ok(Self {
            account_number,
            message_type,
            event_qualifier_value,
            event_qualifier: ContactIdEventQualifier::from_value(event_qualifier_value),
            event_code_value,
            event_code: ContactIdEventCode::from_value(event_code_value),
            device_category,
            group_number,
            unit_number,
            user_id,
            checksum,
        })
    }

    /// Category for the type of event.
    pub fn event_category(&self) -> Option<ContactIdEventCategory> {
        ContactIdEventCategory::from_code_value(self.event_code_value)
    }

    /// Zone the device is assigned to, or `None` for base unit events.
    pub fn zone(&self) -> Option<String> {
        match (self.group_number, self.unit_number) {
            (Some(group), Some(unit)) => Some(format!("{:02x}-{:02x}", group, unit)),
            _ => None,
        }
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContactID: account={:04x}, qualifier={:?}, code={:03x} ({:?}), category={}",
            self.account_number,
            self.event_qualifier,
            self.event_code_value,
            self.event_code,
            self.device_category.description(),
        )?;
        if let Some(zone) = self.zone() {
            write!(f, ", zone {}", zone)?;
        } else if let Some(user) = self.user_id {
            write!(f, ", user {:02x}", user)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Sum of digits (zero counted as 10) for a candidate body without its
    // final checksum digit; returns the digit that makes it validate.
    fn checksum_digit(body15: &str) -> char {
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
        for candidate in 1..=15u32 {
            if (sum + candidate) % 15 == 0 {
                return std::char::from_digit(candidate % 16, 16).unwrap();
            }
        }
        unreachable!()
    }

    fn valid_message(body15: &str) -> String {
        format!("{}{}", body15, checksum_digit(body15))
    }

    #[test]
    fn test_parse_valid_message() {
        // Account 1234, type 0x18, qualifier Event, code 0x131 (Perimeter),
        // group 01, burglar category (index 1), unit 02
        let text = valid_message("123418113101102");
        let msg = ContactId::parse(&text).unwrap();
        assert_eq!(msg.account_number, 0x1234);
        assert_eq!(msg.message_type, 0x18);
        assert_eq!(msg.event_qualifier, Some(ContactIdEventQualifier::Event));
        assert_eq!(msg.event_code, Some(ContactIdEventCode::Perimeter));
        assert_eq!(msg.event_category(), Some(ContactIdEventCategory::Alarm));
        assert_eq!(msg.device_category, DeviceCategory::Burglar);
        assert_eq!(msg.group_number, Some(0x01));
        assert_eq!(msg.unit_number, Some(0x02));
        assert_eq!(msg.user_id, None);
        assert_eq!(msg.zone().as_deref(), Some("01-02"));
    }

    #[test]
    fn test_parse_base_unit_event_uses_user_id() {
        // Category index 5 = base unit; trailing two digits become user id
        let text = valid_message("123418140000503");
        let msg = ContactId::parse(&text).unwrap();
        assert_eq!(msg.device_category, DeviceCategory::BaseUnit);
        assert_eq!(msg.group_number, None);
        assert_eq!(msg.unit_number, None);
        assert_eq!(msg.user_id, Some(0x03));
        assert!(msg.zone().is_none());
    }

    #[test]
    fn test_checksum_failure_rejected() {
        let text = valid_message("123418113101102");
        // Flip the final digit; divisibility by 15 must break
        let mut broken: Vec<char> = text.chars().collect();
        let last = broken[15];
        broken[15] = if last == '1' { '2' } else { '1' };
        let broken: String = broken.into_iter().collect();
        assert!(matches!(
            ContactId::parse(&broken),
            Err(LifeSosError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_every_single_digit_mutation_rejected() {
        let text = valid_message("123418113101102");
        for pos in 0..16 {
            let mut chars: Vec<char> = text.chars().collect();
            let original = chars[pos].to_digit(16).unwrap();
            // +1 mod 16 changes the digit sum by 1 (or wraps f->0, which
            // counts as 15-1=+... either way never a multiple of 15 again
            // for a single digit)
            let mutated = (original + 1) % 16;
            chars[pos] = std::char::from_digit(mutated, 16).unwrap();
            let mutated_text: String = chars.into_iter().collect();
            assert!(
                ContactId::parse(&mutated_text).is_err(),
                "mutation at {} accepted",
                pos
            );
        }
    }

    #[test]
    fn test_invalid_message_type_rejected() {
        // Same layout but message type 0x17
        let text = valid_message("123417113101102");
        assert!(matches!(
            ContactId::parse(&text),
            Err(LifeSosError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(ContactId::parse("12341811310110").is_err());
        assert!(ContactId::parse("").is_err());
    }
}

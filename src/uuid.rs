//! Bluetooth UUIDs
//!
//! Attribute types, service classes and profile identifiers all share the
//! same 128-bit space. Short forms are aliases into the Bluetooth Base UUID
//! and compare equal to their expanded 128-bit value.

use crate::Error;
use core::fmt::Write;
use heapless::{String, Vec};

/// Bluetooth Base UUID: 00000000-0000-1000-8000-00805F9B34FB
pub const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Length of the canonical textual form
pub const UUID_STRING_LENGTH: usize = 36;

/// A 16, 32 or 128-bit Bluetooth UUID
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Uuid {
    /// 16-bit alias into the base UUID
    Uuid16(u16),
    /// 32-bit alias into the base UUID
    Uuid32(u32),
    /// Full 128-bit UUID
    Uuid128(u128),
}

/// Primary Service declaration
pub const PRIMARY_SERVICE: Uuid = Uuid::Uuid16(0x2800);
/// Secondary Service declaration
pub const SECONDARY_SERVICE: Uuid = Uuid::Uuid16(0x2801);
/// Characteristic declaration
pub const CHARACTERISTIC: Uuid = Uuid::Uuid16(0x2803);
/// Characteristic User Description descriptor
pub const CHARACTERISTIC_USER_DESCRIPTION: Uuid = Uuid::Uuid16(0x2901);
/// Client Characteristic Configuration descriptor
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = Uuid::Uuid16(0x2902);

/// Headset (HSP headset role)
pub const HSP_HS: Uuid = Uuid::Uuid16(0x1108);
/// Audio Source (A2DP)
pub const A2DP_SOURCE: Uuid = Uuid::Uuid16(0x110A);
/// Audio Sink (A2DP)
pub const A2DP_SINK: Uuid = Uuid::Uuid16(0x110B);
/// Headset Audio Gateway (HSP)
pub const HSP_AG: Uuid = Uuid::Uuid16(0x1112);
/// Handsfree (HFP hands-free role)
pub const HFP_HS: Uuid = Uuid::Uuid16(0x111E);
/// Handsfree Audio Gateway (HFP)
pub const HFP_AG: Uuid = Uuid::Uuid16(0x111F);

impl Uuid {
    /// Expand to the full 128-bit value
    #[must_use]
    pub const fn to_u128(self) -> u128 {
        match self {
            Self::Uuid16(value) => BASE_UUID | ((value as u128) << 96),
            Self::Uuid32(value) => BASE_UUID | ((value as u128) << 96),
            Self::Uuid128(value) => value,
        }
    }

    /// Number of bytes this UUID occupies on the wire
    #[must_use]
    pub const fn encoded_len(self) -> usize {
        match self {
            Self::Uuid16(_) => 2,
            Self::Uuid32(_) => 4,
            Self::Uuid128(_) => 16,
        }
    }

    /// Append the little-endian wire form to `out`
    ///
    /// # Errors
    /// Returns `Error::Failed` if `out` has no room left.
    pub fn write_le<const N: usize>(self, out: &mut Vec<u8, N>) -> Result<(), Error> {
        let result = match self {
            Self::Uuid16(value) => out.extend_from_slice(&value.to_le_bytes()),
            Self::Uuid32(value) => out.extend_from_slice(&value.to_le_bytes()),
            Self::Uuid128(value) => out.extend_from_slice(&value.to_le_bytes()),
        };
        result.map_err(|()| Error::NO_RESOURCES)
    }

    /// Decode a little-endian UUID, picking the width from the slice length
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            2 => Some(Self::Uuid16(u16::from_le_bytes([bytes[0], bytes[1]]))),
            4 => Some(Self::Uuid32(u32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]))),
            16 => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(bytes);
                Some(Self::Uuid128(u128::from_le_bytes(raw)))
            }
            _ => None,
        }
    }

    /// Parse `"180f"`, `"0x180f"`, `"0000180f"` or the canonical 36-character form
    ///
    /// # Errors
    /// Returns `Error::InvalidArguments` for anything else.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let short = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if !short.is_empty() && short.chars().all(|c| c.is_ascii_hexdigit()) {
            return match short.len() {
                4 => u16::from_str_radix(short, 16)
                    .map(Self::Uuid16)
                    .map_err(|_| Error::InvalidArguments),
                8 => u32::from_str_radix(short, 16)
                    .map(Self::Uuid32)
                    .map_err(|_| Error::InvalidArguments),
                _ => Err(Error::InvalidArguments),
            };
        }

        if text.len() != UUID_STRING_LENGTH {
            return Err(Error::InvalidArguments);
        }
        let mut digits: String<32> = String::new();
        for (i, c) in text.chars().enumerate() {
            match (i, c) {
                (8 | 13 | 18 | 23, '-') => {}
                (8 | 13 | 18 | 23, _) => return Err(Error::InvalidArguments),
                (_, c) if c.is_ascii_hexdigit() => {
                    digits.push(c).map_err(|()| Error::InvalidArguments)?;
                }
                _ => return Err(Error::InvalidArguments),
            }
        }
        u128::from_str_radix(&digits, 16)
            .map(Self::Uuid128)
            .map_err(|_| Error::InvalidArguments)
    }

    /// Canonical lowercase 128-bit textual form
    #[must_use]
    pub fn format_canonical(self) -> String<UUID_STRING_LENGTH> {
        let value = self.to_u128();
        let mut text = String::new();
        write!(
            text,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (value >> 96) as u32,
            (value >> 80) as u16,
            (value >> 64) as u16,
            (value >> 48) as u16,
            value & 0xFFFF_FFFF_FFFF
        )
        .ok();
        text
    }
}

impl PartialEq for Uuid {
    fn eq(&self, other: &Self) -> bool {
        self.to_u128() == other.to_u128()
    }
}

impl Eq for Uuid {}

impl From<u16> for Uuid {
    fn from(value: u16) -> Self {
        Self::Uuid16(value)
    }
}

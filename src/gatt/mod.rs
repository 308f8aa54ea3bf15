//! GATT Local Attribute Store
//!
//! The local attribute database and its handle allocator. Services are built
//! one attribute at a time, then registered in a single pass with the
//! lower-layer attribute server.
//!
//! ## Architecture
//!
//! - [`AttributeStore`] owns every local [`Attribute`] in handle order and the
//!   chain of handles created for the service under construction.
//! - [`AttributeServer`] is the attribute protocol server the store plugs
//!   into. It assigns the handles peers see and delivers indications.
//! - [`ExternalServices`] builds services from objects published by bus
//!   clients and serves reads and writes on their behalf.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut store = AttributeStore::default();
//! store.add_service(Uuid::from(0x180F))?;
//! store.add_characteristic(
//!     Uuid::from(0x2A19),
//!     CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
//!     AttributeAccess::READ,
//! )?;
//! let range = store.materialize(&mut server)?;
//! ```

pub mod attribute;
pub mod external;
pub mod server;
pub mod store;

pub use attribute::*;
pub use external::*;
pub use server::*;
pub use store::*;

use crate::constants::MAX_FLAG_LENGTH;
use core::ops::BitOr;

/// Attribute handle
pub type Handle = u16;

/// Inclusive range of attribute handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandleRange {
    /// First handle
    pub start: Handle,
    /// Last handle
    pub end: Handle,
}

impl HandleRange {
    /// Create a range covering `start..=end`
    #[must_use]
    pub const fn new(start: Handle, end: Handle) -> Self {
        Self { start, end }
    }

    /// Whether `handle` lies inside the range
    #[must_use]
    pub const fn contains(&self, handle: Handle) -> bool {
        handle >= self.start && handle <= self.end
    }
}

/// Characteristic properties octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicProperties(u8);

impl CharacteristicProperties {
    /// No properties
    pub const NONE: Self = Self(0x00);
    /// Value may be broadcast
    pub const BROADCAST: Self = Self(0x01);
    /// Value may be read
    pub const READ: Self = Self(0x02);
    /// Value may be written without response
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(0x04);
    /// Value may be written
    pub const WRITE: Self = Self(0x08);
    /// Value changes may be notified
    pub const NOTIFY: Self = Self(0x10);
    /// Value changes may be indicated
    pub const INDICATE: Self = Self(0x20);
    /// Value may be written with a signature
    pub const AUTHENTICATED_SIGNED_WRITES: Self = Self(0x40);

    /// Properties assumed when a client publishes no flags
    pub const DEFAULT_EXTERNAL: Self =
        Self(Self::READ.0 | Self::WRITE.0 | Self::WRITE_WITHOUT_RESPONSE.0);

    /// Wrap a raw properties octet
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw properties octet
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether no property is set
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether value changes are pushed to peers, which reserves a
    /// configuration descriptor handle
    #[must_use]
    pub const fn pushes_updates(self) -> bool {
        self.intersects(Self(Self::NOTIFY.0 | Self::INDICATE.0))
    }

    /// Map a bus flag string such as `"write-without-response"`
    #[must_use]
    pub fn from_flag(flag: &str) -> Option<Self> {
        if flag.len() > MAX_FLAG_LENGTH {
            return None;
        }
        match flag {
            "broadcast" => Some(Self::BROADCAST),
            "read" => Some(Self::READ),
            "write-without-response" => Some(Self::WRITE_WITHOUT_RESPONSE),
            "write" => Some(Self::WRITE),
            "notify" => Some(Self::NOTIFY),
            "indicate" => Some(Self::INDICATE),
            "authenticated-signed-writes" => Some(Self::AUTHENTICATED_SIGNED_WRITES),
            _ => None,
        }
    }

    /// Combine bus flag strings
    ///
    /// Returns `None` if any flag is unknown or no flag is given.
    #[must_use]
    pub fn from_flags<'a, I>(flags: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let props = flags
            .into_iter()
            .try_fold(Self::NONE, |acc, flag| Self::from_flag(flag).map(|bit| acc | bit))?;
        if props.is_empty() { None } else { Some(props) }
    }
}

impl BitOr for CharacteristicProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Role of a node on the pending-handle chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttributeKind {
    /// Primary service declaration, always the head of a chain
    PrimaryService,
    /// Characteristic declaration
    CharacteristicDeclaration,
    /// Characteristic value
    CharacteristicValue,
    /// Characteristic descriptor
    Descriptor,
}

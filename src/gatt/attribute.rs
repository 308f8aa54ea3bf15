//! Local attributes
//!
//! An attribute is one handle, type and value triple. Declarations carry a
//! constant value; characteristic values and descriptors are backed by an
//! [`AttributeHandler`] and only cache the last value seen.

use super::{CharacteristicProperties, Handle, HandleRange};
use crate::{
    Error,
    constants::MAX_ATTRIBUTE_VALUE_LENGTH,
    uuid::{self, Uuid},
};
use heapless::Vec;

/// Value bytes of an attribute
pub type AttributeValue = Vec<u8, MAX_ATTRIBUTE_VALUE_LENGTH>;

/// Which remote operations an externally backed attribute accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttributeAccess {
    /// Reads are forwarded to the handler
    pub read: bool,
    /// Writes are forwarded to the handler
    pub write: bool,
}

impl AttributeAccess {
    /// Neither reads nor writes
    pub const NONE: Self = Self {
        read: false,
        write: false,
    };
    /// Reads only
    pub const READ: Self = Self {
        read: true,
        write: false,
    };
    /// Writes only
    pub const WRITE: Self = Self {
        read: false,
        write: true,
    };
    /// Reads and writes
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };

    /// Access implied by a characteristic's properties
    #[must_use]
    pub const fn for_properties(props: CharacteristicProperties) -> Self {
        Self {
            read: props.contains(CharacteristicProperties::READ),
            write: props.intersects(CharacteristicProperties::from_bits(
                CharacteristicProperties::WRITE.bits()
                    | CharacteristicProperties::WRITE_WITHOUT_RESPONSE.bits(),
            )),
        }
    }
}

/// An entry in the local attribute database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    handle: Handle,
    attribute_type: Uuid,
    value: AttributeValue,
    access: Option<AttributeAccess>,
    range: Option<HandleRange>,
    notify_ready: bool,
}

impl Attribute {
    /// Attribute with a constant value
    pub(crate) const fn constant(handle: Handle, attribute_type: Uuid, value: AttributeValue) -> Self {
        Self {
            handle,
            attribute_type,
            value,
            access: None,
            range: None,
            notify_ready: false,
        }
    }

    /// Attribute whose value lives behind an [`AttributeHandler`]
    pub(crate) const fn dynamic(handle: Handle, attribute_type: Uuid, access: AttributeAccess) -> Self {
        Self {
            handle,
            attribute_type,
            value: Vec::new(),
            access: Some(access),
            range: None,
            notify_ready: false,
        }
    }

    /// Local handle
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// Attribute type
    #[must_use]
    pub const fn attribute_type(&self) -> Uuid {
        self.attribute_type
    }

    /// Current value, or the last cached value of a dynamic attribute
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Remote access for dynamic attributes, `None` for constants
    #[must_use]
    pub const fn access(&self) -> Option<AttributeAccess> {
        self.access
    }

    /// Server handle range of a registered service declaration
    #[must_use]
    pub const fn range(&self) -> Option<HandleRange> {
        self.range
    }

    /// Whether the next value update is pushed to peers
    #[must_use]
    pub const fn notify_ready(&self) -> bool {
        self.notify_ready
    }

    /// Whether this is a primary or secondary service declaration
    #[must_use]
    pub fn is_service(&self) -> bool {
        self.attribute_type == uuid::PRIMARY_SERVICE || self.attribute_type == uuid::SECONDARY_SERVICE
    }

    /// UUID carried by a service declaration
    #[must_use]
    pub fn service_uuid(&self) -> Option<Uuid> {
        if self.is_service() {
            Uuid::from_le_bytes(&self.value)
        } else {
            None
        }
    }

    /// Properties octet of a characteristic declaration
    #[must_use]
    pub fn characteristic_properties(&self) -> Option<CharacteristicProperties> {
        if self.attribute_type != uuid::CHARACTERISTIC {
            return None;
        }
        self.value
            .first()
            .map(|bits| CharacteristicProperties::from_bits(*bits))
    }

    /// Value handle recorded in a characteristic declaration
    #[must_use]
    pub fn characteristic_value_handle(&self) -> Option<Handle> {
        if self.attribute_type != uuid::CHARACTERISTIC {
            return None;
        }
        match self.value.get(1..3) {
            Some([lo, hi]) => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }

    /// Characteristic UUID recorded in a characteristic declaration
    #[must_use]
    pub fn characteristic_uuid(&self) -> Option<Uuid> {
        if self.attribute_type != uuid::CHARACTERISTIC {
            return None;
        }
        self.value.get(3..).and_then(Uuid::from_le_bytes)
    }

    /// Lookup key: service declarations match on the UUID they declare,
    /// everything else on its type
    #[must_use]
    pub fn matches(&self, target: Uuid) -> bool {
        if self.attribute_type == uuid::PRIMARY_SERVICE {
            self.service_uuid() == Some(target)
        } else {
            self.attribute_type == target
        }
    }

    pub(crate) fn set_value(&mut self, value: &[u8]) -> Result<(), Error> {
        self.value = Vec::from_slice(value).map_err(|()| Error::NO_RESOURCES)?;
        Ok(())
    }

    pub(crate) fn patch_value(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Error> {
        let end = offset + bytes.len();
        let target = self
            .value
            .get_mut(offset..end)
            .ok_or(Error::InvalidArguments)?;
        target.copy_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn set_range(&mut self, range: Option<HandleRange>) {
        self.range = range;
    }

    pub(crate) fn set_notify_ready(&mut self, ready: bool) {
        self.notify_ready = ready;
    }
}

/// Serves remote reads and writes of externally backed attributes
pub trait AttributeHandler {
    /// Produce the current value of `attribute`
    ///
    /// # Errors
    /// Returns an error if the value is unavailable.
    fn read(&mut self, attribute: &Attribute) -> Result<AttributeValue, Error>;

    /// Store `value` into `attribute`
    ///
    /// # Errors
    /// Returns an error if the write could not be forwarded.
    fn write(&mut self, attribute: &Attribute, value: &[u8]) -> Result<(), Error>;
}

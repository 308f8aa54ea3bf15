//! IPC Bus Surface
//!
//! Types exchanged with the system message bus and the [`MessageBus`] trait the
//! rest of the crate uses to answer method calls, track client liveness and
//! emit property change signals. The bus itself lives outside this crate.

use crate::{
    BluetoothAddress, Error,
    constants::{
        MAX_CLIENT_NAME_LENGTH, MAX_CONFIGURATION_SIZE, MAX_OBJECT_PATH_LENGTH, MAX_PROPERTIES,
    },
    transport::StreamDescriptor,
    uuid::Uuid,
};
use heapless::{String, Vec};

/// Unique bus name of a client, e.g. `:1.42`
pub type ClientId = String<MAX_CLIENT_NAME_LENGTH>;

/// Object path on the bus
pub type ObjectPath = String<MAX_OBJECT_PATH_LENGTH>;

/// Property map returned by `GetProperties`
pub type Properties = Vec<Property, MAX_PROPERTIES>;

/// Correlates a deferred reply with the method call it answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReplyToken(pub u32);

/// Identifies a client disconnect watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WatchId(pub u32);

/// A typed property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Boolean
    Bool(bool),
    /// Single byte
    Byte(u8),
    /// Unsigned 16-bit integer
    U16(u16),
    /// Static string
    Str(&'static str),
    /// UUID
    Uuid(Uuid),
    /// Object path
    Path(ObjectPath),
    /// Device address
    Address(BluetoothAddress),
    /// Raw bytes
    Bytes(Vec<u8, MAX_CONFIGURATION_SIZE>),
}

impl PropertyValue {
    /// Boolean payload, if this is a boolean
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// 16-bit payload, if this is an unsigned 16-bit integer
    #[must_use]
    pub const fn as_u16(&self) -> Option<u16> {
        match self {
            Self::U16(value) => Some(*value),
            _ => None,
        }
    }
}

/// A named property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Property name as seen on the bus
    pub name: &'static str,
    /// Property value
    pub value: PropertyValue,
}

impl Property {
    /// Create a property
    #[must_use]
    pub const fn new(name: &'static str, value: PropertyValue) -> Self {
        Self { name, value }
    }
}

/// Look up a property by name
#[must_use]
pub fn find_property<'a>(properties: &'a [Property], name: &str) -> Option<&'a PropertyValue> {
    properties
        .iter()
        .find(|property| property.name == name)
        .map(|property| &property.value)
}

/// Reply to a method call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `Acquire` succeeded
    Acquired {
        /// Stream descriptor handed to the client
        descriptor: StreamDescriptor,
        /// Input packet size, zero when the owner did not ask to read
        read_mtu: u16,
        /// Output packet size, zero when the owner did not ask to write
        write_mtu: u16,
    },
    /// `GetProperties` result
    Properties(Properties),
    /// Empty success reply
    Done,
    /// Error reply
    Error(Error),
}

/// The system message bus as seen by this crate
pub trait MessageBus {
    /// Send a reply for a previously received method call
    ///
    /// # Errors
    /// Returns an error if the reply could not be queued. Callers treat this
    /// as a failure of the operation being answered.
    fn send_reply(&mut self, token: ReplyToken, reply: Reply) -> Result<(), Error>;

    /// Start watching `client` for disconnection
    fn watch_disconnect(&mut self, client: &str) -> Option<WatchId>;

    /// Stop a disconnect watch
    fn remove_watch(&mut self, watch: WatchId);

    /// Emit a `PropertyChanged` signal for the object at `path`
    fn property_changed(&mut self, path: &str, property: Property);

    /// Push a new value to an object owned by `client`
    ///
    /// # Errors
    /// Returns an error if the call could not be issued.
    fn set_remote_value(&mut self, client: &str, path: &str, value: &[u8]) -> Result<(), Error>;
}

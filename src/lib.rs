#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

#[cfg(test)]
extern crate std;

// Must come first so the logging macros are visible to every module below.
mod fmt;

mod address;
pub mod bus;
pub mod constants;
pub mod gatt;
pub mod host;
pub mod processor;
pub mod transport;
pub mod uuid;

use crate::{
    bus::{ClientId, ObjectPath, PropertyValue, ReplyToken},
    constants::{
        DEFAULT_SCO_MTU, FIRST_HANDLE, MAX_ACCESS_LENGTH, MAX_CONFIGURATION_SIZE,
        MAX_PROPERTY_NAME_LENGTH,
    },
    gatt::{AttributeValue, Handle, ProxyObject},
    transport::RequestId,
    uuid::Uuid,
};
use heapless::{String, Vec};

pub use address::BluetoothAddress;
pub use host::PluginHost;

/// Errors reported to bus callers
///
/// Every failure inside the crate is mapped to one of these before it
/// reaches a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Malformed access string, missing or ill-typed property
    InvalidArguments,
    /// Lock conflict, caller is not an owner, or the profile refused
    NotAuthorized,
    /// A conflicting request is already in flight
    AlreadyInProgress,
    /// The object is already registered
    AlreadyExists,
    /// Nothing pending to act on
    NotAvailable,
    /// Unknown object, handle or registration
    DoesNotExist,
    /// The operation is not offered by this object
    NotSupported,
    /// Generic failure with a reason
    Failed(&'static str),
}

impl Error {
    /// The transport's resume or suspend failed
    pub const IO: Self = Self::Failed("Input/output error");
    /// A weak acquire found no playback to attach to
    pub const NOT_PLAYING: Self = Self::Failed("Transport not playing");
    /// A fixed-capacity table or handle space is exhausted
    pub const NO_RESOURCES: Self = Self::Failed("Not enough resources");

    /// Error name as sent on the bus
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::InvalidArguments => "org.bluez.Error.InvalidArguments",
            Self::NotAuthorized => "org.bluez.Error.NotAuthorized",
            Self::AlreadyInProgress => "org.bluez.Error.InProgress",
            Self::AlreadyExists => "org.bluez.Error.AlreadyExists",
            Self::NotAvailable => "org.bluez.Error.NotAvailable",
            Self::DoesNotExist => "org.bluez.Error.DoesNotExist",
            Self::NotSupported => "org.bluez.Error.NotSupported",
            Self::Failed(_) => "org.bluez.Error.Failed",
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidArguments => f.write_str("Invalid arguments in method call"),
            Self::NotAuthorized => f.write_str("Operation Not Authorized"),
            Self::AlreadyInProgress => f.write_str("In Progress"),
            Self::AlreadyExists => f.write_str("Already Exists"),
            Self::NotAvailable => f.write_str("Operation currently not available"),
            Self::DoesNotExist => f.write_str("Does Not Exist"),
            Self::NotSupported => f.write_str("Operation is not supported"),
            Self::Failed(reason) => f.write_str(reason),
        }
    }
}

/// Options for configuring a [`PluginHost`]
///
/// # Examples
///
/// ```rust
/// use nestbird::HostOptions;
///
/// let options = HostOptions {
///     sco_mtu: 60,
///     ..HostOptions::default()
/// };
/// assert!(options.service_changed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HostOptions {
    /// Packet size reported for headset and gateway (SCO) transports
    pub sco_mtu: u16,
    /// First GATT handle handed out by the local attribute store
    ///
    /// Handles below it stay free for services the attribute server
    /// registers itself.
    pub first_handle: Handle,
    /// Whether peers are sent Service Changed indications
    pub service_changed: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            sco_mtu: DEFAULT_SCO_MTU,
            first_handle: FIRST_HANDLE,
            service_changed: true,
        }
    }
}

/// Method calls received on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodCall {
    /// `MediaTransport.Acquire(access)`
    Acquire {
        /// Transport object path
        transport: ObjectPath,
        /// Access string such as `"rw"` or `"r?"`
        access: String<MAX_ACCESS_LENGTH>,
    },
    /// `MediaTransport.Release(access)`
    Release {
        /// Transport object path
        transport: ObjectPath,
        /// Access string
        access: String<MAX_ACCESS_LENGTH>,
    },
    /// `MediaTransport.GetProperties()`
    GetProperties {
        /// Transport object path
        transport: ObjectPath,
    },
    /// `MediaTransport.SetProperty(name, value)`
    SetProperty {
        /// Transport object path
        transport: ObjectPath,
        /// Property name
        name: String<MAX_PROPERTY_NAME_LENGTH>,
        /// New value
        value: PropertyValue,
    },
    /// `GattManager.RegisterService(path)`
    RegisterService {
        /// Object path of the client's service
        path: ObjectPath,
    },
    /// `GattManager.UnregisterService(path)`
    UnregisterService {
        /// Object path of the client's service
        path: ObjectPath,
    },
}

/// Everything the host reacts to
///
/// Method calls come from bus clients; the rest are reported by the profile
/// layer or by the bus itself.
#[derive(Debug)]
pub enum Event<S> {
    /// A method call waiting for a reply
    MethodCall {
        /// Caller's bus identity
        client: ClientId,
        /// Correlates the reply
        token: ReplyToken,
        /// The call
        call: MethodCall,
    },
    /// A stream was negotiated and needs a transport
    TransportConfigured {
        /// Remote device
        device: BluetoothAddress,
        /// Object path of the remote device
        device_path: ObjectPath,
        /// Negotiated service UUID
        uuid: Uuid,
        /// Codec identifier
        codec: u8,
        /// Raw codec configuration
        configuration: Vec<u8, MAX_CONFIGURATION_SIZE>,
        /// Profile session driving the stream
        session: S,
    },
    /// The stream behind a transport went away
    TransportClosed {
        /// Transport object path
        transport: ObjectPath,
    },
    /// A resume started for `client` finished
    ResumeComplete {
        /// Transport object path
        transport: ObjectPath,
        /// Owner the resume was started for
        client: ClientId,
        /// Correlation id returned when the resume was started
        id: RequestId,
        /// Outcome reported by the profile layer
        result: Result<(), Error>,
    },
    /// A suspend started for `client` finished
    SuspendComplete {
        /// Transport object path
        transport: ObjectPath,
        /// Owner the suspend was started for
        client: ClientId,
        /// Correlation id returned when the suspend was started
        id: RequestId,
    },
    /// Playback started or stopped on the remote side
    PlaybackChanged {
        /// Transport object path
        transport: ObjectPath,
        /// Whether audio is flowing
        playing: bool,
    },
    /// Remote delay report (A2DP)
    DelayReported {
        /// Transport object path
        transport: ObjectPath,
        /// Delay in 1/10 ms
        delay: u16,
    },
    /// Remote volume change (A2DP)
    VolumeReported {
        /// Transport object path
        transport: ObjectPath,
        /// Volume, 0 to 127
        volume: u16,
    },
    /// A client left the bus
    ClientDisconnected {
        /// Client bus identity
        client: ClientId,
    },
    /// A client published a GATT object
    ProxyAdded {
        /// Client bus identity
        client: ClientId,
        /// Object as seen locally
        proxy: ProxyObject,
    },
    /// A client withdrew a GATT object
    ProxyRemoved {
        /// Client bus identity
        client: ClientId,
        /// Object path
        path: ObjectPath,
    },
    /// Every object of a registered service is known
    ClientReady {
        /// Client bus identity
        client: ClientId,
        /// Registered service path
        path: ObjectPath,
    },
    /// A client changed the `Value` of one of its GATT objects
    ValueChanged {
        /// Client bus identity
        client: ClientId,
        /// Object path
        path: ObjectPath,
        /// New value
        value: AttributeValue,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names() {
        assert_eq!(Error::InvalidArguments.name(), "org.bluez.Error.InvalidArguments");
        assert_eq!(Error::AlreadyInProgress.name(), "org.bluez.Error.InProgress");
        assert_eq!(Error::IO.name(), "org.bluez.Error.Failed");
    }

    #[test]
    fn test_error_display() {
        use core::fmt::Write;

        let mut text: String<64> = String::new();
        write!(text, "{}", Error::NO_RESOURCES).unwrap();
        assert_eq!(text.as_str(), "Not enough resources");
        text.clear();
        write!(text, "{}", Error::NotAuthorized).unwrap();
        assert_eq!(text.as_str(), "Operation Not Authorized");
    }

    #[test]
    fn test_default_host_options() {
        let options = HostOptions::default();
        assert_eq!(options.sco_mtu, 48);
        assert_eq!(options.first_handle, 0x0001);
        assert!(options.service_changed);
    }
}

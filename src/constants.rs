//! `Nestbird` Constants
//!
//! Capacity limits and protocol values shared by the transport and GATT
//! modules. Every collection in the crate is fixed-size; these constants
//! bound them.

/// Maximum number of media transports managed at once
pub const MAX_TRANSPORTS: usize = 8;

/// Maximum number of owners holding a lock on one transport
pub const MAX_OWNERS: usize = 4;

/// Maximum length of a client bus identity (unique bus name)
pub const MAX_CLIENT_NAME_LENGTH: usize = 32;

/// Maximum length of an object path
pub const MAX_OBJECT_PATH_LENGTH: usize = 96;

/// Maximum length of an access string such as `"rw?"`
pub const MAX_ACCESS_LENGTH: usize = 4;

/// Maximum length of a property name
pub const MAX_PROPERTY_NAME_LENGTH: usize = 24;

/// Maximum size of a raw codec configuration blob
pub const MAX_CONFIGURATION_SIZE: usize = 32;

/// Maximum number of entries in a property map
pub const MAX_PROPERTIES: usize = 12;

/// Packet size reported for SCO-backed (HFP/HSP) transports
pub const DEFAULT_SCO_MTU: u16 = 48;

/// Highest absolute volume accepted for A2DP transports
pub const MAX_VOLUME: u16 = 127;

/// First GATT attribute handle handed out by a fresh store
pub const FIRST_HANDLE: u16 = 0x0001;

/// Highest valid GATT attribute handle
pub const LAST_HANDLE: u16 = 0xFFFF;

/// Maximum number of attributes in the local attribute store
pub const MAX_ATTRIBUTES: usize = 64;

/// Maximum length of a stored attribute value
pub const MAX_ATTRIBUTE_VALUE_LENGTH: usize = 64;

/// Maximum number of handles tracked while one service is under construction
pub const MAX_PENDING_HANDLES: usize = 32;

/// Maximum number of connected peers reported by the attribute server
pub const MAX_PEERS: usize = 8;

/// Maximum number of externally registered GATT services
pub const MAX_EXTERNAL_SERVICES: usize = 4;

/// Maximum number of proxy objects per external GATT service
pub const MAX_PROXIES: usize = 16;

/// Maximum length of one characteristic flag string
pub const MAX_FLAG_LENGTH: usize = 32;

/// Depth of the processor event queue
pub const EVENT_QUEUE_SIZE: usize = 8;

/// ATT Handle Value Indication opcode
pub const ATT_OP_HANDLE_VALUE_IND: u8 = 0x1D;

/// Size of a service-changed indication PDU (opcode + start + end)
pub const SERVICE_CHANGED_PDU_LENGTH: usize = 5;

//! Media Transport Lifecycle and Locking
//!
//! A media transport is one negotiated streaming endpoint (device × profile ×
//! codec configuration). Clients acquire read and/or write access to it; the
//! first acquisition resumes the underlying profile stream and the last
//! release suspends it again.
//!
//! ## Architecture
//!
//! - **Lock**: two-bit `READ`/`WRITE` capability ([`TransportLock`])
//! - **Owners**: per-transport clients and their in-flight requests ([`OwnerSet`])
//! - **State**: five internal states collapsed to three external strings ([`TransportState`])
//! - **Profile adapters**: A2DP, headset and gateway specifics ([`ProfileAdapter`])
//! - **Media transport**: the state machine driving all of the above ([`MediaTransport`])
//! - **Manager**: registry of transports addressed by id or path ([`TransportManager`])
//!
//! ## Usage
//!
//! ```rust,ignore
//! let id = manager.create_transport(config, session)?;
//! manager.acquire(&mut bus, id, ":1.42", ReplyToken(1), "rw")?;
//! // ... the profile session reports completion later
//! manager.resume_complete(&mut bus, id, ":1.42", request, Ok(()))?;
//! ```

pub mod lock;
pub mod manager;
pub mod media;
pub mod owner;
pub mod profile;

pub use lock::*;
pub use manager::*;
pub use media::*;
pub use owner::*;
pub use profile::*;

/// Identifies a transport within its manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportId(pub u16);

/// Correlation id returned by a profile session for an in-flight resume or suspend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RequestId(pub u32);

/// Stream descriptor handed to the acquiring client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamDescriptor(pub i32);

/// A live stream and its negotiated packet sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamInfo {
    /// Stream descriptor
    pub descriptor: StreamDescriptor,
    /// Input packet size
    pub read_mtu: u16,
    /// Output packet size
    pub write_mtu: u16,
}

impl StreamInfo {
    /// Zero the packet size of every direction `lock` does not grant
    #[must_use]
    pub const fn masked(self, lock: TransportLock) -> Self {
        Self {
            descriptor: self.descriptor,
            read_mtu: if lock.contains(TransportLock::READ) {
                self.read_mtu
            } else {
                0
            },
            write_mtu: if lock.contains(TransportLock::WRITE) {
                self.write_mtu
            } else {
                0
            },
        }
    }
}

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportState {
    /// Nothing playing, nothing acquired
    #[default]
    Idle,
    /// Playback started by the profile layer, not yet acquired
    Pending,
    /// First acquire in flight
    Requesting,
    /// Stream acquired
    Active,
    /// Last release in flight
    Suspending,
}

impl TransportState {
    /// Whether the underlying profile resource is held
    #[must_use]
    pub const fn in_use(self) -> bool {
        matches!(self, Self::Requesting | Self::Active | Self::Suspending)
    }

    /// External state string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle | Self::Requesting => "idle",
            Self::Pending => "pending",
            Self::Active | Self::Suspending => "active",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_strings_collapse() {
        assert_eq!(TransportState::Idle.as_str(), "idle");
        assert_eq!(TransportState::Requesting.as_str(), "idle");
        assert_eq!(TransportState::Pending.as_str(), "pending");
        assert_eq!(TransportState::Active.as_str(), "active");
        assert_eq!(TransportState::Suspending.as_str(), "active");
    }

    #[test]
    fn test_state_in_use() {
        assert!(!TransportState::Idle.in_use());
        assert!(!TransportState::Pending.in_use());
        assert!(TransportState::Requesting.in_use());
        assert!(TransportState::Active.in_use());
        assert!(TransportState::Suspending.in_use());
    }

    #[test]
    fn test_stream_masking() {
        let stream = StreamInfo {
            descriptor: StreamDescriptor(7),
            read_mtu: 48,
            write_mtu: 48,
        };
        assert_eq!(stream.masked(TransportLock::READ).write_mtu, 0);
        assert_eq!(stream.masked(TransportLock::READ).read_mtu, 48);
        assert_eq!(stream.masked(TransportLock::WRITE).read_mtu, 0);
        assert_eq!(stream.masked(TransportLock::READ_WRITE), stream);
    }
}

//! Profile Adapters
//!
//! The profile-specific half of a transport. A [`ProfileSession`] is the
//! underlying A2DP or hands-free session owned by the profile layer; a
//! [`ProfileAdapter`] is the per-transport glue that drives it and exposes
//! profile properties. One adapter exists per profile family and it is picked
//! from the negotiated service UUID when the transport is created.

use super::{RequestId, StreamInfo, TransportState};
use crate::{
    Error,
    bus::{Properties, Property, PropertyValue},
    constants::{DEFAULT_SCO_MTU, MAX_VOLUME},
    uuid::{self, Uuid},
};

/// A2DP endpoint role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Audio source (sends audio)
    Source,
    /// Audio sink (receives audio)
    Sink,
}

/// Profile family a transport belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Profile {
    /// A2DP source or sink endpoint
    A2dp(Role),
    /// Local audio gateway talking to a remote headset (HFP/HSP AG)
    Headset,
    /// Local headset talking to a remote audio gateway (HFP/HSP HF)
    Gateway,
}

impl Profile {
    /// Profile family for a negotiated service UUID
    #[must_use]
    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        if *uuid == uuid::A2DP_SOURCE {
            Some(Self::A2dp(Role::Source))
        } else if *uuid == uuid::A2DP_SINK {
            Some(Self::A2dp(Role::Sink))
        } else if *uuid == uuid::HFP_AG || *uuid == uuid::HSP_AG {
            Some(Self::Headset)
        } else if *uuid == uuid::HFP_HS || *uuid == uuid::HSP_HS {
            Some(Self::Gateway)
        } else {
            None
        }
    }
}

/// The profile layer's streaming session behind one transport.
///
/// `resume` and `suspend` start asynchronous operations. The session reports
/// their outcome exactly once through the transport manager's completion
/// entry points, quoting the owner it was called for.
pub trait ProfileSession {
    /// Take the profile-level stream lock. Returns `false` if it is held elsewhere.
    fn lock(&mut self) -> bool;

    /// Drop the profile-level stream lock
    fn unlock(&mut self);

    /// Start streaming on behalf of `owner`. `None` means the request could not be started.
    fn resume(&mut self, owner: &str) -> Option<RequestId>;

    /// Stop streaming on behalf of `owner`. `None` means there is nothing to wait for.
    fn suspend(&mut self, owner: &str) -> Option<RequestId>;

    /// Abandon an operation started by `resume` or `suspend`
    fn cancel(&mut self, id: RequestId);

    /// The live stream, once the session has one
    fn stream(&self) -> Option<StreamInfo>;

    /// Whether the remote side is currently playing
    fn is_playing(&self) -> bool;

    /// Send an absolute volume to the remote device (AVRCP)
    ///
    /// # Errors
    /// Returns `Error::NotSupported` unless the session has a remote control channel.
    fn set_volume(&mut self, volume: u8) -> Result<(), Error> {
        let _ = volume;
        Err(Error::NotSupported)
    }

    /// Noise reduction and echo cancelling state (hands-free)
    fn nrec(&self) -> bool {
        false
    }

    /// Change noise reduction and echo cancelling (hands-free)
    ///
    /// # Errors
    /// Sessions that forward the change may report a failure.
    fn set_nrec(&mut self, enabled: bool) -> Result<(), Error> {
        let _ = enabled;
        Ok(())
    }

    /// In-band ringtone state (hands-free)
    fn inband_ringtone(&self) -> bool {
        false
    }

    /// Change in-band ringtone (hands-free)
    ///
    /// # Errors
    /// Sessions that forward the change may report a failure.
    fn set_inband_ringtone(&mut self, enabled: bool) -> Result<(), Error> {
        let _ = enabled;
        Ok(())
    }

    /// Whether SCO audio is routed over HCI rather than PCM
    fn sco_over_hci(&self) -> bool {
        true
    }
}

/// Per-profile behaviour of a transport
pub trait ProfileAdapter {
    /// Profile family
    fn profile(&self) -> Profile;

    /// Start streaming for `owner`. The profile lock is taken unless the
    /// transport already holds it.
    fn resume(
        &mut self,
        session: &mut dyn ProfileSession,
        in_use: bool,
        owner: &str,
    ) -> Option<RequestId> {
        if !in_use && !session.lock() {
            return None;
        }
        let id = session.resume(owner);
        if id.is_none() && !in_use {
            session.unlock();
        }
        id
    }

    /// Stop streaming for `owner`
    fn suspend(&mut self, session: &mut dyn ProfileSession, owner: &str) -> Option<RequestId> {
        session.suspend(owner)
    }

    /// Suspend without an owner: drop the profile lock and settle on `Pending`
    /// if the remote is still playing, `Idle` otherwise.
    fn release(&mut self, session: &mut dyn ProfileSession) -> TransportState {
        let playing = session.is_playing();
        session.unlock();
        if playing {
            TransportState::Pending
        } else {
            TransportState::Idle
        }
    }

    /// Abandon an in-flight resume or suspend
    fn cancel(&mut self, session: &mut dyn ProfileSession, id: RequestId) {
        session.cancel(id);
    }

    /// The stream to hand out once a resume completed
    fn stream(&self, session: &dyn ProfileSession) -> Option<StreamInfo> {
        session.stream()
    }

    /// Append profile-specific properties
    ///
    /// # Errors
    /// Returns a resource error if `properties` is full.
    fn properties(
        &self,
        session: &dyn ProfileSession,
        properties: &mut Properties,
    ) -> Result<(), Error>;

    /// Change a writable profile property
    ///
    /// # Errors
    /// Returns `Error::InvalidArguments` for unknown names, wrong value types or
    /// out of range values.
    fn set_property(
        &mut self,
        session: &mut dyn ProfileSession,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), Error>;
}

fn push(properties: &mut Properties, name: &'static str, value: PropertyValue) -> Result<(), Error> {
    properties
        .push(Property::new(name, value))
        .map_err(|_| Error::NO_RESOURCES)
}

/// A2DP source and sink transports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A2dpAdapter {
    role: Role,
    delay: u16,
    volume: Option<u16>,
}

impl A2dpAdapter {
    /// Create an adapter for `role`
    #[must_use]
    pub const fn new(role: Role) -> Self {
        Self {
            role,
            delay: 0,
            volume: None,
        }
    }

    /// Endpoint role
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Current delay report, in 1/10 ms
    #[must_use]
    pub const fn delay(&self) -> u16 {
        self.delay
    }

    /// Last known absolute volume
    #[must_use]
    pub const fn volume(&self) -> Option<u16> {
        self.volume
    }

    /// Record a delay reported by the remote. Returns `true` if it changed.
    pub fn update_delay(&mut self, delay: u16) -> bool {
        if self.delay == delay {
            return false;
        }
        self.delay = delay;
        true
    }

    /// Record a volume reported by the remote. Returns `true` if it changed.
    pub fn update_volume(&mut self, volume: u16) -> bool {
        if self.volume == Some(volume) {
            return false;
        }
        self.volume = Some(volume);
        true
    }
}

impl ProfileAdapter for A2dpAdapter {
    fn profile(&self) -> Profile {
        Profile::A2dp(self.role)
    }

    fn properties(
        &self,
        _session: &dyn ProfileSession,
        properties: &mut Properties,
    ) -> Result<(), Error> {
        push(properties, "Delay", PropertyValue::U16(self.delay))?;
        if let Some(volume) = self.volume.filter(|volume| *volume <= MAX_VOLUME) {
            push(properties, "Volume", PropertyValue::U16(volume))?;
        }
        Ok(())
    }

    fn set_property(
        &mut self,
        session: &mut dyn ProfileSession,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), Error> {
        match name {
            "Delay" => {
                self.delay = value.as_u16().ok_or(Error::InvalidArguments)?;
                Ok(())
            }
            "Volume" => {
                let volume = value.as_u16().ok_or(Error::InvalidArguments)?;
                let level = u8::try_from(volume)
                    .ok()
                    .filter(|_| volume <= MAX_VOLUME)
                    .ok_or(Error::InvalidArguments)?;
                if self.volume == Some(volume) {
                    return Ok(());
                }
                session.set_volume(level)?;
                self.volume = Some(volume);
                Ok(())
            }
            _ => Err(Error::InvalidArguments),
        }
    }
}

/// HFP/HSP transports where the local side is the audio gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadsetAdapter {
    sco_mtu: u16,
}

impl HeadsetAdapter {
    /// Create an adapter reporting `sco_mtu` in both directions
    #[must_use]
    pub const fn new(sco_mtu: u16) -> Self {
        Self { sco_mtu }
    }
}

impl Default for HeadsetAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_SCO_MTU)
    }
}

impl ProfileAdapter for HeadsetAdapter {
    fn profile(&self) -> Profile {
        Profile::Headset
    }

    fn stream(&self, session: &dyn ProfileSession) -> Option<StreamInfo> {
        session.stream().map(|stream| StreamInfo {
            read_mtu: self.sco_mtu,
            write_mtu: self.sco_mtu,
            ..stream
        })
    }

    fn properties(
        &self,
        session: &dyn ProfileSession,
        properties: &mut Properties,
    ) -> Result<(), Error> {
        push(properties, "NREC", PropertyValue::Bool(session.nrec()))?;
        push(
            properties,
            "InbandRingtone",
            PropertyValue::Bool(session.inband_ringtone()),
        )?;
        let routing = if session.sco_over_hci() { "HCI" } else { "PCM" };
        push(properties, "Routing", PropertyValue::Str(routing))
    }

    fn set_property(
        &mut self,
        session: &mut dyn ProfileSession,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), Error> {
        let enabled = value.as_bool().ok_or(Error::InvalidArguments)?;
        match name {
            "NREC" => session.set_nrec(enabled),
            "InbandRingtone" => session.set_inband_ringtone(enabled),
            _ => Err(Error::InvalidArguments),
        }
    }
}

/// HFP/HSP transports where the local side is the headset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayAdapter {
    sco_mtu: u16,
}

impl GatewayAdapter {
    /// Create an adapter reporting `sco_mtu` in both directions
    #[must_use]
    pub const fn new(sco_mtu: u16) -> Self {
        Self { sco_mtu }
    }
}

impl Default for GatewayAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_SCO_MTU)
    }
}

impl ProfileAdapter for GatewayAdapter {
    fn profile(&self) -> Profile {
        Profile::Gateway
    }

    fn stream(&self, session: &dyn ProfileSession) -> Option<StreamInfo> {
        session.stream().map(|stream| StreamInfo {
            read_mtu: self.sco_mtu,
            write_mtu: self.sco_mtu,
            ..stream
        })
    }

    fn properties(
        &self,
        _session: &dyn ProfileSession,
        _properties: &mut Properties,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn set_property(
        &mut self,
        _session: &mut dyn ProfileSession,
        _name: &str,
        _value: &PropertyValue,
    ) -> Result<(), Error> {
        Err(Error::InvalidArguments)
    }
}

/// Storage for the adapter picked at transport creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaProfile {
    /// A2DP
    A2dp(A2dpAdapter),
    /// Audio gateway side of HFP/HSP
    Headset(HeadsetAdapter),
    /// Headset side of HFP/HSP
    Gateway(GatewayAdapter),
}

impl MediaProfile {
    /// Pick the adapter matching a negotiated service UUID
    ///
    /// # Errors
    /// Returns `Error::InvalidArguments` if the UUID is not a media profile.
    pub fn for_uuid(uuid: &Uuid, sco_mtu: u16) -> Result<Self, Error> {
        match Profile::from_uuid(uuid).ok_or(Error::InvalidArguments)? {
            Profile::A2dp(role) => Ok(Self::A2dp(A2dpAdapter::new(role))),
            Profile::Headset => Ok(Self::Headset(HeadsetAdapter::new(sco_mtu))),
            Profile::Gateway => Ok(Self::Gateway(GatewayAdapter::new(sco_mtu))),
        }
    }

    /// The adapter
    #[must_use]
    pub fn adapter(&self) -> &dyn ProfileAdapter {
        match self {
            Self::A2dp(adapter) => adapter,
            Self::Headset(adapter) => adapter,
            Self::Gateway(adapter) => adapter,
        }
    }

    /// The adapter, mutably
    pub fn adapter_mut(&mut self) -> &mut dyn ProfileAdapter {
        match self {
            Self::A2dp(adapter) => adapter,
            Self::Headset(adapter) => adapter,
            Self::Gateway(adapter) => adapter,
        }
    }

    /// The A2DP adapter, if this is an A2DP transport
    pub fn a2dp_mut(&mut self) -> Option<&mut A2dpAdapter> {
        match self {
            Self::A2dp(adapter) => Some(adapter),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::transport::StreamDescriptor;
    use std::vec::Vec as StdVec;

    /// Scriptable profile session recording every call.
    #[derive(Debug, Default)]
    pub(crate) struct MockSession {
        pub locked: bool,
        pub lock_calls: usize,
        pub unlock_calls: usize,
        pub resumes: StdVec<(std::string::String, RequestId)>,
        pub suspends: StdVec<(std::string::String, RequestId)>,
        pub cancelled: StdVec<RequestId>,
        pub volumes: StdVec<u8>,
        pub playing: bool,
        pub fail_lock: bool,
        pub fail_resume: bool,
        pub immediate_suspend: bool,
        pub stream: Option<StreamInfo>,
        pub next_id: u32,
    }

    impl MockSession {
        pub(crate) fn streaming(descriptor: i32, read_mtu: u16, write_mtu: u16) -> Self {
            Self {
                stream: Some(StreamInfo {
                    descriptor: StreamDescriptor(descriptor),
                    read_mtu,
                    write_mtu,
                }),
                ..Self::default()
            }
        }

        fn next(&mut self) -> RequestId {
            self.next_id += 1;
            RequestId(self.next_id)
        }
    }

    impl ProfileSession for MockSession {
        fn lock(&mut self) -> bool {
            self.lock_calls += 1;
            if self.fail_lock || self.locked {
                return false;
            }
            self.locked = true;
            true
        }

        fn unlock(&mut self) {
            self.unlock_calls += 1;
            self.locked = false;
        }

        fn resume(&mut self, owner: &str) -> Option<RequestId> {
            if self.fail_resume {
                return None;
            }
            let id = self.next();
            self.resumes.push((owner.into(), id));
            Some(id)
        }

        fn suspend(&mut self, owner: &str) -> Option<RequestId> {
            if self.immediate_suspend {
                return None;
            }
            let id = self.next();
            self.suspends.push((owner.into(), id));
            Some(id)
        }

        fn cancel(&mut self, id: RequestId) {
            self.cancelled.push(id);
        }

        fn stream(&self) -> Option<StreamInfo> {
            self.stream
        }

        fn is_playing(&self) -> bool {
            self.playing
        }

        fn set_volume(&mut self, volume: u8) -> Result<(), Error> {
            self.volumes.push(volume);
            Ok(())
        }

        fn nrec(&self) -> bool {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockSession;
    use super::*;
    use crate::bus::find_property;

    #[test]
    fn test_profile_from_uuid() {
        assert_eq!(
            Profile::from_uuid(&uuid::A2DP_SOURCE),
            Some(Profile::A2dp(Role::Source))
        );
        assert_eq!(
            Profile::from_uuid(&uuid::A2DP_SINK),
            Some(Profile::A2dp(Role::Sink))
        );
        assert_eq!(Profile::from_uuid(&uuid::HFP_AG), Some(Profile::Headset));
        assert_eq!(Profile::from_uuid(&uuid::HSP_AG), Some(Profile::Headset));
        assert_eq!(Profile::from_uuid(&uuid::HFP_HS), Some(Profile::Gateway));
        assert_eq!(Profile::from_uuid(&uuid::HSP_HS), Some(Profile::Gateway));
        assert_eq!(Profile::from_uuid(&Uuid::Uuid16(0x180F)), None);
        assert_eq!(
            MediaProfile::for_uuid(&Uuid::Uuid16(0x180F), DEFAULT_SCO_MTU),
            Err(Error::InvalidArguments)
        );
    }

    #[test]
    fn test_resume_takes_lock_only_when_idle() {
        let mut session = MockSession::default();
        let mut adapter = A2dpAdapter::new(Role::Source);

        assert!(adapter.resume(&mut session, false, ":1.1").is_some());
        assert!(session.locked);
        assert_eq!(session.lock_calls, 1);

        assert!(adapter.resume(&mut session, true, ":1.2").is_some());
        assert_eq!(session.lock_calls, 1);
    }

    #[test]
    fn test_resume_failure_drops_lock() {
        let mut session = MockSession {
            fail_resume: true,
            ..MockSession::default()
        };
        let mut adapter = A2dpAdapter::new(Role::Sink);
        assert!(adapter.resume(&mut session, false, ":1.1").is_none());
        assert!(!session.locked);

        let mut busy = MockSession {
            fail_lock: true,
            ..MockSession::default()
        };
        assert!(adapter.resume(&mut busy, false, ":1.1").is_none());
        assert!(busy.resumes.is_empty());
    }

    #[test]
    fn test_release_settles_by_playing_state() {
        let mut adapter = HeadsetAdapter::default();
        let mut session = MockSession {
            locked: true,
            playing: true,
            ..MockSession::default()
        };
        assert_eq!(adapter.release(&mut session), TransportState::Pending);
        assert!(!session.locked);

        session.playing = false;
        assert_eq!(adapter.release(&mut session), TransportState::Idle);
    }

    #[test]
    fn test_headset_reports_sco_mtu() {
        let session = MockSession::streaming(3, 672, 895);
        let stream = HeadsetAdapter::new(48).stream(&session).unwrap();
        assert_eq!((stream.read_mtu, stream.write_mtu), (48, 48));

        let stream = A2dpAdapter::new(Role::Source).stream(&session).unwrap();
        assert_eq!((stream.read_mtu, stream.write_mtu), (672, 895));
    }

    #[test]
    fn test_a2dp_volume() {
        let mut session = MockSession::default();
        let mut adapter = A2dpAdapter::new(Role::Source);

        assert_eq!(
            adapter.set_property(&mut session, "Volume", &PropertyValue::U16(128)),
            Err(Error::InvalidArguments)
        );
        assert_eq!(
            adapter.set_property(&mut session, "Volume", &PropertyValue::Bool(true)),
            Err(Error::InvalidArguments)
        );

        adapter
            .set_property(&mut session, "Volume", &PropertyValue::U16(100))
            .unwrap();
        assert_eq!(session.volumes, [100]);
        assert_eq!(adapter.volume(), Some(100));

        // Same value is a no-op
        adapter
            .set_property(&mut session, "Volume", &PropertyValue::U16(100))
            .unwrap();
        assert_eq!(session.volumes, [100]);

        let mut properties = Properties::new();
        adapter.properties(&session, &mut properties).unwrap();
        assert_eq!(
            find_property(&properties, "Volume"),
            Some(&PropertyValue::U16(100))
        );
    }

    #[test]
    fn test_a2dp_delay_and_updates() {
        let mut session = MockSession::default();
        let mut adapter = A2dpAdapter::new(Role::Sink);
        adapter
            .set_property(&mut session, "Delay", &PropertyValue::U16(150))
            .unwrap();
        assert_eq!(adapter.delay(), 150);
        assert!(!adapter.update_delay(150));
        assert!(adapter.update_delay(200));
        assert!(adapter.update_volume(20));
        assert!(!adapter.update_volume(20));

        let mut properties = Properties::new();
        adapter.properties(&session, &mut properties).unwrap();
        assert_eq!(
            find_property(&properties, "Delay"),
            Some(&PropertyValue::U16(200))
        );
    }

    #[test]
    fn test_volume_hidden_until_known() {
        let session = MockSession::default();
        let mut properties = Properties::new();
        A2dpAdapter::new(Role::Sink)
            .properties(&session, &mut properties)
            .unwrap();
        assert!(find_property(&properties, "Volume").is_none());
    }

    #[test]
    fn test_headset_properties() {
        let mut session = MockSession::default();
        let mut adapter = HeadsetAdapter::default();
        let mut properties = Properties::new();
        adapter.properties(&session, &mut properties).unwrap();
        assert_eq!(
            find_property(&properties, "NREC"),
            Some(&PropertyValue::Bool(true))
        );
        assert_eq!(
            find_property(&properties, "Routing"),
            Some(&PropertyValue::Str("HCI"))
        );

        adapter
            .set_property(&mut session, "InbandRingtone", &PropertyValue::Bool(true))
            .unwrap();
        assert_eq!(
            adapter.set_property(&mut session, "Routing", &PropertyValue::Bool(true)),
            Err(Error::InvalidArguments)
        );
    }

    #[test]
    fn test_gateway_has_nothing_writable() {
        let mut session = MockSession::default();
        let mut adapter = GatewayAdapter::default();
        assert_eq!(
            adapter.set_property(&mut session, "NREC", &PropertyValue::Bool(true)),
            Err(Error::InvalidArguments)
        );
        let mut properties = Properties::new();
        adapter.properties(&session, &mut properties).unwrap();
        assert!(properties.is_empty());
    }
}

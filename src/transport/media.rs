//! Media Transport State Machine
//!
//! One [`MediaTransport`] per negotiated streaming endpoint. It tracks lock
//! ownership, drives the profile adapter's resume and suspend operations and
//! answers the method calls that triggered them once the profile layer
//! reports completion.
//!
//! ```text
//! IDLE --acquire--> REQUESTING --resume done--> ACTIVE
//! IDLE --playback started--> PENDING --acquire, resume done--> ACTIVE
//! ACTIVE --last release--> SUSPENDING --suspend done--> IDLE | PENDING
//! ```

use super::{
    Access, MediaOwner, MediaProfile, MediaRequest, OwnerSet, ProfileSession, RequestId,
    RequestKind, StreamInfo, TransportId, TransportLock, TransportState,
};
use crate::{
    BluetoothAddress, Error,
    bus::{ClientId, MessageBus, ObjectPath, Properties, Property, PropertyValue, Reply, ReplyToken},
    constants::{MAX_CONFIGURATION_SIZE, MAX_OWNERS, MAX_VOLUME},
    uuid::Uuid,
};
use core::fmt::Write;
use heapless::Vec;

/// Parameters of a newly negotiated stream
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig<'a> {
    /// Remote device
    pub device: BluetoothAddress,
    /// Object path of the remote device
    pub device_path: &'a str,
    /// Negotiated service UUID, selects the profile adapter
    pub uuid: Uuid,
    /// Codec identifier
    pub codec: u8,
    /// Raw codec configuration
    pub configuration: &'a [u8],
}

/// How a method call is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Completion {
    /// Answer with an empty success reply now
    Done,
    /// The reply has been, or will be, sent through the bus
    Pending,
}

/// A media transport
#[derive(Debug)]
pub struct MediaTransport<S: ProfileSession> {
    id: TransportId,
    path: ObjectPath,
    device: BluetoothAddress,
    device_path: ObjectPath,
    uuid: Uuid,
    codec: u8,
    configuration: Vec<u8, MAX_CONFIGURATION_SIZE>,
    profile: MediaProfile,
    session: S,
    owners: OwnerSet,
    lock: TransportLock,
    state: TransportState,
    stream: Option<StreamInfo>,
}

impl<S: ProfileSession> MediaTransport<S> {
    /// Create a transport exported at `{device_path}/fd{id}`
    ///
    /// # Errors
    /// Returns `Error::InvalidArguments` if the UUID is not a media profile or
    /// the path does not fit, and a resource error if the configuration is too large.
    pub fn new(
        id: TransportId,
        config: TransportConfig<'_>,
        session: S,
        sco_mtu: u16,
    ) -> Result<Self, Error> {
        let profile = MediaProfile::for_uuid(&config.uuid, sco_mtu)?;

        let device_path =
            ObjectPath::try_from(config.device_path).map_err(|()| Error::InvalidArguments)?;
        let mut path = ObjectPath::new();
        write!(path, "{}/fd{}", config.device_path, id.0).map_err(|_| Error::InvalidArguments)?;

        let configuration =
            Vec::from_slice(config.configuration).map_err(|()| Error::NO_RESOURCES)?;

        Ok(Self {
            id,
            path,
            device: config.device,
            device_path,
            uuid: config.uuid,
            codec: config.codec,
            configuration,
            profile,
            session,
            owners: OwnerSet::new(),
            lock: TransportLock::NONE,
            state: TransportState::Idle,
            stream: None,
        })
    }

    /// Transport id
    #[must_use]
    pub const fn id(&self) -> TransportId {
        self.id
    }

    /// Object path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Remote device
    #[must_use]
    pub const fn device(&self) -> BluetoothAddress {
        self.device
    }

    /// Negotiated service UUID
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> TransportState {
        self.state
    }

    /// Aggregate lock held by all owners
    #[must_use]
    pub const fn lock(&self) -> TransportLock {
        self.lock
    }

    /// Current owners
    #[must_use]
    pub const fn owners(&self) -> &OwnerSet {
        &self.owners
    }

    /// Stream obtained by the last successful resume
    #[must_use]
    pub const fn stream(&self) -> Option<StreamInfo> {
        self.stream
    }

    /// Profile adapter
    #[must_use]
    pub const fn profile(&self) -> &MediaProfile {
        &self.profile
    }

    /// Profile session
    #[must_use]
    pub const fn session(&self) -> &S {
        &self.session
    }

    /// Profile session, mutably
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Give the profile session back
    #[must_use]
    pub fn into_session(self) -> S {
        self.session
    }

    /// Handle `Acquire(access)` from `client`.
    ///
    /// On success the reply is sent through the bus, either right away when
    /// the stream is already active or once the profile resume completes.
    ///
    /// # Errors
    /// - `Error::NotAuthorized` if `client` already owns this transport, a
    ///   requested bit is held, or the profile refused to resume
    /// - `Error::InvalidArguments` if no bit was requested
    /// - `Error::Failed` if `?` was given and playback has not started
    /// - `Error::AlreadyInProgress` if another resume or suspend is in flight
    pub fn acquire<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        client: &str,
        token: ReplyToken,
        access: &str,
    ) -> Result<Completion, Error> {
        if self.owners.contains(client) {
            return Err(Error::NotAuthorized);
        }

        let access = Access::parse(access);
        if access.lock.is_empty() {
            return Err(Error::InvalidArguments);
        }
        if access.weak && self.state != TransportState::Pending {
            return Err(Error::NOT_PLAYING);
        }
        if self.lock.intersects(access.lock) {
            return Err(Error::NotAuthorized);
        }
        if self.owners.has_in_flight() {
            return Err(Error::AlreadyInProgress);
        }
        if self.owners.len() >= MAX_OWNERS {
            return Err(Error::NO_RESOURCES);
        }

        let client_id = ClientId::try_from(client).map_err(|()| Error::InvalidArguments)?;
        let mut owner = MediaOwner::new(client_id, access.lock);

        if let (TransportState::Active, Some(stream)) = (self.state, self.stream) {
            let masked = stream.masked(access.lock);
            bus.send_reply(
                token,
                Reply::Acquired {
                    descriptor: masked.descriptor,
                    read_mtu: masked.read_mtu,
                    write_mtu: masked.write_mtu,
                },
            )?;
            owner.watch = bus.watch_disconnect(client);
            self.owners.insert(owner)?;
            self.lock = self.lock | access.lock;
            debug!(
                "[TRANSPORT] {} joined by {} ({})",
                self.path.as_str(),
                client,
                access.lock.as_str()
            );
            return Ok(Completion::Pending);
        }

        self.lock = self.lock | access.lock;
        let in_use = self.state.in_use();
        let Some(id) = self
            .profile
            .adapter_mut()
            .resume(&mut self.session, in_use, client)
        else {
            self.lock = self.lock & !access.lock;
            warn!("[TRANSPORT] {} resume refused for {}", self.path.as_str(), client);
            return Err(Error::NotAuthorized);
        };

        owner.pending = Some(MediaRequest {
            kind: RequestKind::Acquire,
            token,
            id: Some(id),
        });
        owner.watch = bus.watch_disconnect(client);
        if let Err(e) = self.owners.insert(owner) {
            self.profile.adapter_mut().cancel(&mut self.session, id);
            self.lock = self.lock & !access.lock;
            return Err(e);
        }

        if self.state == TransportState::Idle {
            self.set_state(bus, TransportState::Requesting);
        }
        debug!(
            "[TRANSPORT] {} resume {} for {} ({})",
            self.path.as_str(),
            id,
            client,
            access.lock.as_str()
        );
        Ok(Completion::Pending)
    }

    /// Handle `Release(access)` from `client`.
    ///
    /// # Errors
    /// - `Error::NotAuthorized` if `client` is not an owner or does not hold the bits
    /// - `Error::InvalidArguments` if no bit was given
    /// - `Error::AlreadyInProgress` if the owner's release is already in flight
    pub fn release<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        client: &str,
        token: ReplyToken,
        access: &str,
    ) -> Result<Completion, Error> {
        let owner = self.owners.get(client).ok_or(Error::NotAuthorized)?;
        let held = owner.lock;
        let pending = owner.pending;

        let lock = Access::parse(access).lock;
        if lock.is_empty() {
            return Err(Error::InvalidArguments);
        }

        if lock == held {
            if self.owners.len() > 1 {
                self.remove_owner(bus, client);
                return Ok(Completion::Done);
            }

            match pending {
                Some(request) if request.kind == RequestKind::Acquire => {
                    debug!(
                        "[TRANSPORT] {} cancelling acquire of {}",
                        self.path.as_str(),
                        client
                    );
                    self.remove_owner(bus, client);
                    return Ok(Completion::Done);
                }
                Some(_) => return Err(Error::AlreadyInProgress),
                None => {}
            }

            self.set_state(bus, TransportState::Suspending);
            let suspended = self
                .profile
                .adapter_mut()
                .suspend(&mut self.session, client);
            match suspended {
                Some(id) => {
                    if let Some(owner) = self.owners.get_mut(client) {
                        owner.pending = Some(MediaRequest {
                            kind: RequestKind::Release,
                            token,
                            id: Some(id),
                        });
                    }
                    debug!("[TRANSPORT] {} suspend {}", self.path.as_str(), id);
                    Ok(Completion::Pending)
                }
                None => {
                    self.remove_owner(bus, client);
                    Ok(Completion::Done)
                }
            }
        } else if held.contains(lock) {
            if let Some(owner) = self.owners.get_mut(client) {
                owner.lock = held & !lock;
            }
            self.lock = self.lock & !lock;
            Ok(Completion::Done)
        } else {
            Err(Error::NotAuthorized)
        }
    }

    /// Profile layer finished the resume `id` started for `client`
    ///
    /// Completions that do not match the owner's in-flight resume are
    /// dropped.
    pub fn resume_complete<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        client: &str,
        id: RequestId,
        result: Result<(), Error>,
    ) {
        let Some(owner) = self.owners.get_mut(client) else {
            warn!("[TRANSPORT] resume completion for unknown owner {}", client);
            return;
        };
        let Some(request) = owner
            .pending
            .as_mut()
            .filter(|r| r.kind == RequestKind::Acquire && r.id == Some(id))
        else {
            warn!("[TRANSPORT] stale resume {} completion for {}", id, client);
            return;
        };
        request.id = None;
        let token = request.token;
        let lock = owner.lock;

        if let Err(e) = result {
            warn!(
                "[TRANSPORT] {} resume failed for {}: {}",
                self.path.as_str(),
                client,
                e
            );
            self.remove_owner(bus, client);
            return;
        }

        let Some(stream) = self.profile.adapter().stream(&self.session) else {
            warn!("[TRANSPORT] {} resumed without a stream", self.path.as_str());
            self.remove_owner(bus, client);
            return;
        };
        self.stream = Some(stream);

        let masked = stream.masked(lock);
        let reply = Reply::Acquired {
            descriptor: masked.descriptor,
            read_mtu: masked.read_mtu,
            write_mtu: masked.write_mtu,
        };
        if bus.send_reply(token, reply).is_err() {
            self.remove_owner(bus, client);
            return;
        }

        if let Some(owner) = self.owners.get_mut(client) {
            owner.pending = None;
        }
        self.set_state(bus, TransportState::Active);
    }

    /// Profile layer finished the suspend `id` started for `client`. Always treated as success.
    pub fn suspend_complete<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        client: &str,
        id: RequestId,
    ) {
        let Some(owner) = self.owners.get_mut(client) else {
            warn!("[TRANSPORT] suspend completion for unknown owner {}", client);
            return;
        };
        let Some(request) = owner
            .pending
            .filter(|r| r.kind == RequestKind::Release && r.id == Some(id))
        else {
            warn!("[TRANSPORT] stale suspend {} completion for {}", id, client);
            return;
        };
        owner.pending = None;
        if bus.send_reply(request.token, Reply::Done).is_err() {
            warn!("[TRANSPORT] release reply to {} not sent", client);
        }
        self.remove_owner(bus, client);
    }

    /// The profile layer reports playback started or stopped
    pub fn update_playing<B: MessageBus + ?Sized>(&mut self, bus: &mut B, playing: bool) {
        debug!(
            "[TRANSPORT] {} playing={} state={}",
            self.path.as_str(),
            playing,
            self.state
        );
        if playing {
            if self.state == TransportState::Idle {
                self.set_state(bus, TransportState::Pending);
            }
            return;
        }

        match self.state {
            TransportState::Pending => self.set_state(bus, TransportState::Idle),
            TransportState::Active => self.remove_all_owners(bus),
            _ => {}
        }
    }

    /// `client` went away. Returns `true` if it owned this transport.
    pub fn client_disconnected<B: MessageBus + ?Sized>(&mut self, bus: &mut B, client: &str) -> bool {
        let Some(owner) = self.owners.get_mut(client) else {
            return false;
        };
        // The watch fired, nothing left to remove
        owner.watch = None;
        info!("[TRANSPORT] {} owner {} disconnected", self.path.as_str(), client);
        self.remove_owner(bus, client);
        true
    }

    /// Tear down: every owner is removed and pending calls fail
    pub fn shutdown<B: MessageBus + ?Sized>(&mut self, bus: &mut B) {
        self.remove_all_owners(bus);
        self.stream = None;
    }

    /// `GetProperties`
    ///
    /// # Errors
    /// Returns a resource error if the property map overflows.
    pub fn properties(&self) -> Result<Properties, Error> {
        let mut properties = Properties::new();
        let common = [
            Property::new("Device", PropertyValue::Path(self.device_path.clone())),
            Property::new("UUID", PropertyValue::Uuid(self.uuid)),
            Property::new("Codec", PropertyValue::Byte(self.codec)),
            Property::new(
                "Configuration",
                PropertyValue::Bytes(self.configuration.clone()),
            ),
            Property::new("State", PropertyValue::Str(self.state.as_str())),
        ];
        for property in common {
            properties
                .push(property)
                .map_err(|_| Error::NO_RESOURCES)?;
        }
        self.profile
            .adapter()
            .properties(&self.session, &mut properties)?;
        Ok(properties)
    }

    /// `SetProperty` from `client`
    ///
    /// # Errors
    /// Returns `Error::InvalidArguments` if `client` is not an owner,
    /// otherwise whatever the profile adapter rejects the value with.
    pub fn set_property(
        &mut self,
        client: &str,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), Error> {
        if !self.owners.contains(client) {
            return Err(Error::InvalidArguments);
        }
        self.profile
            .adapter_mut()
            .set_property(&mut self.session, name, value)
    }

    /// Delay reported by the remote device (A2DP)
    ///
    /// # Errors
    /// Returns `Error::NotSupported` on non-A2DP transports.
    pub fn update_delay<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        delay: u16,
    ) -> Result<(), Error> {
        let a2dp = self.profile.a2dp_mut().ok_or(Error::NotSupported)?;
        if a2dp.update_delay(delay) {
            bus.property_changed(&self.path, Property::new("Delay", PropertyValue::U16(delay)));
        }
        Ok(())
    }

    /// Volume reported by the remote device (A2DP)
    ///
    /// # Errors
    /// Returns `Error::NotSupported` on non-A2DP transports and
    /// `Error::InvalidArguments` for volumes above 127.
    pub fn update_volume<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        volume: u16,
    ) -> Result<(), Error> {
        if volume > MAX_VOLUME {
            return Err(Error::InvalidArguments);
        }
        let a2dp = self.profile.a2dp_mut().ok_or(Error::NotSupported)?;
        if a2dp.update_volume(volume) {
            bus.property_changed(
                &self.path,
                Property::new("Volume", PropertyValue::U16(volume)),
            );
        }
        Ok(())
    }

    fn set_state<B: MessageBus + ?Sized>(&mut self, bus: &mut B, state: TransportState) {
        let old = self.state;
        if old == state {
            return;
        }
        self.state = state;
        debug!(
            "[TRANSPORT] {} state {} -> {}",
            self.path.as_str(),
            old,
            state
        );
        if old.as_str() != state.as_str() {
            bus.property_changed(
                &self.path,
                Property::new("State", PropertyValue::Str(state.as_str())),
            );
        }
    }

    /// Drop `client`'s owner record: its bits are released, an in-flight
    /// profile operation is cancelled and a pending call fails with an I/O
    /// error. Removing the last owner of an in-use transport releases the
    /// profile lock.
    fn remove_owner<B: MessageBus + ?Sized>(&mut self, bus: &mut B, client: &str) {
        let Some(mut owner) = self.owners.remove(client) else {
            return;
        };
        self.lock = self.lock & !owner.lock;

        if let Some(request) = owner.pending.take() {
            if let Some(id) = request.id {
                self.profile.adapter_mut().cancel(&mut self.session, id);
            }
            if bus.send_reply(request.token, Reply::Error(Error::IO)).is_err() {
                warn!("[TRANSPORT] error reply to {} not sent", client);
            }
        }
        if let Some(watch) = owner.watch.take() {
            bus.remove_watch(watch);
        }

        if self.owners.is_empty() && self.state.in_use() {
            let state = self.profile.adapter_mut().release(&mut self.session);
            self.set_state(bus, state);
        }
    }

    fn remove_all_owners<B: MessageBus + ?Sized>(&mut self, bus: &mut B) {
        while let Some(client) = self.owners.first_client() {
            self.remove_owner(bus, &client);
        }
    }
}

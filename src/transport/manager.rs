//! Transport Manager
//!
//! Registry of live media transports. Method calls, profile completions and
//! client disconnects are routed to the transport they concern.

use super::{Completion, MediaTransport, ProfileSession, RequestId, TransportConfig, TransportId};
use crate::{
    Error,
    bus::{MessageBus, Properties, PropertyValue, ReplyToken},
    constants::{DEFAULT_SCO_MTU, MAX_TRANSPORTS},
};
use heapless::Vec;

/// Media transport registry
#[derive(Debug)]
pub struct TransportManager<S: ProfileSession> {
    transports: Vec<MediaTransport<S>, MAX_TRANSPORTS>,
    next_id: u16,
    sco_mtu: u16,
}

impl<S: ProfileSession> Default for TransportManager<S> {
    fn default() -> Self {
        Self::new(DEFAULT_SCO_MTU)
    }
}

impl<S: ProfileSession> TransportManager<S> {
    /// Create an empty manager; SCO transports report `sco_mtu`
    #[must_use]
    pub const fn new(sco_mtu: u16) -> Self {
        Self {
            transports: Vec::new(),
            next_id: 0,
            sco_mtu,
        }
    }

    /// Number of transports
    #[must_use]
    pub fn len(&self) -> usize {
        self.transports.len()
    }

    /// Whether there are no transports
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    /// Iterate over transports
    pub fn iter(&self) -> impl Iterator<Item = &MediaTransport<S>> {
        self.transports.iter()
    }

    /// Transport by id
    #[must_use]
    pub fn get(&self, id: TransportId) -> Option<&MediaTransport<S>> {
        self.transports.iter().find(|t| t.id() == id)
    }

    /// Transport by id, mutably
    pub fn get_mut(&mut self, id: TransportId) -> Option<&mut MediaTransport<S>> {
        self.transports.iter_mut().find(|t| t.id() == id)
    }

    /// Transport exported at `path`
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<TransportId> {
        self.transports
            .iter()
            .find(|t| t.path() == path)
            .map(MediaTransport::id)
    }

    /// Register a transport for a newly negotiated stream
    ///
    /// # Errors
    /// Returns `Error::InvalidArguments` if the UUID is not a media profile
    /// and a resource error if the registry is full.
    pub fn create_transport(
        &mut self,
        config: TransportConfig<'_>,
        session: S,
    ) -> Result<TransportId, Error> {
        if self.transports.is_full() {
            return Err(Error::NO_RESOURCES);
        }

        // The counter wraps; skip ids still held by a live transport. The
        // registry is not full, so a free id exists.
        let mut id = TransportId(self.next_id);
        while self.transports.iter().any(|t| t.id() == id) {
            id = TransportId(id.0.wrapping_add(1));
        }
        self.next_id = id.0.wrapping_add(1);

        let transport = MediaTransport::new(id, config, session, self.sco_mtu)?;
        info!(
            "[TRANSPORT] created {} for {}",
            transport.path(),
            transport.device().format_hex().as_str()
        );
        self.transports
            .push(transport)
            .map_err(|_| Error::NO_RESOURCES)?;
        Ok(id)
    }

    /// Destroy a transport, failing every pending call on it
    ///
    /// # Errors
    /// Returns `Error::DoesNotExist` for unknown ids.
    pub fn remove_transport<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        id: TransportId,
    ) -> Result<S, Error> {
        let index = self
            .transports
            .iter()
            .position(|t| t.id() == id)
            .ok_or(Error::DoesNotExist)?;
        let mut transport = self.transports.remove(index);
        transport.shutdown(bus);
        info!("[TRANSPORT] removed {}", transport.path());
        Ok(transport.into_session())
    }

    /// `Acquire` on transport `id`
    ///
    /// # Errors
    /// `Error::DoesNotExist` for unknown ids, otherwise see [`MediaTransport::acquire`].
    pub fn acquire<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        id: TransportId,
        client: &str,
        token: ReplyToken,
        access: &str,
    ) -> Result<Completion, Error> {
        self.transport(id)?.acquire(bus, client, token, access)
    }

    /// `Release` on transport `id`
    ///
    /// # Errors
    /// `Error::DoesNotExist` for unknown ids, otherwise see [`MediaTransport::release`].
    pub fn release<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        id: TransportId,
        client: &str,
        token: ReplyToken,
        access: &str,
    ) -> Result<Completion, Error> {
        self.transport(id)?.release(bus, client, token, access)
    }

    /// `SetProperty` on transport `id`
    ///
    /// # Errors
    /// `Error::DoesNotExist` for unknown ids, otherwise see [`MediaTransport::set_property`].
    pub fn set_property(
        &mut self,
        id: TransportId,
        client: &str,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), Error> {
        self.transport(id)?.set_property(client, name, value)
    }

    /// `GetProperties` on transport `id`
    ///
    /// # Errors
    /// `Error::DoesNotExist` for unknown ids.
    pub fn properties(&self, id: TransportId) -> Result<Properties, Error> {
        self.get(id).ok_or(Error::DoesNotExist)?.properties()
    }

    /// Resume completion from the profile layer
    ///
    /// # Errors
    /// `Error::DoesNotExist` for unknown ids.
    pub fn resume_complete<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        id: TransportId,
        client: &str,
        request: RequestId,
        result: Result<(), Error>,
    ) -> Result<(), Error> {
        self.transport(id)?.resume_complete(bus, client, request, result);
        Ok(())
    }

    /// Suspend completion from the profile layer
    ///
    /// # Errors
    /// `Error::DoesNotExist` for unknown ids.
    pub fn suspend_complete<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        id: TransportId,
        client: &str,
        request: RequestId,
    ) -> Result<(), Error> {
        self.transport(id)?.suspend_complete(bus, client, request);
        Ok(())
    }

    /// Playback started or stopped on transport `id`
    ///
    /// # Errors
    /// `Error::DoesNotExist` for unknown ids.
    pub fn update_playing<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        id: TransportId,
        playing: bool,
    ) -> Result<(), Error> {
        self.transport(id)?.update_playing(bus, playing);
        Ok(())
    }

    /// Remote delay report on transport `id`
    ///
    /// # Errors
    /// `Error::DoesNotExist` for unknown ids, otherwise see [`MediaTransport::update_delay`].
    pub fn update_delay<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        id: TransportId,
        delay: u16,
    ) -> Result<(), Error> {
        self.transport(id)?.update_delay(bus, delay)
    }

    /// Remote volume report on transport `id`
    ///
    /// # Errors
    /// `Error::DoesNotExist` for unknown ids, otherwise see [`MediaTransport::update_volume`].
    pub fn update_volume<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        id: TransportId,
        volume: u16,
    ) -> Result<(), Error> {
        self.transport(id)?.update_volume(bus, volume)
    }

    /// `client` disconnected from the bus: drop it from every transport.
    /// Returns the number of transports it owned.
    pub fn client_disconnected<B: MessageBus + ?Sized>(&mut self, bus: &mut B, client: &str) -> usize {
        self.transports
            .iter_mut()
            .map(|t| t.client_disconnected(bus, client))
            .filter(|owned| *owned)
            .count()
    }

    fn transport(&mut self, id: TransportId) -> Result<&mut MediaTransport<S>, Error> {
        self.get_mut(id).ok_or(Error::DoesNotExist)
    }
}

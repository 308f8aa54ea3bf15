//! Plugin Host
//!
//! Owns every piece of transport and attribute state and applies one
//! [`Event`] at a time.
//!
//! ## Architecture
//!
//! 1. **Transports** - [`TransportManager`] answers `Acquire`, `Release`,
//!    `GetProperties` and `SetProperty` and consumes profile completions
//! 2. **Attribute store** - [`AttributeStore`] holds the local GATT database
//! 3. **External services** - [`ExternalServices`] builds services published
//!    by bus clients into the store
//! 4. **Attribute server** - the lower layer the store registers into
//!
//! ## Event Flow
//!
//! 1. Method calls are applied and answered through the [`MessageBus`]; a
//!    call that waits on the profile layer is answered later
//! 2. Profile completions resolve the pending call they belong to
//! 3. A client leaving the bus releases everything it held
//!
//! Nothing here blocks or locks. All mutation happens on the caller's task.

use crate::{
    Error, Event, HostOptions, MethodCall,
    bus::{MessageBus, Reply, ReplyToken},
    gatt::{AttributeServer, AttributeStore, AttributeValue, ExternalServices},
    transport::{Completion, ProfileSession, TransportConfig, TransportId, TransportManager},
    uuid::Uuid,
};

/// Host for the media transport and GATT plugins
#[derive(Debug)]
pub struct PluginHost<S: ProfileSession, A: AttributeServer> {
    transports: TransportManager<S>,
    attributes: AttributeStore,
    external: ExternalServices,
    server: A,
    options: HostOptions,
}

impl<S: ProfileSession, A: AttributeServer> PluginHost<S, A> {
    /// Create a host with default options
    #[must_use]
    pub fn new(server: A) -> Self {
        Self::with_options(HostOptions::default(), server)
    }

    /// Create a host with custom options
    #[must_use]
    pub fn with_options(options: HostOptions, server: A) -> Self {
        Self {
            transports: TransportManager::new(options.sco_mtu),
            attributes: AttributeStore::new(options.first_handle)
                .with_service_changed(options.service_changed),
            external: ExternalServices::new(),
            server,
            options,
        }
    }

    /// Get a reference to the options
    #[must_use]
    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    /// Media transports
    #[must_use]
    pub fn transports(&self) -> &TransportManager<S> {
        &self.transports
    }

    /// Local attribute database
    #[must_use]
    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    /// Mutable access to the local attribute database, for services built
    /// in-process
    pub fn attributes_mut(&mut self) -> &mut AttributeStore {
        &mut self.attributes
    }

    /// Client-registered services
    #[must_use]
    pub fn external(&self) -> &ExternalServices {
        &self.external
    }

    /// The lower-layer attribute server
    #[must_use]
    pub fn server(&self) -> &A {
        &self.server
    }

    /// Register the service under construction with the attribute server
    ///
    /// # Errors
    /// See [`AttributeStore::materialize`].
    pub fn materialize(&mut self) -> Result<crate::gatt::HandleRange, Error> {
        self.attributes.materialize(&mut self.server)
    }

    /// Create a transport for a negotiated stream
    ///
    /// # Errors
    /// See [`TransportManager::create_transport`].
    pub fn create_transport(
        &mut self,
        config: TransportConfig<'_>,
        session: S,
    ) -> Result<TransportId, Error> {
        self.transports.create_transport(config, session)
    }

    /// Serve a remote read of the attribute `uuid`
    ///
    /// # Errors
    /// See [`AttributeStore::dispatch_read`].
    pub fn read_attribute<B: MessageBus + ?Sized>(
        &self,
        bus: &mut B,
        uuid: Uuid,
    ) -> Result<AttributeValue, Error> {
        self.attributes
            .dispatch_read(uuid, &mut self.external.handler(bus))
    }

    /// Serve a remote write of the attribute `uuid`
    ///
    /// # Errors
    /// See [`AttributeStore::dispatch_write`].
    pub fn write_attribute<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        uuid: Uuid,
        value: &[u8],
    ) -> Result<(), Error> {
        self.attributes
            .dispatch_write(uuid, value, &mut self.external.handler(bus))
    }

    /// Apply one event
    pub fn process_event<B: MessageBus + ?Sized>(&mut self, bus: &mut B, event: Event<S>) {
        match event {
            Event::MethodCall {
                client,
                token,
                call,
            } => {
                match self.process_method_call(bus, &client, token, call) {
                    Ok(Some(reply)) => Self::reply(bus, token, reply),
                    Ok(None) => {}
                    Err(e) => {
                        debug!("[HOST] {} call failed: {}", client.as_str(), e);
                        Self::reply(bus, token, Reply::Error(e));
                    }
                }
            }
            Event::TransportConfigured {
                device,
                device_path,
                uuid,
                codec,
                configuration,
                session,
            } => {
                let config = TransportConfig {
                    device,
                    device_path: &device_path,
                    uuid,
                    codec,
                    configuration: &configuration,
                };
                if let Err(e) = self.transports.create_transport(config, session) {
                    warn!("[HOST] no transport for {}: {}", device_path.as_str(), e);
                }
            }
            Event::TransportClosed { transport } => {
                let result = self
                    .transport_id(&transport)
                    .and_then(|id| self.transports.remove_transport(bus, id));
                if let Err(e) = result {
                    warn!("[HOST] close {} failed: {}", transport.as_str(), e);
                }
            }
            Event::ResumeComplete {
                transport,
                client,
                id: request,
                result,
            } => {
                let outcome = self.transport_id(&transport).and_then(|id| {
                    self.transports
                        .resume_complete(bus, id, &client, request, result)
                });
                Self::log_stale(&transport, outcome);
            }
            Event::SuspendComplete {
                transport,
                client,
                id: request,
            } => {
                let outcome = self.transport_id(&transport).and_then(|id| {
                    self.transports
                        .suspend_complete(bus, id, &client, request)
                });
                Self::log_stale(&transport, outcome);
            }
            Event::PlaybackChanged { transport, playing } => {
                let outcome = self
                    .transport_id(&transport)
                    .and_then(|id| self.transports.update_playing(bus, id, playing));
                Self::log_stale(&transport, outcome);
            }
            Event::DelayReported { transport, delay } => {
                let outcome = self
                    .transport_id(&transport)
                    .and_then(|id| self.transports.update_delay(bus, id, delay));
                Self::log_stale(&transport, outcome);
            }
            Event::VolumeReported { transport, volume } => {
                let outcome = self
                    .transport_id(&transport)
                    .and_then(|id| self.transports.update_volume(bus, id, volume));
                Self::log_stale(&transport, outcome);
            }
            Event::ClientDisconnected { client } => {
                let transports = self.transports.client_disconnected(bus, &client);
                let services =
                    self.external
                        .client_disconnected(&mut self.attributes, &mut self.server, &client);
                debug!(
                    "[HOST] {} left: {} transports, {} services",
                    client.as_str(),
                    transports,
                    services
                );
            }
            Event::ProxyAdded { client, proxy } => {
                if !self.external.proxy_added(&client, proxy) {
                    trace!("[HOST] unclaimed object from {}", client.as_str());
                }
            }
            Event::ProxyRemoved { client, path } => {
                self.external.proxy_removed(&client, &path);
            }
            Event::ClientReady { client, path } => {
                if let Err(e) = self.external.client_ready(
                    bus,
                    &mut self.attributes,
                    &mut self.server,
                    &client,
                    &path,
                ) {
                    warn!("[HOST] service {} not registered: {}", path.as_str(), e);
                }
            }
            Event::ValueChanged {
                client,
                path,
                value,
            } => {
                if let Err(e) = self.external.value_changed(
                    &mut self.attributes,
                    &mut self.server,
                    &client,
                    &path,
                    &value,
                ) {
                    debug!("[HOST] value of {} dropped: {}", path.as_str(), e);
                }
            }
        }
    }

    /// Apply a method call, returning the reply to send now if any
    fn process_method_call<B: MessageBus + ?Sized>(
        &mut self,
        bus: &mut B,
        client: &str,
        token: ReplyToken,
        call: MethodCall,
    ) -> Result<Option<Reply>, Error> {
        match call {
            MethodCall::Acquire { transport, access } => {
                let id = self.transport_id(&transport)?;
                let completion = self.transports.acquire(bus, id, client, token, &access)?;
                Ok(Self::immediate(completion))
            }
            MethodCall::Release { transport, access } => {
                let id = self.transport_id(&transport)?;
                let completion = self.transports.release(bus, id, client, token, &access)?;
                Ok(Self::immediate(completion))
            }
            MethodCall::GetProperties { transport } => {
                let id = self.transport_id(&transport)?;
                Ok(Some(Reply::Properties(self.transports.properties(id)?)))
            }
            MethodCall::SetProperty {
                transport,
                name,
                value,
            } => {
                let id = self.transport_id(&transport)?;
                self.transports.set_property(id, client, &name, &value)?;
                Ok(Some(Reply::Done))
            }
            MethodCall::RegisterService { path } => {
                self.external.register_service(client, &path, token)?;
                Ok(None)
            }
            MethodCall::UnregisterService { path } => {
                self.external.unregister_service(
                    &mut self.attributes,
                    &mut self.server,
                    client,
                    &path,
                )?;
                Ok(Some(Reply::Done))
            }
        }
    }

    fn transport_id(&self, path: &str) -> Result<TransportId, Error> {
        self.transports.find_by_path(path).ok_or(Error::DoesNotExist)
    }

    const fn immediate(completion: Completion) -> Option<Reply> {
        match completion {
            Completion::Done => Some(Reply::Done),
            Completion::Pending => None,
        }
    }

    fn reply<B: MessageBus + ?Sized>(bus: &mut B, token: ReplyToken, reply: Reply) {
        if let Err(e) = bus.send_reply(token, reply) {
            warn!("[HOST] reply {} lost: {}", token.0, e);
        }
    }

    fn log_stale(transport: &str, outcome: Result<(), Error>) {
        if let Err(e) = outcome {
            debug!("[HOST] event for {} ignored: {}", transport, e);
        }
    }
}

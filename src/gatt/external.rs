//! Externally implemented GATT services
//!
//! A bus client registers the object path of a service it implements. The
//! objects it publishes below that path (service, characteristics and
//! descriptors) are collected as proxies. Once the client reports that all
//! of them are known, the service is built into the local store and
//! registered with the attribute server. Remote reads are answered from the
//! proxies' cached values and remote writes are forwarded to the client.

use super::{
    Attribute, AttributeAccess, AttributeHandler, AttributeServer, AttributeStore,
    AttributeValue, CharacteristicProperties, Handle,
};
use crate::{
    Error,
    bus::{ClientId, MessageBus, ObjectPath, Reply, ReplyToken},
    constants::{MAX_EXTERNAL_SERVICES, MAX_PROXIES},
    uuid::Uuid,
};
use heapless::Vec;

/// Bus interface of a published GATT object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattInterface {
    /// `org.bluez.GattService1`
    Service,
    /// `org.bluez.GattCharacteristic1`
    Characteristic,
    /// `org.bluez.GattDescriptor1`
    Descriptor,
}

impl GattInterface {
    /// Map a bus interface name, `None` for anything that is not GATT
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "org.bluez.GattService1" => Some(Self::Service),
            "org.bluez.GattCharacteristic1" => Some(Self::Characteristic),
            "org.bluez.GattDescriptor1" => Some(Self::Descriptor),
            _ => None,
        }
    }

    /// Bus interface name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Service => "org.bluez.GattService1",
            Self::Characteristic => "org.bluez.GattCharacteristic1",
            Self::Descriptor => "org.bluez.GattDescriptor1",
        }
    }
}

/// Local view of an object published by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyObject {
    path: ObjectPath,
    interface: GattInterface,
    uuid: Option<Uuid>,
    // `Some(None)` when the published flags were unusable
    flags: Option<Option<CharacteristicProperties>>,
    value: AttributeValue,
    attribute: Option<Handle>,
}

impl ProxyObject {
    /// Proxy for the object at `path`
    ///
    /// # Errors
    /// Returns `Error::InvalidArguments` if the path is too long.
    pub fn new(path: &str, interface: GattInterface) -> Result<Self, Error> {
        Ok(Self {
            path: path.try_into().map_err(|()| Error::InvalidArguments)?,
            interface,
            uuid: None,
            flags: None,
            value: AttributeValue::new(),
            attribute: None,
        })
    }

    /// Record the published `UUID` property
    #[must_use]
    pub fn with_uuid(mut self, uuid: &str) -> Self {
        self.uuid = Uuid::parse(uuid).ok();
        self
    }

    /// Record the published `Flags` property
    #[must_use]
    pub fn with_flags<'a, I>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.flags = Some(CharacteristicProperties::from_flags(flags));
        self
    }

    /// Record the published `Value` property
    ///
    /// # Errors
    /// Returns `Error::NO_RESOURCES` if the value does not fit.
    pub fn with_value(mut self, value: &[u8]) -> Result<Self, Error> {
        self.value = AttributeValue::from_slice(value).map_err(|()| Error::NO_RESOURCES)?;
        Ok(self)
    }

    /// Object path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bus interface
    #[must_use]
    pub const fn interface(&self) -> GattInterface {
        self.interface
    }

    /// Parsed UUID, `None` if missing or malformed
    #[must_use]
    pub const fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    /// Last value published by the client
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Local attribute built from this proxy
    #[must_use]
    pub const fn attribute(&self) -> Option<Handle> {
        self.attribute
    }

    /// Characteristic properties; read, write and write-without-response
    /// when the client published no flags
    ///
    /// # Errors
    /// Returns `Error::InvalidArguments` for unknown or empty flags.
    pub fn properties(&self) -> Result<CharacteristicProperties, Error> {
        match self.flags {
            None => Ok(CharacteristicProperties::DEFAULT_EXTERNAL),
            Some(Some(props)) => Ok(props),
            Some(None) => Err(Error::InvalidArguments),
        }
    }

    fn is_under(&self, root: &str) -> bool {
        self.path
            .strip_prefix(root)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

/// A service registered by a bus client
#[derive(Debug, Clone)]
pub struct ExternalService {
    owner: ClientId,
    path: ObjectPath,
    registration: Option<ReplyToken>,
    proxies: Vec<ProxyObject, MAX_PROXIES>,
    service: Option<Handle>,
}

impl ExternalService {
    /// Bus identity of the registering client
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Registered object path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the registration call is still waiting for its reply
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.registration.is_some()
    }

    /// Known objects, sorted by path
    #[must_use]
    pub fn proxies(&self) -> &[ProxyObject] {
        &self.proxies
    }

    /// Local service declaration handle once built
    #[must_use]
    pub const fn service(&self) -> Option<Handle> {
        self.service
    }

    fn build(&mut self, store: &mut AttributeStore) -> Result<Handle, Error> {
        let mut proxies = self.proxies.iter_mut();
        let head = proxies.next().ok_or(Error::InvalidArguments)?;
        if head.interface != GattInterface::Service || head.path != self.path {
            return Err(Error::InvalidArguments);
        }
        let uuid = head.uuid.ok_or(Error::InvalidArguments)?;
        let service = store.add_service(uuid)?;
        head.attribute = Some(service);
        self.service = Some(service);

        for proxy in proxies {
            let uuid = proxy.uuid.ok_or(Error::InvalidArguments)?;
            let attribute = match proxy.interface {
                GattInterface::Characteristic => {
                    let props = proxy.properties()?;
                    store.add_characteristic(uuid, props, AttributeAccess::for_properties(props))?
                }
                GattInterface::Descriptor => store.add_descriptor(uuid, AttributeAccess::READ_WRITE)?,
                GattInterface::Service => return Err(Error::InvalidArguments),
            };
            proxy.attribute = Some(attribute);
            debug!("[GATT] added {} ({})", proxy.path.as_str(), proxy.interface.as_str());
        }
        Ok(service)
    }
}

/// Registry of externally implemented services
#[derive(Debug, Clone, Default)]
pub struct ExternalServices {
    services: Vec<ExternalService, MAX_EXTERNAL_SERVICES>,
}

impl ExternalServices {
    /// Create an empty registry
    #[must_use]
    pub const fn new() -> Self {
        Self {
            services: Vec::new(),
        }
    }

    /// Number of registered services
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no service is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Look up a registration by path
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ExternalService> {
        self.services.iter().find(|service| service.path == path)
    }

    /// Record `RegisterService(path)` from `client`
    ///
    /// The reply is deferred until [`ExternalServices::client_ready`].
    ///
    /// # Errors
    /// Returns `Error::AlreadyExists` for a registered path,
    /// `Error::InvalidArguments` for an oversized name or path and
    /// `Error::NO_RESOURCES` when the registry is full.
    pub fn register_service(
        &mut self,
        client: &str,
        path: &str,
        token: ReplyToken,
    ) -> Result<(), Error> {
        if self.get(path).is_some() {
            return Err(Error::AlreadyExists);
        }
        let service = ExternalService {
            owner: client.try_into().map_err(|()| Error::InvalidArguments)?,
            path: path.try_into().map_err(|()| Error::InvalidArguments)?,
            registration: Some(token),
            proxies: Vec::new(),
            service: None,
        };
        self.services
            .push(service)
            .map_err(|_| Error::NO_RESOURCES)?;
        info!("[GATT] {} registering {}", client, path);
        Ok(())
    }

    /// Handle `UnregisterService(path)` from `client`
    ///
    /// # Errors
    /// Returns `Error::DoesNotExist` if the path is unknown or registered by
    /// another client.
    pub fn unregister_service<A: AttributeServer + ?Sized>(
        &mut self,
        store: &mut AttributeStore,
        server: &mut A,
        client: &str,
        path: &str,
    ) -> Result<(), Error> {
        let index = self
            .services
            .iter()
            .position(|service| service.path == path && service.owner == client)
            .ok_or(Error::DoesNotExist)?;
        let service = self.services.remove(index);
        Self::teardown(store, server, &service);
        info!("[GATT] {} unregistered {}", client, path);
        Ok(())
    }

    /// A client published `proxy`
    ///
    /// Returns whether the object belongs to one of the client's services.
    pub fn proxy_added(&mut self, client: &str, proxy: ProxyObject) -> bool {
        let Some(service) = self
            .services
            .iter_mut()
            .find(|service| service.owner == client && proxy.is_under(&service.path))
        else {
            return false;
        };

        if let Some(existing) = service
            .proxies
            .iter_mut()
            .find(|existing| existing.path == proxy.path)
        {
            *existing = proxy;
            return true;
        }

        let index = service
            .proxies
            .iter()
            .position(|existing| existing.path > proxy.path)
            .unwrap_or(service.proxies.len());
        trace!("[GATT] proxy {} for {}", proxy.path.as_str(), service.path.as_str());
        if service.proxies.insert(index, proxy).is_err() {
            warn!("[GATT] too many objects under {}", service.path.as_str());
            return false;
        }
        true
    }

    /// A client withdrew the object at `path`
    ///
    /// An object withdrawn before `client_ready` is left out of the build.
    /// Once the service is registered its attribute table is fixed: the
    /// attributes built from the object stay in the store until the whole
    /// service is removed, but remote reads and writes of them fail with
    /// `Error::DoesNotExist` and are no longer forwarded to the client.
    ///
    /// Returns whether a proxy was dropped.
    pub fn proxy_removed(&mut self, client: &str, path: &str) -> bool {
        for service in self
            .services
            .iter_mut()
            .filter(|service| service.owner == client)
        {
            if let Some(index) = service.proxies.iter().position(|proxy| proxy.path == path) {
                service.proxies.remove(index);
                return true;
            }
        }
        false
    }

    /// Every object of the service at `path` is known: build and register it
    ///
    /// The registration is answered before the service is registered with
    /// the attribute server. A service that cannot be built is dropped and
    /// its registration answered with `InvalidArguments`.
    ///
    /// # Errors
    /// Returns `Error::DoesNotExist` for an unknown registration,
    /// `Error::NotAvailable` if it was already answered, otherwise the
    /// attribute server registration failure.
    pub fn client_ready<B, A>(
        &mut self,
        bus: &mut B,
        store: &mut AttributeStore,
        server: &mut A,
        client: &str,
        path: &str,
    ) -> Result<(), Error>
    where
        B: MessageBus + ?Sized,
        A: AttributeServer + ?Sized,
    {
        let index = self
            .services
            .iter()
            .position(|service| service.path == path && service.owner == client)
            .ok_or(Error::DoesNotExist)?;
        let token = self.services[index]
            .registration
            .take()
            .ok_or(Error::NotAvailable)?;

        if let Err(e) = self.services[index].build(store) {
            error!("[GATT] could not register external service {}: {}", path, e);
            let service = self.services.remove(index);
            Self::teardown(store, server, &service);
            if bus
                .send_reply(token, Reply::Error(Error::InvalidArguments))
                .is_err()
            {
                warn!("[GATT] registration reply to {} lost", client);
            }
            return Ok(());
        }

        if bus.send_reply(token, Reply::Done).is_err() {
            warn!("[GATT] registration reply to {} lost", client);
        }
        info!("[GATT] added external service {}", path);
        store.materialize(server).map(|_| ())
    }

    /// `client` left the bus: drop everything it registered
    ///
    /// Returns the number of services removed.
    pub fn client_disconnected<A: AttributeServer + ?Sized>(
        &mut self,
        store: &mut AttributeStore,
        server: &mut A,
        client: &str,
    ) -> usize {
        let mut removed = 0;
        while let Some(index) = self
            .services
            .iter()
            .position(|service| service.owner == client)
        {
            let service = self.services.remove(index);
            Self::teardown(store, server, &service);
            removed += 1;
        }
        if removed > 0 {
            info!("[GATT] {} gone, removed {} services", client, removed);
        }
        removed
    }

    /// The client published a new `Value` for the object at `path`
    ///
    /// # Errors
    /// Returns `Error::DoesNotExist` for an unknown object, otherwise see
    /// [`AttributeStore::update_characteristic_value`].
    pub fn value_changed<A: AttributeServer + ?Sized>(
        &mut self,
        store: &mut AttributeStore,
        server: &mut A,
        client: &str,
        path: &str,
        value: &[u8],
    ) -> Result<(), Error> {
        let proxy = self
            .services
            .iter_mut()
            .filter(|service| service.owner == client)
            .flat_map(|service| service.proxies.iter_mut())
            .find(|proxy| proxy.path == path)
            .ok_or(Error::DoesNotExist)?;
        proxy.value = AttributeValue::from_slice(value).map_err(|()| Error::NO_RESOURCES)?;

        match (proxy.attribute, proxy.uuid) {
            (Some(_), Some(uuid)) => store.update_characteristic_value(server, uuid, value),
            _ => Ok(()),
        }
    }

    /// Attribute handler serving remote access from the proxies
    pub fn handler<'a, B: MessageBus + ?Sized>(&'a self, bus: &'a mut B) -> ProxyAccess<'a, B> {
        ProxyAccess {
            services: self,
            bus,
        }
    }

    fn find_proxy(&self, handle: Handle) -> Option<(&ExternalService, &ProxyObject)> {
        self.services.iter().find_map(|service| {
            service
                .proxies
                .iter()
                .find(|proxy| proxy.attribute == Some(handle))
                .map(|proxy| (service, proxy))
        })
    }

    fn teardown<A: AttributeServer + ?Sized>(
        store: &mut AttributeStore,
        server: &mut A,
        service: &ExternalService,
    ) {
        if let Some(handle) = service.service {
            if let Err(e) = store.remove_service(server, handle) {
                warn!("[GATT] removing {} failed: {}", service.path.as_str(), e);
            }
        }
    }
}

/// Serves remote reads and writes of proxied attributes
pub struct ProxyAccess<'a, B: MessageBus + ?Sized> {
    services: &'a ExternalServices,
    bus: &'a mut B,
}

impl<B: MessageBus + ?Sized> AttributeHandler for ProxyAccess<'_, B> {
    fn read(&mut self, attribute: &Attribute) -> Result<AttributeValue, Error> {
        let (_, proxy) = self
            .services
            .find_proxy(attribute.handle())
            .ok_or(Error::DoesNotExist)?;
        Ok(proxy.value.clone())
    }

    fn write(&mut self, attribute: &Attribute, value: &[u8]) -> Result<(), Error> {
        let (service, proxy) = self
            .services
            .find_proxy(attribute.handle())
            .ok_or(Error::DoesNotExist)?;
        debug!("[GATT] write {} bytes to {}", value.len(), proxy.path.as_str());
        self.bus
            .set_remote_value(&service.owner, &proxy.path, value)
    }
}

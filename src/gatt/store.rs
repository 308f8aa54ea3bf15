//! Attribute database and handle allocator
//!
//! Handles are allocated from a monotonically increasing counter and never
//! reused, even after a service is removed. While a service is being built,
//! every attribute created for it is recorded on the pending-handle chain;
//! [`AttributeStore::materialize`] consumes the chain once to register the
//! whole service with the attribute server.
//!
//! A characteristic's value attribute always sits at its declaration handle
//! plus one. That holds for attributes created here and is relied on when
//! looking a value attribute's declaration back up.

use super::{
    Attribute, AttributeAccess, AttributeHandler, AttributeKind, AttributeServer, AttributeValue,
    CharacteristicProperties, Handle, HandleRange, send_service_changed,
};
use crate::{
    Error,
    constants::{FIRST_HANDLE, LAST_HANDLE, MAX_ATTRIBUTES, MAX_PENDING_HANDLES},
    uuid::{self, Uuid},
};
use heapless::Vec;

/// A handle created for the service under construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingHandle {
    /// Local handle
    pub handle: Handle,
    /// Role of the attribute in the service
    pub kind: AttributeKind,
}

/// Handles of the service under construction, in creation order
pub type PendingChain = Vec<PendingHandle, MAX_PENDING_HANDLES>;

/// Server handles touched while registering one service
#[derive(Debug, Default)]
struct Registration {
    start: Option<Handle>,
    end: Handle,
}

impl Registration {
    fn range(&self) -> Option<HandleRange> {
        self.start.map(|start| HandleRange::new(start, self.end.max(start)))
    }
}

/// The local attribute database
#[derive(Debug)]
pub struct AttributeStore {
    attributes: Vec<Attribute, MAX_ATTRIBUTES>,
    pending: PendingChain,
    next_handle: u32,
    service_changed: bool,
}

impl Default for AttributeStore {
    fn default() -> Self {
        Self::new(FIRST_HANDLE)
    }
}

impl AttributeStore {
    /// Create an empty store allocating from `first_handle`
    #[must_use]
    pub const fn new(first_handle: Handle) -> Self {
        Self {
            attributes: Vec::new(),
            pending: Vec::new(),
            next_handle: first_handle as u32,
            service_changed: true,
        }
    }

    /// Enable or disable Service Changed indications
    #[must_use]
    pub fn with_service_changed(mut self, enabled: bool) -> Self {
        self.service_changed = enabled;
        self
    }

    /// Number of attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the store holds no attributes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attributes in handle order
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// Chain of the service under construction
    #[must_use]
    pub fn pending(&self) -> &[PendingHandle] {
        &self.pending
    }

    /// Next handle the allocator would hand out
    #[must_use]
    pub fn next_handle(&self) -> Option<Handle> {
        Handle::try_from(self.next_handle).ok()
    }

    /// Look up an attribute by handle
    #[must_use]
    pub fn find_by_handle(&self, handle: Handle) -> Option<&Attribute> {
        self.position(handle).map(|index| &self.attributes[index])
    }

    /// First attribute matching `uuid`, see [`Attribute::matches`]
    #[must_use]
    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.matches(uuid))
    }

    /// Server handle range of the registered service declaring `uuid`
    #[must_use]
    pub fn service_range(&self, uuid: Uuid) -> Option<HandleRange> {
        self.attributes
            .iter()
            .filter(|attribute| attribute.service_uuid() == Some(uuid))
            .find_map(Attribute::range)
    }

    /// Add a primary service declaration and start a new chain with it
    ///
    /// # Errors
    /// Returns `Error::NO_RESOURCES` once handles or storage run out.
    pub fn add_service(&mut self, uuid: Uuid) -> Result<Handle, Error> {
        let handle = self.reserve(1)?;
        let mut value = AttributeValue::new();
        uuid.write_le(&mut value)?;
        self.insert(Attribute::constant(handle, uuid::PRIMARY_SERVICE, value))?;
        self.next_handle += 1;

        if !self.pending.is_empty() {
            warn!("[GATT] discarding unfinished service chain");
        }
        self.pending.clear();
        self.track(handle, AttributeKind::PrimaryService)?;

        info!(
            "[GATT] service {} at 0x{:04x}",
            uuid.format_canonical().as_str(),
            handle
        );
        Ok(handle)
    }

    /// Add a characteristic to the service under construction
    ///
    /// Creates the declaration and the value attribute on two consecutive
    /// handles and returns the value handle. Nothing is kept if either one
    /// cannot be created.
    ///
    /// # Errors
    /// Returns `Error::NotAvailable` when no service is under construction,
    /// `Error::NO_RESOURCES` once handles or storage run out.
    pub fn add_characteristic(
        &mut self,
        uuid: Uuid,
        properties: CharacteristicProperties,
        access: AttributeAccess,
    ) -> Result<Handle, Error> {
        if self.pending.is_empty() {
            return Err(Error::NotAvailable);
        }
        if self.pending.capacity() - self.pending.len() < 2 {
            return Err(Error::NO_RESOURCES);
        }
        let declaration = self.reserve(2)?;
        let value_handle = declaration + 1;

        let mut value = AttributeValue::new();
        value
            .extend_from_slice(&[properties.bits(), 0, 0])
            .map_err(|()| Error::NO_RESOURCES)?;
        uuid.write_le(&mut value)?;
        let index = self.insert(Attribute::constant(declaration, uuid::CHARACTERISTIC, value))?;

        if let Err(e) = self.insert(Attribute::dynamic(value_handle, uuid, access)) {
            self.attributes.remove(index);
            return Err(e);
        }
        self.attributes[index].patch_value(1, &value_handle.to_le_bytes())?;
        self.next_handle += 2;

        self.track(declaration, AttributeKind::CharacteristicDeclaration)?;
        self.track(value_handle, AttributeKind::CharacteristicValue)?;

        debug!(
            "[GATT] characteristic {} at 0x{:04x}, properties 0x{:02x}",
            uuid.format_canonical().as_str(),
            value_handle,
            properties.bits()
        );
        Ok(value_handle)
    }

    /// Add a descriptor to the service under construction
    ///
    /// # Errors
    /// Returns `Error::NotAvailable` when no service is under construction,
    /// `Error::NO_RESOURCES` once handles or storage run out.
    pub fn add_descriptor(&mut self, uuid: Uuid, access: AttributeAccess) -> Result<Handle, Error> {
        if self.pending.is_empty() {
            return Err(Error::NotAvailable);
        }
        if self.pending.is_full() {
            return Err(Error::NO_RESOURCES);
        }
        let handle = self.reserve(1)?;
        self.insert(Attribute::dynamic(handle, uuid, access))?;
        self.next_handle += 1;
        self.track(handle, AttributeKind::Descriptor)?;

        debug!(
            "[GATT] descriptor {} at 0x{:04x}",
            uuid.format_canonical().as_str(),
            handle
        );
        Ok(handle)
    }

    /// Remove the service declared at `service` and everything up to the
    /// next service declaration
    ///
    /// A registered service also has its server range dropped and peers
    /// told about the change.
    ///
    /// # Errors
    /// Returns `Error::DoesNotExist` for an unknown handle and
    /// `Error::InvalidArguments` if it is not a service declaration.
    pub fn remove_service<A: AttributeServer + ?Sized>(
        &mut self,
        server: &mut A,
        service: Handle,
    ) -> Result<(), Error> {
        let index = self.position(service).ok_or(Error::DoesNotExist)?;
        let declaration = &self.attributes[index];
        if !declaration.is_service() {
            return Err(Error::InvalidArguments);
        }

        if let Some(range) = declaration.range() {
            server.remove_range(range);
            if self.service_changed {
                send_service_changed(server, range);
            }
        } else {
            debug!("[GATT] service 0x{:04x} was never registered", service);
        }

        let end = self.attributes[index + 1..]
            .iter()
            .position(Attribute::is_service)
            .map_or(self.attributes.len(), |offset| index + 1 + offset);
        for _ in index..end {
            self.attributes.remove(index);
        }

        if self
            .pending
            .first()
            .is_some_and(|head| head.handle == service)
        {
            self.pending.clear();
        }

        info!("[GATT] removed service 0x{:04x}", service);
        Ok(())
    }

    /// Register the service under construction with `server`
    ///
    /// Walks the pending-handle chain once: the service reserves its table,
    /// then each characteristic and descriptor is registered in order. On
    /// failure whatever was registered is removed again. Either way peers
    /// are told about the affected range and the chain is consumed.
    ///
    /// # Errors
    /// Returns `Error::NotAvailable` when no service is under construction,
    /// otherwise the first registration failure.
    pub fn materialize<A: AttributeServer + ?Sized>(
        &mut self,
        server: &mut A,
    ) -> Result<HandleRange, Error> {
        let chain = core::mem::take(&mut self.pending);
        let Some(head) = chain
            .first()
            .copied()
            .filter(|node| node.kind == AttributeKind::PrimaryService)
        else {
            return Err(Error::NotAvailable);
        };

        let mut registration = Registration::default();
        let outcome = self.register(server, &chain, &mut registration);
        let affected = registration.range();
        let reserved = chain
            .last()
            .map_or(head.handle, |node| node.handle.max(head.handle));

        let result = match (outcome, affected) {
            (Ok(()), Some(range)) => {
                if let Some(index) = self.position(head.handle) {
                    self.attributes[index].set_range(Some(range));
                }
                info!(
                    "[GATT] service 0x{:04x} registered at 0x{:04x}-0x{:04x}",
                    head.handle,
                    range.start,
                    range.end
                );
                Ok(range)
            }
            (Ok(()), None) => Err(Error::NotAvailable),
            (Err(e), range) => {
                warn!("[GATT] service 0x{:04x} not added: {}", head.handle, e);
                if let Some(range) = range {
                    server.remove_range(range);
                }
                Err(e)
            }
        };

        if self.service_changed {
            // A refused service touched no server handles; peers still learn
            // about the local handles it had reserved.
            let range = match (&result, affected) {
                (_, Some(range)) => Some(range),
                (Err(_), None) => Some(HandleRange::new(head.handle, reserved)),
                (Ok(_), None) => None,
            };
            if let Some(range) = range {
                send_service_changed(server, range);
            }
        }
        result
    }

    /// Cache a new value for the characteristic `uuid` and push it
    ///
    /// The first accepted update of a notifying characteristic only arms
    /// the ready flag; later updates are notified to peers.
    ///
    /// # Errors
    /// Returns `Error::DoesNotExist` for an unknown UUID and
    /// `Error::NO_RESOURCES` if the value does not fit.
    pub fn update_characteristic_value<A: AttributeServer + ?Sized>(
        &mut self,
        server: &mut A,
        uuid: Uuid,
        value: &[u8],
    ) -> Result<(), Error> {
        let index = self
            .attributes
            .iter()
            .position(|attribute| attribute.matches(uuid))
            .ok_or(Error::DoesNotExist)?;
        self.attributes[index].set_value(value)?;
        let handle = self.attributes[index].handle();
        let ready = self.attributes[index].notify_ready();

        let Some(properties) = handle
            .checked_sub(1)
            .and_then(|declaration| self.find_by_handle(declaration))
            .and_then(Attribute::characteristic_properties)
        else {
            debug!("[GATT] 0x{:04x} has no declaration, value cached", handle);
            return Ok(());
        };

        if !server.update_value(uuid, value) {
            warn!("[GATT] server rejected update of 0x{:04x}", handle);
            return Ok(());
        }
        if !properties.pushes_updates() {
            return Ok(());
        }

        if ready {
            trace!("[GATT] notify 0x{:04x}", handle);
            server.notify(uuid, value);
            Ok(())
        } else {
            self.set_notify_ready(handle, true)
        }
    }

    /// Set the ready flag of the attribute at `handle`
    ///
    /// # Errors
    /// Returns `Error::DoesNotExist` for an unknown handle.
    pub fn set_notify_ready(&mut self, handle: Handle, ready: bool) -> Result<(), Error> {
        let index = self.position(handle).ok_or(Error::DoesNotExist)?;
        self.attributes[index].set_notify_ready(ready);
        Ok(())
    }

    /// Serve a remote read of `uuid`
    ///
    /// Constant attributes answer from the store, dynamic ones through
    /// `handler`.
    ///
    /// # Errors
    /// Returns `Error::DoesNotExist` for an unknown UUID, `Error::NotSupported`
    /// if the attribute refuses reads, otherwise the handler's error.
    pub fn dispatch_read<H: AttributeHandler + ?Sized>(
        &self,
        uuid: Uuid,
        handler: &mut H,
    ) -> Result<AttributeValue, Error> {
        let attribute = self.find_by_uuid(uuid).ok_or(Error::DoesNotExist)?;
        match attribute.access() {
            None => AttributeValue::from_slice(attribute.value()).map_err(|()| Error::NO_RESOURCES),
            Some(access) if access.read => handler.read(attribute),
            Some(_) => Err(Error::NotSupported),
        }
    }

    /// Serve a remote write of `uuid` through `handler`
    ///
    /// A write clears the attribute's ready flag, so the next value update
    /// re-arms instead of notifying.
    ///
    /// # Errors
    /// Returns `Error::DoesNotExist` for an unknown UUID, `Error::NotSupported`
    /// if the attribute refuses writes, otherwise the handler's error.
    pub fn dispatch_write<H: AttributeHandler + ?Sized>(
        &mut self,
        uuid: Uuid,
        value: &[u8],
        handler: &mut H,
    ) -> Result<(), Error> {
        let index = self
            .attributes
            .iter()
            .position(|attribute| attribute.matches(uuid))
            .ok_or(Error::DoesNotExist)?;
        if !self.attributes[index]
            .access()
            .is_some_and(|access| access.write)
        {
            return Err(Error::NotSupported);
        }
        self.attributes[index].set_notify_ready(false);
        handler.write(&self.attributes[index], value)
    }

    fn register<A: AttributeServer + ?Sized>(
        &self,
        server: &mut A,
        chain: &[PendingHandle],
        registration: &mut Registration,
    ) -> Result<(), Error> {
        let size = self.table_size(chain);
        let mut declaration = None;
        let mut characteristic = None;

        for node in chain {
            let attribute = self.find_by_handle(node.handle).ok_or(Error::DoesNotExist)?;
            match node.kind {
                AttributeKind::PrimaryService => {
                    let uuid = attribute.service_uuid().ok_or(Error::InvalidArguments)?;
                    let start = server
                        .register_service(uuid, size)
                        .ok_or(Error::Failed("Service registration failed"))?;
                    registration.start = Some(start);
                    registration.end = start;
                }
                AttributeKind::CharacteristicDeclaration => {
                    let properties = attribute
                        .characteristic_properties()
                        .ok_or(Error::InvalidArguments)?;
                    let uuid = attribute
                        .characteristic_uuid()
                        .ok_or(Error::InvalidArguments)?;
                    declaration = Some((properties, uuid));
                }
                AttributeKind::CharacteristicValue => {
                    let (properties, uuid) = declaration.take().ok_or(Error::InvalidArguments)?;
                    let service = registration.start.ok_or(Error::InvalidArguments)?;
                    let access = attribute.access().unwrap_or_default();
                    let handle = server
                        .register_characteristic(service, uuid, properties, access)
                        .ok_or(Error::Failed("Characteristic registration failed"))?;
                    let last = if properties.pushes_updates() {
                        handle.saturating_add(1)
                    } else {
                        handle
                    };
                    registration.end = registration.end.max(last);
                    characteristic = Some(handle);
                }
                AttributeKind::Descriptor => {
                    let owner = characteristic.ok_or(Error::InvalidArguments)?;
                    let handle = server
                        .register_descriptor(owner, attribute.attribute_type())
                        .ok_or(Error::Failed("Descriptor registration failed"))?;
                    registration.end = registration.end.max(handle);
                }
            }
        }
        Ok(())
    }

    /// Handles the server must reserve for the service on `chain`
    fn table_size(&self, chain: &[PendingHandle]) -> u16 {
        chain.iter().fold(0u16, |size, node| {
            let needed = match node.kind {
                AttributeKind::PrimaryService | AttributeKind::Descriptor => 1,
                AttributeKind::CharacteristicValue => 0,
                AttributeKind::CharacteristicDeclaration => {
                    let pushes = self
                        .find_by_handle(node.handle)
                        .and_then(Attribute::characteristic_properties)
                        .is_some_and(|properties| properties.pushes_updates());
                    if pushes { 3 } else { 2 }
                }
            };
            size.saturating_add(needed)
        })
    }

    fn reserve(&self, count: u32) -> Result<Handle, Error> {
        if self.next_handle + count - 1 > u32::from(LAST_HANDLE) {
            warn!("[GATT] attribute handles exhausted");
            return Err(Error::NO_RESOURCES);
        }
        Handle::try_from(self.next_handle).map_err(|_| Error::NO_RESOURCES)
    }

    fn insert(&mut self, attribute: Attribute) -> Result<usize, Error> {
        let index = self
            .attributes
            .iter()
            .position(|existing| existing.handle() > attribute.handle())
            .unwrap_or(self.attributes.len());
        self.attributes
            .insert(index, attribute)
            .map_err(|_| Error::NO_RESOURCES)?;
        Ok(index)
    }

    fn track(&mut self, handle: Handle, kind: AttributeKind) -> Result<(), Error> {
        self.pending
            .push(PendingHandle { handle, kind })
            .map_err(|_| Error::NO_RESOURCES)
    }

    fn position(&self, handle: Handle) -> Option<usize> {
        self.attributes
            .binary_search_by_key(&handle, Attribute::handle)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::super::server::mock::MockServer;
    use super::*;
    use std::vec::Vec as StdVec;

    const BATTERY_SERVICE: Uuid = Uuid::Uuid16(0x1234);
    const BATTERY_LEVEL: Uuid = Uuid::Uuid16(0x2A19);

    #[derive(Default)]
    struct Recorder {
        reads: StdVec<Handle>,
        writes: StdVec<(Handle, StdVec<u8>)>,
    }

    impl AttributeHandler for Recorder {
        fn read(&mut self, attribute: &Attribute) -> Result<AttributeValue, Error> {
            self.reads.push(attribute.handle());
            Ok(AttributeValue::from_slice(&[0x64]).unwrap())
        }

        fn write(&mut self, attribute: &Attribute, value: &[u8]) -> Result<(), Error> {
            self.writes.push((attribute.handle(), value.to_vec()));
            Ok(())
        }
    }

    fn battery_store() -> AttributeStore {
        let mut store = AttributeStore::default();
        store.add_service(BATTERY_SERVICE).unwrap();
        store
            .add_characteristic(
                BATTERY_LEVEL,
                CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
                AttributeAccess::READ,
            )
            .unwrap();
        store
    }

    #[test]
    fn test_notifying_characteristic_reserves_configuration_slot() {
        let mut store = battery_store();
        let mut server = MockServer::default();

        let range = store.materialize(&mut server).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(server.services, std::vec![(BATTERY_SERVICE, 4, 1)]);
        assert_eq!(server.characteristics.len(), 1);
        let (value, uuid, properties, access) = server.characteristics[0];
        assert_eq!(value, 3);
        assert_eq!(uuid, BATTERY_LEVEL);
        assert!(properties.pushes_updates());
        assert_eq!(access, AttributeAccess::READ);
        assert_eq!(range, HandleRange::new(1, 4));
        assert_eq!(store.service_range(BATTERY_SERVICE), Some(range));
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_declaration_points_at_value() {
        let store = battery_store();
        let declaration = store.find_by_handle(2).unwrap();
        assert_eq!(declaration.characteristic_value_handle(), Some(3));
        assert_eq!(declaration.characteristic_uuid(), Some(BATTERY_LEVEL));
        assert_eq!(
            store.pending().iter().map(|node| node.kind).collect::<StdVec<_>>(),
            std::vec![
                AttributeKind::PrimaryService,
                AttributeKind::CharacteristicDeclaration,
                AttributeKind::CharacteristicValue,
            ]
        );
    }

    #[test]
    fn test_characteristic_needs_service_under_construction() {
        let mut store = AttributeStore::default();
        let result = store.add_characteristic(
            BATTERY_LEVEL,
            CharacteristicProperties::READ,
            AttributeAccess::READ,
        );
        assert_eq!(result, Err(Error::NotAvailable));
        assert_eq!(
            store.add_descriptor(uuid::CHARACTERISTIC_USER_DESCRIPTION, AttributeAccess::READ),
            Err(Error::NotAvailable)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_descriptors_extend_table() {
        let mut store = battery_store();
        let descriptor = store
            .add_descriptor(uuid::CHARACTERISTIC_USER_DESCRIPTION, AttributeAccess::READ_WRITE)
            .unwrap();
        assert_eq!(descriptor, 4);

        let mut server = MockServer::default();
        let range = store.materialize(&mut server).unwrap();

        assert_eq!(server.services[0].1, 5);
        assert_eq!(
            server.descriptors,
            std::vec![(5, uuid::CHARACTERISTIC_USER_DESCRIPTION)]
        );
        assert_eq!(range, HandleRange::new(1, 5));
    }

    #[test]
    fn test_handles_never_reused() {
        let mut store = battery_store();
        let mut server = MockServer::default();
        store.materialize(&mut server).unwrap();

        store.remove_service(&mut server, 1).unwrap();
        let next = store.add_service(Uuid::from(0x180A)).unwrap();

        assert_eq!(next, 4);
        assert!(store.find_by_handle(1).is_none());
    }

    #[test]
    fn test_remove_service_stops_at_next_service() {
        let mut store = battery_store();
        let mut server = MockServer::default().with_peer(9, true, true);
        store.materialize(&mut server).unwrap();
        let second = store.add_service(Uuid::from(0x180A)).unwrap();
        store
            .add_characteristic(
                Uuid::from(0x2A29),
                CharacteristicProperties::READ,
                AttributeAccess::READ,
            )
            .unwrap();
        store.materialize(&mut server).unwrap();
        server.indications.clear();

        store.remove_service(&mut server, 1).unwrap();

        assert!(store.iter().all(|attribute| attribute.handle() >= second));
        assert_eq!(store.len(), 3);
        assert_eq!(server.removed, std::vec![HandleRange::new(1, 4)]);
        assert_eq!(server.indications.len(), 1);
        assert_eq!(server.indications[0].1, std::vec![0x1D, 1, 0, 4, 0]);
    }

    #[test]
    fn test_remove_unknown_or_non_service() {
        let mut store = battery_store();
        let mut server = MockServer::default();
        assert_eq!(store.remove_service(&mut server, 42), Err(Error::DoesNotExist));
        assert_eq!(
            store.remove_service(&mut server, 2),
            Err(Error::InvalidArguments)
        );
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_remove_unregistered_service_skips_server() {
        let mut store = battery_store();
        let mut server = MockServer::default().with_peer(1, true, true);

        store.remove_service(&mut server, 1).unwrap();

        assert!(store.is_empty());
        assert!(store.pending().is_empty());
        assert!(server.removed.is_empty());
        assert!(server.indications.is_empty());
    }

    #[test]
    fn test_failed_registration_rolls_back_and_still_indicates() {
        let mut store = battery_store();
        let mut server = MockServer::default().with_peer(1, true, true);
        server.fail_characteristic_after = Some(0);

        let result = store.materialize(&mut server);

        assert_eq!(
            result,
            Err(Error::Failed("Characteristic registration failed"))
        );
        assert_eq!(server.removed, std::vec![HandleRange::new(1, 1)]);
        assert_eq!(server.indications.len(), 1);
        assert!(store.pending().is_empty());
        assert_eq!(store.service_range(BATTERY_SERVICE), None);
    }

    #[test]
    fn test_refused_service_registers_nothing() {
        let mut store = battery_store();
        let mut server = MockServer::default().with_peer(1, true, true);
        server.fail_service = true;

        assert!(store.materialize(&mut server).is_err());
        assert!(server.characteristics.is_empty());
        assert!(server.removed.is_empty());
    }

    #[test]
    fn test_refused_service_indicates_reserved_handles() {
        let mut store = battery_store();
        let last = store.pending().last().unwrap().handle;
        let mut server = MockServer::default().with_peer(1, true, true);
        server.fail_service = true;

        assert!(store.materialize(&mut server).is_err());

        let [low, high] = last.to_le_bytes();
        assert_eq!(server.indications.len(), 1);
        assert_eq!(server.indications[0].1, std::vec![0x1D, 1, 0, low, high]);
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_materialize_without_service() {
        let mut store = AttributeStore::default();
        let mut server = MockServer::default();
        assert_eq!(store.materialize(&mut server), Err(Error::NotAvailable));
    }

    #[test]
    fn test_service_changed_can_be_disabled() {
        let mut store = AttributeStore::default().with_service_changed(false);
        store.add_service(BATTERY_SERVICE).unwrap();
        let mut server = MockServer::default().with_peer(1, true, true);

        store.materialize(&mut server).unwrap();
        store.remove_service(&mut server, 1).unwrap();

        assert!(server.indications.is_empty());
        assert_eq!(server.removed.len(), 1);
    }

    // Awaiting product confirmation: the first accepted update only arms
    // notifications, it is not sent to peers.
    #[test]
    fn test_first_update_primes_instead_of_notifying() {
        let mut store = battery_store();
        let mut server = MockServer::default();
        store.materialize(&mut server).unwrap();

        store
            .update_characteristic_value(&mut server, BATTERY_LEVEL, &[80])
            .unwrap();
        assert!(server.notifications.is_empty());
        assert!(store.find_by_handle(3).unwrap().notify_ready());
        assert_eq!(store.find_by_handle(3).unwrap().value(), &[80]);

        store
            .update_characteristic_value(&mut server, BATTERY_LEVEL, &[79])
            .unwrap();
        assert_eq!(server.notifications, std::vec![(BATTERY_LEVEL, std::vec![79])]);
        assert_eq!(server.values.len(), 2);
    }

    #[test]
    fn test_non_notifying_update_never_arms() {
        let mut store = AttributeStore::default();
        store.add_service(BATTERY_SERVICE).unwrap();
        store
            .add_characteristic(
                BATTERY_LEVEL,
                CharacteristicProperties::READ,
                AttributeAccess::READ,
            )
            .unwrap();
        let mut server = MockServer::default();

        store
            .update_characteristic_value(&mut server, BATTERY_LEVEL, &[1])
            .unwrap();
        store
            .update_characteristic_value(&mut server, BATTERY_LEVEL, &[2])
            .unwrap();

        assert!(server.notifications.is_empty());
        assert!(!store.find_by_handle(3).unwrap().notify_ready());
    }

    #[test]
    fn test_rejected_update_keeps_flag() {
        let mut store = battery_store();
        let mut server = MockServer::default();
        server.reject_updates = true;

        store
            .update_characteristic_value(&mut server, BATTERY_LEVEL, &[5])
            .unwrap();

        assert!(!store.find_by_handle(3).unwrap().notify_ready());
        assert_eq!(store.find_by_handle(3).unwrap().value(), &[5]);
    }

    #[test]
    fn test_update_unknown_uuid() {
        let mut store = battery_store();
        let mut server = MockServer::default();
        assert_eq!(
            store.update_characteristic_value(&mut server, Uuid::from(0xFFFF), &[1]),
            Err(Error::DoesNotExist)
        );
    }

    #[test]
    fn test_remote_write_disarms_notifications() {
        let mut store = battery_store();
        store
            .add_characteristic(
                Uuid::from(0x2A2B),
                CharacteristicProperties::WRITE | CharacteristicProperties::NOTIFY,
                AttributeAccess::WRITE,
            )
            .unwrap();
        let mut server = MockServer::default();
        let mut handler = Recorder::default();
        store
            .update_characteristic_value(&mut server, Uuid::from(0x2A2B), &[1])
            .unwrap();
        assert!(store.find_by_handle(5).unwrap().notify_ready());

        store
            .dispatch_write(Uuid::from(0x2A2B), &[7, 7], &mut handler)
            .unwrap();
        assert_eq!(handler.writes, std::vec![(5, std::vec![7, 7])]);
        assert!(!store.find_by_handle(5).unwrap().notify_ready());

        store
            .update_characteristic_value(&mut server, Uuid::from(0x2A2B), &[2])
            .unwrap();
        assert!(server.notifications.is_empty());
    }

    #[test]
    fn test_dispatch_respects_access() {
        let mut store = battery_store();
        let mut handler = Recorder::default();

        let value = store.dispatch_read(BATTERY_LEVEL, &mut handler).unwrap();
        assert_eq!(&value[..], &[0x64]);
        assert_eq!(handler.reads, std::vec![3]);

        assert_eq!(
            store.dispatch_write(BATTERY_LEVEL, &[1], &mut handler),
            Err(Error::NotSupported)
        );
        assert_eq!(
            store.dispatch_read(Uuid::from(0xBEEF), &mut handler),
            Err(Error::DoesNotExist)
        );
    }

    #[test]
    fn test_constant_read_served_from_store() {
        let store = battery_store();
        let mut handler = Recorder::default();
        let value = store.dispatch_read(BATTERY_SERVICE, &mut handler).unwrap();
        assert_eq!(&value[..], &[0x34, 0x12]);
        assert!(handler.reads.is_empty());
    }

    #[test]
    fn test_handle_space_exhaustion() {
        let mut store = AttributeStore::new(0xFFFE);
        assert_eq!(store.add_service(BATTERY_SERVICE), Ok(0xFFFE));
        assert_eq!(
            store.add_characteristic(
                BATTERY_LEVEL,
                CharacteristicProperties::READ,
                AttributeAccess::READ
            ),
            Err(Error::NO_RESOURCES)
        );
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.add_descriptor(uuid::CHARACTERISTIC_USER_DESCRIPTION, AttributeAccess::READ),
            Ok(0xFFFF)
        );
        assert_eq!(store.next_handle(), None);
        assert_eq!(store.add_service(Uuid::from(0x180A)), Err(Error::NO_RESOURCES));
    }
}

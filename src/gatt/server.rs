//! Lower-layer attribute server
//!
//! The attribute protocol server is external. The store registers services
//! with it, pushes value updates through it and asks it which peers should
//! hear about database changes.

use super::{AttributeAccess, CharacteristicProperties, Handle, HandleRange};
use crate::{
    BluetoothAddress,
    constants::{ATT_OP_HANDLE_VALUE_IND, MAX_PEERS, SERVICE_CHANGED_PDU_LENGTH},
    uuid::Uuid,
};
use bt_hci::param::BdAddr;
use heapless::Vec;

/// A remote device known to the attribute server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Peer {
    /// Device address
    pub address: BluetoothAddress,
    /// Whether the device is trusted
    pub trusted: bool,
    /// Whether an attribute bearer to the device is up
    pub connected: bool,
}

/// Peers reported by the server
pub type PeerList = Vec<Peer, MAX_PEERS>;

/// Attribute protocol server the local store registers into
pub trait AttributeServer {
    /// Reserve `size` handles for a primary service, returning its start handle
    fn register_service(&mut self, uuid: Uuid, size: u16) -> Option<Handle>;

    /// Register a characteristic under `service`, returning its value handle
    fn register_characteristic(
        &mut self,
        service: Handle,
        uuid: Uuid,
        properties: CharacteristicProperties,
        access: AttributeAccess,
    ) -> Option<Handle>;

    /// Register a descriptor after `characteristic`, returning its handle
    fn register_descriptor(&mut self, characteristic: Handle, uuid: Uuid) -> Option<Handle>;

    /// Drop every handle in `range`
    fn remove_range(&mut self, range: HandleRange);

    /// Store a new value for the characteristic `uuid`
    fn update_value(&mut self, uuid: Uuid, value: &[u8]) -> bool;

    /// Push the value of `uuid` to subscribed peers
    fn notify(&mut self, uuid: Uuid, value: &[u8]);

    /// Remote devices currently known
    fn peers(&self) -> PeerList;

    /// Send a raw indication PDU to `peer`
    fn send_indication(&mut self, peer: BdAddr, pdu: &[u8]);
}

/// Encode a Service Changed indication for `range`
#[must_use]
pub fn service_changed_pdu(range: HandleRange) -> [u8; SERVICE_CHANGED_PDU_LENGTH] {
    let start = range.start.to_le_bytes();
    let end = range.end.to_le_bytes();
    [ATT_OP_HANDLE_VALUE_IND, start[0], start[1], end[0], end[1]]
}

/// Indicate a database change over `range` to every trusted, connected peer
///
/// Returns the number of peers indicated.
pub fn send_service_changed<A: AttributeServer + ?Sized>(server: &mut A, range: HandleRange) -> usize {
    let pdu = service_changed_pdu(range);
    let mut sent = 0;
    for peer in server.peers() {
        if !peer.trusted || !peer.connected {
            continue;
        }
        debug!(
            "[GATT] service changed 0x{:04x}-0x{:04x} to {}",
            range.start,
            range.end,
            peer.address.format_hex().as_str()
        );
        server.send_indication(peer.address.into(), &pdu);
        sent += 1;
    }
    sent
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::vec::Vec as StdVec;

    /// Hands out handles sequentially and records every call.
    #[derive(Debug)]
    pub(crate) struct MockServer {
        pub next_handle: Handle,
        pub services: StdVec<(Uuid, u16, Handle)>,
        pub characteristics: StdVec<(Handle, Uuid, CharacteristicProperties, AttributeAccess)>,
        pub descriptors: StdVec<(Handle, Uuid)>,
        pub removed: StdVec<HandleRange>,
        pub values: StdVec<(Uuid, StdVec<u8>)>,
        pub notifications: StdVec<(Uuid, StdVec<u8>)>,
        pub indications: StdVec<(BdAddr, StdVec<u8>)>,
        pub peers: StdVec<Peer>,
        pub fail_service: bool,
        pub fail_characteristic_after: Option<usize>,
        pub reject_updates: bool,
    }

    impl Default for MockServer {
        fn default() -> Self {
            Self {
                next_handle: 1,
                services: StdVec::new(),
                characteristics: StdVec::new(),
                descriptors: StdVec::new(),
                removed: StdVec::new(),
                values: StdVec::new(),
                notifications: StdVec::new(),
                indications: StdVec::new(),
                peers: StdVec::new(),
                fail_service: false,
                fail_characteristic_after: None,
                reject_updates: false,
            }
        }
    }

    impl MockServer {
        pub(crate) fn with_peer(mut self, byte: u8, trusted: bool, connected: bool) -> Self {
            self.peers.push(Peer {
                address: BluetoothAddress::new([byte; 6]),
                trusted,
                connected,
            });
            self
        }

        fn take(&mut self, count: u16) -> Handle {
            let handle = self.next_handle;
            self.next_handle += count;
            handle
        }
    }

    impl AttributeServer for MockServer {
        fn register_service(&mut self, uuid: Uuid, size: u16) -> Option<Handle> {
            if self.fail_service {
                return None;
            }
            let handle = self.take(1);
            self.services.push((uuid, size, handle));
            Some(handle)
        }

        fn register_characteristic(
            &mut self,
            _service: Handle,
            uuid: Uuid,
            properties: CharacteristicProperties,
            access: AttributeAccess,
        ) -> Option<Handle> {
            if self.fail_characteristic_after == Some(self.characteristics.len()) {
                return None;
            }
            let decl = self.take(2);
            if properties.pushes_updates() {
                self.take(1);
            }
            self.characteristics.push((decl + 1, uuid, properties, access));
            Some(decl + 1)
        }

        fn register_descriptor(&mut self, _characteristic: Handle, uuid: Uuid) -> Option<Handle> {
            let handle = self.take(1);
            self.descriptors.push((handle, uuid));
            Some(handle)
        }

        fn remove_range(&mut self, range: HandleRange) {
            self.removed.push(range);
        }

        fn update_value(&mut self, uuid: Uuid, value: &[u8]) -> bool {
            if self.reject_updates {
                return false;
            }
            self.values.push((uuid, value.to_vec()));
            true
        }

        fn notify(&mut self, uuid: Uuid, value: &[u8]) {
            self.notifications.push((uuid, value.to_vec()));
        }

        fn peers(&self) -> PeerList {
            self.peers.iter().copied().collect()
        }

        fn send_indication(&mut self, peer: BdAddr, pdu: &[u8]) {
            self.indications.push((peer, pdu.to_vec()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockServer;
    use super::*;

    #[test]
    fn test_service_changed_pdu_layout() {
        let pdu = service_changed_pdu(HandleRange::new(0x0010, 0x0123));
        assert_eq!(pdu, [0x1D, 0x10, 0x00, 0x23, 0x01]);
    }

    #[test]
    fn test_service_changed_only_to_trusted_connected_peers() {
        let mut server = MockServer::default()
            .with_peer(1, true, true)
            .with_peer(2, false, true)
            .with_peer(3, true, false)
            .with_peer(4, true, true);

        let sent = send_service_changed(&mut server, HandleRange::new(1, 4));

        assert_eq!(sent, 2);
        assert_eq!(server.indications.len(), 2);
        assert_eq!(server.indications[0].0, BdAddr::new([1; 6]));
        assert_eq!(
            BluetoothAddress::try_from(server.indications[1].0),
            Ok(BluetoothAddress::new([4; 6]))
        );
        assert_eq!(server.indications[0].1, std::vec![0x1D, 1, 0, 4, 0]);
    }
}

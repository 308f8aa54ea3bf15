//! Transport owners
//!
//! An owner is a client currently holding lock bits on a transport. Each owner
//! has at most one request in flight: the `Acquire` waiting for a resume or
//! the `Release` waiting for a suspend.

use super::{RequestId, TransportLock};
use crate::{
    Error,
    bus::{ClientId, ReplyToken, WatchId},
    constants::MAX_OWNERS,
};
use heapless::Vec;

/// Method a pending request answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestKind {
    /// Waiting for a resume
    Acquire,
    /// Waiting for a suspend
    Release,
}

/// A method call waiting on the profile layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MediaRequest {
    /// Method being answered
    pub kind: RequestKind,
    /// Reply token of the method call
    pub token: ReplyToken,
    /// Profile session correlation id, cleared once the operation completes
    pub id: Option<RequestId>,
}

/// A client holding lock bits on a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOwner {
    /// Bus identity of the client
    pub client: ClientId,
    /// Lock bits held
    pub lock: TransportLock,
    /// Request in flight, if any
    pub pending: Option<MediaRequest>,
    /// Disconnect watch on the client
    pub watch: Option<WatchId>,
}

impl MediaOwner {
    /// Create an owner holding `lock`
    #[must_use]
    pub const fn new(client: ClientId, lock: TransportLock) -> Self {
        Self {
            client,
            lock,
            pending: None,
            watch: None,
        }
    }

    /// Correlation id of the profile operation in flight
    #[must_use]
    pub fn in_flight(&self) -> Option<RequestId> {
        self.pending.and_then(|request| request.id)
    }
}

/// Owners of one transport, in acquisition order
#[derive(Debug, Clone, Default)]
pub struct OwnerSet {
    owners: Vec<MediaOwner, MAX_OWNERS>,
}

impl OwnerSet {
    /// Create an empty set
    #[must_use]
    pub const fn new() -> Self {
        Self { owners: Vec::new() }
    }

    /// Number of owners
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Whether there are no owners
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Iterate over owners
    pub fn iter(&self) -> impl Iterator<Item = &MediaOwner> {
        self.owners.iter()
    }

    /// Owner record of `client`
    #[must_use]
    pub fn get(&self, client: &str) -> Option<&MediaOwner> {
        self.owners.iter().find(|owner| owner.client == client)
    }

    /// Mutable owner record of `client`
    pub fn get_mut(&mut self, client: &str) -> Option<&mut MediaOwner> {
        self.owners.iter_mut().find(|owner| owner.client == client)
    }

    /// Whether `client` owns anything
    #[must_use]
    pub fn contains(&self, client: &str) -> bool {
        self.get(client).is_some()
    }

    /// Add an owner
    ///
    /// # Errors
    /// Returns `Error::AlreadyExists` if the client is already an owner and a
    /// resource error if the set is full.
    pub fn insert(&mut self, owner: MediaOwner) -> Result<(), Error> {
        if self.contains(&owner.client) {
            return Err(Error::AlreadyExists);
        }
        self.owners.push(owner).map_err(|_| Error::NO_RESOURCES)
    }

    /// Remove and return the owner record of `client`
    pub fn remove(&mut self, client: &str) -> Option<MediaOwner> {
        let index = self.owners.iter().position(|owner| owner.client == client)?;
        Some(self.owners.remove(index))
    }

    /// Union of all owners' lock bits
    #[must_use]
    pub fn lock(&self) -> TransportLock {
        self.owners
            .iter()
            .fold(TransportLock::NONE, |lock, owner| lock | owner.lock)
    }

    /// Whether any owner is waiting on a profile operation
    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        self.owners.iter().any(|owner| owner.in_flight().is_some())
    }

    /// Client of the first owner, if any
    #[must_use]
    pub fn first_client(&self) -> Option<ClientId> {
        self.owners.first().map(|owner| owner.client.clone())
    }
}

use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::time::Duration;

use crate::id::NodeId;
use crate::time::Instant;

/// Remote peer as seen by the routing table.
///
/// The address belongs to the transport layer; the table stores and hands it back but never
/// looks inside. Equality and hashing only consider the id.
#[derive(Clone)]
pub struct Contact {
    id: NodeId,
    addr: SocketAddr,
    failed_rpcs: usize,
    last_seen: Instant,
}

impl Contact {
    /// Create a contact for a peer that was just observed.
    pub fn new(id: NodeId, addr: SocketAddr) -> Contact {
        Contact {
            id,
            addr,
            failed_rpcs: 0,
            last_seen: Instant::now(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of consecutive RPC failures recorded since the contact was last admitted.
    pub fn failed_rpcs(&self) -> usize {
        self.failed_rpcs
    }

    /// Record a failed RPC, returning the new failure count.
    pub(crate) fn record_failure(&mut self) -> usize {
        self.failed_rpcs = self.failed_rpcs.saturating_add(1);
        self.failed_rpcs
    }

    /// Mark the contact as alive right now.
    pub(crate) fn refresh(&mut self) {
        self.failed_rpcs = 0;
        self.last_seen = Instant::now();
    }

    /// Take over the address and freshness of a newer sighting of the same peer.
    pub(crate) fn update(&mut self, other: Contact) {
        debug_assert_eq!(self.id, other.id);

        self.addr = other.addr;
        self.refresh();
    }

    /// Time since the peer was last seen alive.
    pub fn idle_time(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

impl Eq for Contact {}

impl PartialEq<Contact> for Contact {
    fn eq(&self, other: &Contact) -> bool {
        self.id == other.id
    }
}

impl Hash for Contact {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        self.id.hash(state);
    }
}

impl Debug for Contact {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("Contact")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("failed_rpcs", &self.failed_rpcs)
            .field("last_seen", &self.last_seen)
            .finish()
    }
}

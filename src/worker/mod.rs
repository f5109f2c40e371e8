pub(crate) use self::handler::LayerHandler;
use crate::error::RoutingResult;
use crate::id::NodeId;
use crate::probe::ProbeOutcome;
use crate::routing::contact::Contact;
use crate::routing::table::{AddOutcome, PendingEviction, RemoveOutcome, TableStats};
use tokio::sync::oneshot;

mod handler;

/// Notifications emitted by a running routing layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayerEvent {
    /// A contact that was not known before entered a bucket.
    ContactAdded(NodeId),
    /// A contact left its bucket, possibly replaced by another one.
    ContactEvicted {
        evicted: NodeId,
        replacement: Option<NodeId>,
    },
    /// Some buckets went unused for too long. Looking up these ids refreshes them.
    RefreshNeeded(Vec<NodeId>),
    /// The layer handler is exiting.
    ShuttingDown,
}

/// Task that the layer handler will execute immediately.
pub(crate) enum OneshotTask {
    /// Offer a contact to the table. The optional sender is notified once the admission
    /// settled, which for a full bucket means after the probe of its head.
    AddContact(Contact, Option<oneshot::Sender<AddOutcome>>),
    /// Report a failed contact.
    RemoveContact(NodeId, oneshot::Sender<RoutingResult<RemoveOutcome>>),
    /// Look up a known contact.
    GetContact(NodeId, oneshot::Sender<RoutingResult<Contact>>),
    /// Collect contacts near the target.
    FindCloseNodes(FindCloseNodes),
    /// Collect refresh targets for stale buckets.
    GetStaleRanges(usize, bool, oneshot::Sender<Vec<NodeId>>),
    /// Mark the bucket covering the id as accessed.
    Touch(NodeId),
    /// Retrieve table statistics.
    GetStats(oneshot::Sender<TableStats>),
    /// Retrieve every contact currently in a bucket.
    LoadContacts(oneshot::Sender<Vec<Contact>>),
    /// A probe of a bucket head settled.
    ProbeCompleted(PendingEviction, ProbeOutcome),
    /// Stop the handler.
    Shutdown,
}

pub(crate) struct FindCloseNodes {
    pub target: NodeId,
    pub count: usize,
    pub exclude: Option<NodeId>,
    pub tx: oneshot::Sender<Vec<Contact>>,
}

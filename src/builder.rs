use crate::{
    config::{EvictionPolicy, RoutingConfig},
    error::{LayerError, LayerResult},
    id::NodeId,
    probe::Prober,
    routing::{
        contact::Contact,
        table::{AddOutcome, RemoveOutcome, RoutingTable, TableStats},
    },
    worker::{FindCloseNodes, LayerEvent, LayerHandler, OneshotTask},
};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task,
};

/// Maintains the routing table of one overlay layer.
///
/// This type is cheaply cloneable where each clone refers to the same underlying table. This is
/// useful to be able to report contacts and run lookups from multiple tasks/threads. The table
/// itself lives in a single handler task which applies every request in order.
#[derive(Clone)]
pub struct RoutingLayer {
    send: mpsc::UnboundedSender<OneshotTask>,
    node_id: NodeId,
    layer_id: u32,
}

impl RoutingLayer {
    /// Create a new LayerBuilder.
    pub fn builder() -> LayerBuilder {
        LayerBuilder {
            node_id: None,
            layer_id: 0,
            config: RoutingConfig::default(),
        }
    }

    /// Start the layer handler with the given LayerBuilder.
    fn with_builder(
        builder: LayerBuilder,
        prober: Arc<dyn Prober>,
    ) -> (Self, mpsc::UnboundedReceiver<LayerEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let node_id = builder.node_id.unwrap_or_else(rand::random);
        let routing_table = RoutingTable::with_config(node_id, builder.layer_id, builder.config);
        let handler = LayerHandler::new(
            routing_table,
            prober,
            command_rx,
            command_tx.downgrade(),
            event_tx,
        );

        task::spawn(handler.run());

        let layer = Self {
            send: command_tx,
            node_id,
            layer_id: builder.layer_id,
        };

        (layer, event_rx)
    }

    /// Id of the local node on this layer.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn layer_id(&self) -> u32 {
        self.layer_id
    }

    /// XOR distance between two ids.
    pub fn distance(a: NodeId, b: NodeId) -> NodeId {
        RoutingTable::distance(a, b)
    }

    /// Offer a contact to the routing table and wait until its admission settled.
    ///
    /// This resolves right away unless the contact's bucket is full and cannot be split. In
    /// that case the bucket's least recently seen contact is probed first and the result tells
    /// whether the new contact replaced it.
    pub async fn add_contact(&self, contact: Contact) -> LayerResult<AddOutcome> {
        let (tx, rx) = oneshot::channel();

        self.send(OneshotTask::AddContact(contact, Some(tx)))?;

        rx.await.map_err(|_| LayerError::Shutdown)
    }

    /// Report that a peer was seen without waiting for the outcome.
    pub fn report_contact(&self, contact: Contact) {
        if self.send(OneshotTask::AddContact(contact, None)).is_err() {
            log::error!("failed to report contact - LayerHandler has shut down");
        }
    }

    /// Report a failed contact. See [`RoutingTable::remove_contact`].
    pub async fn remove_contact(&self, id: NodeId) -> LayerResult<RemoveOutcome> {
        let (tx, rx) = oneshot::channel();

        self.send(OneshotTask::RemoveContact(id, tx))?;

        Ok(rx.await.map_err(|_| LayerError::Shutdown)??)
    }

    pub async fn get_contact(&self, id: NodeId) -> LayerResult<Contact> {
        let (tx, rx) = oneshot::channel();

        self.send(OneshotTask::GetContact(id, tx))?;

        Ok(rx.await.map_err(|_| LayerError::Shutdown)??)
    }

    /// Up to `count` contacts near `target`, skipping `exclude`.
    /// See [`RoutingTable::find_close_nodes`].
    pub async fn find_close_nodes(
        &self,
        target: NodeId,
        count: usize,
        exclude: Option<NodeId>,
    ) -> LayerResult<Vec<Contact>> {
        let (tx, rx) = oneshot::channel();

        self.send(OneshotTask::FindCloseNodes(FindCloseNodes {
            target,
            count,
            exclude,
            tx,
        }))?;

        rx.await.map_err(|_| LayerError::Shutdown)
    }

    /// Ids to look up in order to refresh stale buckets.
    /// See [`RoutingTable::get_stale_ranges`].
    pub async fn get_stale_ranges(
        &self,
        start_index: usize,
        force: bool,
    ) -> LayerResult<Vec<NodeId>> {
        let (tx, rx) = oneshot::channel();

        self.send(OneshotTask::GetStaleRanges(start_index, force, tx))?;

        rx.await.map_err(|_| LayerError::Shutdown)
    }

    /// Mark the bucket covering `id` as accessed.
    pub fn touch(&self, id: NodeId) -> LayerResult<()> {
        self.send(OneshotTask::Touch(id))
    }

    /// Get statistics of the routing table, can be used for debugging.
    pub async fn stats(&self) -> LayerResult<TableStats> {
        let (tx, rx) = oneshot::channel();

        self.send(OneshotTask::GetStats(tx))?;

        rx.await.map_err(|_| LayerError::Shutdown)
    }

    /// Return every contact currently held in a bucket, e.g. to persist them.
    pub async fn load_contacts(&self) -> LayerResult<Vec<Contact>> {
        let (tx, rx) = oneshot::channel();

        self.send(OneshotTask::LoadContacts(tx))?;

        rx.await.map_err(|_| LayerError::Shutdown)
    }

    /// Stop the handler. Probes still in flight are discarded when they settle.
    pub fn shutdown(&self) {
        self.send(OneshotTask::Shutdown).ok();
    }

    fn send(&self, task: OneshotTask) -> LayerResult<()> {
        self.send.send(task).map_err(|_| LayerError::Shutdown)
    }
}

// ----------------------------------------------------------------------------//

/// Stores information for initializing a routing layer.
#[derive(Debug)]
pub struct LayerBuilder {
    node_id: Option<NodeId>,
    layer_id: u32,
    config: RoutingConfig,
}

impl LayerBuilder {
    /// Set the id of this node. If not provided, a random node id is generated.
    pub fn set_node_id(mut self, id: NodeId) -> Self {
        self.node_id = Some(id);
        self
    }

    /// Set the id of the layer, used to tell several layers of one node apart. Defaults to 0.
    pub fn set_layer_id(mut self, layer_id: u32) -> Self {
        self.layer_id = layer_id;
        self
    }

    /// Replace the whole configuration.
    pub fn set_config(mut self, config: RoutingConfig) -> Self {
        self.config = config;
        self
    }

    /// Choose what happens to new contacts of full buckets that cannot be split.
    pub fn set_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Set the bucket capacity `k`.
    ///
    /// Panics in `start` if zero.
    pub fn set_bucket_size(mut self, bucket_size: usize) -> Self {
        self.config.bucket_size = bucket_size;
        self
    }

    /// Start the layer with the current configuration. Must be called within a tokio runtime.
    pub fn start<P: Prober>(
        self,
        prober: P,
    ) -> (RoutingLayer, mpsc::UnboundedReceiver<LayerEvent>) {
        RoutingLayer::with_builder(self, Arc::new(prober))
    }
}

use crate::builder::RoutingLayer;
use std::collections::HashMap;

/// Independent routing layers of one node, keyed by layer id.
///
/// Every layer owns its own routing table; nothing is shared between them except whatever
/// transport the caller plugs into their probers.
#[derive(Clone, Default)]
pub struct Layers {
    layers: HashMap<u32, RoutingLayer>,
}

impl Layers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running layer under its layer id.
    ///
    /// A layer previously registered under the same id is shut down and returned.
    pub fn insert(&mut self, layer: RoutingLayer) -> Option<RoutingLayer> {
        let previous = self.layers.insert(layer.layer_id(), layer);

        if let Some(previous) = &previous {
            log::debug!("Replacing routing layer {}", previous.layer_id());
            previous.shutdown();
        }

        previous
    }

    pub fn get(&self, layer_id: u32) -> Option<&RoutingLayer> {
        self.layers.get(&layer_id)
    }

    /// Unregister and shut down the layer with the given id.
    pub fn remove(&mut self, layer_id: u32) -> Option<RoutingLayer> {
        let layer = self.layers.remove(&layer_id)?;
        layer.shutdown();
        Some(layer)
    }

    /// Ids of all registered layers, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.layers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn shutdown_all(&mut self) {
        for (_, layer) in self.layers.drain() {
            layer.shutdown();
        }
    }
}

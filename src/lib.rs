//! Kademlia routing table for overlay networks.
//!
//! The table partitions the 160-bit id space into k-buckets held in an ordered list, splitting
//! the bucket that covers the local node's id whenever it overflows. Full buckets elsewhere are
//! handled either by probing their least recently seen contact or by parking new contacts in a
//! per-bucket replacement cache.
//!
//! [`RoutingTable`] is the plain, synchronous data structure. [`RoutingLayer`] runs a table
//! inside a handler task, drives liveness probes through a [`Prober`] supplied by the transport
//! and emits refresh targets for stale buckets.

mod builder;
mod config;
mod error;
mod id;
mod layers;
mod probe;
mod routing;
mod time;
mod worker;

pub use crate::builder::{LayerBuilder, RoutingLayer};
pub use crate::config::{
    EvictionPolicy, RoutingConfig, ALPHA, MAX_FAILED_RPCS, REFRESH_CHECK_INTERVAL,
    REFRESH_TIMEOUT, RPC_TIMEOUT,
};
pub use crate::error::{LayerError, LayerResult, RoutingError, RoutingResult};
pub use crate::id::{IdError, NodeId, NODE_ID_BITS, NODE_ID_LEN};
pub use crate::layers::Layers;
pub use crate::probe::{ProbeOutcome, Prober};
pub use crate::routing::bucket::{Bucket, MAX_BUCKET_SIZE};
pub use crate::routing::contact::Contact;
pub use crate::routing::table::{
    AddOutcome, PendingEviction, RemoveOutcome, RoutingTable, TableStats,
};
pub use crate::worker::LayerEvent;
pub use primitive_types::U256;

use crate::id::NodeId;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RoutingError {
    /// Callers should treat this as "already absent" rather than as a fault.
    #[error("contact {0} not in routing table")]
    NotFound(NodeId),
}

pub type RoutingResult<T, E = RoutingError> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LayerError {
    #[error("routing layer handler has shut down")]
    Shutdown,
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

pub type LayerResult<T, E = LayerError> = std::result::Result<T, E>;

/// Raised by a bucket that is at capacity. Always handled inside the table.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("bucket is full")]
pub(crate) struct BucketFull;

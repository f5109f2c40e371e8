//! Tunable parameters of a routing layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::routing::bucket::MAX_BUCKET_SIZE;

/// Degree of parallelism callers should use for iterative lookups.
pub const ALPHA: usize = 3;

/// Timeout for a single liveness probe.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// A bucket that has not been accessed for this long needs refreshing.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// How often the layer looks for buckets that need refreshing.
pub const REFRESH_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60 / 5);

/// Consecutive failures after which a contact is replaced from the replacement cache.
pub const MAX_FAILED_RPCS: usize = 5;

/// What to do with a new contact whose bucket is full and cannot be split.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Probe the least recently seen contact and replace it only if it does not answer.
    Probe,
    /// Park the new contact in a per-bucket replacement cache and evict stale contacts only
    /// after repeated failures reported through `remove_contact`.
    ReplacementCache,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::Probe
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Capacity `k` of every bucket, also the per-bucket replacement cache limit.
    pub bucket_size: usize,
    /// Informational, the table itself never issues parallel requests.
    pub alpha: usize,
    pub rpc_timeout: Duration,
    pub refresh_timeout: Duration,
    /// Zero disables the periodic refresh check.
    pub refresh_check_interval: Duration,
    pub max_failed_rpcs: usize,
    pub policy: EvictionPolicy,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            bucket_size: MAX_BUCKET_SIZE,
            alpha: ALPHA,
            rpc_timeout: RPC_TIMEOUT,
            refresh_timeout: REFRESH_TIMEOUT,
            refresh_check_interval: REFRESH_CHECK_INTERVAL,
            max_failed_rpcs: MAX_FAILED_RPCS,
            policy: EvictionPolicy::default(),
        }
    }
}

//! Liveness probing seam towards the transport layer.

use async_trait::async_trait;
use std::time::Duration;

use crate::routing::contact::Contact;

/// Result of a liveness probe.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Alive,
    Timeout,
}

/// Sends a liveness check (e.g. a PING RPC) to a contact.
///
/// Implemented by the transport/RPC layer. Implementations do not need to enforce a deadline
/// themselves, the routing layer bounds every probe by its configured RPC timeout and treats an
/// elapsed deadline as `ProbeOutcome::Timeout`.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, contact: &Contact) -> ProbeOutcome;
}

/// Run a probe bounded by `timeout`.
pub(crate) async fn probe_with_timeout<P>(
    prober: &P,
    contact: &Contact,
    timeout: Duration,
) -> ProbeOutcome
where
    P: Prober + ?Sized,
{
    match tokio::time::timeout(timeout, prober.probe(contact)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            log::debug!("Probe of {:?} timed out after {:?}", contact.id(), timeout);
            ProbeOutcome::Timeout
        }
    }
}

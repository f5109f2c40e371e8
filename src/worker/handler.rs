use super::{FindCloseNodes, LayerEvent, OneshotTask};
use crate::id::NodeId;
use crate::probe::{self, ProbeOutcome, Prober};
use crate::routing::table::{AddOutcome, PendingEviction, RemoveOutcome, RoutingTable};
use futures_util::{
    future::{self, Either},
    pin_mut,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task,
    time::{self, MissedTickBehavior},
};

/// Owner of a layer's routing table.
///
/// All commands, including the continuations of liveness probes, are processed one at a time by
/// this handler, so nobody ever observes the table halfway through a split or an eviction.
pub(crate) struct LayerHandler {
    running: bool,
    routing_table: RoutingTable,
    prober: Arc<dyn Prober>,
    command_rx: mpsc::UnboundedReceiver<OneshotTask>,
    // Weak so that probe tasks don't keep the handler alive once every `RoutingLayer` is gone.
    command_tx: mpsc::WeakUnboundedSender<OneshotTask>,
    event_tx: mpsc::UnboundedSender<LayerEvent>,
    // Bucket head being probed -> caller waiting for the admission that triggered the probe.
    probes_in_flight: HashMap<NodeId, Option<oneshot::Sender<AddOutcome>>>,
}

impl LayerHandler {
    pub fn new(
        routing_table: RoutingTable,
        prober: Arc<dyn Prober>,
        command_rx: mpsc::UnboundedReceiver<OneshotTask>,
        command_tx: mpsc::WeakUnboundedSender<OneshotTask>,
        event_tx: mpsc::UnboundedSender<LayerEvent>,
    ) -> Self {
        Self {
            running: false,
            routing_table,
            prober,
            command_rx,
            command_tx,
            event_tx,
            probes_in_flight: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        self.running = true;

        // A zero period disables the periodic refresh check.
        let period = self.routing_table.config().refresh_check_interval;
        let mut refresh_check = (!period.is_zero()).then(|| {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        log::info!("{}: handler started", self.routing_table);

        while self.running {
            let event = {
                let command = self.command_rx.recv();
                pin_mut!(command);

                let tick = async {
                    match &mut refresh_check {
                        Some(interval) => {
                            interval.tick().await;
                        }
                        None => future::pending::<()>().await,
                    }
                };
                pin_mut!(tick);

                match future::select(command, tick).await {
                    Either::Left((Some(command), _)) => Either::Left(command),
                    Either::Left((None, _)) => break,
                    Either::Right(_) => Either::Right(()),
                }
            };

            match event {
                Either::Left(command) => self.handle_command(command),
                Either::Right(()) => self.handle_refresh_check(),
            }
        }

        log::info!("{}: handler shut down", self.routing_table);
        self.send_event(LayerEvent::ShuttingDown);
    }

    fn handle_command(&mut self, task: OneshotTask) {
        match task {
            OneshotTask::AddContact(contact, tx) => {
                let id = contact.id();
                let outcome = self.routing_table.add_contact(contact);
                self.handle_admission(id, outcome, tx);
            }
            OneshotTask::RemoveContact(id, tx) => {
                let result = self.routing_table.remove_contact(id);

                if let Ok(RemoveOutcome::Removed {
                    contact,
                    replacement,
                }) = &result
                {
                    self.send_event(LayerEvent::ContactEvicted {
                        evicted: contact.id(),
                        replacement: replacement.as_ref().map(|c| c.id()),
                    });
                }

                tx.send(result).ok();
            }
            OneshotTask::GetContact(id, tx) => {
                tx.send(self.routing_table.get_contact(id).cloned()).ok();
            }
            OneshotTask::FindCloseNodes(FindCloseNodes {
                target,
                count,
                exclude,
                tx,
            }) => {
                let contacts = self.routing_table.find_close_nodes(target, count, exclude);
                tx.send(contacts).ok();
            }
            OneshotTask::GetStaleRanges(start_index, force, tx) => {
                tx.send(self.routing_table.get_stale_ranges(start_index, force))
                    .ok();
            }
            OneshotTask::Touch(id) => {
                self.routing_table.touch(id);
            }
            OneshotTask::GetStats(tx) => {
                tx.send(self.routing_table.stats()).ok();
            }
            OneshotTask::LoadContacts(tx) => {
                tx.send(self.routing_table.contacts().cloned().collect())
                    .ok();
            }
            OneshotTask::ProbeCompleted(pending, outcome) => {
                self.handle_probe_completed(pending, outcome);
            }
            OneshotTask::Shutdown => {
                self.running = false;
            }
        }
    }

    fn handle_admission(
        &mut self,
        id: NodeId,
        outcome: AddOutcome,
        tx: Option<oneshot::Sender<AddOutcome>>,
    ) {
        match outcome {
            AddOutcome::ProbeRequired(pending) => self.start_probe(pending, tx),
            outcome => {
                if outcome == AddOutcome::Added {
                    self.send_event(LayerEvent::ContactAdded(id));
                }

                reply(tx, outcome);
            }
        }
    }

    fn start_probe(
        &mut self,
        pending: PendingEviction,
        tx: Option<oneshot::Sender<AddOutcome>>,
    ) {
        let head_id = pending.head().id();

        if self.probes_in_flight.contains_key(&head_id) {
            log::trace!(
                "{}: {:?} is already being probed, dropping {:?}",
                self.routing_table,
                head_id,
                pending.candidate().id()
            );

            reply(tx, AddOutcome::Dropped);
            return;
        }

        self.probes_in_flight.insert(head_id, tx);

        let prober = self.prober.clone();
        let command_tx = self.command_tx.clone();
        let timeout = self.routing_table.config().rpc_timeout;

        let mut completion = ProbeCompletion {
            pending: Some(pending),
            outcome: ProbeOutcome::Timeout,
            command_tx,
        };

        task::spawn(async move {
            let outcome = match &completion.pending {
                Some(pending) => {
                    probe::probe_with_timeout(&*prober, pending.head(), timeout).await
                }
                None => return,
            };

            completion.outcome = outcome;
        });
    }

    fn handle_probe_completed(&mut self, pending: PendingEviction, outcome: ProbeOutcome) {
        let head_id = pending.head().id();
        let candidate_id = pending.candidate().id();
        let tx = self.probes_in_flight.remove(&head_id).flatten();

        let head_known = self.routing_table.get_contact(head_id).is_ok();
        let result = self.routing_table.resolve_probe(pending, outcome);

        if head_known && self.routing_table.get_contact(head_id).is_err() {
            let replaced = self.routing_table.get_contact(candidate_id).is_ok();

            self.send_event(LayerEvent::ContactEvicted {
                evicted: head_id,
                replacement: if replaced { Some(candidate_id) } else { None },
            });
        }

        // A probe that timed out can lead to another one if the bucket filled up meanwhile.
        self.handle_admission(candidate_id, result, tx);
    }

    fn handle_refresh_check(&mut self) {
        let targets = self.routing_table.get_stale_ranges(0, false);

        if !targets.is_empty() {
            log::debug!(
                "{}: {} buckets need refreshing",
                self.routing_table,
                targets.len()
            );

            self.send_event(LayerEvent::RefreshNeeded(targets));
        }
    }

    fn send_event(&self, event: LayerEvent) {
        // Nobody listening is fine.
        self.event_tx.send(event).ok();
    }
}

/// Reports a finished probe back to the handler when dropped.
///
/// Also runs when the probe task unwinds from a panicking `Prober`, in which case the head
/// counts as unresponsive. Either way the head's in-flight entry gets cleared.
struct ProbeCompletion {
    pending: Option<PendingEviction>,
    outcome: ProbeOutcome,
    command_tx: mpsc::WeakUnboundedSender<OneshotTask>,
}

impl Drop for ProbeCompletion {
    fn drop(&mut self) {
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => return,
        };

        // Without a handler there is no table left to resume.
        if let Some(command_tx) = self.command_tx.upgrade() {
            command_tx
                .send(OneshotTask::ProbeCompleted(pending, self.outcome))
                .ok();
        }
    }
}

fn reply(tx: Option<oneshot::Sender<AddOutcome>>, outcome: AddOutcome) {
    if let Some(tx) = tx {
        tx.send(outcome).ok();
    }
}

use std::fmt;

use primitive_types::U256;

use super::{
    bucket::Bucket,
    cache::ReplacementCache,
    contact::Contact,
};
use crate::config::{EvictionPolicy, RoutingConfig};
use crate::error::{BucketFull, RoutingResult};
use crate::id::{id_space_end, NodeId};
use crate::probe::ProbeOutcome;

/// Result of offering a contact to the routing table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// The contact carries our own id.
    Ignored,
    /// The contact was not known and now sits in a bucket.
    Added,
    /// The contact was known and has been moved to the most recently seen position.
    Updated,
    /// The bucket was full, the contact now waits in the replacement cache.
    Cached,
    /// The bucket was full and the least recently seen contact has to be probed first.
    ProbeRequired(PendingEviction),
    /// The contact was discarded because the contact it competed with is alive.
    Dropped,
}

/// Full-bucket admission waiting on a liveness probe of the bucket's head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingEviction {
    head: Contact,
    candidate: Contact,
}

impl PendingEviction {
    /// Least recently seen contact of the full bucket, the one to probe.
    pub fn head(&self) -> &Contact {
        &self.head
    }

    /// Contact waiting to be admitted if the head turns out to be dead.
    pub fn candidate(&self) -> &Contact {
        &self.candidate
    }
}

/// Result of reporting a failed contact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The failure was counted but the contact stays in its bucket.
    FailureRecorded(usize),
    /// The contact left its bucket, possibly backfilled from the replacement cache.
    Removed {
        contact: Contact,
        replacement: Option<Contact>,
    },
}

/// Snapshot of the table's size.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TableStats {
    pub layer_id: u32,
    pub bucket_count: usize,
    pub contact_count: usize,
    pub cached_count: usize,
}

/// Routing table of a single layer.
///
/// The buckets partition the whole id space into contiguous, non-overlapping ranges ordered
/// from low to high, which makes the list an implicit binary trie: only the bucket covering our
/// own id is ever split.
pub struct RoutingTable {
    node_id: NodeId,
    layer_id: u32,
    config: RoutingConfig,
    buckets: Vec<Bucket>,
    cache: ReplacementCache,
}

impl RoutingTable {
    /// Create a new RoutingTable with the given node id as our id and the default config.
    pub fn new(node_id: NodeId) -> RoutingTable {
        RoutingTable::with_config(node_id, 0, RoutingConfig::default())
    }

    pub fn with_config(node_id: NodeId, layer_id: u32, config: RoutingConfig) -> RoutingTable {
        assert!(config.bucket_size > 0, "bucket size must be positive");

        let buckets = vec![Bucket::new(
            U256::zero(),
            id_space_end(),
            config.bucket_size,
        )];
        let cache = ReplacementCache::new(config.bucket_size);

        RoutingTable {
            node_id,
            layer_id,
            config,
            buckets,
            cache,
        }
    }

    /// Return the node id of the RoutingTable.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn layer_id(&self) -> u32 {
        self.layer_id
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.config.policy
    }

    /// XOR distance between two ids.
    pub fn distance(a: NodeId, b: NodeId) -> NodeId {
        a.distance(&b)
    }

    /// Iterator over all buckets in the routing table, ordered by range.
    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> + ExactSizeIterator {
        self.buckets.iter()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Iterator over every contact held in a bucket.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.buckets.iter().flat_map(|bucket| bucket.iter())
    }

    /// Iterator over every contact waiting in the replacement cache.
    pub fn cached_contacts(&self) -> impl Iterator<Item = &Contact> {
        self.cache.iter()
    }

    pub fn total_contacts(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            layer_id: self.layer_id,
            bucket_count: self.buckets.len(),
            contact_count: self.total_contacts(),
            cached_count: self.cache.len(),
        }
    }

    /// Index of the bucket whose range contains the id.
    pub fn bucket_index(&self, id: NodeId) -> usize {
        let value = id.to_u256();
        let index = self
            .buckets
            .partition_point(|bucket| bucket.range().end <= value);

        match self.buckets.get(index) {
            Some(bucket) if bucket.in_range(id) => index,
            _ => panic!(
                "no bucket covers id {:?} in RoutingTable - implementation error",
                id
            ),
        }
    }

    /// Find the contact with the given id.
    pub fn get_contact(&self, id: NodeId) -> RoutingResult<&Contact> {
        self.buckets[self.bucket_index(id)].get(id)
    }

    /// Add the contact to its bucket or, if it is known already, mark it as most recently seen.
    ///
    /// The bucket covering our own id is split as often as needed to make room. Any other full
    /// bucket is handled according to the eviction policy.
    pub fn add_contact(&mut self, contact: Contact) -> AddOutcome {
        // Should not add a contact that has the same id as us
        if contact.id() == self.node_id {
            return AddOutcome::Ignored;
        }

        loop {
            let bucket_index = self.bucket_index(contact.id());

            match self.buckets[bucket_index].add_or_update(contact.clone()) {
                Ok(updated) => {
                    self.cache.remove(bucket_index, contact.id());

                    log::trace!(
                        "Layer {}: {} {:?} in bucket {}",
                        self.layer_id,
                        if updated { "updated" } else { "added" },
                        contact.id(),
                        bucket_index
                    );

                    return if updated {
                        AddOutcome::Updated
                    } else {
                        AddOutcome::Added
                    };
                }
                Err(BucketFull) if self.buckets[bucket_index].in_range(self.node_id) => {
                    // Splitting strictly shrinks the bucket covering our id, so this
                    // terminates once the contact lands in a bucket we don't cover.
                    self.split_bucket(bucket_index);
                }
                Err(BucketFull) => return self.handle_full_bucket(bucket_index, contact),
            }
        }
    }

    fn handle_full_bucket(&mut self, bucket_index: usize, contact: Contact) -> AddOutcome {
        match self.config.policy {
            EvictionPolicy::Probe => {
                let head = self.buckets[bucket_index]
                    .head()
                    .cloned()
                    .expect("full bucket without contacts - implementation error");

                log::trace!(
                    "Layer {}: bucket {} is full, probing {:?} before admitting {:?}",
                    self.layer_id,
                    bucket_index,
                    head.id(),
                    contact.id()
                );

                AddOutcome::ProbeRequired(PendingEviction {
                    head,
                    candidate: contact,
                })
            }
            EvictionPolicy::ReplacementCache => {
                let mut contact = contact;
                contact.refresh();

                let id = contact.id();
                if let Some(evicted) = self.cache.insert(bucket_index, contact) {
                    log::trace!(
                        "Layer {}: replacement cache of bucket {} full, dropped {:?}",
                        self.layer_id,
                        bucket_index,
                        evicted.id()
                    );
                }

                log::trace!(
                    "Layer {}: cached {:?} for bucket {}",
                    self.layer_id,
                    id,
                    bucket_index
                );

                AddOutcome::Cached
            }
        }
    }

    /// Finish an admission that was waiting on a probe of the bucket's head.
    ///
    /// The table may have changed while the probe was in flight, so the state is checked
    /// again: a head that already left the table counts as evicted, and a candidate that got
    /// in by other means needs nothing more.
    pub fn resolve_probe(
        &mut self,
        pending: PendingEviction,
        outcome: ProbeOutcome,
    ) -> AddOutcome {
        let PendingEviction { head, candidate } = pending;

        if self.get_contact(candidate.id()).is_ok() {
            return AddOutcome::Updated;
        }

        match outcome {
            ProbeOutcome::Alive if self.get_contact(head.id()).is_ok() => {
                log::trace!(
                    "Layer {}: {:?} is alive, dropping {:?}",
                    self.layer_id,
                    head.id(),
                    candidate.id()
                );

                AddOutcome::Dropped
            }
            ProbeOutcome::Alive => self.add_contact(candidate),
            ProbeOutcome::Timeout => {
                let bucket_index = self.bucket_index(head.id());
                if self.buckets[bucket_index].remove(head.id()).is_ok() {
                    log::debug!(
                        "Layer {}: replacing dead contact {:?} with {:?}",
                        self.layer_id,
                        head.id(),
                        candidate.id()
                    );
                }

                self.add_contact(candidate)
            }
        }
    }

    /// Report a contact as failed.
    ///
    /// With the probe policy the contact is removed right away. With the replacement cache
    /// policy its failure count is increased and it is only removed once the count reaches the
    /// configured threshold, in which case the most recently seen cached contact takes its
    /// place.
    pub fn remove_contact(&mut self, id: NodeId) -> RoutingResult<RemoveOutcome> {
        let bucket_index = self.bucket_index(id);

        match self.config.policy {
            EvictionPolicy::Probe => {
                let contact = self.buckets[bucket_index].remove(id)?;
                log::debug!(
                    "Layer {}: removed {:?} from bucket {}",
                    self.layer_id,
                    id,
                    bucket_index
                );

                Ok(RemoveOutcome::Removed {
                    contact,
                    replacement: None,
                })
            }
            EvictionPolicy::ReplacementCache => {
                let failures = self.buckets[bucket_index].get_mut(id)?.record_failure();
                if failures < self.config.max_failed_rpcs {
                    return Ok(RemoveOutcome::FailureRecorded(failures));
                }

                let contact = self.buckets[bucket_index].remove(id)?;
                let replacement = self.cache.pop_most_recent(bucket_index);

                if let Some(replacement) = &replacement {
                    if self.buckets[bucket_index]
                        .add_or_update(replacement.clone())
                        .is_err()
                    {
                        unreachable!("bucket full right after removal - implementation error");
                    }
                }

                log::debug!(
                    "Layer {}: removed {:?} from bucket {} after {} failures, replacement: {:?}",
                    self.layer_id,
                    id,
                    bucket_index,
                    failures,
                    replacement.as_ref().map(Contact::id)
                );

                Ok(RemoveOutcome::Removed {
                    contact,
                    replacement,
                })
            }
        }
    }

    /// Contacts near the target id, at most `count` of them.
    ///
    /// Starts with the bucket covering the target and then alternates between the neighbouring
    /// buckets below and above it, moving outwards. The result is ordered by bucket adjacency,
    /// not by exact XOR distance; callers doing iterative lookups sort what they need.
    pub fn find_close_nodes(
        &self,
        target: NodeId,
        count: usize,
        exclude: Option<NodeId>,
    ) -> Vec<Contact> {
        let bucket_index = self.bucket_index(target);

        let mut closest: Vec<Contact> = self.buckets[bucket_index]
            .get_closest(count, exclude)
            .cloned()
            .collect();

        let mut offset = 1;
        while closest.len() < count {
            let lower = bucket_index.checked_sub(offset);
            let higher = Some(bucket_index + offset).filter(|index| *index < self.buckets.len());

            if lower.is_none() && higher.is_none() {
                break;
            }

            for index in lower.into_iter().chain(higher) {
                let remaining = count - closest.len();
                closest.extend(
                    self.buckets[index]
                        .get_closest(remaining, exclude)
                        .cloned(),
                );
            }

            offset += 1;
        }

        closest
    }

    /// Random ids to look up in order to refresh stale buckets.
    ///
    /// One id is produced for each bucket at or after `start_index` that was not accessed
    /// within the refresh timeout, or for every such bucket if `force` is set.
    pub fn get_stale_ranges(&self, start_index: usize, force: bool) -> Vec<NodeId> {
        let mut rng = rand::thread_rng();

        self.buckets
            .iter()
            .skip(start_index)
            .filter(|bucket| {
                force || bucket.last_accessed().elapsed() >= self.config.refresh_timeout
            })
            .map(|bucket| bucket.random_id_in_range(&mut rng))
            .collect()
    }

    /// Update the last accessed time of the bucket covering the id.
    pub fn touch(&mut self, id: NodeId) {
        let bucket_index = self.bucket_index(id);
        self.buckets[bucket_index].touch();
    }

    /// Split the bucket at the given index in two halves, the upper one inserted right after.
    fn split_bucket(&mut self, bucket_index: usize) {
        let old_count = self.buckets[bucket_index].len();

        let upper = self.buckets[bucket_index].split();
        self.cache.split(bucket_index, &upper);
        self.buckets.insert(bucket_index + 1, upper);

        log::debug!(
            "Layer {}: split bucket {} ({} contacts) into {} / {}, {} buckets total",
            self.layer_id,
            bucket_index,
            old_count,
            self.buckets[bucket_index].len(),
            self.buckets[bucket_index + 1].len(),
            self.buckets.len()
        );
    }

    #[cfg(test)]
    pub(crate) fn bucket_mut(&mut self, index: usize) -> &mut Bucket {
        &mut self.buckets[index]
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<RTable({}) {} buckets for {}>",
            self.layer_id,
            self.buckets.len(),
            self.node_id
        )
    }
}

// ----------------------------------------------------------------------------//

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use primitive_types::U256;

    use crate::config::{EvictionPolicy, RoutingConfig, MAX_FAILED_RPCS};
    use crate::error::RoutingError;
    use crate::id::{id_space_end, NodeId, NODE_ID_LEN};
    use crate::probe::ProbeOutcome;
    use crate::routing::bucket::MAX_BUCKET_SIZE;
    use crate::routing::contact::Contact;
    use crate::routing::table::{AddOutcome, RemoveOutcome, RoutingTable};
    use crate::test;
    use crate::time::Instant;

    fn cache_table(node_id: NodeId) -> RoutingTable {
        let config = RoutingConfig {
            policy: EvictionPolicy::ReplacementCache,
            ..RoutingConfig::default()
        };

        RoutingTable::with_config(node_id, 0, config)
    }

    fn add_all(table: &mut RoutingTable, ids: &[NodeId]) {
        let dummy_addr = test::dummy_socket_addr_v4();
        for id in ids {
            table.add_contact(Contact::new(*id, dummy_addr));
        }
    }

    fn assert_coverage(table: &RoutingTable) {
        let mut expected_start = U256::zero();
        for bucket in table.buckets() {
            let range = bucket.range();
            assert_eq!(range.start, expected_start);
            assert!(range.start < range.end);
            expected_start = range.end;
        }
        assert_eq!(expected_start, id_space_end());
    }

    fn assert_capacity_and_placement(table: &RoutingTable) {
        for bucket in table.buckets() {
            assert!(bucket.len() <= table.config().bucket_size);
            assert!(bucket.iter().all(|contact| bucket.in_range(contact.id())));
        }
    }

    /// Fill the upper half of the id space, which does not contain our id, and split off the
    /// lower half. Returns the ids in the full, unsplittable bucket.
    fn fill_far_bucket(table: &mut RoutingTable) -> Vec<NodeId> {
        let far_ids = test::dummy_block_node_ids_with_prefix(0xf0, MAX_BUCKET_SIZE as u64);
        let near_ids = test::dummy_block_node_ids_with_prefix(0x01, 2);

        add_all(table, &far_ids);
        // The 9th distinct contact forces the first split.
        add_all(table, &near_ids);

        assert!(table.buckets().count() >= 2);
        assert!(table.buckets[table.bucket_index(far_ids[0])].is_full());

        far_ids
    }

    #[test]
    fn positive_initial_single_bucket() {
        let table = RoutingTable::new(test::dummy_node_id());

        assert_eq!(table.buckets().count(), 1);
        assert_eq!(table.total_contacts(), 0);
        assert_coverage(&table);
    }

    #[test]
    fn negative_node_id_equal_table_id() {
        let table_id = NodeId::from([1u8; NODE_ID_LEN]);
        let mut table = RoutingTable::new(table_id);

        let outcome = table.add_contact(Contact::new(table_id, test::dummy_socket_addr_v4()));

        assert_eq!(outcome, AddOutcome::Ignored);
        assert_eq!(table.total_contacts(), 0);
        assert_eq!(table.buckets().count(), 1);
        assert_eq!(table.find_close_nodes(table_id, 8, None).len(), 0);
    }

    #[test]
    fn positive_single_split_on_overflow() {
        let mut table = RoutingTable::new(test::node_id_with_prefix(0x00, 7));

        // Half the contacts on each side of the first split point.
        let mut ids = test::dummy_block_node_ids_with_prefix(0x10, 4);
        ids.extend(test::dummy_block_node_ids_with_prefix(0x90, 5));
        add_all(&mut table, &ids);

        assert_eq!(table.buckets().count(), 2);
        assert_eq!(table.total_contacts(), MAX_BUCKET_SIZE + 1);
        for id in &ids {
            assert!(table.get_contact(*id).is_ok());
        }
        assert_coverage(&table);
        assert_capacity_and_placement(&table);
    }

    #[test]
    fn positive_split_recurses_towards_own_id() {
        let table_id = NodeId::from([1u8; NODE_ID_LEN]);
        let mut table = RoutingTable::new(table_id);

        // All ids differ from ours in the last byte only, so the bucket covering our id keeps
        // being split until they separate.
        let mut node_id: [u8; NODE_ID_LEN] = table_id.into();
        let ids: Vec<NodeId> = (0..=MAX_BUCKET_SIZE as u8)
            .map(|i| {
                node_id[NODE_ID_LEN - 1] = 0x80 | i;
                NodeId::from(node_id)
            })
            .collect();
        add_all(&mut table, &ids);

        assert!(table.buckets().count() > 100);
        assert_coverage(&table);
        assert_capacity_and_placement(&table);

        let own_bucket = table.bucket_index(table_id);
        assert!(table.buckets[own_bucket].in_range(table_id));
    }

    #[test]
    fn positive_update_existing_contact() {
        let mut table = RoutingTable::new(test::dummy_node_id());
        let id = test::node_id_with_prefix(0x42, 1);
        let addrs = test::dummy_block_socket_addrs(2);

        assert_eq!(table.add_contact(Contact::new(id, addrs[0])), AddOutcome::Added);
        assert_eq!(table.add_contact(Contact::new(id, addrs[1])), AddOutcome::Updated);

        assert_eq!(table.total_contacts(), 1);
        assert_eq!(table.get_contact(id).unwrap().addr(), addrs[1]);
    }

    #[test]
    fn positive_full_far_bucket_requires_probe() {
        let mut table = RoutingTable::new(test::node_id_with_prefix(0x00, 7));
        let far_ids = fill_far_bucket(&mut table);

        let candidate = test::node_id_with_prefix(0xf1, 99);
        let outcome = table.add_contact(Contact::new(candidate, test::dummy_socket_addr_v4()));

        match outcome {
            AddOutcome::ProbeRequired(pending) => {
                assert_eq!(pending.head().id(), far_ids[0]);
                assert_eq!(pending.candidate().id(), candidate);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert!(table.get_contact(candidate).is_err());
    }

    #[test]
    fn positive_probe_timeout_replaces_head() {
        let mut table = RoutingTable::new(test::node_id_with_prefix(0x00, 7));
        let far_ids = fill_far_bucket(&mut table);
        let before = table.total_contacts();

        let candidate = test::node_id_with_prefix(0xf1, 99);
        let pending =
            match table.add_contact(Contact::new(candidate, test::dummy_socket_addr_v4())) {
                AddOutcome::ProbeRequired(pending) => pending,
                other => panic!("unexpected outcome {:?}", other),
            };

        let outcome = table.resolve_probe(pending, ProbeOutcome::Timeout);

        assert_eq!(outcome, AddOutcome::Added);
        assert_eq!(
            table.get_contact(far_ids[0]).unwrap_err(),
            RoutingError::NotFound(far_ids[0])
        );
        assert!(table.get_contact(candidate).is_ok());
        assert_eq!(table.total_contacts(), before);

        let far_bucket = &table.buckets[table.bucket_index(candidate)];
        assert_eq!(far_bucket.iter().last().unwrap().id(), candidate);
    }

    #[test]
    fn positive_probe_alive_drops_candidate() {
        let mut table = RoutingTable::new(test::node_id_with_prefix(0x00, 7));
        let far_ids = fill_far_bucket(&mut table);

        let snapshot: Vec<NodeId> = table.contacts().map(Contact::id).collect();

        let candidate = test::node_id_with_prefix(0xf1, 99);
        let pending =
            match table.add_contact(Contact::new(candidate, test::dummy_socket_addr_v4())) {
                AddOutcome::ProbeRequired(pending) => pending,
                other => panic!("unexpected outcome {:?}", other),
            };

        let outcome = table.resolve_probe(pending, ProbeOutcome::Alive);

        assert_eq!(outcome, AddOutcome::Dropped);
        assert!(table.get_contact(candidate).is_err());
        assert!(table.get_contact(far_ids[0]).is_ok());
        assert_eq!(table.contacts().map(Contact::id).collect::<Vec<_>>(), snapshot);
    }

    #[test]
    fn positive_probe_resolution_revalidates() {
        let mut table = RoutingTable::new(test::node_id_with_prefix(0x00, 7));
        let far_ids = fill_far_bucket(&mut table);

        let candidate = test::node_id_with_prefix(0xf1, 99);
        let pending =
            match table.add_contact(Contact::new(candidate, test::dummy_socket_addr_v4())) {
                AddOutcome::ProbeRequired(pending) => pending,
                other => panic!("unexpected outcome {:?}", other),
            };

        // The head disappears while the probe is in flight.
        table.remove_contact(far_ids[0]).unwrap();

        let outcome = table.resolve_probe(pending, ProbeOutcome::Alive);

        assert_eq!(outcome, AddOutcome::Added);
        assert!(table.get_contact(candidate).is_ok());
    }

    #[test]
    fn positive_probe_resolution_with_candidate_already_admitted() {
        let mut table = RoutingTable::new(test::node_id_with_prefix(0x00, 7));
        let far_ids = fill_far_bucket(&mut table);

        let candidate = test::node_id_with_prefix(0xf1, 99);
        let pending =
            match table.add_contact(Contact::new(candidate, test::dummy_socket_addr_v4())) {
                AddOutcome::ProbeRequired(pending) => pending,
                other => panic!("unexpected outcome {:?}", other),
            };

        // Another contact leaves and the candidate gets in while the probe is in flight.
        table.remove_contact(far_ids[3]).unwrap();
        assert_eq!(
            table.add_contact(Contact::new(candidate, test::dummy_socket_addr_v4())),
            AddOutcome::Added
        );
        let snapshot: Vec<NodeId> = table.contacts().map(Contact::id).collect();

        let outcome = table.resolve_probe(pending, ProbeOutcome::Timeout);

        assert_eq!(outcome, AddOutcome::Updated);
        assert!(table.get_contact(far_ids[0]).is_ok());
        assert_eq!(table.contacts().map(Contact::id).collect::<Vec<_>>(), snapshot);
    }

    #[test]
    fn positive_probe_policy_removes_immediately() {
        let mut table = RoutingTable::new(test::dummy_node_id());
        let id = test::node_id_with_prefix(0x42, 1);
        add_all(&mut table, &[id]);

        match table.remove_contact(id).unwrap() {
            RemoveOutcome::Removed {
                contact,
                replacement,
            } => {
                assert_eq!(contact.id(), id);
                assert!(replacement.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(
            table.remove_contact(id).unwrap_err(),
            RoutingError::NotFound(id)
        );
    }

    #[test]
    fn positive_full_far_bucket_caches_candidates() {
        let mut table = cache_table(test::node_id_with_prefix(0x00, 7));
        fill_far_bucket(&mut table);

        let candidates = test::dummy_block_node_ids_with_prefix(0xf2, MAX_BUCKET_SIZE as u64 + 3);
        for id in &candidates {
            assert_eq!(
                table.add_contact(Contact::new(*id, test::dummy_socket_addr_v4())),
                AddOutcome::Cached
            );
        }

        // Capped per bucket, oldest entries evicted first.
        let cached: Vec<NodeId> = table.cached_contacts().map(Contact::id).collect();
        assert_eq!(cached, candidates[3..].to_vec());
        assert_eq!(table.stats().cached_count, MAX_BUCKET_SIZE);
    }

    #[test]
    fn positive_eviction_threshold_with_backfill() {
        let mut table = cache_table(test::node_id_with_prefix(0x00, 7));
        let far_ids = fill_far_bucket(&mut table);

        let standby = test::dummy_block_node_ids_with_prefix(0xf3, 2);
        add_all(&mut table, &standby);

        for expected in 1..MAX_FAILED_RPCS {
            assert_eq!(
                table.remove_contact(far_ids[2]).unwrap(),
                RemoveOutcome::FailureRecorded(expected)
            );
            assert!(table.get_contact(far_ids[2]).is_ok());
        }

        match table.remove_contact(far_ids[2]).unwrap() {
            RemoveOutcome::Removed {
                contact,
                replacement,
            } => {
                assert_eq!(contact.id(), far_ids[2]);
                assert_eq!(replacement.unwrap().id(), standby[1]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert!(table.get_contact(far_ids[2]).is_err());
        assert!(table.get_contact(standby[1]).is_ok());
        assert_eq!(table.get_contact(standby[1]).unwrap().failed_rpcs(), 0);
        assert_eq!(
            table.cached_contacts().map(Contact::id).collect::<Vec<_>>(),
            vec![standby[0]]
        );
    }

    #[test]
    fn positive_readmission_resets_failures() {
        let mut table = cache_table(test::dummy_node_id());
        let id = test::node_id_with_prefix(0x42, 1);
        add_all(&mut table, &[id]);

        table.remove_contact(id).unwrap();
        table.remove_contact(id).unwrap();
        assert_eq!(table.get_contact(id).unwrap().failed_rpcs(), 2);

        add_all(&mut table, &[id]);
        assert_eq!(table.get_contact(id).unwrap().failed_rpcs(), 0);
    }

    #[test]
    fn negative_remove_unknown_with_cache_policy() {
        let mut table = cache_table(test::dummy_node_id());
        let id = test::node_id_with_prefix(0x42, 1);

        assert_eq!(
            table.remove_contact(id).unwrap_err(),
            RoutingError::NotFound(id)
        );
    }

    #[test]
    fn positive_close_nodes_cardinality() {
        let mut table = RoutingTable::new(NodeId::from([1u8; NODE_ID_LEN]));

        let mut ids = Vec::new();
        for prefix in [0x00u8, 0x01, 0x03, 0x07, 0x0f, 0x1f, 0x3f, 0x7f, 0xff] {
            ids.extend(test::dummy_block_node_ids_with_prefix(prefix, 5));
        }
        add_all(&mut table, &ids);

        let total = table.total_contacts();
        assert!(table.buckets().count() > 1);

        for count in [0, 1, 8, 20, total, total + 10] {
            let target: NodeId = rand::random();
            let closest = table.find_close_nodes(target, count, None);

            assert_eq!(closest.len(), count.min(total));

            let unique: HashSet<_> = closest.iter().map(Contact::id).collect();
            assert_eq!(unique.len(), closest.len());
        }
    }

    #[test]
    fn positive_close_nodes_excludes_requester() {
        let mut table = RoutingTable::new(test::dummy_node_id());
        let ids = test::dummy_block_node_ids_with_prefix(0x42, 5);
        add_all(&mut table, &ids);

        let closest = table.find_close_nodes(ids[0], 8, Some(ids[0]));

        assert_eq!(closest.len(), 4);
        assert!(closest.iter().all(|contact| contact.id() != ids[0]));
    }

    #[test]
    fn positive_close_nodes_start_with_target_bucket() {
        let mut table = RoutingTable::new(test::node_id_with_prefix(0x00, 7));
        let far_ids = fill_far_bucket(&mut table);

        let closest = table.find_close_nodes(far_ids[0], 3, None);

        assert_eq!(closest.len(), 3);
        assert!(closest.iter().all(|contact| far_ids.contains(&contact.id())));
    }

    #[test]
    fn positive_stale_ranges_fresh_table() {
        let table = RoutingTable::new(test::dummy_node_id());

        assert!(table.get_stale_ranges(0, false).is_empty());

        let forced = table.get_stale_ranges(0, true);
        assert_eq!(forced.len(), 1);
    }

    #[test]
    fn positive_stale_ranges_one_per_bucket() {
        let mut table = RoutingTable::new(test::node_id_with_prefix(0x00, 7));
        fill_far_bucket(&mut table);

        let forced = table.get_stale_ranges(0, true);
        assert_eq!(forced.len(), table.buckets().count());
        for (id, bucket) in forced.iter().zip(table.buckets()) {
            assert!(bucket.in_range(*id));
        }

        assert_eq!(
            table.get_stale_ranges(1, true).len(),
            table.buckets().count() - 1
        );
        assert!(table.get_stale_ranges(table.buckets().count(), true).is_empty());
    }

    #[test]
    fn positive_stale_ranges_after_idle_period() {
        let mut table = RoutingTable::new(test::node_id_with_prefix(0x00, 7));
        fill_far_bucket(&mut table);

        let idle = table.config().refresh_timeout + Duration::from_secs(1);
        let last = table.buckets().count() - 1;
        table.bucket_mut(last).set_last_accessed(Instant::now() - idle);

        let stale = table.get_stale_ranges(0, false);
        assert_eq!(stale.len(), 1);
        assert!(table.buckets[last].in_range(stale[0]));

        // Touching the bucket makes it fresh again.
        table.touch(stale[0]);
        assert!(table.get_stale_ranges(0, false).is_empty());
    }

    #[test]
    fn positive_random_operations_keep_invariants() {
        let table_id: NodeId = rand::random();
        let mut table = cache_table(table_id);

        let ids: Vec<NodeId> = (0..500).map(|_| rand::random()).collect();
        for (i, id) in ids.iter().enumerate() {
            table.add_contact(Contact::new(*id, test::dummy_socket_addr_v4()));

            if i % 7 == 0 {
                let _ = table.remove_contact(ids[i / 2]);
            }
        }

        assert_coverage(&table);
        assert_capacity_and_placement(&table);
        assert!(table.get_contact(table_id).is_err());

        let mut seen = HashSet::new();
        for contact in table.contacts() {
            assert!(seen.insert(contact.id()));
        }
    }

    #[test]
    fn positive_display() {
        let table = RoutingTable::with_config(NodeId::MAX, 2, RoutingConfig::default());

        assert_eq!(
            table.to_string(),
            format!("<RTable(2) 1 buckets for {}>", "ff".repeat(NODE_ID_LEN))
        );
    }
}

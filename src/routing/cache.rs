use std::collections::VecDeque;

use crate::id::NodeId;
use crate::routing::bucket::Bucket;
use crate::routing::contact::Contact;

/// Standby contacts for buckets that are full and can no longer be split.
///
/// Entries are indexed in parallel with the routing table's buckets and each entry is ordered
/// least recently seen first, most recently seen last. Every entry holds at most `capacity`
/// contacts.
pub(crate) struct ReplacementCache {
    capacity: usize,
    entries: Vec<VecDeque<Contact>>,
}

impl ReplacementCache {
    pub(crate) fn new(capacity: usize) -> ReplacementCache {
        ReplacementCache {
            capacity,
            entries: vec![VecDeque::new()],
        }
    }

    /// Insert a candidate for the given bucket, or move it to the most recently seen end if it
    /// is already cached.
    ///
    /// Returns the oldest entry if it had to make room for the candidate.
    pub(crate) fn insert(&mut self, bucket_index: usize, contact: Contact) -> Option<Contact> {
        let entry = &mut self.entries[bucket_index];

        let evicted = if let Some(index) = entry.iter().position(|c| *c == contact) {
            entry.remove(index);
            None
        } else if entry.len() >= self.capacity {
            entry.pop_front()
        } else {
            None
        };

        entry.push_back(contact);

        evicted
    }

    /// Take the most recently seen standby contact for the given bucket.
    pub(crate) fn pop_most_recent(&mut self, bucket_index: usize) -> Option<Contact> {
        self.entries[bucket_index].pop_back()
    }

    /// Drop a contact from the given bucket's entry, e.g. because it was admitted directly.
    pub(crate) fn remove(&mut self, bucket_index: usize, id: NodeId) -> Option<Contact> {
        let entry = &mut self.entries[bucket_index];
        let index = entry.iter().position(|c| c.id() == id)?;
        entry.remove(index)
    }

    /// Mirror a bucket split: a new entry is created right after `bucket_index` and receives
    /// every cached contact that falls into the `upper` bucket.
    pub(crate) fn split(&mut self, bucket_index: usize, upper: &Bucket) {
        let (moved, kept): (VecDeque<_>, VecDeque<_>) = self.entries[bucket_index]
            .drain(..)
            .partition(|contact| upper.in_range(contact.id()));

        self.entries[bucket_index] = kept;
        self.entries.insert(bucket_index + 1, moved);
    }

    /// Standby contacts of the given bucket, least recently seen first.
    #[cfg(test)]
    pub(crate) fn entry(&self, bucket_index: usize) -> impl Iterator<Item = &Contact> {
        self.entries
            .get(bucket_index)
            .into_iter()
            .flat_map(|entry| entry.iter())
    }

    /// Total number of standby contacts over all buckets.
    pub fn len(&self) -> usize {
        self.entries.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(VecDeque::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.entries.iter().flat_map(|entry| entry.iter())
    }
}

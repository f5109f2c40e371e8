use std::ops::Range;
use std::slice::Iter;

use primitive_types::U256;
use rand::Rng;

use crate::error::{BucketFull, RoutingError, RoutingResult};
use crate::id::NodeId;
use crate::routing::contact::Contact;
use crate::time::Instant;

/// Default maximum number of contacts that should reside in any bucket.
pub const MAX_BUCKET_SIZE: usize = 8;

/// Bucket containing the contacts whose ids fall in `[range_min, range_max)`.
///
/// Contacts are kept least recently seen first, most recently seen last.
pub struct Bucket {
    range_min: U256,
    range_max: U256,
    capacity: usize,
    contacts: Vec<Contact>,
    last_accessed: Instant,
}

impl Bucket {
    /// Create an empty bucket over the given range.
    pub(crate) fn new(range_min: U256, range_max: U256, capacity: usize) -> Bucket {
        debug_assert!(range_min < range_max);

        Bucket {
            range_min,
            range_max,
            capacity,
            contacts: Vec::with_capacity(capacity),
            last_accessed: Instant::now(),
        }
    }

    /// Range of ids (as integers) covered by this bucket.
    pub fn range(&self) -> Range<U256> {
        self.range_min..self.range_max
    }

    /// Is the id inside this bucket's range?
    pub fn in_range(&self, id: NodeId) -> bool {
        let value = id.to_u256();
        self.range_min <= value && value < self.range_max
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.contacts.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterator over the contacts, least recently seen first.
    pub fn iter(&self) -> Iter<Contact> {
        self.contacts.iter()
    }

    /// Least recently seen contact.
    pub fn head(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    /// Add a new contact or, if it is already present, move it to the most recently seen end.
    ///
    /// Returns true if the contact was already in the bucket.
    pub(crate) fn add_or_update(&mut self, contact: Contact) -> Result<bool, BucketFull> {
        debug_assert!(self.in_range(contact.id()));

        if let Some(index) = self.position(contact.id()) {
            let mut existing = self.contacts.remove(index);
            existing.update(contact);
            self.contacts.push(existing);
            self.touch();

            return Ok(true);
        }

        if self.is_full() {
            return Err(BucketFull);
        }

        let mut contact = contact;
        contact.refresh();
        self.contacts.push(contact);
        self.touch();

        Ok(false)
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> RoutingResult<Contact> {
        let index = self.position(id).ok_or(RoutingError::NotFound(id))?;
        Ok(self.contacts.remove(index))
    }

    pub fn get(&self, id: NodeId) -> RoutingResult<&Contact> {
        self.contacts
            .iter()
            .find(|contact| contact.id() == id)
            .ok_or(RoutingError::NotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> RoutingResult<&mut Contact> {
        self.contacts
            .iter_mut()
            .find(|contact| contact.id() == id)
            .ok_or(RoutingError::NotFound(id))
    }

    /// Up to `count` contacts, most recently seen first, skipping `exclude`.
    pub fn get_closest(
        &self,
        count: usize,
        exclude: Option<NodeId>,
    ) -> impl Iterator<Item = &Contact> {
        self.contacts
            .iter()
            .rev()
            .filter(move |contact| Some(contact.id()) != exclude)
            .take(count)
    }

    pub(crate) fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }

    pub(crate) fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    #[cfg(test)]
    pub(crate) fn set_last_accessed(&mut self, instant: Instant) {
        self.last_accessed = instant;
    }

    /// Uniformly random id within this bucket's range.
    pub fn random_id_in_range<R: Rng + ?Sized>(&self, rng: &mut R) -> NodeId {
        let width = self.range_max - self.range_min;
        let mask = (U256::one() << width.bits()) - U256::one();

        // Rejection sampling over the smallest power of two covering the width, so at most
        // half of the draws are discarded on average.
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);

            let offset = U256::from_big_endian(&bytes) & mask;
            if offset < width {
                return NodeId::from_u256(self.range_min + offset);
            }
        }
    }

    /// Shrink this bucket to the lower half of its range and return a new bucket covering the
    /// upper half, holding every contact that falls there.
    pub(crate) fn split(&mut self) -> Bucket {
        let mid = self.range_max - (self.range_max - self.range_min) / 2;

        let mut upper = Bucket::new(mid, self.range_max, self.capacity);
        upper.last_accessed = self.last_accessed;
        self.range_max = mid;

        let (lower, moved): (Vec<_>, Vec<_>) = self
            .contacts
            .drain(..)
            .partition(|contact| contact.id().to_u256() < mid);

        self.contacts = lower;
        upper.contacts = moved;

        upper
    }

    fn position(&self, id: NodeId) -> Option<usize> {
        self.contacts.iter().position(|contact| contact.id() == id)
    }
}

// ----------------------------------------------------------------------------//

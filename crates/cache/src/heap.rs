//! Expiry-ordered binary min-heap over cache entries.
//!
//! The heap stores keys in an array-backed complete binary tree ordered by
//! each entry's expiry instant. Entries themselves live in the cache index;
//! every entry records its own position in the heap array so re-prioritising
//! an existing key stays O(log n). Both structures are mutated together
//! under the cache's write lock, which is why every operation here takes the
//! index as an explicit argument.

use std::collections::HashMap;
use std::time::Instant;

/// Sentinel slot value for an entry that is not currently in the heap.
pub(crate) const NOT_IN_HEAP: usize = usize::MAX;

const OUT_OF_SYNC: &str = "cache index and expiry heap out of sync";

/// A single cached value with its absolute expiry.
///
/// Owned exclusively by the cache index; the heap refers to it by key.
#[derive(Debug)]
pub(crate) struct Entry<V> {
    pub(crate) value: V,
    pub(crate) expires_at: Instant,
    pub(crate) heap_slot: usize,
}

/// Array-backed binary min-heap of index keys, ordered by expiry.
#[derive(Debug, Default)]
pub(crate) struct ExpiryHeap {
    slots: Vec<String>,
}

impl ExpiryHeap {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Insert a key that was just added to the index. O(log n).
    pub(crate) fn push<V>(&mut self, index: &mut HashMap<String, Entry<V>>, key: String) {
        let slot = self.slots.len();
        entry_mut(index, &key).heap_slot = slot;
        self.slots.push(key);
        self.sift_up(index, slot);
    }

    /// Restore heap order after the entry's expiry changed. O(log n).
    ///
    /// Handles movement in both directions, so a per-call TTL that shortens
    /// an entry's remaining life is re-ordered just as well as a refresh
    /// that extends it.
    pub(crate) fn fix<V>(&mut self, index: &mut HashMap<String, Entry<V>>, key: &str) {
        let slot = entry(index, key).heap_slot;
        assert!(slot < self.slots.len(), "{OUT_OF_SYNC}");
        let slot = self.sift_up(index, slot);
        self.sift_down(index, slot);
    }

    /// Remove and return the key with the earliest expiry.
    ///
    /// The sweep path removes from the tail instead; root removal is kept
    /// for standard heap completeness.
    #[allow(dead_code)]
    pub(crate) fn pop<V>(&mut self, index: &mut HashMap<String, Entry<V>>) -> Option<String> {
        if self.slots.is_empty() {
            return None;
        }
        let last = self.slots.len() - 1;
        self.swap(index, 0, last);
        let key = self.slots.pop()?;
        entry_mut(index, &key).heap_slot = NOT_IN_HEAP;
        if !self.slots.is_empty() {
            self.sift_down(index, 0);
        }
        Some(key)
    }

    /// Remove a bounded batch of expired entries from the array tail.
    ///
    /// Walks backward from the highest index, collecting the contiguous run
    /// of entries whose expiry has passed, stopping at the first entry that
    /// is still live or once `limit` keys are collected. Trailing slots of a
    /// complete tree are always leaves, so removing the run needs no
    /// re-heapification and the whole batch costs O(batch).
    ///
    /// This is not a full "remove everything expired" operation: an expired
    /// leaf sitting behind a still-live one in array order is skipped this
    /// pass. It stays invisible to readers through the logical-expiry check
    /// and is collected by a later sweep once it drifts toward the tail.
    ///
    /// Collected keys are returned through the reusable `out` buffer; the
    /// caller removes them from the index.
    pub(crate) fn reclaim_expired<V>(
        &mut self,
        index: &mut HashMap<String, Entry<V>>,
        now: Instant,
        limit: usize,
        out: &mut Vec<String>,
    ) -> usize {
        out.clear();
        while out.len() < limit {
            let tail_expired =
                self.slots.last().is_some_and(|key| entry(index, key).expires_at <= now);
            if !tail_expired {
                break;
            }
            if let Some(key) = self.slots.pop() {
                entry_mut(index, &key).heap_slot = NOT_IN_HEAP;
                out.push(key);
            }
        }
        out.len()
    }

    /// Move the entry at `slot` toward the root until its parent expires no
    /// later than it does. Returns the final slot.
    fn sift_up<V>(&mut self, index: &mut HashMap<String, Entry<V>>, mut slot: usize) -> usize {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.expires_at(index, parent) <= self.expires_at(index, slot) {
                break;
            }
            self.swap(index, slot, parent);
            slot = parent;
        }
        slot
    }

    /// Move the entry at `slot` toward the leaves until both children expire
    /// no earlier than it does.
    fn sift_down<V>(&mut self, index: &mut HashMap<String, Entry<V>>, mut slot: usize) {
        loop {
            let left = 2 * slot + 1;
            if left >= self.slots.len() {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < self.slots.len()
                && self.expires_at(index, right) < self.expires_at(index, left)
            {
                child = right;
            }
            if self.expires_at(index, slot) <= self.expires_at(index, child) {
                break;
            }
            self.swap(index, slot, child);
            slot = child;
        }
    }

    fn expires_at<V>(&self, index: &HashMap<String, Entry<V>>, slot: usize) -> Instant {
        entry(index, &self.slots[slot]).expires_at
    }

    /// Swap two slots and write the new positions back to their entries.
    fn swap<V>(&mut self, index: &mut HashMap<String, Entry<V>>, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.slots.swap(a, b);
        entry_mut(index, &self.slots[a]).heap_slot = a;
        entry_mut(index, &self.slots[b]).heap_slot = b;
    }
}

fn entry<'a, V>(index: &'a HashMap<String, Entry<V>>, key: &str) -> &'a Entry<V> {
    index.get(key).expect(OUT_OF_SYNC)
}

fn entry_mut<'a, V>(index: &'a mut HashMap<String, Entry<V>>, key: &str) -> &'a mut Entry<V> {
    index.get_mut(key).expect(OUT_OF_SYNC)
}

// Copyright 2024 The Guard Contributors
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! A single-threaded callout (timer) queue.
//!
//! Every engine in this workspace schedules its future actions (ban expiry, decay GC, aging GC,
//! secret rotation, token cache expiry) as a callout here instead of spawning a task or thread.
//! At most one callout is ever live per `Key` (a `BanRecord` has exactly one pending timer, an
//! `AgingTable` has exactly one pending GC tick); scheduling a new callout for a key that already
//! has one logically replaces it. Rather than searching the heap for the old entry, the old entry
//! is left in place and recognised as stale (its sequence number no longer matches the key's
//! current sequence) when it is eventually popped, and is skipped. This keeps `schedule` and
//! `cancel` both O(log n) at the cost of occasionally popping and discarding a dead entry — the
//! standard lazy-deletion trade-off for a single-writer timer wheel.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    hash::Hash,
    time::Instant,
};

/// A reference to a scheduled callout. Holding on to a stale handle is harmless: `cancel` on an
/// already-fired or already-superseded handle is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalloutHandle<K> {
    key: K,
    seq: u64,
}

struct Entry<K, P> {
    deadline: Instant,
    seq: u64,
    key: K,
    payload: P,
}

impl<K, P> PartialEq for Entry<K, P> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl<K, P> Eq for Entry<K, P> {}

impl<K, P> PartialOrd for Entry<K, P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, P> Ord for Entry<K, P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline sorts first.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A min-heap of pending callouts keyed by an arbitrary `K` (commonly an [`Address`] or a version
/// string), each carrying a caller-defined payload `P` describing what to do when it fires.
pub struct CalloutQueue<K, P> {
    heap: BinaryHeap<Entry<K, P>>,
    live: HashMap<K, u64>,
    next_seq: u64,
}

impl<K, P> Default for CalloutQueue<K, P>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> CalloutQueue<K, P>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        CalloutQueue {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Schedules `payload` to fire at `at`, replacing any callout previously scheduled for `key`.
    pub fn schedule(&mut self, key: K, payload: P, at: Instant) -> CalloutHandle<K> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.live.insert(key.clone(), seq);
        self.heap.push(Entry {
            deadline: at,
            seq,
            key: key.clone(),
            payload,
        });
        CalloutHandle { key, seq }
    }

    /// Cancels a previously scheduled callout. Guaranteed never to fire, even if it is already
    /// sitting in the heap waiting to be popped.
    pub fn cancel(&mut self, handle: &CalloutHandle<K>) {
        if self.live.get(&handle.key) == Some(&handle.seq) {
            self.live.remove(&handle.key);
        }
    }

    pub fn is_scheduled(&self, key: &K) -> bool {
        self.live.contains_key(key)
    }

    /// Pops and returns every callout whose deadline has passed, in deadline order, discarding
    /// any stale (cancelled or superseded) entries along the way.
    pub fn drain_due(&mut self, now: Instant) -> Vec<(K, P)> {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let entry = self.heap.pop().expect("peeked Some above");
            if self.live.get(&entry.key) == Some(&entry.seq) {
                self.live.remove(&entry.key);
                due.push((entry.key, entry.payload));
            }
            // else: stale entry, already superseded or cancelled — drop it silently.
        }
        due
    }

    /// The deadline of the earliest still-live callout, if any. Useful for an embedding event
    /// loop that wants to sleep until the next callout is due rather than polling.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap
            .iter()
            .filter(|e| self.live.get(&e.key) == Some(&e.seq))
            .map(|e| e.deadline)
            .min()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_in_deadline_order() {
        let mut q: CalloutQueue<&'static str, u32> = CalloutQueue::new();
        let t0 = Instant::now();
        q.schedule("b", 2, t0 + Duration::from_secs(2));
        q.schedule("a", 1, t0 + Duration::from_secs(1));

        assert!(q.drain_due(t0).is_empty());
        let due = q.drain_due(t0 + Duration::from_secs(1));
        assert_eq!(due, vec![("a", 1)]);
        let due = q.drain_due(t0 + Duration::from_secs(2));
        assert_eq!(due, vec![("b", 2)]);
    }

    #[test]
    fn rescheduling_drops_the_stale_entry() {
        let mut q: CalloutQueue<&'static str, u32> = CalloutQueue::new();
        let t0 = Instant::now();
        q.schedule("a", 1, t0 + Duration::from_secs(1));
        // Replace before it fires.
        q.schedule("a", 2, t0 + Duration::from_secs(5));

        // The first (stale) deadline produces nothing live.
        assert!(q.drain_due(t0 + Duration::from_secs(1)).is_empty());
        let due = q.drain_due(t0 + Duration::from_secs(5));
        assert_eq!(due, vec![("a", 2)]);
    }

    #[test]
    fn cancel_suppresses_firing() {
        let mut q: CalloutQueue<&'static str, u32> = CalloutQueue::new();
        let t0 = Instant::now();
        let handle = q.schedule("a", 1, t0 + Duration::from_secs(1));
        q.cancel(&handle);
        assert!(q.drain_due(t0 + Duration::from_secs(10)).is_empty());
    }
}

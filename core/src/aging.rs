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

//! A generic map whose entries expire a fixed TTL after their last insert or touch. The ban
//! engine, the token mint's per-version cache, and any other throttle in this crate that needs
//! "forget this after N seconds of silence" is built on top of this.

use std::{
    collections::{HashMap, VecDeque},
    hash::Hash,
    time::{Duration, Instant},
};

struct Slot<V> {
    value: V,
    last_insert: Instant,
    seq: u64,
}

/// An order-queue entry. Kept separate from `index` so that GC can walk oldest-to-newest without
/// touching the hash map except to check liveness; stale entries (superseded by a later `insert`
/// of the same key) are recognised by their `seq` no longer matching the live slot and are
/// skipped for free during the walk.
struct OrderEntry<K> {
    key: K,
    seq: u64,
}

/// A map keyed by `K` whose entries are dropped once `now - last_insert > ttl`.
///
/// `AgingTable` itself does not own a clock or a background task: the embedding engine calls
/// [`AgingTable::gc`] from its own callout loop with the current time.
pub struct AgingTable<K, V> {
    ttl: Duration,
    index: HashMap<K, Slot<V>>,
    order: VecDeque<OrderEntry<K>>,
    next_seq: u64,
}

impl<K, V> AgingTable<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(ttl: Duration) -> Self {
        AgingTable {
            ttl,
            index: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Inserts `value` for `key`, replacing any existing value, and moves the entry to the tail
    /// (freshest) end of the aging order.
    pub fn insert(&mut self, key: K, value: V, now: Instant) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.index.insert(
            key.clone(),
            Slot {
                value,
                last_insert: now,
                seq,
            },
        );
        self.order.push_back(OrderEntry { key, seq });
    }

    /// Looks up `key` without refreshing its age.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|slot| &slot.value)
    }

    /// Looks up `key`, refreshing its age and moving it to the tail, as if it had just been
    /// inserted again with the same value.
    pub fn touch_get(&mut self, key: &K, now: Instant) -> Option<&V>
    where
        V: Clone,
    {
        if let Some(slot) = self.index.get(key) {
            let seq = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1);
            let value = slot.value.clone();
            self.index.insert(
                key.clone(),
                Slot {
                    value,
                    last_insert: now,
                    seq,
                },
            );
            self.order.push_back(OrderEntry {
                key: key.clone(),
                seq,
            });
            self.index.get(key).map(|slot| &slot.value)
        } else {
            None
        }
    }

    /// How long ago `key` was last inserted or touched.
    pub fn age(&self, key: &K, now: Instant) -> Option<Duration> {
        self.index.get(key).map(|slot| now.saturating_duration_since(slot.last_insert))
    }

    /// Removes `key` unconditionally. Returns whether anything was removed.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.index.remove(key).map(|slot| slot.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Walks from the oldest (head) entry, dropping every one whose age exceeds the TTL, and
    /// stops at the first survivor. Because the order queue is tail-insertion-ordered, the head
    /// is always the oldest live entry, so this is O(expired) rather than O(len).
    pub fn gc(&mut self, now: Instant) {
        while let Some(front) = self.order.front() {
            let key = &front.key;
            let seq = front.seq;
            match self.index.get(key) {
                None => {
                    self.order.pop_front();
                }
                Some(slot) if slot.seq != seq => {
                    // Superseded by a later insert/touch of the same key; this order entry is
                    // dead weight.
                    self.order.pop_front();
                }
                Some(slot) => {
                    if now.saturating_duration_since(slot.last_insert) > self.ttl {
                        self.order.pop_front();
                        self.index.remove(key);
                    } else {
                        break;
                    }
                }
            }
        }
    }

    /// Drops every entry, regardless of age.
    pub fn clear(&mut self) {
        self.index.clear();
        self.order.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.index.iter().map(|(k, slot)| (k, &slot.value))
    }
}

/// A thread-safe wrapper around [`AgingTable`] for the rare case where a single table is shared
/// across OS threads (e.g. the socket-accept thread and a timer thread in an embedding
/// application that does not serialize them itself). Every public operation, including GC,
/// acquires a re-entrant lock, so a drop callback that calls back into the same table (through
/// the same owning thread) does not deadlock.
pub struct ThreadSafeAgingTable<K, V> {
    inner: parking_lot::ReentrantMutex<std::cell::RefCell<AgingTable<K, V>>>,
}

impl<K, V> ThreadSafeAgingTable<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(ttl: Duration) -> Self {
        ThreadSafeAgingTable {
            inner: parking_lot::ReentrantMutex::new(std::cell::RefCell::new(AgingTable::new(ttl))),
        }
    }

    pub fn insert(&self, key: K, value: V, now: Instant) {
        self.inner.lock().borrow_mut().insert(key, value, now);
    }

    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.lock().borrow().get(key).cloned()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().borrow_mut().remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().borrow().is_empty()
    }

    pub fn gc(&self, now: Instant) {
        self.inner.lock().borrow_mut().gc(now);
    }
}

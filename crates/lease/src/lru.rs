// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Recency bookkeeping for tracked read leases.
//!
//! Entries are keyed by a monotonically increasing tick. Promoting an entry
//! re-inserts it under a fresh tick, so the smallest tick is always the least
//! recently used entry and two entries can never share a position.

use std::collections::BTreeMap;
use std::fmt;

use ahash::HashMap;

/// Process-unique identifier of a read lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseId(u64);

impl LeaseId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

struct Entry<T> {
    tick: u64,
    size: u64,
    value: T,
}

/// Guarded by the leaser lock. All methods are plain in-memory bookkeeping.
pub(crate) struct LruState<T> {
    used_bytes: u64,
    next_tick: u64,
    order: BTreeMap<u64, LeaseId>,
    entries: HashMap<LeaseId, Entry<T>>,
}

impl<T> LruState<T> {
    pub(crate) fn new() -> Self {
        Self {
            used_bytes: 0,
            next_tick: 0,
            order: BTreeMap::new(),
            entries: HashMap::default(),
        }
    }

    pub(crate) fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: LeaseId) -> bool {
        self.entries.contains_key(&id)
    }

    fn tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Starts tracking `id` as the most recently used entry and charges `size`.
    ///
    /// Panics if `id` is already tracked.
    pub(crate) fn insert(&mut self, id: LeaseId, size: u64, value: T) {
        let tick = self.tick();
        let previous = self.entries.insert(id, Entry { tick, size, value });
        assert!(previous.is_none(), "lease {id} is already tracked");
        self.order.insert(tick, id);
        self.used_bytes += size;
    }

    /// Moves `id` to the most recently used position. Returns false if `id`
    /// is not tracked.
    pub(crate) fn promote(&mut self, id: LeaseId) -> bool {
        let tick = self.tick();
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, id);
        true
    }

    /// Stops tracking `id` and credits its size back.
    pub(crate) fn remove(&mut self, id: LeaseId) -> Option<T> {
        let entry = self.entries.remove(&id)?;
        self.order.remove(&entry.tick);
        self.used_bytes -= entry.size;
        Some(entry.value)
    }

    pub(crate) fn least_recent(&self) -> Option<LeaseId> {
        self.order.first_key_value().map(|(_, id)| *id)
    }

    pub(crate) fn pop_least_recent(&mut self) -> Option<(LeaseId, T)> {
        let (_, id) = self.order.pop_first()?;
        let entry = self
            .entries
            .remove(&id)
            .expect("every ordered lease has an entry");
        self.used_bytes -= entry.size;
        Some((id, entry.value))
    }

    /// Least recently used first.
    #[cfg(test)]
    pub(crate) fn ids(&self) -> impl Iterator<Item = LeaseId> + '_ {
        self.order.values().copied()
    }

    /// Recomputes `used_bytes` and cross-checks both indexes.
    pub(crate) fn check_invariants(&self) {
        assert_eq!(
            self.order.len(),
            self.entries.len(),
            "order and entries disagree on the number of tracked leases"
        );
        for (tick, id) in &self.order {
            let entry = self
                .entries
                .get(id)
                .unwrap_or_else(|| panic!("lease {id} is ordered but has no entry"));
            assert_eq!(entry.tick, *tick, "lease {id} has a stale tick");
        }
        let sum: u64 = self.entries.values().map(|e| e.size).sum();
        assert_eq!(
            sum, self.used_bytes,
            "used bytes do not match the sum of tracked lease sizes"
        );
    }
}

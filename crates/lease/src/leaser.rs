// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The leaser owns the byte budget and decides which read leases to revoke
//! when it is exceeded.
//!
//! # Locking
//!
//! The LRU lock guards `used_bytes` and the set of tracked leases. It is only
//! held for in-memory bookkeeping. Each lease has its own lock that is held
//! for the duration of file I/O. The LRU lock is never acquired while a lease
//! lock is held (see [`crate::lock_order`]), so readers promote their lease
//! before locking it, and revocation untracks a lease under the LRU lock but
//! releases its file only after dropping it.
//!
//! Untracking a lease is what grants the right to release it. Whoever removes a
//! lease from the LRU (eviction, voluntary revocation, or an upgrade) is the
//! only caller of [`LeaseSlot::release`] for it, which makes the transition to
//! revoked happen exactly once.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::error::LeaseError;
use crate::file::{DiskFiles, TempFile, TempFileFactory};
use crate::lock_order::{LockLevel, LockOrderGuard};
use crate::lru::{LeaseId, LruState};
use crate::metric_definitions::{
    LEASE_DOWNGRADES, LEASE_EVICTIONS, LEASE_OVER_BUDGET, LEASE_TRACKED, LEASE_UPGRADES,
    LEASE_USED_BYTES,
};
use crate::options::LeaserOptions;
use crate::read_lease::{LeaseSlot, ReadLease};
use crate::write_lease::WriteLease;

/// Hands out leases on scratch files and keeps the space used by read leases
/// within a configured budget.
///
/// Cheaply cloneable; clones share the same budget.
#[derive(Clone)]
pub struct FileLeaser {
    inner: Arc<LeaserInner>,
}

struct LeaserInner {
    byte_limit: u64,
    file_limit: Option<NonZeroUsize>,
    files: Box<dyn TempFileFactory>,
    next_id: AtomicU64,
    lru: Mutex<LruState<Arc<LeaseSlot>>>,
}

struct LruGuard<'a> {
    // drops before the order guard
    state: MutexGuard<'a, LruState<Arc<LeaseSlot>>>,
    _order: LockOrderGuard,
}

/// Point-in-time view of a leaser's accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaserStats {
    pub used_bytes: u64,
    pub byte_limit: u64,
    pub tracked_leases: usize,
    pub file_limit: Option<NonZeroUsize>,
}

impl FileLeaser {
    /// Creates a leaser backed by anonymous files on local disk.
    pub fn new(options: &LeaserOptions) -> Self {
        let files = match &options.temp_dir {
            Some(dir) => DiskFiles::in_dir(dir),
            None => DiskFiles::new(),
        };
        Self::with_factory(options, files)
    }

    pub fn with_factory(options: &LeaserOptions, files: impl TempFileFactory) -> Self {
        Self {
            inner: Arc::new(LeaserInner {
                byte_limit: options.byte_limit(),
                file_limit: options.max_files,
                files: Box::new(files),
                next_id: AtomicU64::new(0),
                lru: Mutex::new(LruState::new()),
            }),
        }
    }

    /// Creates an empty scratch file behind a write lease.
    ///
    /// The file does not count against the budget until it is downgraded.
    pub fn new_file(&self) -> Result<WriteLease, LeaseError> {
        let file = self.inner.files.create()?;
        trace!("Created new scratch file");
        Ok(WriteLease::new(self.clone(), file, 0))
    }

    /// Revokes every tracked read lease. Write leases are unaffected.
    pub fn revoke_all(&self) {
        let victims: Vec<_> = {
            let mut lru = self.lock_lru();
            let victims: Vec<_> = std::iter::from_fn(|| lru.state.pop_least_recent()).collect();
            self.publish(&lru);
            victims
        };
        if !victims.is_empty() {
            debug!(count = victims.len(), "Revoking all read leases");
        }
        for (_, slot) in victims {
            drop(slot.release());
        }
    }

    pub fn stats(&self) -> LeaserStats {
        let lru = self.lock_lru();
        LeaserStats {
            used_bytes: lru.state.used_bytes(),
            byte_limit: self.inner.byte_limit,
            tracked_leases: lru.state.len(),
            file_limit: self.inner.file_limit,
        }
    }

    /// Panics if the leaser's accounting is inconsistent.
    ///
    /// Only meaningful while no other thread is using the leaser.
    pub fn check_invariants(&self) {
        let lru = self.lock_lru();
        lru.state.check_invariants();
        assert!(
            lru.state.used_bytes() <= self.inner.byte_limit || lru.state.len() <= 1,
            "{} bytes in {} leases exceed the limit of {} bytes",
            lru.state.used_bytes(),
            lru.state.len(),
            self.inner.byte_limit
        );
        if let Some(limit) = self.inner.file_limit {
            assert!(
                lru.state.len() <= limit.get(),
                "{} tracked leases exceed the limit of {limit}",
                lru.state.len()
            );
        }
    }

    fn lock_lru(&self) -> LruGuard<'_> {
        let order = LockOrderGuard::acquire(LockLevel::Leaser);
        LruGuard {
            state: self.inner.lru.lock(),
            _order: order,
        }
    }

    fn publish(&self, lru: &LruGuard<'_>) {
        gauge!(LEASE_USED_BYTES).set(lru.state.used_bytes() as f64);
        gauge!(LEASE_TRACKED).set(lru.state.len() as f64);
    }

    fn next_id(&self) -> LeaseId {
        LeaseId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn over_budget(&self, lru: &LruState<Arc<LeaseSlot>>) -> bool {
        lru.used_bytes() > self.inner.byte_limit
            || self
                .inner
                .file_limit
                .is_some_and(|limit| lru.len() > limit.get())
    }

    /// Untracks least recently used leases until the budget is met, never
    /// touching `keep`. Returns the untracked leases; the caller releases
    /// them once the LRU lock is dropped.
    fn select_victims(
        &self,
        lru: &mut LruState<Arc<LeaseSlot>>,
        keep: LeaseId,
    ) -> Vec<Arc<LeaseSlot>> {
        let mut victims = Vec::new();
        while self.over_budget(lru) {
            match lru.least_recent() {
                Some(id) if id != keep => {
                    let (_, slot) = lru
                        .pop_least_recent()
                        .expect("least recent lease is tracked");
                    victims.push(slot);
                }
                _ => {
                    counter!(LEASE_OVER_BUDGET).increment(1);
                    debug!(
                        used_bytes = lru.used_bytes(),
                        byte_limit = self.inner.byte_limit,
                        tracked = lru.len(),
                        "No more read leases to evict, staying over budget"
                    );
                    break;
                }
            }
        }
        victims
    }

    pub(crate) fn promote_to_most_recent(&self, slot: &LeaseSlot) {
        let mut lru = self.lock_lru();
        if !lru.state.promote(slot.id()) {
            // concurrently revoked or upgraded, the subsequent I/O will notice
            trace!(lease_id = %slot.id(), "Not promoting untracked lease");
        }
    }

    pub(crate) fn upgrade(&self, slot: &LeaseSlot) -> Result<WriteLease, LeaseError> {
        {
            let mut lru = self.lock_lru();
            if lru.state.remove(slot.id()).is_none() {
                return Err(LeaseError::Revoked);
            }
            self.publish(&lru);
        }

        let file = slot.release();
        counter!(LEASE_UPGRADES).increment(1);
        debug!(lease_id = %slot.id(), size = slot.size(), "Upgraded read lease");
        Ok(WriteLease::new(self.clone(), file, slot.size()))
    }

    pub(crate) fn downgrade(&self, file: Box<dyn TempFile>, size: u64) -> ReadLease {
        let slot = Arc::new(LeaseSlot::new(self.next_id(), size, file));

        let victims = {
            let mut lru = self.lock_lru();
            lru.state.insert(slot.id(), size, Arc::clone(&slot));
            let victims = self.select_victims(&mut lru.state, slot.id());
            self.publish(&lru);
            debug!(
                lease_id = %slot.id(),
                size,
                used_bytes = lru.state.used_bytes(),
                "Downgraded write lease"
            );
            victims
        };
        counter!(LEASE_DOWNGRADES).increment(1);

        for victim in victims {
            debug!(lease_id = %victim.id(), size = victim.size(), "Evicting read lease");
            counter!(LEASE_EVICTIONS).increment(1);
            drop(victim.release());
        }

        ReadLease::new(self.clone(), slot)
    }

    pub(crate) fn revoke_voluntarily(&self, slot: &LeaseSlot) {
        {
            let mut lru = self.lock_lru();
            if lru.state.remove(slot.id()).is_none() {
                return;
            }
            self.publish(&lru);
        }

        trace!(lease_id = %slot.id(), size = slot.size(), "Revoking read lease");
        drop(slot.release());
    }
}

impl fmt::Debug for FileLeaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLeaser")
            .field("byte_limit", &self.inner.byte_limit)
            .field("file_limit", &self.inner.file_limit)
            .finish_non_exhaustive()
    }
}

// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::LeaseError;
use crate::file::TempFile;
use crate::leaser::FileLeaser;
use crate::lock_order::{LockLevel, LockOrderGuard};
use crate::lru::LeaseId;
use crate::write_lease::WriteLease;

pub(crate) enum LeaseState {
    Valid(Box<dyn TempFile>),
    Revoked,
}

impl LeaseState {
    fn file(&mut self) -> Result<&mut Box<dyn TempFile>, LeaseError> {
        match self {
            LeaseState::Valid(file) => Ok(file),
            LeaseState::Revoked => Err(LeaseError::Revoked),
        }
    }
}

/// The part of a read lease shared between its handles and the leaser's LRU.
pub(crate) struct LeaseSlot {
    id: LeaseId,
    size: u64,
    state: Mutex<LeaseState>,
}

pub(crate) struct LeaseGuard<'a> {
    // drops before the order guard
    state: MutexGuard<'a, LeaseState>,
    _order: LockOrderGuard,
}

impl LeaseSlot {
    pub(crate) fn new(id: LeaseId, size: u64, file: Box<dyn TempFile>) -> Self {
        Self {
            id,
            size,
            state: Mutex::new(LeaseState::Valid(file)),
        }
    }

    pub(crate) fn id(&self) -> LeaseId {
        self.id
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn lock(&self) -> LeaseGuard<'_> {
        let order = LockOrderGuard::acquire(LockLevel::Lease);
        LeaseGuard {
            state: self.state.lock(),
            _order: order,
        }
    }

    /// Takes the file away from the lease, leaving it revoked.
    ///
    /// Only the thread that removed the lease from the leaser's LRU may call
    /// this. Blocks until in-flight I/O on the lease completes.
    ///
    /// # Panics
    ///
    /// If the lease is already revoked.
    pub(crate) fn release(&self) -> Box<dyn TempFile> {
        let mut guard = self.lock();
        match std::mem::replace(&mut *guard.state, LeaseState::Revoked) {
            LeaseState::Valid(file) => file,
            LeaseState::Revoked => panic!("lease {} already revoked", self.id),
        }
    }
}

/// A read-only view of a scratch file that the leaser may revoke at any time,
/// typically to reclaim space for other leases.
///
/// Cloning is cheap and every clone refers to the same lease: revoking or
/// upgrading through one clone revokes all of them. Once the last clone is
/// dropped the lease is revoked and its bytes are returned to the leaser.
///
/// Reading, seeking, and upgrading a revoked lease fail with
/// [`LeaseError::Revoked`].
#[derive(Clone)]
pub struct ReadLease {
    inner: Arc<ReadLeaseInner>,
}

struct ReadLeaseInner {
    leaser: FileLeaser,
    slot: Arc<LeaseSlot>,
}

impl Drop for ReadLeaseInner {
    fn drop(&mut self) {
        self.leaser.revoke_voluntarily(&self.slot);
    }
}

impl ReadLease {
    pub(crate) fn new(leaser: FileLeaser, slot: Arc<LeaseSlot>) -> Self {
        Self {
            inner: Arc::new(ReadLeaseInner { leaser, slot }),
        }
    }

    pub fn id(&self) -> LeaseId {
        self.inner.slot.id
    }

    /// Reads from the current cursor position and marks the lease as most
    /// recently used.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, LeaseError> {
        // promote before taking the lease lock, the leaser lock must never be
        // acquired while holding it
        self.inner.leaser.promote_to_most_recent(&self.inner.slot);

        let mut guard = self.inner.slot.lock();
        Ok(guard.state.file()?.read(buf)?)
    }

    /// Reads at `offset` without moving the cursor and marks the lease as most
    /// recently used.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, LeaseError> {
        self.inner.leaser.promote_to_most_recent(&self.inner.slot);

        let mut guard = self.inner.slot.lock();
        Ok(guard.state.file()?.read_at(buf, offset)?)
    }

    /// Moves the cursor shared by all clones of this lease. Does not count as
    /// a use of the lease.
    pub fn seek(&self, pos: SeekFrom) -> Result<u64, LeaseError> {
        let mut guard = self.inner.slot.lock();
        Ok(guard.state.file()?.seek(pos)?)
    }

    /// Size of the file. Keeps returning the same value after revocation.
    pub fn size(&self) -> u64 {
        self.inner.slot.size
    }

    /// Whether the lease has been revoked.
    ///
    /// The answer can be stale by the time it is returned unless all access
    /// to the leaser is externally synchronized. Use it for diagnostics and
    /// tests only; handle [`LeaseError::Revoked`] instead.
    pub fn is_revoked(&self) -> bool {
        let guard = self.inner.slot.lock();
        matches!(*guard.state, LeaseState::Revoked)
    }

    /// Converts this lease into a [`WriteLease`] over the same file.
    ///
    /// On success every clone of this lease is revoked and the file no longer
    /// counts against the leaser's budget. The file cursor is kept.
    pub fn upgrade(self) -> Result<WriteLease, LeaseError> {
        self.inner.leaser.upgrade(&self.inner.slot)
    }

    /// Revokes the lease and deletes its file. Does nothing if the lease was
    /// already revoked or upgraded.
    pub fn revoke(&self) {
        self.inner.leaser.revoke_voluntarily(&self.inner.slot);
    }
}

impl fmt::Debug for ReadLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadLease")
            .field("id", &self.inner.slot.id)
            .field("size", &self.inner.slot.size)
            .finish_non_exhaustive()
    }
}

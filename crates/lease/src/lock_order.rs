// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Lock ordering between the leaser and individual leases.
//!
//! There are exactly two lock levels: the leaser's LRU lock and a per-lease
//! lock. A thread may take the lease lock while holding the LRU lock, but it
//! must never take the LRU lock while holding a lease lock. Taking two locks of
//! the same level is also forbidden.
//!
//! Every acquisition goes through [`LockOrderGuard`]. In debug builds it
//! tracks the held level in a thread local and panics on a violation. In
//! release builds it compiles down to nothing.

#[cfg(debug_assertions)]
use std::cell::Cell;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub(crate) enum LockLevel {
    Leaser = 1,
    Lease = 2,
}

impl fmt::Display for LockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockLevel::Leaser => f.write_str("leaser"),
            LockLevel::Lease => f.write_str("lease"),
        }
    }
}

#[cfg(debug_assertions)]
thread_local! {
    // 0 means no lock held
    static HELD_LEVEL: Cell<u8> = const { Cell::new(0) };
}

/// Must be created *before* blocking on the corresponding mutex and dropped
/// *after* the mutex guard.
pub(crate) struct LockOrderGuard {
    #[cfg(debug_assertions)]
    previous: u8,
}

impl LockOrderGuard {
    #[inline]
    pub(crate) fn acquire(level: LockLevel) -> Self {
        #[cfg(debug_assertions)]
        let previous = HELD_LEVEL.with(Cell::get);
        #[cfg(debug_assertions)]
        {
            assert!(
                level as u8 > previous,
                "lock ordering violation: acquiring the {level} lock while holding a lock at level {previous}"
            );
            HELD_LEVEL.with(|held| held.set(level as u8));
        }
        #[cfg(not(debug_assertions))]
        let _ = level;

        Self {
            #[cfg(debug_assertions)]
            previous,
        }
    }
}

impl Drop for LockOrderGuard {
    #[inline]
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        HELD_LEVEL.with(|held| held.set(self.previous));
    }
}

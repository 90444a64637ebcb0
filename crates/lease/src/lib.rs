// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Revocable leases over a bounded pool of scratch files.
//!
//! A [`FileLeaser`] hands out two kinds of leases:
//!
//! - [`ReadLease`]: shared, read-only access to a file. Read leases count
//!   against the leaser's byte budget and are revoked, least recently used
//!   first, when the budget is exceeded.
//! - [`WriteLease`]: exclusive read/write access. Write leases are never
//!   revoked and do not count against the budget while they are open.
//!
//! Fresh files start out as write leases ([`FileLeaser::new_file`]). A write
//! lease becomes a read lease via [`WriteLease::downgrade`], and a read lease
//! that has not been revoked can be turned back into a write lease via
//! [`ReadLease::upgrade`].

mod error;
mod file;
mod leaser;
mod lock_order;
mod lru;
mod metric_definitions;
mod options;
mod read_lease;
mod write_lease;

pub use error::LeaseError;
pub use file::{DiskFiles, MemoryFile, MemoryFiles, TempFile, TempFileFactory};
pub use leaser::{FileLeaser, LeaserStats};
pub use lru::LeaseId;
pub use metric_definitions::describe_metrics;
pub use options::{LeaserOptions, LeaserOptionsBuilder, LeaserOptionsBuilderError};
pub use read_lease::ReadLease;
pub use write_lease::WriteLease;

static_assertions::assert_impl_all!(FileLeaser: Send, Sync);
static_assertions::assert_impl_all!(ReadLease: Send, Sync);
static_assertions::assert_impl_all!(WriteLease: Send, Sync);

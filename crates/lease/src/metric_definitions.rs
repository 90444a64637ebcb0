// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use metrics::{Unit, describe_counter, describe_gauge};

pub const LEASE_USED_BYTES: &str = "scratch.lease.used_bytes";
pub const LEASE_TRACKED: &str = "scratch.lease.tracked";
pub const LEASE_EVICTIONS: &str = "scratch.lease.evictions.total";
pub const LEASE_UPGRADES: &str = "scratch.lease.upgrades.total";
pub const LEASE_DOWNGRADES: &str = "scratch.lease.downgrades.total";
pub const LEASE_OVER_BUDGET: &str = "scratch.lease.over_budget.total";

pub fn describe_metrics() {
    describe_gauge!(
        LEASE_USED_BYTES,
        Unit::Bytes,
        "Bytes charged to read leases"
    );
    describe_gauge!(LEASE_TRACKED, Unit::Count, "Number of tracked read leases");
    describe_counter!(
        LEASE_EVICTIONS,
        Unit::Count,
        "Read leases revoked to make room for others"
    );
    describe_counter!(
        LEASE_UPGRADES,
        Unit::Count,
        "Read leases upgraded to write leases"
    );
    describe_counter!(
        LEASE_DOWNGRADES,
        Unit::Count,
        "Write leases downgraded to read leases"
    );
    describe_counter!(
        LEASE_OVER_BUDGET,
        Unit::Count,
        "Evictions that ran out of candidates while still over budget"
    );
}

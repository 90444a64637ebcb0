// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

/// # Scratch file leasing options
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct LeaserOptions {
    /// # Byte limit
    ///
    /// Upper bound on the combined size of all read leases. Write leases are not
    /// counted while they are open. A single downgrade larger than the limit is
    /// still accepted; it evicts everything else and leaves the pool over budget.
    pub byte_limit: ByteSize,

    /// # Maximum number of files
    ///
    /// Optional upper bound on the number of read leases tracked at once. Like the
    /// byte limit, it is enforced by evicting the least recently used leases.
    pub max_files: Option<NonZeroUsize>,

    /// # Temporary directory
    ///
    /// Directory for scratch files. Defaults to the system temp directory.
    pub temp_dir: Option<PathBuf>,
}

impl LeaserOptions {
    pub fn byte_limit(&self) -> u64 {
        self.byte_limit.as_u64()
    }
}

impl Default for LeaserOptions {
    fn default() -> Self {
        Self {
            byte_limit: ByteSize::mib(512),
            max_files: None,
            temp_dir: None,
        }
    }
}

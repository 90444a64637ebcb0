// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::io;

/// Errors returned by lease operations.
///
/// [`LeaseError::Revoked`] is the only error the lease engine produces on its
/// own. Everything else comes from the backing file and is passed through as-is.
#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    /// The lease was evicted, revoked, or upgraded and can no longer be used.
    /// Fetch or create a new lease to continue.
    #[error("lease revoked")]
    Revoked,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LeaseError {
    pub fn is_revoked(&self) -> bool {
        matches!(self, LeaseError::Revoked)
    }
}

impl From<LeaseError> for io::Error {
    fn from(err: LeaseError) -> Self {
        match err {
            LeaseError::Io(err) => err,
            revoked @ LeaseError::Revoked => io::Error::other(revoked),
        }
    }
}

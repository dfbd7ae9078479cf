// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! Per-session memory accounting.
//!
//! A [`MemoryBudget`] is constructed for one transcode session, charged as
//! coefficient stores, segment payloads and plane streams are allocated, and
//! dropped when the session ends. Exceeding the limit aborts the operation
//! with a typed error instead of exhausting the host.

use crate::error::{JpegError, Result};

/// Default limit for a single transcode session (512 MB).
pub const DEFAULT_MEMORY_LIMIT: usize = 512 * 1024 * 1024;

/// Tracks cumulative allocations during one decode/transcode session.
#[derive(Debug, Clone)]
pub struct MemoryBudget {
    allocated: usize,
    limit: usize,
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT)
    }
}

impl MemoryBudget {
    pub fn new(limit: usize) -> Self {
        Self { allocated: 0, limit }
    }

    /// A budget that never rejects. For trusted inputs and tests.
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// Charge `bytes` against the budget; `context` names the allocation in
    /// the resulting error.
    pub fn charge(&mut self, bytes: usize, context: &'static str) -> Result<()> {
        let total = self
            .allocated
            .checked_add(bytes)
            .ok_or(JpegError::MemoryLimit(context))?;
        if total > self.limit {
            return Err(JpegError::MemoryLimit(context));
        }
        self.allocated = total;
        Ok(())
    }

    /// Return `bytes` to the budget.
    pub fn release(&mut self, bytes: usize) {
        self.allocated = self.allocated.saturating_sub(bytes);
    }

    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.allocated)
    }
}

// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time-bounded in-memory state log.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;

use crate::error::StoreError;

use super::{LiveStateRecord, StateLog};

/// Default time a record is retained.
const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

/// State log keeping recent records in memory.
///
/// # Retention
///
/// Records are kept for a fixed time (default five minutes) measured back
/// from the newest appended record. Appending evicts the older ones, however
/// many devices report, so every report inside the retention time is still
/// there. The retention only needs to cover the recovery window.
///
/// Clones share the same records.
#[derive(Debug, Clone)]
pub struct MemoryStateLog {
    records: Arc<RwLock<VecDeque<LiveStateRecord>>>,
    retention: TimeDelta,
}

impl MemoryStateLog {
    /// Creates a log with the default retention.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Creates a log retaining records for `retention`.
    #[must_use]
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            records: Arc::default(),
            retention: TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Returns how long records are retained.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention.to_std().unwrap_or(Duration::MAX)
    }

    /// Returns the number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no record is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for MemoryStateLog {
    fn default() -> Self {
        Self::new()
    }
}

impl StateLog for MemoryStateLog {
    async fn append(&self, record: LiveStateRecord) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if let Some(cutoff) = record.timestamp.checked_sub_signed(self.retention) {
            while records.front().is_some_and(|oldest| oldest.timestamp < cutoff) {
                records.pop_front();
            }
        }
        records.push_back(record);
        Ok(())
    }

    async fn records_since(
        &self,
        topic: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<LiveStateRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|record| record.topic == topic && record.timestamp >= since)
            .cloned()
            .collect())
    }
}

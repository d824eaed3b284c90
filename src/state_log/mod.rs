// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Append-only log of device state reports.
//!
//! The live-state listener appends one [`LiveStateRecord`] per report and the
//! recovery handler queries the log by topic and recency. Records keep the
//! payload as structured JSON, so recovery reads a field instead of slicing
//! log text.

mod memory;

pub use memory::MemoryStateLog;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// One observed state report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStateRecord {
    /// When the report was recorded.
    pub timestamp: DateTime<Utc>,
    /// Topic the report was published on.
    pub topic: String,
    /// Report payload, unmodified.
    pub payload: serde_json::Value,
}

impl LiveStateRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::at(Utc::now(), topic, payload)
    }

    /// Creates a record with an explicit timestamp.
    #[must_use]
    pub fn at(timestamp: DateTime<Utc>, topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            timestamp,
            topic: topic.into(),
            payload,
        }
    }
}

/// Storage of live-state records, queryable by topic and recency.
pub trait StateLog: Send + Sync {
    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the log cannot be written.
    fn append(&self, record: LiveStateRecord)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns the records published on `topic` at or after `since`,
    /// oldest first.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the log cannot be read.
    fn records_since(
        &self,
        topic: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<LiveStateRecord>, StoreError>> + Send;
}

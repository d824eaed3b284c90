// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recent-state recovery.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{Error, ParseError};
use crate::state_log::StateLog;
use crate::topic;
use crate::types::{Mci, StateReport};

/// Default trailing window searched for a device's last report.
pub const DEFAULT_RECOVERY_WINDOW: Duration = Duration::from_secs(30);

/// Answers a device's last known state from the recorded reports.
#[derive(Debug, Clone)]
pub struct StateRecovery<L> {
    log: L,
    window: Duration,
}

impl<L: StateLog> StateRecovery<L> {
    /// Creates a recovery handler with the default 30 second window.
    #[must_use]
    pub fn new(log: L) -> Self {
        Self::with_window(log, DEFAULT_RECOVERY_WINDOW)
    }

    /// Creates a recovery handler with a custom window.
    #[must_use]
    pub fn with_window(log: L, window: Duration) -> Self {
        Self { log, window }
    }

    /// Returns the trailing window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the most recent report of `mci` within the window.
    ///
    /// # Errors
    ///
    /// Returns `Error::StateNotFound` if the device reported nothing within
    /// the window, `Error::Parse` if the latest report is not a valid state
    /// report, or `Error::Store` if the log cannot be read.
    pub async fn recover(&self, mci: &Mci) -> Result<StateReport, Error> {
        self.recover_at(mci, Utc::now()).await
    }

    /// Like [`recover`](Self::recover), relative to an explicit instant.
    ///
    /// # Errors
    ///
    /// See [`recover`](Self::recover).
    pub async fn recover_at(&self, mci: &Mci, now: DateTime<Utc>) -> Result<StateReport, Error> {
        let topic = topic::state_report_topic(mci);
        let window = TimeDelta::from_std(self.window).unwrap_or(TimeDelta::MAX);
        let since = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let records = self.log.records_since(&topic, since).await?;
        let latest = records
            .into_iter()
            .filter(|record| record.timestamp <= now)
            .max_by_key(|record| record.timestamp)
            .ok_or_else(|| {
                tracing::debug!(mci = %mci, window_secs = self.window.as_secs(), "No recent state");
                Error::StateNotFound(mci.clone())
            })?;

        let report: StateReport = serde_json::from_value(latest.payload).map_err(ParseError::from)?;
        tracing::debug!(
            mci = %mci,
            recorded_at = %latest.timestamp,
            components = report.current_state.len(),
            "Recovered recent state"
        );
        Ok(report)
    }
}

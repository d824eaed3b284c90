// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Live-state recording.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::{Error, ParseError};
use crate::protocol::InboundMessage;
use crate::state_log::{LiveStateRecord, StateLog};
use crate::topic::{self, STATE_REPORT_FILTER};

/// Records every state report devices publish.
///
/// Payloads are stored as received; the listener neither transforms nor
/// deduplicates them. Subscription routing does not drop messages, so a
/// listener that falls behind holds back the broker connection instead of
/// losing reports.
#[derive(Debug, Clone)]
pub struct LiveStateListener<L> {
    log: L,
}

impl<L: StateLog> LiveStateListener<L> {
    /// Creates a listener appending to `log`.
    #[must_use]
    pub fn new(log: L) -> Self {
        Self { log }
    }

    /// Returns the state log.
    #[must_use]
    pub fn log(&self) -> &L {
        &self.log
    }

    /// Records a message stamped with the current time.
    ///
    /// Returns `None` for messages outside the state report topics.
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` for a payload that is not JSON, or
    /// `Error::Store` if the log cannot be written.
    pub async fn handle(&self, message: &InboundMessage) -> Result<Option<LiveStateRecord>, Error> {
        self.record_at(message, Utc::now()).await
    }

    /// Records a message with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// See [`handle`](Self::handle).
    pub async fn record_at(
        &self,
        message: &InboundMessage,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<LiveStateRecord>, Error> {
        if !topic::matches(STATE_REPORT_FILTER, &message.topic) {
            tracing::trace!(topic = %message.topic, "Ignoring message outside state reports");
            return Ok(None);
        }

        let payload: serde_json::Value = serde_json::from_slice(&message.payload)
            .map_err(ParseError::from)
            .inspect_err(|e| {
                tracing::warn!(topic = %message.topic, error = %e, "Rejecting non-JSON state report");
            })?;

        let record = LiveStateRecord::at(timestamp, message.topic.clone(), payload);
        self.log.append(record.clone()).await?;

        tracing::info!(
            topic = %record.topic,
            payload = %record.payload,
            "Live state recorded"
        );
        Ok(Some(record))
    }

    /// Records messages until the subscription closes.
    pub async fn run(&self, mut messages: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = messages.recv().await {
            if let Err(e) = self.handle(&message).await {
                tracing::error!(topic = %message.topic, error = %e, "Failed to record live state");
            }
        }
        tracing::debug!("State report subscription closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_log::MemoryStateLog;
    use chrono::TimeDelta;
    use serde_json::json;

    fn report(topic: &str, payload: &serde_json::Value) -> InboundMessage {
        InboundMessage::new(topic, serde_json::to_vec(payload).unwrap())
    }

    #[tokio::test]
    async fn records_report_unchanged() {
        let log = MemoryStateLog::new();
        let listener = LiveStateListener::new(log.clone());
        let payload = json!({"target_sensors": [], "current_state": {"components": []}, "extra": 1});

        let record = listener
            .handle(&report("/esp32/tms", &payload))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.topic, "/esp32/tms");
        assert_eq!(record.payload, payload);
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn ignores_other_topics() {
        let log = MemoryStateLog::new();
        let listener = LiveStateListener::new(log.clone());

        let recorded = listener
            .handle(&report("/esp32/mcsu", &json!({})))
            .await
            .unwrap();
        assert!(recorded.is_none());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn rejects_non_json_payload() {
        let log = MemoryStateLog::new();
        let listener = LiveStateListener::new(log.clone());

        let err = listener
            .handle(&InboundMessage::new("/esp32/tms", b"fan=1".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::Json(_))));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn duplicates_are_kept() {
        let log = MemoryStateLog::new();
        let listener = LiveStateListener::new(log.clone());
        let message = report("/esp32/tms", &json!({"n": 1}));
        let now = Utc::now();

        listener.record_at(&message, now).await.unwrap();
        listener.record_at(&message, now).await.unwrap();

        let records = log
            .records_since("/esp32/tms", now - TimeDelta::seconds(1))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn run_drains_subscription() {
        let log = MemoryStateLog::new();
        let listener = LiveStateListener::new(log.clone());
        let (tx, rx) = mpsc::channel(4);

        tx.send(report("/a/tms", &json!({"n": 1}))).await.unwrap();
        tx.send(InboundMessage::new("/b/tms", b"not json".to_vec()))
            .await
            .unwrap();
        tx.send(report("/c/tms", &json!({"n": 3}))).await.unwrap();
        drop(tx);

        listener.run(rx).await;
        assert_eq!(log.len(), 2);
    }
}

// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process broker.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::BrokerError;

use super::{InboundMessage, Publisher, TopicRouter};

/// Broker delivering publishes to subscribers in the same process.
///
/// Every publish is also kept in a history, which makes the broker handy for
/// asserting on what was sent. Clones share subscriptions and history.
///
/// # Examples
///
/// ```
/// use mcsync::protocol::{LoopbackBroker, Publisher};
///
/// # async fn example() -> mcsync::Result<()> {
/// let broker = LoopbackBroker::new();
/// let mut reports = broker.subscribe("/+/tms")?;
///
/// broker.publish("/esp32/tms", b"{}".to_vec()).await?;
///
/// let message = reports.recv().await.unwrap();
/// assert_eq!(message.topic, "/esp32/tms");
/// assert_eq!(broker.published().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoopbackBroker {
    router: Arc<TopicRouter>,
    history: Arc<Mutex<Vec<InboundMessage>>>,
}

impl LoopbackBroker {
    /// Creates a broker without subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a topic filter.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::InvalidTopic` for a malformed filter.
    pub fn subscribe(
        &self,
        filter: impl Into<String>,
    ) -> Result<mpsc::Receiver<InboundMessage>, BrokerError> {
        self.router.register(filter)
    }

    /// Returns every message published so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<InboundMessage> {
        self.history.lock().clone()
    }

    /// Returns the messages published to `topic`, oldest first.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<InboundMessage> {
        self.history
            .lock()
            .iter()
            .filter(|message| message.topic == topic)
            .cloned()
            .collect()
    }
}

impl Publisher for LoopbackBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(BrokerError::InvalidTopic(topic.to_string()));
        }

        let message = InboundMessage::new(topic, payload);
        self.history.lock().push(message.clone());
        self.router.route(&message).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_matching_subscribers_only() {
        let broker = LoopbackBroker::new();
        let mut updates = broker.subscribe("/esp32/mcsu").unwrap();

        broker.publish("/esp32/mcsu", b"1".to_vec()).await.unwrap();
        broker.publish("/other/mcsu", b"2".to_vec()).await.unwrap();

        assert_eq!(updates.recv().await.unwrap().payload, b"1".to_vec());
        assert!(updates.try_recv().is_err());
        assert_eq!(broker.published().len(), 2);
        assert_eq!(broker.published_to("/other/mcsu").len(), 1);
    }

    #[tokio::test]
    async fn wildcard_topic_cannot_be_published() {
        let broker = LoopbackBroker::new();
        let err = broker.publish("/+/mcsu", Vec::new()).await.unwrap_err();
        assert!(matches!(err, BrokerError::InvalidTopic(_)));
        assert!(broker.published().is_empty());
    }
}

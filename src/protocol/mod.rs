// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message broker plumbing.
//!
//! The advancer only needs to publish, so it depends on the [`Publisher`]
//! trait. Subscriptions are handed out by the concrete brokers as channels of
//! [`InboundMessage`]s, fed by a shared [`TopicRouter`].
//!
//! # Brokers
//!
//! - [`MqttBroker`]: persistent MQTT connection (feature `mqtt`)
//! - [`LoopbackBroker`]: in-process broker delivering publishes to local
//!   subscribers, for tests and broker-less runs

mod loopback;
#[cfg(feature = "mqtt")]
mod mqtt_broker;
mod router;

pub use loopback::LoopbackBroker;
#[cfg(feature = "mqtt")]
pub use mqtt_broker::{MqttBroker, MqttBrokerBuilder};
pub use router::TopicRouter;

use std::future::Future;

use crate::error::BrokerError;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Creates an inbound message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Returns the payload as UTF-8, if it is valid UTF-8.
    #[must_use]
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Something that can publish messages to a broker.
pub trait Publisher: Send + Sync {
    /// Publishes `payload` to `topic` with at-least-once delivery.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError` if the message cannot be handed to the broker.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

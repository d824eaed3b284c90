// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fan-out of inbound messages to filter subscriptions.
//!
//! ```text
//! Publish: /esp32/tms → {"target_sensors": ...}
//!                 ↓
//!         TopicRouter.route()
//!                 ↓
//!   every route whose filter matches (/+/tms, #, ...)
//!                 ↓
//!        mpsc::Sender.send(message).await
//! ```
//!
//! Delivery never drops a message: routing waits for room in a full
//! subscription channel, which holds back the caller (the MQTT event loop or
//! a publisher) until the subscriber catches up. Routes whose receiver was
//! dropped are removed on the next routing pass.

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::BrokerError;
use crate::topic;

use super::InboundMessage;

/// Default capacity of a subscription channel.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 256;

#[derive(Debug)]
struct Route {
    filter: String,
    sender: mpsc::Sender<InboundMessage>,
}

/// Routes inbound messages to the subscriptions whose filter matches.
#[derive(Debug, Default)]
pub struct TopicRouter {
    routes: RwLock<Vec<Route>>,
}

impl TopicRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription and returns the receiving end.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::InvalidTopic` for a malformed filter.
    pub fn register(
        &self,
        filter: impl Into<String>,
    ) -> Result<mpsc::Receiver<InboundMessage>, BrokerError> {
        let filter = filter.into();
        if !topic::is_valid_filter(&filter) {
            return Err(BrokerError::InvalidTopic(filter));
        }

        let (sender, receiver) = mpsc::channel(DEFAULT_SUBSCRIPTION_CAPACITY);
        tracing::debug!(filter = %filter, "Registering subscription");
        self.routes.write().push(Route { filter, sender });
        Ok(receiver)
    }

    /// Delivers a message to every matching subscription.
    ///
    /// Returns the number of subscriptions the message was delivered to. A full
    /// subscription channel is waited on, not skipped.
    pub async fn route(&self, message: &InboundMessage) -> usize {
        let senders: Vec<mpsc::Sender<InboundMessage>> = self
            .routes
            .read()
            .iter()
            .filter(|route| topic::matches(&route.filter, &message.topic))
            .map(|route| route.sender.clone())
            .collect();

        let mut delivered = 0;
        let mut stale = false;
        for sender in senders {
            if sender.capacity() == 0 {
                tracing::debug!(topic = %message.topic, "Subscriber is lagging, waiting");
            }
            match sender.send(message.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => stale = true,
            }
        }

        if stale {
            self.cleanup();
        }
        if delivered == 0 {
            tracing::trace!(topic = %message.topic, "No subscriber for topic");
        }
        delivered
    }

    /// Removes subscriptions whose receiver was dropped.
    pub fn cleanup(&self) {
        self.routes.write().retain(|route| {
            let alive = !route.sender.is_closed();
            if !alive {
                tracing::debug!(filter = %route.filter, "Removing closed subscription");
            }
            alive
        });
    }

    /// Returns the filters of all live subscriptions.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        self.routes
            .read()
            .iter()
            .filter(|route| !route.sender.is_closed())
            .map(|route| route.filter.clone())
            .collect()
    }

    /// Returns the number of registered subscriptions.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Drops every subscription, closing their channels.
    pub fn clear(&self) {
        self.routes.write().clear();
    }
}

// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT broker connection.
//!
//! A single persistent connection carries both directions of device traffic:
//! state updates published to `/{mci}/mcsu` and state reports received on
//! `/+/tms`.
//!
//! # Examples
//!
//! ```no_run
//! use mcsync::protocol::{MqttBroker, Publisher};
//!
//! # async fn example() -> mcsync::Result<()> {
//! let broker = MqttBroker::builder()
//!     .host("192.168.1.50")
//!     .port(1883)
//!     .credentials("user", "password")
//!     .build()
//!     .await?;
//!
//! let mut reports = broker.subscribe("/+/tms").await?;
//! broker.publish("/esp32/mcsu", br#"{"state_update":{"components":[]}}"#.to_vec()).await?;
//!
//! if let Some(report) = reports.recv().await {
//!     println!("{} reported {} bytes", report.topic, report.payload.len());
//! }
//!
//! broker.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, oneshot};

use crate::error::BrokerError;

use super::{InboundMessage, Publisher, TopicRouter};

/// Global counter for generating unique client IDs.
static BROKER_CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Delay before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Capacity of the client request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Configuration for an MQTT broker connection.
#[derive(Debug, Clone)]
struct MqttBrokerConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    connection_timeout: Duration,
}

impl Default for MqttBrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            credentials: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

/// A persistent MQTT broker connection.
///
/// `MqttBroker` is cheaply cloneable (via `Arc`). The event loop keeps
/// polling after connection errors, so the client reconnects on its own and
/// restores every subscription once the broker acknowledges the new session.
#[derive(Clone)]
pub struct MqttBroker {
    inner: Arc<MqttBrokerInner>,
}

struct MqttBrokerInner {
    client: AsyncClient,
    router: TopicRouter,
    config: MqttBrokerConfig,
    connected: AtomicBool,
    closing: AtomicBool,
}

impl MqttBroker {
    /// Creates a new builder for configuring an MQTT broker connection.
    #[must_use]
    pub fn builder() -> MqttBrokerBuilder {
        MqttBrokerBuilder::default()
    }

    /// Returns whether the broker is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Returns the host address of the broker.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    /// Returns the port of the broker.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.config.port
    }

    /// Returns whether authentication is configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.inner.config.credentials.is_some()
    }

    /// Subscribes to a topic filter and returns the receiving end.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::InvalidTopic` for a malformed filter, or
    /// `BrokerError::Mqtt` if the subscribe request cannot be queued.
    pub async fn subscribe(
        &self,
        filter: impl Into<String>,
    ) -> Result<mpsc::Receiver<InboundMessage>, BrokerError> {
        let filter = filter.into();
        let receiver = self.inner.router.register(filter.clone())?;
        self.inner
            .client
            .subscribe(&filter, QoS::AtLeastOnce)
            .await?;
        tracing::debug!(filter = %filter, "Subscribed");
        Ok(receiver)
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.router.route_count()
    }

    /// Disconnects from the broker.
    ///
    /// All subscription channels are closed.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect request cannot be queued.
    pub async fn disconnect(&self) -> Result<(), BrokerError> {
        tracing::info!(
            host = %self.inner.config.host,
            port = %self.inner.config.port,
            "Disconnecting from MQTT broker"
        );

        self.inner.closing.store(true, Ordering::Release);
        self.inner.router.clear();
        self.inner.client.disconnect().await?;
        self.inner.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn restore_subscriptions(&self) {
        for filter in self.inner.router.filters() {
            if let Err(e) = self.inner.client.try_subscribe(&filter, QoS::AtLeastOnce) {
                tracing::warn!(filter = %filter, error = %e, "Failed to restore subscription");
            }
        }
    }
}

impl Publisher for MqttBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(BrokerError::InvalidTopic(topic.to_string()));
        }
        self.inner
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        tracing::trace!(topic = %topic, "Queued publish");
        Ok(())
    }
}

impl std::fmt::Debug for MqttBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBroker")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// Builder for creating an MQTT broker connection.
///
/// # Examples
///
/// ```no_run
/// use mcsync::protocol::MqttBroker;
/// use std::time::Duration;
///
/// # async fn example() -> mcsync::Result<()> {
/// let broker = MqttBroker::builder()
///     .host("192.168.1.50")
///     .port(1883)
///     .credentials("user", "password")
///     .keep_alive(Duration::from_secs(60))
///     .connection_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MqttBrokerBuilder {
    config: MqttBrokerConfig,
}

impl MqttBrokerBuilder {
    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Builds and connects to the MQTT broker.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Host is not set
    /// - Connection fails
    /// - Connection times out
    pub async fn build(self) -> Result<MqttBroker, BrokerError> {
        if self.config.host.is_empty() {
            return Err(BrokerError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }

        let counter = BROKER_CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("mcsync_{}_{}", std::process::id(), counter);

        let mut mqtt_options = MqttOptions::new(&client_id, &self.config.host, self.config.port);
        mqtt_options.set_keep_alive(self.config.keep_alive);
        mqtt_options.set_clean_session(true);

        if let Some((ref username, ref password)) = self.config.credentials {
            mqtt_options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        let broker = MqttBroker {
            inner: Arc::new(MqttBrokerInner {
                client,
                router: TopicRouter::new(),
                config: self.config.clone(),
                connected: AtomicBool::new(false),
                closing: AtomicBool::new(false),
            }),
        };

        let (connack_tx, connack_rx) = oneshot::channel();
        tokio::spawn(handle_broker_events(event_loop, broker.clone(), connack_tx));

        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => {
                tracing::info!(
                    host = %self.config.host,
                    port = %self.config.port,
                    client_id = %client_id,
                    "Connected to MQTT broker"
                );
                Ok(broker)
            }
            Ok(Err(_)) => Err(BrokerError::ConnectionFailed(
                "MQTT event loop terminated unexpectedly".to_string(),
            )),
            Err(_) => {
                broker.inner.closing.store(true, Ordering::Release);
                Err(BrokerError::ConnectionFailed(format!(
                    "MQTT connection timeout after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }
}

/// Drives the connection: acknowledges the first connect, routes inbound
/// publishes, and keeps reconnecting until the broker is closed.
async fn handle_broker_events(
    mut event_loop: EventLoop,
    broker: MqttBroker,
    connack_tx: oneshot::Sender<()>,
) {
    let mut connack_tx = Some(connack_tx);

    loop {
        if broker.inner.closing.load(Ordering::Acquire) {
            break;
        }

        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                broker.inner.connected.store(true, Ordering::Release);
                match connack_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(());
                    }
                    None => {
                        tracing::info!("Reconnected to MQTT broker");
                        broker.restore_subscriptions();
                    }
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::debug!(
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                    "MQTT message received"
                );
                let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                broker.inner.router.route(&message).await;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker disconnected");
                broker.inner.connected.store(false, Ordering::Release);
            }
            Ok(_) => {}
            Err(e) => {
                broker.inner.connected.store(false, Ordering::Release);
                if broker.inner.closing.load(Ordering::Acquire) {
                    break;
                }
                tracing::error!(error = %e, "MQTT broker event loop error");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }

    tracing::debug!("MQTT event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_default_values() {
        let builder = MqttBrokerBuilder::default();
        assert_eq!(builder.config.port, 1883);
        assert!(builder.config.host.is_empty());
        assert!(builder.config.credentials.is_none());
        assert_eq!(builder.config.keep_alive, Duration::from_secs(30));
        assert_eq!(builder.config.connection_timeout, Duration::from_secs(10));
    }

    #[test]
    fn builder_chain() {
        let builder = MqttBrokerBuilder::default()
            .host("192.168.1.50")
            .port(8883)
            .credentials("admin", "secret")
            .keep_alive(Duration::from_secs(45))
            .connection_timeout(Duration::from_secs(15));

        assert_eq!(builder.config.host, "192.168.1.50");
        assert_eq!(builder.config.port, 8883);
        assert_eq!(
            builder.config.credentials,
            Some(("admin".to_string(), "secret".to_string()))
        );
        assert_eq!(builder.config.keep_alive, Duration::from_secs(45));
        assert_eq!(builder.config.connection_timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn builder_missing_host_fails() {
        let err = MqttBrokerBuilder::default().build().await.unwrap_err();
        assert!(matches!(err, BrokerError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn unreachable_broker_times_out() {
        let err = MqttBroker::builder()
            .host("127.0.0.1")
            .port(1)
            .connection_timeout(Duration::from_millis(300))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::ConnectionFailed(_)));
    }
}

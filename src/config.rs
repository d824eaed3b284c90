// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Service configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::handler::DEFAULT_RECOVERY_WINDOW;
use crate::trigger::TriggerBinding;

/// Default HTTP listen address.
pub const DEFAULT_LISTEN: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000);

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Configuration of the sync service.
///
/// # Examples
///
/// ```
/// use mcsync::config::ServiceConfig;
/// use std::time::Duration;
///
/// let config = ServiceConfig::builder()
///     .mqtt_host("broker.local")
///     .mqtt_credentials("user", "secret")
///     .recovery_window(Duration::from_secs(60))
///     .build();
///
/// assert_eq!(config.mqtt_host(), "broker.local");
/// assert_eq!(config.mqtt_port(), 1883);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    listen: SocketAddr,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_credentials: Option<(String, String)>,
    mqtt_connection_timeout: Duration,
    recovery_window: Duration,
    binding: TriggerBinding,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN,
            mqtt_host: "localhost".to_string(),
            mqtt_port: DEFAULT_MQTT_PORT,
            mqtt_credentials: None,
            mqtt_connection_timeout: Duration::from_secs(10),
            recovery_window: DEFAULT_RECOVERY_WINDOW,
            binding: TriggerBinding::default(),
        }
    }
}

impl ServiceConfig {
    /// Creates a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Returns the HTTP listen address.
    #[must_use]
    pub fn listen(&self) -> SocketAddr {
        self.listen
    }

    /// Returns the MQTT broker host.
    #[must_use]
    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    /// Returns the MQTT broker port.
    #[must_use]
    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    /// Returns the MQTT credentials, if any.
    #[must_use]
    pub fn mqtt_credentials(&self) -> Option<(&str, &str)> {
        self.mqtt_credentials
            .as_ref()
            .map(|(u, p)| (u.as_str(), p.as_str()))
    }

    /// Returns how long to wait for the broker to accept the connection.
    #[must_use]
    pub fn mqtt_connection_timeout(&self) -> Duration {
        self.mqtt_connection_timeout
    }

    /// Returns the recovery window.
    #[must_use]
    pub fn recovery_window(&self) -> Duration {
        self.recovery_window
    }

    /// Returns the trigger binding.
    #[must_use]
    pub fn binding(&self) -> &TriggerBinding {
        &self.binding
    }

    /// Returns a broker builder for the configured MQTT connection.
    #[cfg(feature = "mqtt")]
    #[must_use]
    pub fn mqtt_broker(&self) -> crate::protocol::MqttBrokerBuilder {
        let builder = crate::protocol::MqttBroker::builder()
            .host(&self.mqtt_host)
            .port(self.mqtt_port)
            .connection_timeout(self.mqtt_connection_timeout);
        match &self.mqtt_credentials {
            Some((username, password)) => builder.credentials(username, password),
            None => builder,
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    /// Sets the HTTP listen address (default: `0.0.0.0:3000`).
    #[must_use]
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.config.listen = addr;
        self
    }

    /// Sets the MQTT broker host (default: `localhost`).
    #[must_use]
    pub fn mqtt_host(mut self, host: impl Into<String>) -> Self {
        self.config.mqtt_host = host.into();
        self
    }

    /// Sets the MQTT broker port (default: 1883).
    #[must_use]
    pub fn mqtt_port(mut self, port: u16) -> Self {
        self.config.mqtt_port = port;
        self
    }

    /// Sets the MQTT credentials.
    #[must_use]
    pub fn mqtt_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.mqtt_credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the MQTT connection timeout (default: 10 seconds).
    #[must_use]
    pub fn mqtt_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.mqtt_connection_timeout = timeout;
        self
    }

    /// Sets the recovery window (default: 30 seconds).
    #[must_use]
    pub fn recovery_window(mut self, window: Duration) -> Self {
        self.config.recovery_window = window;
        self
    }

    /// Sets the trigger binding.
    #[must_use]
    pub fn binding(mut self, binding: TriggerBinding) -> Self {
        self.config.binding = binding;
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> ServiceConfig {
        self.config
    }
}

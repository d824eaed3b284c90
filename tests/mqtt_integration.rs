// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the MQTT broker connection using mockforge-mqtt.
//!
//! The mock broker accepts connections, subscriptions and publishes but does
//! not forward messages between clients, so these tests cover the client side
//! of the connection only.

#![cfg(feature = "mqtt")]

use std::time::Duration;

use mcsync::handler::{Delivery, UpdateAdvancer};
use mcsync::protocol::{MqttBroker, Publisher};
use mcsync::ring::UpdateStep;
use mcsync::store::{MemoryStepStore, StepStore};
use mcsync::topic::STATE_REPORT_FILTER;
use mcsync::types::{ComponentState, Mci, OrderId, StateUpdate};
use mcsync::{BrokerError, ServiceConfig};
use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use tokio::time::sleep;

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18950);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    // Give the broker time to bind before clients connect
    sleep(Duration::from_millis(500)).await;
}

async fn connect(port: u16) -> MqttBroker {
    MqttBroker::builder()
        .host("127.0.0.1")
        .port(port)
        .connection_timeout(Duration::from_secs(5))
        .build()
        .await
        .expect("connect to mock broker")
}

// ============================================================================
// Connection Tests
// ============================================================================

mod connection {
    use super::*;

    #[tokio::test]
    async fn connect_to_broker() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = connect(port).await;
        assert!(broker.is_connected());
        assert_eq!(broker.host(), "127.0.0.1");
        assert_eq!(broker.port(), port);
        assert!(!broker.has_credentials());
    }

    #[tokio::test]
    async fn connect_from_service_config() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let config = ServiceConfig::builder()
            .mqtt_host("127.0.0.1")
            .mqtt_port(port)
            .build();
        let broker = config.mqtt_broker().build().await;
        assert!(broker.is_ok(), "Failed to connect: {:?}", broker.err());
    }

    #[tokio::test]
    async fn disconnect_closes_subscriptions() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = connect(port).await;
        let mut reports = broker.subscribe(STATE_REPORT_FILTER).await.unwrap();
        assert_eq!(broker.subscription_count(), 1);

        broker.disconnect().await.unwrap();
        assert!(!broker.is_connected());
        assert_eq!(broker.subscription_count(), 0);
        assert!(reports.recv().await.is_none());
    }

    #[tokio::test]
    async fn nothing_listening() {
        let port = get_test_port();
        let result = MqttBroker::builder()
            .host("127.0.0.1")
            .port(port)
            .connection_timeout(Duration::from_millis(500))
            .build()
            .await;
        assert!(matches!(result, Err(BrokerError::ConnectionFailed(_))));
    }
}

// ============================================================================
// Publish / Subscribe Tests
// ============================================================================

mod messaging {
    use super::*;

    #[tokio::test]
    async fn subscribe_to_state_reports() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = connect(port).await;
        let result = broker.subscribe(STATE_REPORT_FILTER).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn malformed_filter_is_rejected() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = connect(port).await;
        let result = broker.subscribe("/#/tms").await;
        assert!(matches!(result, Err(BrokerError::InvalidTopic(_))));
        assert_eq!(broker.subscription_count(), 0);
    }

    #[tokio::test]
    async fn publish_state_update() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = connect(port).await;
        let payload = br#"{"state_update":{"components":[{"component":"fan","value":1}]}}"#;
        let result = broker.publish("/esp32/mcsu", payload.to_vec()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn wildcard_publish_is_rejected() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = connect(port).await;
        let result = broker.publish("/+/mcsu", Vec::new()).await;
        assert!(matches!(result, Err(BrokerError::InvalidTopic(_))));
    }

    #[tokio::test]
    async fn advancer_publishes_through_broker() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let store = MemoryStepStore::new();
        let advancer = UpdateAdvancer::new(store.clone(), connect(port).await);
        let order_id = OrderId::new();
        let update = StateUpdate::new().with_component(ComponentState::new("fan", 1));
        store
            .insert_batch(&[UpdateStep::new(Mci::new("esp32").unwrap(), order_id, 1, update)])
            .await
            .unwrap();

        let outcome = advancer.advance(&order_id).await.unwrap();
        assert!(outcome.published());

        let delivery = advancer
            .publish_manual(&Mci::new("esp32").unwrap(), &StateUpdate::new())
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Skipped);
    }
}

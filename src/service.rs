// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Standalone service wiring.
//!
//! ```text
//!             ┌──────────── axum ────────────┐
//! HTTP ──────▶│ /mcsu  /psu  /msr  /health   │
//!             └──┬──────┬──────┬─────────────┘
//!                │      │      └──▶ StateRecovery ◀── MemoryStateLog
//!                │      └──▶ UpdateSubmitter ──▶ LocalTriggers ──┐
//!                ▼                                               │ TriggerEvent
//!          UpdateAdvancer ◀──────────── dispatch task ◀──────────┘
//!                │ publish /{mci}/mcsu
//!                ▼
//!            MqttBroker ──▶ /+/tms ──▶ LiveStateListener ──▶ MemoryStateLog
//! ```

use std::future::Future;

use tokio::net::TcpListener;

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::handler::{LiveStateListener, StateRecovery, UpdateAdvancer, UpdateSubmitter};
use crate::server::{AppState, build_router};
use crate::state_log::MemoryStateLog;
use crate::store::MemoryStepStore;
use crate::topic::STATE_REPORT_FILTER;
use crate::trigger::LocalTriggers;

/// Runs the service until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the broker connection, the subscription, or the HTTP
/// listener cannot be set up.
pub async fn run(config: ServiceConfig) -> Result<()> {
    run_until(config, shutdown_signal()).await
}

/// Runs the service until `shutdown` completes.
///
/// # Errors
///
/// See [`run`].
pub async fn run_until<F>(config: ServiceConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let broker = config.mqtt_broker().build().await?;
    let store = MemoryStepStore::new();
    let log = MemoryStateLog::with_retention(config.recovery_window());
    let (triggers, events) = LocalTriggers::new(config.binding());

    let advancer = UpdateAdvancer::new(store.clone(), broker.clone());
    let dispatcher = {
        let advancer = advancer.clone();
        tokio::spawn(async move { advancer.run(events).await })
    };

    let reports = broker.subscribe(STATE_REPORT_FILTER).await?;
    let listener = LiveStateListener::new(log.clone());
    let recorder = tokio::spawn(async move { listener.run(reports).await });

    let state = AppState::new(
        advancer,
        UpdateSubmitter::new(store, triggers, config.binding().clone()),
        StateRecovery::with_window(log, config.recovery_window()),
    );
    let app = build_router(state);

    let tcp = TcpListener::bind(config.listen()).await?;
    tracing::info!(
        listen = %tcp.local_addr()?,
        mqtt_host = %broker.host(),
        mqtt_port = broker.port(),
        "mcsync listening"
    );

    let served = axum::serve(tcp, app).with_graceful_shutdown(shutdown).await;

    tracing::info!("Shutting down");
    recorder.abort();
    dispatcher.abort();
    if let Err(e) = broker.disconnect().await {
        tracing::warn!(error = %e, "Failed to disconnect from MQTT broker");
    }

    served.map_err(Into::into)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

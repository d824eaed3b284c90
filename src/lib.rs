// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `mcsync` - Keeps microcontroller component state in sync.
//!
//! Devices listen for state updates on `/{mci}/mcsu` and report the state
//! they applied on `/{mci}/tms`. This crate provides the handlers around
//! those two topics:
//!
//! - **Update submitter**: stores an ordered ring of state updates for a
//!   device and schedules a recurring trigger for it
//! - **Update advancer**: on each trigger, moves the ring's current step
//!   forward (wrapping to order 1) and publishes it
//! - **Live-state listener**: records every state report devices publish
//! - **State recovery**: answers a device's most recent report
//!
//! Collaborators (step store, state log, broker, trigger scheduler) are
//! traits. In-process implementations ship with the crate, along with an
//! MQTT broker connection and an HTTP ingress.
//!
//! # Features
//!
//! - `mqtt` (default): [`protocol::MqttBroker`] on top of `rumqttc`
//! - `server` (default): the axum router, [`service::run`] and the `mcsync`
//!   binary
//!
//! # Quick Start
//!
//! ## Cycling a ring in process
//!
//! ```
//! use mcsync::handler::{PeriodicStep, PeriodicSubmission, UpdateAdvancer, UpdateSubmitter};
//! use mcsync::protocol::LoopbackBroker;
//! use mcsync::store::MemoryStepStore;
//! use mcsync::trigger::{LocalTriggers, TriggerBinding};
//! use mcsync::types::{ComponentState, Mci, StateUpdate};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> mcsync::Result<()> {
//! let store = MemoryStepStore::new();
//! let broker = LoopbackBroker::new();
//! let binding = TriggerBinding::default();
//! let (triggers, _events) = LocalTriggers::new(&binding);
//!
//! let submitter = UpdateSubmitter::new(store.clone(), triggers, binding);
//! let advancer = UpdateAdvancer::new(store, broker.clone());
//!
//! let fan = |value: i64| PeriodicStep {
//!     order: u32::try_from(value + 1).unwrap(),
//!     state_update: StateUpdate::new().with_component(ComponentState::new("fan", value)),
//! };
//! let submission = PeriodicSubmission {
//!     psu: vec![fan(0), fan(1)],
//!     schedule_expression: "rate(5 minutes)".parse()?,
//! };
//!
//! let submitted = submitter.submit(&Mci::new("esp32")?, &submission).await?;
//! advancer.advance(&submitted.order_id).await?;
//! assert_eq!(broker.published_to("/esp32/mcsu").len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Running the service
//!
//! ```no_run
//! # #[cfg(all(feature = "mqtt", feature = "server"))]
//! # async fn example() -> mcsync::Result<()> {
//! use mcsync::config::ServiceConfig;
//!
//! let config = ServiceConfig::builder().mqtt_host("192.168.1.50").build();
//! mcsync::service::run(config).await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod ring;
#[cfg(feature = "server")]
pub mod server;
#[cfg(all(feature = "mqtt", feature = "server"))]
pub mod service;
pub mod state_log;
pub mod store;
pub mod topic;
pub mod trigger;
pub mod types;

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::{BrokerError, Error, ParseError, Result, ScheduleError, StoreError, ValueError};
pub use handler::{
    AdvanceOutcome, Delivery, LiveStateListener, PeriodicStep, PeriodicSubmission, StateRecovery,
    Submitted, UpdateAdvancer, UpdateSubmitter,
};
#[cfg(feature = "mqtt")]
pub use protocol::{MqttBroker, MqttBrokerBuilder};
pub use protocol::{InboundMessage, LoopbackBroker, Publisher};
pub use types::{ComponentState, Mci, OrderId, ScheduleExpression, StateReport, StateUpdate};

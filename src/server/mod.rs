// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP ingress.
//!
//! | Route              | Handler                        |
//! |--------------------|--------------------------------|
//! | `POST /mcsu/{mci}` | manual state update            |
//! | `POST /psu/{mci}`  | periodic update submission     |
//! | `POST /msr/{mci}`  | recent-state recovery          |
//! | `GET /health`      | liveness check                 |
//!
//! Every response carries `Access-Control-Allow-Origin: *` and
//! `Access-Control-Allow-Credentials: true`. Failures answer 400 with a JSON
//! body `{"error": "..."}`.

mod error;
mod routes;

pub use error::{ApiError, ErrorBody};

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::routing::{get, post};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{StateRecovery, UpdateAdvancer, UpdateSubmitter};
use crate::protocol::Publisher;
use crate::state_log::StateLog;
use crate::store::StepStore;
use crate::trigger::{InvokePermissions, TriggerRegistry};

/// Handlers shared by the HTTP routes.
pub struct AppState<S, P, T, L> {
    /// Ring advancer, used for manual updates.
    pub advancer: Arc<UpdateAdvancer<S, P>>,
    /// Periodic update submitter.
    pub submitter: Arc<UpdateSubmitter<S, T>>,
    /// Recent-state recovery.
    pub recovery: Arc<StateRecovery<L>>,
}

impl<S, P, T, L> AppState<S, P, T, L> {
    /// Bundles the handlers.
    #[must_use]
    pub fn new(
        advancer: UpdateAdvancer<S, P>,
        submitter: UpdateSubmitter<S, T>,
        recovery: StateRecovery<L>,
    ) -> Self {
        Self {
            advancer: Arc::new(advancer),
            submitter: Arc::new(submitter),
            recovery: Arc::new(recovery),
        }
    }
}

impl<S, P, T, L> Clone for AppState<S, P, T, L> {
    fn clone(&self) -> Self {
        Self {
            advancer: Arc::clone(&self.advancer),
            submitter: Arc::clone(&self.submitter),
            recovery: Arc::clone(&self.recovery),
        }
    }
}

/// Builds the HTTP router.
pub fn build_router<S, P, T, L>(state: AppState<S, P, T, L>) -> Router
where
    S: StepStore + 'static,
    P: Publisher + 'static,
    T: TriggerRegistry + InvokePermissions + 'static,
    L: StateLog + 'static,
{
    Router::new()
        .route("/mcsu/{mci}", post(routes::manual_update::<S, P, T, L>))
        .route("/psu/{mci}", post(routes::submit_periodic::<S, P, T, L>))
        .route("/msr/{mci}", post(routes::recover_state::<S, P, T, L>))
        .route("/health", get(routes::health))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

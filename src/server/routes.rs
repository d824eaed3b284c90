// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Route handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::ParseError;
use crate::handler::{Delivery, PeriodicSubmission};
use crate::protocol::Publisher;
use crate::state_log::StateLog;
use crate::store::StepStore;
use crate::trigger::{InvokePermissions, TriggerRegistry};
use crate::types::{Mci, StateReport, StateUpdateMessage};

use super::{ApiError, AppState};

fn parse_body<B: DeserializeOwned>(body: &Bytes) -> Result<B, ApiError> {
    let parsed = serde_json::from_slice(body).map_err(ParseError::from)?;
    Ok(parsed)
}

pub(super) async fn manual_update<S, P, T, L>(
    State(state): State<AppState<S, P, T, L>>,
    Path(mci): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError>
where
    S: StepStore + 'static,
    P: Publisher + 'static,
    T: TriggerRegistry + InvokePermissions + 'static,
    L: StateLog + 'static,
{
    let mci = Mci::new(mci)?;
    let message: StateUpdateMessage = parse_body(&body)?;
    let delivery = state
        .advancer
        .publish_manual(&mci, &message.state_update)
        .await?;
    Ok(Json(json!({
        "published": matches!(delivery, Delivery::Published { .. }),
    })))
}

pub(super) async fn submit_periodic<S, P, T, L>(
    State(state): State<AppState<S, P, T, L>>,
    Path(mci): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError>
where
    S: StepStore + 'static,
    P: Publisher + 'static,
    T: TriggerRegistry + InvokePermissions + 'static,
    L: StateLog + 'static,
{
    let mci = Mci::new(mci)?;
    let submission: PeriodicSubmission = parse_body(&body)?;
    let submitted = state.submitter.submit(&mci, &submission).await?;
    Ok(Json(json!({ "order_id": submitted.order_id })))
}

pub(super) async fn recover_state<S, P, T, L>(
    State(state): State<AppState<S, P, T, L>>,
    Path(mci): Path<String>,
) -> Result<Json<StateReport>, ApiError>
where
    S: StepStore + 'static,
    P: Publisher + 'static,
    T: TriggerRegistry + InvokePermissions + 'static,
    L: StateLog + 'static,
{
    let mci = Mci::new(mci)?;
    let report = state.recovery.recover(&mci).await?;
    Ok(Json(report))
}

pub(super) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The periodic update ring.
//!
//! A ring is the set of [`UpdateStep`]s submitted together under one
//! [`OrderId`](crate::types::OrderId). At most one step is current at a time;
//! each trigger firing moves the current pointer one step forward and wraps
//! back to order 1 at the end.
//!
//! ```text
//!   order 1 ──▶ order 2 ──▶ ... ──▶ order N
//!      ▲                               │
//!      └───────────────────────────────┘
//! ```
//!
//! [`plan_advance`] decides which step to deactivate and which to activate.
//! It is pure; persisting the move and publishing is the job of the
//! [`UpdateAdvancer`](crate::handler::UpdateAdvancer).

mod advance;
mod step;

pub use advance::{AdvancePlan, plan_advance};
pub use step::{StepRow, UpdateStep};

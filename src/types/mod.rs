// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by the handlers.
//!
//! Each type validates its input at construction time so the handlers only
//! ever see well-formed device identifiers, orders and schedules.
//!
//! # Types
//!
//! - [`Mci`] - Microcontroller identifier, safe to embed in a topic level
//! - [`OrderId`] / [`StepId`] - Identifiers of an update ring and of one of its steps
//! - [`StateUpdate`] / [`ComponentState`] - Component values pushed to a device
//! - [`StateReport`] - State reported back by a device
//! - [`ScheduleExpression`] - `rate(...)` or `cron(...)` trigger schedule

mod component;
mod ids;
mod mci;
mod schedule;

pub use component::{ComponentState, StateReport, StateUpdate, StateUpdateMessage, TargetSensor};
pub use ids::{OrderId, StepId};
pub use mci::Mci;
pub use schedule::{CronSchedule, RateUnit, ScheduleExpression};

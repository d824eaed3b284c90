// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The four handlers of the sync control loop.
//!
//! ```text
//! UpdateSubmitter ──▶ steps + rule ──▶ trigger fires ──▶ UpdateAdvancer
//!                                                            │ publish /{mci}/mcsu
//!                                                            ▼
//! StateRecovery ◀── state log ◀── LiveStateListener ◀── device /{mci}/tms
//! ```
//!
//! Each handler is generic over the collaborator traits it talks to, so the
//! same code runs against the in-process collaborators and real services.

mod advancer;
mod listener;
mod recovery;
mod submitter;

pub use advancer::{AdvanceOutcome, Delivery, UpdateAdvancer};
pub use listener::LiveStateListener;
pub use recovery::{DEFAULT_RECOVERY_WINDOW, StateRecovery};
pub use submitter::{PeriodicStep, PeriodicSubmission, Submitted, UpdateSubmitter};

// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persistence of update steps.
//!
//! The [`StepStore`] trait is the seam to the document store holding the
//! update rings. [`MemoryStepStore`] keeps rows in process and is what the
//! service binary runs with.
//!
//! Advancing a ring is one conditional write: [`StepStore::move_current`] only
//! applies when the ring's current step is still the one the caller read, so
//! two invocations advancing the same ring cannot both succeed.

mod memory;

pub use memory::MemoryStepStore;

use std::future::Future;

use crate::error::StoreError;
use crate::ring::UpdateStep;
use crate::types::{OrderId, StepId};

/// Storage of update steps keyed by step identifier.
pub trait StepStore: Send + Sync {
    /// Writes all steps in one bulk operation.
    ///
    /// Either every step is written or none is.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateStep` if a step identifier is already
    /// stored, or another `StoreError` if the store fails.
    fn insert_batch(
        &self,
        steps: &[UpdateStep],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Loads every step of a ring, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Corrupt` if a row cannot be decoded, or another
    /// `StoreError` if the store fails.
    fn steps_for_order(
        &self,
        order_id: &OrderId,
    ) -> impl Future<Output = Result<Vec<UpdateStep>, StoreError>> + Send;

    /// Makes `to` the only current step of the ring in one atomic write.
    ///
    /// The write is conditional on the state the caller read: `from` must
    /// still be current, or, when `from` is `None`, no step of the ring may
    /// be current. `from` and `to` may be the same step.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConditionFailed` when the condition does not
    /// hold, `StoreError::StepNotFound` when a step is not part of the ring,
    /// or another `StoreError` if the store fails.
    fn move_current(
        &self,
        order_id: &OrderId,
        from: Option<&StepId>,
        to: &StepId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes every step of a ring and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store fails.
    fn delete_order(
        &self,
        order_id: &OrderId,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;
}

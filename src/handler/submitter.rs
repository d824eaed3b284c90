// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic update submission.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ScheduleError, ValueError};
use crate::ring::UpdateStep;
use crate::store::StepStore;
use crate::trigger::{InvokePermissions, RuleName, TriggerBinding, TriggerRegistry};
use crate::types::{Mci, OrderId, ScheduleExpression, StateUpdate};

/// One step of a periodic submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicStep {
    /// Position within the ring, starting at 1.
    pub order: u32,
    /// Components published when the step becomes current.
    pub state_update: StateUpdate,
}

/// A batch of steps to cycle through on a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicSubmission {
    /// The steps of the ring.
    pub psu: Vec<PeriodicStep>,
    /// How often the ring advances.
    pub schedule_expression: ScheduleExpression,
}

impl PeriodicSubmission {
    /// Checks the step orders.
    ///
    /// # Errors
    ///
    /// Returns `ValueError` if there are no steps, an order is 0, an order
    /// appears twice, or no step has order 1.
    pub fn validate(&self) -> Result<(), ValueError> {
        if self.psu.is_empty() {
            return Err(ValueError::EmptyBatch);
        }

        let mut seen = HashSet::with_capacity(self.psu.len());
        for step in &self.psu {
            if step.order == 0 {
                return Err(ValueError::InvalidOrder(step.order));
            }
            if !seen.insert(step.order) {
                return Err(ValueError::DuplicateOrder(step.order));
            }
        }

        if seen.contains(&1) {
            Ok(())
        } else {
            Err(ValueError::MissingFirstOrder)
        }
    }
}

/// A ring that was stored and scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submitted {
    /// Identifier shared by the ring's steps.
    pub order_id: OrderId,
    /// Rule driving the ring.
    #[serde(skip)]
    pub rule: RuleName,
    /// Number of steps stored.
    #[serde(skip)]
    pub steps: usize,
}

/// Stores periodic update rings and schedules their advancement.
///
/// Submission writes every step in one batch, then registers the rule, its
/// target and the invoke permission. If any trigger call fails, the batch and
/// the rule are removed again before the error is returned.
#[derive(Debug, Clone)]
pub struct UpdateSubmitter<S, T> {
    store: S,
    triggers: T,
    binding: TriggerBinding,
}

impl<S, T> UpdateSubmitter<S, T>
where
    S: StepStore,
    T: TriggerRegistry + InvokePermissions,
{
    /// Creates a submitter.
    #[must_use]
    pub fn new(store: S, triggers: T, binding: TriggerBinding) -> Self {
        Self {
            store,
            triggers,
            binding,
        }
    }

    /// Returns the trigger binding.
    #[must_use]
    pub fn binding(&self) -> &TriggerBinding {
        &self.binding
    }

    /// Stores a ring for `mci` and schedules it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Value` for an invalid submission, `Error::Store` if the
    /// steps cannot be written, or `Error::Schedule` if the trigger cannot be
    /// registered. In the last case no step of the ring is left behind.
    pub async fn submit(&self, mci: &Mci, submission: &PeriodicSubmission) -> Result<Submitted, Error> {
        submission.validate()?;

        let order_id = OrderId::new();
        let steps: Vec<UpdateStep> = submission
            .psu
            .iter()
            .map(|step| UpdateStep::new(mci.clone(), order_id, step.order, step.state_update.clone()))
            .collect();

        self.store.insert_batch(&steps).await.inspect_err(|e| {
            tracing::error!(mci = %mci, order_id = %order_id, error = %e, "Failed to store ring");
        })?;

        let rule = RuleName::for_order(&order_id);
        if let Err(e) = self.schedule(&rule, &submission.schedule_expression).await {
            tracing::error!(
                mci = %mci,
                order_id = %order_id,
                rule = %rule,
                error = %e,
                "Failed to schedule ring, rolling back"
            );
            self.roll_back(&order_id, &rule, &e).await;
            return Err(e.into());
        }

        tracing::info!(
            mci = %mci,
            order_id = %order_id,
            steps = steps.len(),
            schedule = %submission.schedule_expression,
            "Periodic update submitted"
        );

        Ok(Submitted {
            order_id,
            rule,
            steps: steps.len(),
        })
    }

    async fn schedule(&self, rule: &RuleName, schedule: &ScheduleExpression) -> Result<(), ScheduleError> {
        self.triggers.put_rule(rule, schedule).await?;
        self.triggers
            .put_target(rule, &self.binding.advancer_target())
            .await?;
        self.triggers
            .add_permission(&self.binding.invoke_grant(rule))
            .await
    }

    async fn roll_back(&self, order_id: &OrderId, rule: &RuleName, cause: &ScheduleError) {
        match self.store.delete_order(order_id).await {
            Ok(removed) => {
                tracing::debug!(order_id = %order_id, removed, "Removed steps of unscheduled ring");
            }
            Err(e) => {
                tracing::error!(
                    order_id = %order_id,
                    error = %e,
                    cause = %cause,
                    "Rollback failed to remove steps"
                );
            }
        }

        match self.triggers.delete_rule(rule).await {
            Ok(()) | Err(ScheduleError::RuleNotFound(_)) => {}
            Err(e) => {
                tracing::error!(
                    rule = %rule,
                    error = %e,
                    cause = %cause,
                    "Rollback failed to delete rule"
                );
            }
        }
    }
}

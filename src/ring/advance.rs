// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ring advance planning.

use crate::error::Error;
use crate::types::OrderId;

use super::UpdateStep;

/// Which step to deactivate and which to activate on one advance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvancePlan<'a> {
    /// The step currently active, if any. It must be switched off.
    pub outgoing: Option<&'a UpdateStep>,
    /// The step to switch on and publish.
    pub target: &'a UpdateStep,
}

impl AdvancePlan<'_> {
    /// Returns true when the ring wrapped back to order 1 or started fresh.
    #[must_use]
    pub fn restarts(&self) -> bool {
        self.outgoing
            .is_none_or(|current| self.target.order != current.order.saturating_add(1))
    }
}

/// Plans the next advance of a ring.
///
/// The target is the step following the current one (`order + 1`). When no
/// step is current, or no step carries exactly `order + 1`, the ring restarts
/// at order 1. Gaps in the numbering are not skipped over: a ring numbered
/// 1, 2, 4 cycles through 1 and 2 only.
///
/// A one-step ring plans itself as both outgoing and target.
///
/// # Errors
///
/// Returns `Error::RingWithoutStart` when a restart is needed and no step has
/// order 1 (this includes an empty ring).
///
/// # Examples
///
/// ```
/// use mcsync::ring::{UpdateStep, plan_advance};
/// use mcsync::types::{Mci, OrderId, StateUpdate};
///
/// let mci = Mci::new("esp32").unwrap();
/// let order_id = OrderId::new();
/// let mut steps: Vec<UpdateStep> = (1..=3)
///     .map(|order| UpdateStep::new(mci.clone(), order_id, order, StateUpdate::new()))
///     .collect();
///
/// // Fresh ring starts at order 1
/// let plan = plan_advance(&order_id, &steps).unwrap();
/// assert!(plan.outgoing.is_none());
/// assert_eq!(plan.target.order, 1);
///
/// // Last step wraps around
/// steps[2].is_current = true;
/// let plan = plan_advance(&order_id, &steps).unwrap();
/// assert_eq!(plan.outgoing.map(|s| s.order), Some(3));
/// assert_eq!(plan.target.order, 1);
/// ```
pub fn plan_advance<'a>(
    order_id: &OrderId,
    steps: &'a [UpdateStep],
) -> Result<AdvancePlan<'a>, Error> {
    let mut current_steps = steps.iter().filter(|step| step.is_current);
    // With a broken invariant the last current row in scan order wins
    let outgoing = current_steps.next_back();
    let extra_current = current_steps.count();
    if extra_current > 0 {
        tracing::warn!(
            order_id = %order_id,
            current = extra_current + 1,
            "Ring has more than one current step"
        );
    }

    let next = outgoing.and_then(|current| {
        let next_order = current.order.checked_add(1)?;
        steps.iter().find(|step| step.order == next_order)
    });

    let target = match next {
        Some(step) => step,
        None => steps
            .iter()
            .find(|step| step.order == 1)
            .ok_or(Error::RingWithoutStart {
                order_id: *order_id,
                steps: steps.len(),
            })?,
    };

    Ok(AdvancePlan { outgoing, target })
}

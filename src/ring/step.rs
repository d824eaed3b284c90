// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Update steps and their persisted row form.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::types::{Mci, OrderId, StateUpdate, StepId};

/// One entry of a device's update ring.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStep {
    /// Unique step identifier.
    pub id: StepId,
    /// Device the step is published to.
    pub mci: Mci,
    /// Ring the step belongs to.
    pub order_id: OrderId,
    /// 1-based position within the ring.
    pub order: u32,
    /// Components published when the step becomes current.
    pub state_update: StateUpdate,
    /// Whether this is the ring's active step.
    pub is_current: bool,
}

impl UpdateStep {
    /// Creates a new, non-current step with a fresh identifier.
    #[must_use]
    pub fn new(mci: Mci, order_id: OrderId, order: u32, state_update: StateUpdate) -> Self {
        Self {
            id: StepId::new(),
            mci,
            order_id,
            order,
            state_update,
            is_current: false,
        }
    }

    /// Encodes the step into its persisted row form.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Json` if the state update cannot be serialized.
    pub fn to_row(&self) -> Result<StepRow, ParseError> {
        Ok(StepRow {
            id: self.id,
            mci: self.mci.to_string(),
            order_id: self.order_id,
            order: self.order,
            is_current: self.is_current,
            state_update: serde_json::to_string(&self.state_update)?,
        })
    }
}

/// Persisted form of an [`UpdateStep`].
///
/// The state update is stored as serialized JSON text, as a document store
/// keeps it in a single string attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRow {
    /// Primary key.
    pub id: StepId,
    /// Device identifier.
    pub mci: String,
    /// Ring identifier.
    pub order_id: OrderId,
    /// Position within the ring.
    pub order: u32,
    /// Current flag.
    pub is_current: bool,
    /// Serialized [`StateUpdate`].
    pub state_update: String,
}

impl TryFrom<&StepRow> for UpdateStep {
    type Error = ParseError;

    fn try_from(row: &StepRow) -> Result<Self, Self::Error> {
        let mci = Mci::new(row.mci.as_str()).map_err(|e| ParseError::InvalidValue {
            field: "mci".to_string(),
            message: e.to_string(),
        })?;
        let state_update = serde_json::from_str(&row.state_update)?;
        Ok(Self {
            id: row.id,
            mci,
            order_id: row.order_id,
            order: row.order,
            state_update,
            is_current: row.is_current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComponentState;

    fn fan_step(order: u32, value: u8) -> UpdateStep {
        UpdateStep::new(
            Mci::new("esp32").unwrap(),
            OrderId::new(),
            order,
            StateUpdate::new().with_component(ComponentState::new("fan", value)),
        )
    }

    #[test]
    fn new_step_is_not_current() {
        let step = fan_step(1, 1);
        assert!(!step.is_current);
        assert_eq!(step.order, 1);
    }

    #[test]
    fn row_stores_state_update_as_text() {
        let step = fan_step(2, 0);
        let row = step.to_row().unwrap();
        assert_eq!(row.state_update, r#"{"components":[{"component":"fan","value":0}]}"#);
        assert_eq!(row.mci, "esp32");

        let decoded = UpdateStep::try_from(&row).unwrap();
        assert_eq!(decoded, step);
    }

    #[test]
    fn corrupt_state_update_fails_to_decode() {
        let mut row = fan_step(1, 1).to_row().unwrap();
        row.state_update = "{not json".to_string();
        assert!(matches!(
            UpdateStep::try_from(&row),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn invalid_mci_fails_to_decode() {
        let mut row = fan_step(1, 1).to_row().unwrap();
        row.mci = "a/b".to_string();
        assert!(matches!(
            UpdateStep::try_from(&row),
            Err(ParseError::InvalidValue { ref field, .. }) if field == "mci"
        ));
    }
}

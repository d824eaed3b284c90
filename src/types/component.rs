// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Component state payloads exchanged with devices.
//!
//! Values keep their JSON number representation, so an integer submitted as
//! `1` is published as `1` and not `1.0`.

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// The value of a single device component (relay, fan, valve...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    /// Component name as known by the device firmware.
    pub component: String,
    /// Requested or reported value.
    pub value: Number,
}

impl ComponentState {
    /// Creates a component state.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcsync::types::ComponentState;
    ///
    /// let fan = ComponentState::new("fan", 1);
    /// assert_eq!(fan.value.as_i64(), Some(1));
    /// ```
    #[must_use]
    pub fn new(component: impl Into<String>, value: impl Into<Number>) -> Self {
        Self {
            component: component.into(),
            value: value.into(),
        }
    }
}

/// An ordered set of component values applied together.
///
/// # Examples
///
/// ```
/// use mcsync::types::{ComponentState, StateUpdate};
///
/// let update = StateUpdate::new()
///     .with_component(ComponentState::new("fan", 1))
///     .with_component(ComponentState::new("pump", 0));
/// assert_eq!(update.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Component values, in application order.
    pub components: Vec<ComponentState>,
}

impl StateUpdate {
    /// Creates an empty state update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a component value.
    #[must_use]
    pub fn with_component(mut self, component: ComponentState) -> Self {
        self.components.push(component);
        self
    }

    /// Returns true when no component is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns the number of component values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }
}

impl FromIterator<ComponentState> for StateUpdate {
    fn from_iter<I: IntoIterator<Item = ComponentState>>(iter: I) -> Self {
        Self {
            components: iter.into_iter().collect(),
        }
    }
}

/// Message published on a device's `/{mci}/mcsu` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdateMessage {
    /// The components the device must apply.
    pub state_update: StateUpdate,
}

/// A sensor reading reported by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSensor {
    /// Sensor name.
    pub sensor: String,
    /// Measured value.
    pub value: Number,
}

/// The state a device reports on its `/{mci}/tms` topic.
///
/// `current_state` has the same shape as a [`StateUpdate`]: the components as
/// the device applied them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateReport {
    /// Sensor readings.
    pub target_sensors: Vec<TargetSensor>,
    /// Applied component values.
    pub current_state: StateUpdate,
}

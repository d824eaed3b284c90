// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device topic layout and topic filter matching.
//!
//! Every device owns two topics rooted at its identifier:
//!
//! ```text
//! /{mci}/mcsu   ← state updates pushed to the device
//! /{mci}/tms    → state reports published by the device
//! ```
//!
//! The live-state listener subscribes to [`STATE_REPORT_FILTER`] and receives
//! the reports of every device.

use crate::types::Mci;

/// Channel carrying state updates to a device.
pub const STATE_UPDATE_CHANNEL: &str = "mcsu";

/// Channel carrying state reports from a device.
pub const STATE_REPORT_CHANNEL: &str = "tms";

/// Filter matching the state reports of all devices.
pub const STATE_REPORT_FILTER: &str = "/+/tms";

/// Returns the topic a device listens to for state updates.
///
/// # Examples
///
/// ```
/// use mcsync::topic;
/// use mcsync::types::Mci;
///
/// let mci = Mci::new("esp32").unwrap();
/// assert_eq!(topic::state_update_topic(&mci), "/esp32/mcsu");
/// ```
#[must_use]
pub fn state_update_topic(mci: &Mci) -> String {
    format!("/{mci}/{STATE_UPDATE_CHANNEL}")
}

/// Returns the topic a device publishes its state reports to.
#[must_use]
pub fn state_report_topic(mci: &Mci) -> String {
    format!("/{mci}/{STATE_REPORT_CHANNEL}")
}

/// Returns true if `topic` matches the MQTT topic `filter`.
///
/// `+` matches exactly one level and `#` matches any number of trailing
/// levels, including none.
///
/// # Examples
///
/// ```
/// use mcsync::topic::matches;
///
/// assert!(matches("/+/tms", "/esp32/tms"));
/// assert!(!matches("/+/tms", "/esp32/mcsu"));
/// assert!(matches("/esp32/#", "/esp32/tms"));
/// ```
#[must_use]
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Returns true if `filter` is a well-formed MQTT topic filter.
///
/// Wildcards must occupy a whole level and `#` may only be the last level.
#[must_use]
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() || filter.contains('\0') {
        return false;
    }
    let levels: Vec<&str> = filter.split('/').collect();
    levels.iter().enumerate().all(|(index, level)| match *level {
        "#" => index == levels.len() - 1,
        "+" => true,
        other => !other.contains(['+', '#']),
    })
}

/// Parsed device topic components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTopic<'a> {
    /// The device identifier level.
    pub mci: &'a str,
    /// The channel level (`mcsu`, `tms`).
    pub channel: &'a str,
}

impl<'a> DeviceTopic<'a> {
    /// Parses a device topic.
    ///
    /// Expected format: `/{mci}/{channel}`
    #[must_use]
    pub fn parse(topic: &'a str) -> Option<Self> {
        let parts: Vec<&str> = topic.split('/').collect();
        match parts.as_slice() {
            ["", mci, channel] if !mci.is_empty() && !channel.is_empty() => Some(Self {
                mci: *mci,
                channel: *channel,
            }),
            _ => None,
        }
    }

    /// Returns true for a state report topic.
    #[must_use]
    pub fn is_state_report(&self) -> bool {
        self.channel == STATE_REPORT_CHANNEL
    }
}

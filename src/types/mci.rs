// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Microcontroller identifier type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Identifier of a remote microcontroller (MCI).
///
/// The identifier becomes one level of the device's broker topics
/// (`/{mci}/mcsu`, `/{mci}/tms`), so it must be non-empty and must not contain
/// the topic separator or wildcard characters.
///
/// # Examples
///
/// ```
/// use mcsync::types::Mci;
///
/// let mci = Mci::new("greenhouse-01").unwrap();
/// assert_eq!(mci.as_str(), "greenhouse-01");
///
/// assert!(Mci::new("").is_err());
/// assert!(Mci::new("a/b").is_err());
/// assert!(Mci::new("+").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mci(String);

impl Mci {
    /// Creates a validated device identifier.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::EmptyMci` for an empty string and
    /// `ValueError::InvalidMci` if the identifier contains `/`, `+`, `#` or
    /// leading/trailing whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, ValueError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValueError::EmptyMci);
        }
        let has_reserved = value.contains(['/', '+', '#', '\0']);
        if has_reserved || value.trim() != value {
            return Err(ValueError::InvalidMci(value));
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mci {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Mci {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Mci {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Mci> for String {
    fn from(mci: Mci) -> Self {
        mci.0
    }
}

impl AsRef<str> for Mci {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recurring triggers that drive the update advancer.
//!
//! Registering a periodic update takes three calls, mirroring how a managed
//! scheduler wires a rule to a function:
//!
//! 1. [`TriggerRegistry::put_rule`] creates the rule `rule-order-id_{order_id}`
//!    with its schedule expression
//! 2. [`TriggerRegistry::put_target`] attaches the advancer as the rule's target
//! 3. [`InvokePermissions::add_permission`] allows the rule to invoke the advancer
//!
//! Each firing delivers a [`TriggerEvent`] whose resource identifier encodes
//! the order id.
//!
//! [`LocalTriggers`] implements both traits on top of tokio timers.

mod local;

pub use local::LocalTriggers;

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ParseError, ScheduleError};
use crate::types::{OrderId, ScheduleExpression};

/// Principal that scheduled rules invoke functions as.
pub const SCHEDULER_PRINCIPAL: &str = "events.amazonaws.com";

/// Action granted to a rule on its target.
pub const INVOKE_ACTION: &str = "lambda:InvokeFunction";

/// Name of the rule driving one ring.
///
/// # Examples
///
/// ```
/// use mcsync::trigger::RuleName;
/// use mcsync::types::OrderId;
///
/// let order_id = OrderId::new();
/// let rule = RuleName::for_order(&order_id);
/// assert!(rule.as_str().starts_with("rule-order-id_"));
/// assert_eq!(rule.order_id().unwrap(), order_id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleName(String);

impl RuleName {
    /// Prefix shared by every rule name.
    pub const PREFIX: &'static str = "rule-order-id_";

    /// Returns the rule name for a ring.
    #[must_use]
    pub fn for_order(order_id: &OrderId) -> Self {
        Self(format!("{}{order_id}", Self::PREFIX))
    }

    /// Parses a rule name.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::UnexpectedFormat` if the name lacks the rule prefix,
    /// or `ParseError::InvalidValue` if the order id is not a UUID.
    pub fn parse(name: &str) -> Result<Self, ParseError> {
        let rule = Self(name.to_string());
        rule.order_id()?;
        Ok(rule)
    }

    /// Extracts the order id encoded in the rule name.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::UnexpectedFormat` if the name lacks the rule prefix,
    /// or `ParseError::InvalidValue` if the order id is not a UUID.
    pub fn order_id(&self) -> Result<OrderId, ParseError> {
        self.0
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| {
                ParseError::UnexpectedFormat(format!("rule name {:?} lacks {}", self.0, Self::PREFIX))
            })?
            .parse()
    }

    /// Returns the rule name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where rules live and what they invoke.
///
/// The rule ARN prefix and the advancer ARN are deployment constants; the
/// submitter uses them to target the advancer and to scope permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerBinding {
    rule_arn_prefix: String,
    advancer_arn: String,
}

impl TriggerBinding {
    /// Default rule ARN prefix for the local trigger engine.
    pub const DEFAULT_RULE_ARN_PREFIX: &'static str = "arn:local:events:rule";
    /// Default advancer ARN for the local trigger engine.
    pub const DEFAULT_ADVANCER_ARN: &'static str = "arn:local:function:mcsu-advancer";

    /// Creates a binding.
    #[must_use]
    pub fn new(rule_arn_prefix: impl Into<String>, advancer_arn: impl Into<String>) -> Self {
        Self {
            rule_arn_prefix: rule_arn_prefix.into().trim_end_matches('/').to_string(),
            advancer_arn: advancer_arn.into(),
        }
    }

    /// Returns the full ARN of a rule.
    #[must_use]
    pub fn rule_arn(&self, rule: &RuleName) -> String {
        format!("{}/{rule}", self.rule_arn_prefix)
    }

    /// Returns the rule ARN prefix.
    #[must_use]
    pub fn rule_arn_prefix(&self) -> &str {
        &self.rule_arn_prefix
    }

    /// Returns the advancer ARN.
    #[must_use]
    pub fn advancer_arn(&self) -> &str {
        &self.advancer_arn
    }

    /// Builds a fresh invocation target for the advancer.
    #[must_use]
    pub fn advancer_target(&self) -> InvocationTarget {
        InvocationTarget {
            id: Uuid::new_v4().to_string(),
            arn: self.advancer_arn.clone(),
        }
    }

    /// Builds the grant allowing `rule` to invoke the advancer.
    #[must_use]
    pub fn invoke_grant(&self, rule: &RuleName) -> PermissionGrant {
        PermissionGrant {
            statement_id: Uuid::new_v4().to_string(),
            action: INVOKE_ACTION.to_string(),
            function_arn: self.advancer_arn.clone(),
            principal: SCHEDULER_PRINCIPAL.to_string(),
            source_arn: self.rule_arn(rule),
        }
    }
}

impl Default for TriggerBinding {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RULE_ARN_PREFIX, Self::DEFAULT_ADVANCER_ARN)
    }
}

/// A function a rule invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationTarget {
    /// Target identifier, unique within the rule.
    pub id: String,
    /// ARN of the invoked function.
    pub arn: String,
}

/// Permission for a principal to invoke a function from a given source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    /// Statement identifier.
    pub statement_id: String,
    /// Granted action.
    pub action: String,
    /// ARN of the function that may be invoked.
    pub function_arn: String,
    /// Principal allowed to invoke.
    pub principal: String,
    /// ARN of the rule the invocation must come from.
    pub source_arn: String,
}

impl PermissionGrant {
    /// Returns true if the grant allows `source_arn` to invoke `function_arn`.
    #[must_use]
    pub fn allows(&self, function_arn: &str, source_arn: &str) -> bool {
        self.action == INVOKE_ACTION
            && self.function_arn == function_arn
            && self.source_arn == source_arn
    }
}

/// Payload of one trigger firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// When the trigger fired.
    pub time: DateTime<Utc>,
    /// ARNs of the rules that fired; the first one identifies the ring.
    pub resources: Vec<String>,
}

impl TriggerEvent {
    /// Creates an event for a firing of `rule_arn`.
    #[must_use]
    pub fn new(rule_arn: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            resources: vec![rule_arn.into()],
        }
    }

    /// Extracts the ring identifier from the first resource.
    ///
    /// The resource has the form `<prefix>/rule-order-id_<order_id>`.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::MissingField` without resources, or a
    /// `ParseError` if the resource does not name a ring rule.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcsync::trigger::TriggerEvent;
    ///
    /// let event = TriggerEvent::new(
    ///     "arn:aws:events:eu-west-1:123456789012:rule/rule-order-id_a1a2a3a4-b1b2-c1c2-d1d2-d3d4d5d6d7d8",
    /// );
    /// let order_id = event.order_id().unwrap();
    /// assert_eq!(order_id.to_string(), "a1a2a3a4-b1b2-c1c2-d1d2-d3d4d5d6d7d8");
    /// ```
    pub fn order_id(&self) -> Result<OrderId, ParseError> {
        let resource = self
            .resources
            .first()
            .ok_or_else(|| ParseError::MissingField("resources".to_string()))?;
        let (_, rule) = resource.rsplit_once('/').ok_or_else(|| {
            ParseError::UnexpectedFormat(format!("resource {resource:?} does not name a rule"))
        })?;
        RuleName::parse(rule)?.order_id()
    }
}

/// Scheduler holding recurring rules.
pub trait TriggerRegistry: Send + Sync {
    /// Creates (or replaces) a rule firing on `schedule`.
    ///
    /// # Errors
    ///
    /// Returns a `ScheduleError` if the rule cannot be created.
    fn put_rule(
        &self,
        rule: &RuleName,
        schedule: &ScheduleExpression,
    ) -> impl Future<Output = Result<(), ScheduleError>> + Send;

    /// Sets the function a rule invokes.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::RuleNotFound` for an unknown rule, or another
    /// `ScheduleError` if the target cannot be attached.
    fn put_target(
        &self,
        rule: &RuleName,
        target: &InvocationTarget,
    ) -> impl Future<Output = Result<(), ScheduleError>> + Send;

    /// Deletes a rule and its target.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::RuleNotFound` for an unknown rule, or another
    /// `ScheduleError` if the rule cannot be deleted.
    fn delete_rule(&self, rule: &RuleName) -> impl Future<Output = Result<(), ScheduleError>> + Send;
}

/// Permission service controlling which sources may invoke a function.
pub trait InvokePermissions: Send + Sync {
    /// Adds a permission statement.
    ///
    /// # Errors
    ///
    /// Returns a `ScheduleError` if the statement cannot be added.
    fn add_permission(
        &self,
        grant: &PermissionGrant,
    ) -> impl Future<Output = Result<(), ScheduleError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_name_round_trip() {
        let order_id = OrderId::new();
        let rule = RuleName::for_order(&order_id);
        assert_eq!(rule.to_string(), format!("rule-order-id_{order_id}"));
        assert_eq!(RuleName::parse(rule.as_str()).unwrap(), rule);
    }

    #[test]
    fn rule_name_rejects_foreign_names() {
        assert!(matches!(
            RuleName::parse("nightly-backup"),
            Err(ParseError::UnexpectedFormat(_))
        ));
        assert!(matches!(
            RuleName::parse("rule-order-id_123"),
            Err(ParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn binding_builds_rule_arn() {
        let binding = TriggerBinding::new("arn:aws:events:eu-west-1:1:rule/", "arn:fn");
        let rule = RuleName::for_order(&OrderId::new());
        assert_eq!(
            binding.rule_arn(&rule),
            format!("arn:aws:events:eu-west-1:1:rule/{rule}")
        );
    }

    #[test]
    fn grant_allows_only_its_source() {
        let binding = TriggerBinding::default();
        let rule = RuleName::for_order(&OrderId::new());
        let other = RuleName::for_order(&OrderId::new());
        let grant = binding.invoke_grant(&rule);

        assert_eq!(grant.principal, SCHEDULER_PRINCIPAL);
        assert!(grant.allows(binding.advancer_arn(), &binding.rule_arn(&rule)));
        assert!(!grant.allows(binding.advancer_arn(), &binding.rule_arn(&other)));
        assert!(!grant.allows("arn:other", &binding.rule_arn(&rule)));
    }

    #[test]
    fn targets_get_unique_ids() {
        let binding = TriggerBinding::default();
        assert_ne!(binding.advancer_target().id, binding.advancer_target().id);
    }

    #[test]
    fn event_order_id_from_binding_arn() {
        let binding = TriggerBinding::default();
        let order_id = OrderId::new();
        let event = TriggerEvent::new(binding.rule_arn(&RuleName::for_order(&order_id)));
        assert_eq!(event.order_id().unwrap(), order_id);
    }

    #[test]
    fn event_without_resources() {
        let event = TriggerEvent {
            time: Utc::now(),
            resources: Vec::new(),
        };
        assert!(matches!(event.order_id(), Err(ParseError::MissingField(_))));
    }

    #[test]
    fn event_with_malformed_resource() {
        assert!(TriggerEvent::new("no-slash-here").order_id().is_err());
        assert!(TriggerEvent::new("arn:x:rule/other-rule").order_id().is_err());
    }
}

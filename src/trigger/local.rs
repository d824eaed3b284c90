// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process trigger engine backed by tokio timers.
//!
//! ```text
//! put_rule ─▶ RuleEntry ─▶ put_target ─▶ spawned timer task
//!                                              │ due
//!                                 permission? ─┤
//!                                              ▼
//!                           mpsc::Sender<TriggerEvent> ─▶ dispatcher
//! ```
//!
//! Timer tasks hold a weak reference to the engine, so dropping the last
//! [`LocalTriggers`] handle stops every rule.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::ScheduleError;
use crate::types::ScheduleExpression;

use super::{
    InvocationTarget, InvokePermissions, PermissionGrant, RuleName, TriggerBinding, TriggerEvent,
    TriggerRegistry,
};

/// Capacity of the trigger event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Trigger engine running rules as tokio timer tasks.
///
/// Both `rate(...)` and `cron(...)` schedules are driven; cron fields are
/// evaluated in UTC. A rule fires only once it has a target and the target
/// function granted the rule permission to invoke it.
///
/// # Examples
///
/// ```no_run
/// use mcsync::trigger::{InvokePermissions, LocalTriggers, RuleName, TriggerBinding, TriggerRegistry};
/// use mcsync::types::OrderId;
///
/// # async fn example() -> mcsync::Result<()> {
/// let binding = TriggerBinding::default();
/// let (triggers, mut events) = LocalTriggers::new(&binding);
///
/// let rule = RuleName::for_order(&OrderId::new());
/// triggers.put_rule(&rule, &"rate(5 minutes)".parse()?).await?;
/// triggers.put_target(&rule, &binding.advancer_target()).await?;
/// triggers.add_permission(&binding.invoke_grant(&rule)).await?;
///
/// while let Some(event) = events.recv().await {
///     println!("advance {}", event.order_id()?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalTriggers {
    inner: Arc<Inner>,
}

struct Inner {
    binding: TriggerBinding,
    rules: Mutex<HashMap<RuleName, RuleEntry>>,
    grants: RwLock<Vec<PermissionGrant>>,
    events: mpsc::Sender<TriggerEvent>,
}

struct RuleEntry {
    schedule: ScheduleExpression,
    target: Option<InvocationTarget>,
    task: Option<JoinHandle<()>>,
}

impl RuleEntry {
    fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl LocalTriggers {
    /// Creates an engine and the receiver its rules deliver events to.
    #[must_use]
    pub fn new(binding: &TriggerBinding) -> (Self, mpsc::Receiver<TriggerEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Inner {
            binding: binding.clone(),
            rules: Mutex::new(HashMap::new()),
            grants: RwLock::new(Vec::new()),
            events,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Returns the number of registered rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.inner.rules.lock().len()
    }

    /// Returns true if the rule is registered.
    #[must_use]
    pub fn has_rule(&self, rule: &RuleName) -> bool {
        self.inner.rules.lock().contains_key(rule)
    }

    /// Returns true if the rule has a target and its timer is running.
    #[must_use]
    pub fn is_armed(&self, rule: &RuleName) -> bool {
        self.inner
            .rules
            .lock()
            .get(rule)
            .is_some_and(|entry| entry.task.is_some())
    }

    /// Returns the number of permission statements.
    #[must_use]
    pub fn grant_count(&self) -> usize {
        self.inner.grants.read().len()
    }

    fn arm(
        &self,
        rule: &RuleName,
        schedule: &ScheduleExpression,
        target: &InvocationTarget,
    ) -> JoinHandle<()> {
        let rule_arn = self.inner.binding.rule_arn(rule);
        tracing::debug!(
            rule = %rule,
            target = %target.arn,
            schedule = %schedule,
            "Arming rule"
        );
        tokio::spawn(run_rule(
            Arc::downgrade(&self.inner),
            rule_arn,
            target.arn.clone(),
            schedule.clone(),
        ))
    }
}

impl Inner {
    fn permits(&self, function_arn: &str, source_arn: &str) -> bool {
        self.grants
            .read()
            .iter()
            .any(|grant| grant.allows(function_arn, source_arn))
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for entry in self.rules.get_mut().values_mut() {
            entry.disarm();
        }
    }
}

impl std::fmt::Debug for LocalTriggers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTriggers")
            .field("rule_arn_prefix", &self.inner.binding.rule_arn_prefix())
            .field("rules", &self.rule_count())
            .field("grants", &self.grant_count())
            .finish()
    }
}

/// Maps the tokio clock onto wall-clock time from a fixed anchor.
///
/// Deadlines are tokio instants, so paused test time drives cron schedules
/// the same way it drives rates.
#[derive(Debug, Clone, Copy)]
struct Clock {
    instant: Instant,
    wall: DateTime<Utc>,
}

impl Clock {
    fn start() -> Self {
        Self {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.instant.elapsed())
            .ok()
            .and_then(|elapsed| self.wall.checked_add_signed(elapsed))
            .unwrap_or(self.wall)
    }

    fn deadline(&self, at: DateTime<Utc>) -> Instant {
        let ahead = (at - self.wall).to_std().unwrap_or(Duration::ZERO);
        self.instant + ahead
    }
}

/// Fires a rule on its schedule until the engine or the dispatcher is gone.
///
/// A late firing is not caught up: the next one is computed from the time
/// the rule actually fired.
async fn run_rule(
    inner: Weak<Inner>,
    rule_arn: String,
    target_arn: String,
    schedule: ScheduleExpression,
) {
    let clock = Clock::start();

    loop {
        let Some(next) = schedule.next_after(&clock.now()) else {
            tracing::info!(rule = %rule_arn, schedule = %schedule, "Schedule has no further firings");
            break;
        };
        tokio::time::sleep_until(clock.deadline(next)).await;

        let events = {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            if !inner.permits(&target_arn, &rule_arn) {
                tracing::warn!(
                    rule = %rule_arn,
                    target = %target_arn,
                    "Rule fired without permission to invoke its target"
                );
                continue;
            }
            inner.events.clone()
        };

        tracing::debug!(rule = %rule_arn, "Rule fired");
        if events.send(TriggerEvent::new(rule_arn.clone())).await.is_err() {
            tracing::debug!(rule = %rule_arn, "Trigger dispatcher closed, stopping rule");
            break;
        }
    }
}

impl TriggerRegistry for LocalTriggers {
    async fn put_rule(
        &self,
        rule: &RuleName,
        schedule: &ScheduleExpression,
    ) -> Result<(), ScheduleError> {
        let mut rules = self.inner.rules.lock();
        match rules.get_mut(rule) {
            Some(entry) => {
                entry.disarm();
                entry.schedule = schedule.clone();
                if let Some(target) = entry.target.clone() {
                    entry.task = Some(self.arm(rule, schedule, &target));
                }
            }
            None => {
                rules.insert(
                    rule.clone(),
                    RuleEntry {
                        schedule: schedule.clone(),
                        target: None,
                        task: None,
                    },
                );
            }
        }

        tracing::info!(rule = %rule, schedule = %schedule, "Rule registered");
        Ok(())
    }

    async fn put_target(&self, rule: &RuleName, target: &InvocationTarget) -> Result<(), ScheduleError> {
        let mut rules = self.inner.rules.lock();
        let entry = rules
            .get_mut(rule)
            .ok_or_else(|| ScheduleError::RuleNotFound(rule.to_string()))?;

        entry.disarm();
        entry.target = Some(target.clone());
        entry.task = Some(self.arm(rule, &entry.schedule, target));
        Ok(())
    }

    async fn delete_rule(&self, rule: &RuleName) -> Result<(), ScheduleError> {
        let mut entry = self
            .inner
            .rules
            .lock()
            .remove(rule)
            .ok_or_else(|| ScheduleError::RuleNotFound(rule.to_string()))?;
        entry.disarm();

        let rule_arn = self.inner.binding.rule_arn(rule);
        self.inner
            .grants
            .write()
            .retain(|grant| grant.source_arn != rule_arn);

        tracing::info!(rule = %rule, "Rule deleted");
        Ok(())
    }
}

impl InvokePermissions for LocalTriggers {
    async fn add_permission(&self, grant: &PermissionGrant) -> Result<(), ScheduleError> {
        let mut grants = self.inner.grants.write();
        if grants
            .iter()
            .any(|existing| existing.statement_id == grant.statement_id)
        {
            return Err(ScheduleError::PermissionDenied(format!(
                "statement {} already exists",
                grant.statement_id
            )));
        }
        grants.push(grant.clone());
        tracing::debug!(
            statement = %grant.statement_id,
            source = %grant.source_arn,
            function = %grant.function_arn,
            "Permission added"
        );
        Ok(())
    }
}

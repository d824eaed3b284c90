// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests of the sync loop on the in-process collaborators.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use mcsync::error::{Error, ScheduleError};
use mcsync::handler::{
    LiveStateListener, PeriodicStep, PeriodicSubmission, StateRecovery, UpdateAdvancer,
    UpdateSubmitter,
};
use mcsync::protocol::{LoopbackBroker, Publisher};
use mcsync::state_log::MemoryStateLog;
use mcsync::store::{MemoryStepStore, StepStore};
use mcsync::topic::STATE_REPORT_FILTER;
use mcsync::trigger::{
    InvocationTarget, InvokePermissions, LocalTriggers, PermissionGrant, RuleName, TriggerBinding,
    TriggerRegistry,
};
use mcsync::types::{ComponentState, Mci, ScheduleExpression, StateUpdate};

fn fan_step(order: u32, value: i64) -> PeriodicStep {
    PeriodicStep {
        order,
        state_update: StateUpdate::new().with_component(ComponentState::new("fan", value)),
    }
}

fn fan_submission() -> PeriodicSubmission {
    PeriodicSubmission {
        psu: vec![fan_step(1, 1), fan_step(2, 0)],
        schedule_expression: "rate(1 minute)".parse().unwrap(),
    }
}

fn fan_value(payload: &[u8]) -> i64 {
    let message: Value = serde_json::from_slice(payload).unwrap();
    message["state_update"]["components"][0]["value"]
        .as_i64()
        .unwrap()
}

// ============================================================================
// Scheduled Advancement
// ============================================================================

mod scheduled {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fan_ring_follows_the_schedule() {
        let store = MemoryStepStore::new();
        let broker = LoopbackBroker::new();
        let binding = TriggerBinding::default();
        let (triggers, events) = LocalTriggers::new(&binding);

        let advancer = UpdateAdvancer::new(store.clone(), broker.clone());
        tokio::spawn(async move { advancer.run(events).await });

        let mut updates = broker.subscribe("/esp32/mcsu").unwrap();
        let submitter = UpdateSubmitter::new(store.clone(), triggers, binding);
        let submitted = submitter
            .submit(&Mci::new("esp32").unwrap(), &fan_submission())
            .await
            .unwrap();

        let mut values = Vec::new();
        for _ in 0..3 {
            let message = updates.recv().await.unwrap();
            values.push(fan_value(&message.payload));
        }
        assert_eq!(values, vec![1, 0, 1]);

        let steps = store.steps_for_order(&submitted.order_id).await.unwrap();
        let current: Vec<u32> = steps
            .iter()
            .filter(|step| step.is_current)
            .map(|step| step.order)
            .collect();
        assert_eq!(current, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn rings_advance_independently() {
        let store = MemoryStepStore::new();
        let broker = LoopbackBroker::new();
        let binding = TriggerBinding::default();
        let (triggers, events) = LocalTriggers::new(&binding);

        let advancer = UpdateAdvancer::new(store.clone(), broker.clone());
        tokio::spawn(async move { advancer.run(events).await });

        let mut a_updates = broker.subscribe("/node-a/mcsu").unwrap();
        let mut b_updates = broker.subscribe("/node-b/mcsu").unwrap();
        let submitter = UpdateSubmitter::new(store.clone(), triggers, binding);
        submitter
            .submit(&Mci::new("node-a").unwrap(), &fan_submission())
            .await
            .unwrap();
        let slow = PeriodicSubmission {
            psu: vec![fan_step(1, 7)],
            schedule_expression: "rate(1 hour)".parse().unwrap(),
        };
        submitter
            .submit(&Mci::new("node-b").unwrap(), &slow)
            .await
            .unwrap();

        for _ in 0..3 {
            a_updates.recv().await.unwrap();
        }
        assert!(b_updates.try_recv().is_err());

        let message = b_updates.recv().await.unwrap();
        assert_eq!(fan_value(&message.payload), 7);
    }
}

// ============================================================================
// Submission Rollback
// ============================================================================

mod rollback {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Stage {
        Rule,
        Target,
        Permission,
    }

    /// Trigger service failing at one stage and recording what it was asked.
    #[derive(Clone)]
    struct FailingTriggers {
        fail_at: Stage,
        rules: Arc<Mutex<Vec<RuleName>>>,
        deleted: Arc<Mutex<Vec<RuleName>>>,
    }

    impl FailingTriggers {
        fn new(fail_at: Stage) -> Self {
            Self {
                fail_at,
                rules: Arc::default(),
                deleted: Arc::default(),
            }
        }

        fn check(&self, stage: Stage) -> Result<(), ScheduleError> {
            if self.fail_at == stage {
                Err(ScheduleError::Unavailable(format!("{stage:?} refused")))
            } else {
                Ok(())
            }
        }
    }

    impl TriggerRegistry for FailingTriggers {
        async fn put_rule(
            &self,
            rule: &RuleName,
            _schedule: &ScheduleExpression,
        ) -> Result<(), ScheduleError> {
            self.check(Stage::Rule)?;
            self.rules.lock().push(rule.clone());
            Ok(())
        }

        async fn put_target(
            &self,
            _rule: &RuleName,
            _target: &InvocationTarget,
        ) -> Result<(), ScheduleError> {
            self.check(Stage::Target)
        }

        async fn delete_rule(&self, rule: &RuleName) -> Result<(), ScheduleError> {
            let mut rules = self.rules.lock();
            let before = rules.len();
            rules.retain(|existing| existing != rule);
            if rules.len() == before {
                return Err(ScheduleError::RuleNotFound(rule.to_string()));
            }
            self.deleted.lock().push(rule.clone());
            Ok(())
        }
    }

    impl InvokePermissions for FailingTriggers {
        async fn add_permission(&self, _grant: &PermissionGrant) -> Result<(), ScheduleError> {
            self.check(Stage::Permission)
        }
    }

    async fn submit_with(stage: Stage) -> (MemoryStepStore, FailingTriggers, Error) {
        let store = MemoryStepStore::new();
        let triggers = FailingTriggers::new(stage);
        let submitter =
            UpdateSubmitter::new(store.clone(), triggers.clone(), TriggerBinding::default());

        let err = submitter
            .submit(&Mci::new("esp32").unwrap(), &fan_submission())
            .await
            .unwrap_err();
        (store, triggers, err)
    }

    #[tokio::test]
    async fn failed_rule_leaves_no_rows() {
        let (store, triggers, err) = submit_with(Stage::Rule).await;
        assert!(matches!(err, Error::Schedule(ScheduleError::Unavailable(_))));
        assert!(store.is_empty());
        assert!(triggers.deleted.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_target_removes_rows_and_rule() {
        let (store, triggers, err) = submit_with(Stage::Target).await;
        assert!(matches!(err, Error::Schedule(_)));
        assert!(store.is_empty());
        assert!(triggers.rules.lock().is_empty());
        assert_eq!(triggers.deleted.lock().len(), 1);
    }

    #[tokio::test]
    async fn failed_permission_removes_rows_and_rule() {
        let (store, triggers, err) = submit_with(Stage::Permission).await;
        assert!(matches!(err, Error::Schedule(_)));
        assert!(store.is_empty());
        assert!(triggers.rules.lock().is_empty());

        let deleted = triggers.deleted.lock();
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].as_str().starts_with(RuleName::PREFIX));
    }

    #[tokio::test]
    async fn other_rings_survive_a_rollback() {
        let store = MemoryStepStore::new();
        let mci = Mci::new("esp32").unwrap();

        let binding = TriggerBinding::default();
        let (triggers, _events) = LocalTriggers::new(&binding);
        let healthy = UpdateSubmitter::new(store.clone(), triggers, binding);
        let kept = healthy.submit(&mci, &fan_submission()).await.unwrap();

        let failing = UpdateSubmitter::new(
            store.clone(),
            FailingTriggers::new(Stage::Permission),
            TriggerBinding::default(),
        );
        assert!(failing.submit(&mci, &fan_submission()).await.is_err());

        assert_eq!(store.len(), 2);
        assert_eq!(store.steps_for_order(&kept.order_id).await.unwrap().len(), 2);
    }
}

// ============================================================================
// Live State and Recovery
// ============================================================================

mod live_state {
    use super::*;

    #[tokio::test]
    async fn reported_state_is_recovered() {
        let broker = LoopbackBroker::new();
        let log = MemoryStateLog::new();
        let listener = LiveStateListener::new(log.clone());
        let reports = broker.subscribe(STATE_REPORT_FILTER).unwrap();
        let recorder = tokio::spawn(async move { listener.run(reports).await });

        let report = json!({
            "target_sensors": [{"sensor": "temp", "value": 22}],
            "current_state": {"components": [{"component": "fan", "value": 0}]}
        });
        broker
            .publish("/esp32/tms", serde_json::to_vec(&report).unwrap())
            .await
            .unwrap();
        broker
            .publish("/esp32/mcsu", b"ignored".to_vec())
            .await
            .unwrap();

        let recovery = StateRecovery::new(log.clone());
        let mci = Mci::new("esp32").unwrap();
        let mut recovered = None;
        for _ in 0..50 {
            if let Ok(state) = recovery.recover(&mci).await {
                recovered = Some(state);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let state = recovered.expect("report recorded");
        assert_eq!(state.current_state.components[0].value.as_i64(), Some(0));
        assert_eq!(log.len(), 1);
        recorder.abort();
    }

    #[tokio::test]
    async fn report_bursts_are_recorded_in_full() {
        let broker = LoopbackBroker::new();
        let log = MemoryStateLog::new();
        let listener = LiveStateListener::new(log.clone());
        let reports = broker.subscribe(STATE_REPORT_FILTER).unwrap();
        let recorder = tokio::spawn(async move { listener.run(reports).await });

        let burst = 1_000;
        for n in 0..burst {
            let report = json!({
                "target_sensors": [],
                "current_state": {"components": [{"component": "fan", "value": n}]}
            });
            broker
                .publish(&format!("/node-{}/tms", n % 50), serde_json::to_vec(&report).unwrap())
                .await
                .unwrap();
        }

        for _ in 0..100 {
            if log.len() == burst {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(log.len(), burst);
        recorder.abort();
    }
}

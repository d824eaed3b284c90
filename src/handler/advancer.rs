// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ring advancement and state update delivery.

use tokio::sync::mpsc;

use crate::error::{Error, ParseError, StoreError};
use crate::protocol::Publisher;
use crate::ring::plan_advance;
use crate::store::StepStore;
use crate::topic;
use crate::trigger::TriggerEvent;
use crate::types::{Mci, OrderId, StateUpdate, StateUpdateMessage, StepId};

/// What happened to the state update of an activated step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The update was published on the device topic.
    Published {
        /// Topic the update was published to.
        topic: String,
    },
    /// The update had no components; nothing was published.
    Skipped,
}

/// Result of one advance of a ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The ring moved to a new current step.
    Advanced {
        /// The step that is now current.
        step: StepId,
        /// Its order within the ring.
        order: u32,
        /// Whether its update was published.
        delivery: Delivery,
    },
    /// A concurrent invocation moved the ring first; nothing was published.
    Superseded,
}

impl AdvanceOutcome {
    /// Returns the order of the activated step, if the ring advanced.
    #[must_use]
    pub fn order(&self) -> Option<u32> {
        match self {
            Self::Advanced { order, .. } => Some(*order),
            Self::Superseded => None,
        }
    }

    /// Returns true if an update was published.
    #[must_use]
    pub fn published(&self) -> bool {
        matches!(
            self,
            Self::Advanced {
                delivery: Delivery::Published { .. },
                ..
            }
        )
    }
}

enum Commit {
    Done,
    LostRace,
    Failed,
}

/// Moves a ring's current pointer and publishes the activated step.
///
/// # Examples
///
/// ```
/// use mcsync::handler::UpdateAdvancer;
/// use mcsync::protocol::LoopbackBroker;
/// use mcsync::ring::UpdateStep;
/// use mcsync::store::{MemoryStepStore, StepStore};
/// use mcsync::types::{ComponentState, Mci, OrderId, StateUpdate};
///
/// # async fn example() -> mcsync::Result<()> {
/// let store = MemoryStepStore::new();
/// let broker = LoopbackBroker::new();
/// let advancer = UpdateAdvancer::new(store.clone(), broker.clone());
///
/// let mci = Mci::new("esp32")?;
/// let order_id = OrderId::new();
/// let update = StateUpdate::new().with_component(ComponentState::new("fan", 1));
/// store.insert_batch(&[UpdateStep::new(mci, order_id, 1, update)]).await?;
///
/// let outcome = advancer.advance(&order_id).await?;
/// assert_eq!(outcome.order(), Some(1));
/// assert_eq!(broker.published_to("/esp32/mcsu").len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct UpdateAdvancer<S, P> {
    store: S,
    publisher: P,
}

impl<S, P> UpdateAdvancer<S, P>
where
    S: StepStore,
    P: Publisher,
{
    /// Creates an advancer over a step store and a publisher.
    #[must_use]
    pub fn new(store: S, publisher: P) -> Self {
        Self { store, publisher }
    }

    /// Returns the step store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the publisher.
    #[must_use]
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Advances the ring named by a trigger firing.
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` if the event does not name a ring rule, or any
    /// error of [`advance`](Self::advance).
    pub async fn handle_trigger(&self, event: &TriggerEvent) -> Result<AdvanceOutcome, Error> {
        let order_id = event.order_id().inspect_err(|e| {
            tracing::warn!(resources = ?event.resources, error = %e, "Dropping malformed trigger event");
        })?;
        self.advance(&order_id).await
    }

    /// Advances rings as trigger events arrive, until the channel closes.
    ///
    /// Events are handled one at a time. Failures are logged and the event
    /// is dropped.
    pub async fn run(&self, mut events: mpsc::Receiver<TriggerEvent>) {
        while let Some(event) = events.recv().await {
            match self.handle_trigger(&event).await {
                Ok(AdvanceOutcome::Superseded) => {
                    tracing::debug!(resources = ?event.resources, "Trigger superseded");
                }
                Ok(AdvanceOutcome::Advanced { .. }) => {}
                Err(e) => {
                    tracing::error!(resources = ?event.resources, error = %e, "Trigger invocation failed");
                }
            }
        }
        tracing::debug!("Trigger channel closed");
    }

    /// Advances a ring by one step.
    ///
    /// The outgoing step is switched off and the next one switched on in one
    /// conditional write. Losing the condition to a concurrent invocation
    /// yields [`AdvanceOutcome::Superseded`]. Other storage failures of the
    /// write are logged and the update is still published.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the ring cannot be loaded,
    /// `Error::RingWithoutStart` if the ring has no step to activate, or
    /// `Error::Broker` if publishing fails.
    pub async fn advance(&self, order_id: &OrderId) -> Result<AdvanceOutcome, Error> {
        let steps = self.store.steps_for_order(order_id).await?;
        let plan = plan_advance(order_id, &steps).inspect_err(|e| {
            tracing::error!(order_id = %order_id, error = %e, "Cannot advance ring");
        })?;

        let target = plan.target;
        tracing::debug!(
            order_id = %order_id,
            from = ?plan.outgoing.map(|step| step.order),
            to = target.order,
            restart = plan.restarts(),
            "Advancing ring"
        );

        let outgoing = plan.outgoing.map(|step| &step.id);
        match self.commit(order_id, outgoing, &target.id).await {
            Commit::LostRace => return Ok(AdvanceOutcome::Superseded),
            Commit::Done | Commit::Failed => {}
        }

        let delivery = self.deliver(&target.mci, &target.state_update).await?;
        tracing::info!(
            order_id = %order_id,
            mci = %target.mci,
            order = target.order,
            published = matches!(delivery, Delivery::Published { .. }),
            "Ring advanced"
        );

        Ok(AdvanceOutcome::Advanced {
            step: target.id,
            order: target.order,
            delivery,
        })
    }

    /// Publishes a state update to a device without touching any ring.
    ///
    /// An update without components publishes nothing.
    ///
    /// # Errors
    ///
    /// Returns `Error::Broker` if publishing fails.
    pub async fn publish_manual(&self, mci: &Mci, update: &StateUpdate) -> Result<Delivery, Error> {
        let delivery = self.deliver(mci, update).await?;
        tracing::info!(
            mci = %mci,
            components = update.len(),
            published = matches!(delivery, Delivery::Published { .. }),
            "Manual state update"
        );
        Ok(delivery)
    }

    async fn commit(&self, order_id: &OrderId, from: Option<&StepId>, to: &StepId) -> Commit {
        match self.store.move_current(order_id, from, to).await {
            Ok(()) => Commit::Done,
            Err(StoreError::ConditionFailed { id, expected }) => {
                tracing::info!(
                    order_id = %order_id,
                    step = %id,
                    expected_current = expected,
                    "Ring was advanced concurrently, standing down"
                );
                Commit::LostRace
            }
            Err(e) => {
                tracing::error!(
                    order_id = %order_id,
                    to = %to,
                    error = %e,
                    "Failed to persist current step, publishing anyway"
                );
                Commit::Failed
            }
        }
    }

    async fn deliver(&self, mci: &Mci, update: &StateUpdate) -> Result<Delivery, Error> {
        if update.is_empty() {
            tracing::debug!(mci = %mci, "State update has no components, nothing to publish");
            return Ok(Delivery::Skipped);
        }

        let topic = topic::state_update_topic(mci);
        let message = StateUpdateMessage {
            state_update: update.clone(),
        };
        let payload = serde_json::to_vec(&message).map_err(ParseError::from)?;
        self.publisher.publish(&topic, payload).await?;

        tracing::debug!(topic = %topic, components = update.len(), "Published state update");
        Ok(Delivery::Published { topic })
    }
}

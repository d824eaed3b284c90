// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory step store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::ring::{StepRow, UpdateStep};
use crate::types::{OrderId, StepId};

use super::StepStore;

/// Step store keeping rows in process memory.
///
/// Rows are held in their persisted [`StepRow`] form, so every read decodes
/// the serialized state update just as a remote document store would require.
/// The store is cheaply cloneable; clones share the same rows.
///
/// # Examples
///
/// ```
/// use mcsync::ring::UpdateStep;
/// use mcsync::store::{MemoryStepStore, StepStore};
/// use mcsync::types::{Mci, OrderId, StateUpdate};
///
/// # async fn example() -> mcsync::Result<()> {
/// let store = MemoryStepStore::new();
/// let order_id = OrderId::new();
/// let step = UpdateStep::new(Mci::new("esp32")?, order_id, 1, StateUpdate::new());
///
/// store.insert_batch(&[step.clone()]).await?;
/// store.move_current(&order_id, None, &step.id).await?;
///
/// let steps = store.steps_for_order(&order_id).await?;
/// assert!(steps[0].is_current);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStepStore {
    rows: Arc<RwLock<HashMap<StepId, StepRow>>>,
}

impl MemoryStepStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if no row is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl StepStore for MemoryStepStore {
    async fn insert_batch(&self, steps: &[UpdateStep]) -> Result<(), StoreError> {
        let encoded = steps
            .iter()
            .map(|step| {
                step.to_row().map_err(|source| StoreError::Corrupt {
                    id: step.id,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = self.rows.write();
        let mut seen = std::collections::HashSet::with_capacity(encoded.len());
        for row in &encoded {
            if rows.contains_key(&row.id) || !seen.insert(row.id) {
                return Err(StoreError::DuplicateStep(row.id));
            }
        }
        for row in encoded {
            rows.insert(row.id, row);
        }

        tracing::debug!(count = steps.len(), "Inserted step batch");
        Ok(())
    }

    async fn steps_for_order(&self, order_id: &OrderId) -> Result<Vec<UpdateStep>, StoreError> {
        let rows = self.rows.read();
        rows.values()
            .filter(|row| row.order_id == *order_id)
            .map(|row| {
                UpdateStep::try_from(row).map_err(|source| StoreError::Corrupt {
                    id: row.id,
                    source,
                })
            })
            .collect()
    }

    async fn move_current(
        &self,
        order_id: &OrderId,
        from: Option<&StepId>,
        to: &StepId,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let in_ring = |id: &StepId| {
            rows.get(id)
                .filter(|row| row.order_id == *order_id)
                .ok_or(StoreError::StepNotFound(*id))
        };

        in_ring(to)?;
        match from {
            Some(from) => {
                if !in_ring(from)?.is_current {
                    return Err(StoreError::ConditionFailed {
                        id: *from,
                        expected: true,
                    });
                }
            }
            None => {
                if let Some(row) = rows
                    .values()
                    .find(|row| row.order_id == *order_id && row.is_current)
                {
                    return Err(StoreError::ConditionFailed {
                        id: row.id,
                        expected: false,
                    });
                }
            }
        }

        // Clears every other current row, not just `from`
        for row in rows.values_mut().filter(|row| row.order_id == *order_id) {
            row.is_current = row.id == *to;
        }
        Ok(())
    }

    async fn delete_order(&self, order_id: &OrderId) -> Result<usize, StoreError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|_, row| row.order_id != *order_id);
        Ok(before - rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComponentState, Mci, StateUpdate};

    fn batch(order_id: OrderId, count: u32) -> Vec<UpdateStep> {
        let mci = Mci::new("esp32").unwrap();
        (1..=count)
            .map(|order| {
                UpdateStep::new(
                    mci.clone(),
                    order_id,
                    order,
                    StateUpdate::new().with_component(ComponentState::new("fan", order)),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn insert_and_load_by_order() {
        let store = MemoryStepStore::new();
        let order_a = OrderId::new();
        let order_b = OrderId::new();
        store.insert_batch(&batch(order_a, 3)).await.unwrap();
        store.insert_batch(&batch(order_b, 2)).await.unwrap();

        assert_eq!(store.len(), 5);
        let mut steps = store.steps_for_order(&order_a).await.unwrap();
        steps.sort_by_key(|s| s.order);
        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(|s| s.order_id == order_a && !s.is_current));
        assert_eq!(steps[2].state_update.components[0].value.as_u64(), Some(3));
    }

    #[tokio::test]
    async fn duplicate_batch_writes_nothing() {
        let store = MemoryStepStore::new();
        let order_id = OrderId::new();
        let steps = batch(order_id, 2);
        store.insert_batch(&steps[..1]).await.unwrap();

        let err = store.insert_batch(&steps).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateStep(id) if id == steps[0].id));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_within_batch_is_rejected() {
        let store = MemoryStepStore::new();
        let steps = batch(OrderId::new(), 1);
        let doubled = vec![steps[0].clone(), steps[0].clone()];
        assert!(store.insert_batch(&doubled).await.is_err());
        assert!(store.is_empty());
    }

    async fn current_orders(store: &MemoryStepStore, order_id: &OrderId) -> Vec<u32> {
        let mut current: Vec<u32> = store
            .steps_for_order(order_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|step| step.is_current)
            .map(|step| step.order)
            .collect();
        current.sort_unstable();
        current
    }

    #[tokio::test]
    async fn move_current_is_conditional() {
        let store = MemoryStepStore::new();
        let order_id = OrderId::new();
        let steps = batch(order_id, 2);
        store.insert_batch(&steps).await.unwrap();
        let (first, second) = (steps[0].id, steps[1].id);

        store.move_current(&order_id, None, &first).await.unwrap();
        assert_eq!(current_orders(&store, &order_id).await, vec![1]);

        // A second bootstrap read the ring before the first one wrote it
        let err = store.move_current(&order_id, None, &first).await.unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed { id, expected: false } if id == first));

        store.move_current(&order_id, Some(&first), &second).await.unwrap();
        assert_eq!(current_orders(&store, &order_id).await, vec![2]);

        let err = store
            .move_current(&order_id, Some(&first), &second)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed { id, expected: true } if id == first));
        assert_eq!(current_orders(&store, &order_id).await, vec![2]);
    }

    #[tokio::test]
    async fn move_current_onto_itself() {
        let store = MemoryStepStore::new();
        let order_id = OrderId::new();
        let steps = batch(order_id, 1);
        store.insert_batch(&steps).await.unwrap();
        let only = steps[0].id;

        store.move_current(&order_id, None, &only).await.unwrap();
        store.move_current(&order_id, Some(&only), &only).await.unwrap();
        assert_eq!(current_orders(&store, &order_id).await, vec![1]);
    }

    #[tokio::test]
    async fn move_current_clears_extra_current_rows() {
        let store = MemoryStepStore::new();
        let order_id = OrderId::new();
        let steps = batch(order_id, 3);
        store.insert_batch(&steps).await.unwrap();
        for step in &steps[..2] {
            store.rows.write().get_mut(&step.id).unwrap().is_current = true;
        }

        store
            .move_current(&order_id, Some(&steps[1].id), &steps[2].id)
            .await
            .unwrap();
        assert_eq!(current_orders(&store, &order_id).await, vec![3]);
    }

    #[tokio::test]
    async fn move_current_rejects_steps_outside_the_ring() {
        let store = MemoryStepStore::new();
        let order_id = OrderId::new();
        let other = batch(OrderId::new(), 1);
        store.insert_batch(&batch(order_id, 1)).await.unwrap();
        store.insert_batch(&other).await.unwrap();

        let err = store
            .move_current(&order_id, None, &other[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StepNotFound(id) if id == other[0].id));

        let missing = StepId::new();
        let err = store.move_current(&order_id, None, &missing).await.unwrap_err();
        assert!(matches!(err, StoreError::StepNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn delete_order_only_removes_that_ring() {
        let store = MemoryStepStore::new();
        let keep = OrderId::new();
        let discard = OrderId::new();
        store.insert_batch(&batch(keep, 2)).await.unwrap();
        store.insert_batch(&batch(discard, 3)).await.unwrap();

        assert_eq!(store.delete_order(&discard).await.unwrap(), 3);
        assert!(store.steps_for_order(&discard).await.unwrap().is_empty());
        assert_eq!(store.steps_for_order(&keep).await.unwrap().len(), 2);
        assert_eq!(store.delete_order(&discard).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_row_is_reported() {
        let store = MemoryStepStore::new();
        let order_id = OrderId::new();
        let steps = batch(order_id, 1);
        store.insert_batch(&steps).await.unwrap();
        store
            .rows
            .write()
            .get_mut(&steps[0].id)
            .unwrap()
            .state_update = "[".to_string();

        let err = store.steps_for_order(&order_id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { id, .. } if id == steps[0].id));
    }
}

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

use super::{
    order_not_found, return_not_found, AppliedChange, CreationClock, Page, ReturnFilter,
    ReturnStore, StatusUpdate,
};
use crate::errors::ServiceError;
use crate::models::return_record::{NewReturnRecord, ReturnRecord, ReturnStatus, StatusChange};

#[derive(Debug, Default)]
struct Inner {
    /// Kept in creation order.
    records: Vec<ReturnRecord>,
    by_id: HashMap<Uuid, usize>,
    by_order: HashMap<String, Vec<usize>>,
    history: HashMap<Uuid, Vec<StatusChange>>,
}

impl Inner {
    fn get(&self, id: Uuid) -> Result<&ReturnRecord, ServiceError> {
        self.by_id
            .get(&id)
            .map(|&idx| &self.records[idx])
            .ok_or_else(|| return_not_found(id))
    }
}

/// Process-local store. One lock guards the records and both indexes, so every
/// operation sees a consistent snapshot.
#[derive(Debug, Default)]
pub struct InMemoryReturnStore {
    inner: RwLock<Inner>,
    clock: CreationClock,
}

impl InMemoryReturnStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReturnStore for InMemoryReturnStore {
    #[instrument(skip(self, new), fields(order_id = %new.order_id))]
    async fn append(&self, new: NewReturnRecord) -> Result<ReturnRecord, ServiceError> {
        let mut inner = self.inner.write().await;
        // Timestamp under the write lock so vector order matches created_at.
        let now = self.clock.next();
        let record = ReturnRecord {
            id: Uuid::new_v4(),
            order_id: new.order_id,
            email: new.email,
            reason: new.reason,
            status: ReturnStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let idx = inner.records.len();
        inner.by_id.insert(record.id, idx);
        inner
            .by_order
            .entry(record.order_id.clone())
            .or_default()
            .push(idx);
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<ReturnRecord, ServiceError> {
        let inner = self.inner.read().await;
        inner.get(id).cloned()
    }

    async fn find_latest_by_order_id(&self, order_id: &str) -> Result<ReturnRecord, ServiceError> {
        let inner = self.inner.read().await;
        inner
            .by_order
            .get(order_id)
            .and_then(|indexes| indexes.last())
            .map(|&idx| inner.records[idx].clone())
            .ok_or_else(|| order_not_found(order_id))
    }

    async fn list(&self, filter: &ReturnFilter) -> Result<Page<ReturnRecord>, ServiceError> {
        let inner = self.inner.read().await;
        let matching = inner
            .records
            .iter()
            .filter(|r| filter.status.map_or(true, |s| r.status == s));

        let total = matching.clone().count() as u64;
        let window = matching.skip(filter.offset as usize);
        let items: Vec<ReturnRecord> = match filter.limit {
            Some(limit) => window.take(limit as usize).cloned().collect(),
            None => window.cloned().collect(),
        };

        Ok(Page {
            items,
            total,
            offset: filter.offset,
            limit: filter.limit,
        })
    }

    #[instrument(skip(self, update), fields(requested = %update.status))]
    async fn update_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
    ) -> Result<AppliedChange, ServiceError> {
        let mut inner = self.inner.write().await;
        let idx = *inner.by_id.get(&id).ok_or_else(|| return_not_found(id))?;

        let current = inner.records[idx].status;
        let next = current.transition_to(update.status)?;
        let changed_at = self.clock.next();

        let record = &mut inner.records[idx];
        record.status = next;
        record.updated_at = changed_at;
        let updated = record.clone();

        let change = StatusChange {
            id: Uuid::new_v4(),
            return_id: id,
            from_status: current,
            to_status: next,
            changed_by: update.changed_by,
            note: update.note,
            changed_at,
        };
        inner.history.entry(id).or_default().push(change.clone());

        Ok(AppliedChange {
            record: updated,
            change,
        })
    }

    async fn status_history(&self, id: Uuid) -> Result<Vec<StatusChange>, ServiceError> {
        let inner = self.inner.read().await;
        inner.get(id)?;
        Ok(inner.history.get(&id).cloned().unwrap_or_default())
    }

    async fn count_active_for_order(&self, order_id: &str) -> Result<u64, ServiceError> {
        let inner = self.inner.read().await;
        let count = inner
            .by_order
            .get(order_id)
            .map(|indexes| {
                indexes
                    .iter()
                    .filter(|&&idx| inner.records[idx].is_active())
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

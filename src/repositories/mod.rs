use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::return_record::{NewReturnRecord, ReturnRecord, ReturnStatus, StatusChange};

pub mod database_store;
pub mod memory_store;

pub use database_store::DatabaseReturnStore;
pub use memory_store::InMemoryReturnStore;

/// Filter and window for listing records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnFilter {
    pub status: Option<ReturnStatus>,
    pub offset: u64,
    /// `None` returns every matching record from `offset` on.
    pub limit: Option<u64>,
}

/// One window of an ordered listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of records matching the filter, ignoring the window.
    pub total: u64,
    pub offset: u64,
    pub limit: Option<u64>,
}

/// A requested status change together with its audit context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ReturnStatus,
    pub changed_by: Option<String>,
    pub note: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: ReturnStatus) -> Self {
        Self {
            status,
            changed_by: None,
            note: None,
        }
    }
}

/// A status change as persisted: the updated record and its audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub record: ReturnRecord,
    pub change: StatusChange,
}

/// Durable keyed storage for return records.
///
/// Implementations are internally synchronized: concurrent appends are never
/// lost and readers never observe a partially applied status change.
#[async_trait]
pub trait ReturnStore: Send + Sync {
    /// Inserts a new `Pending` record with a generated id and creation time.
    async fn append(&self, new: NewReturnRecord) -> Result<ReturnRecord, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<ReturnRecord, ServiceError>;

    /// Most recently created record for `order_id`.
    async fn find_latest_by_order_id(&self, order_id: &str) -> Result<ReturnRecord, ServiceError>;

    /// Records ordered by creation time ascending, then id.
    async fn list(&self, filter: &ReturnFilter) -> Result<Page<ReturnRecord>, ServiceError>;

    async fn list_all(&self) -> Result<Vec<ReturnRecord>, ServiceError> {
        Ok(self.list(&ReturnFilter::default()).await?.items)
    }

    /// Applies one state machine step against the current persisted status and
    /// records the change in the audit trail, atomically.
    async fn update_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
    ) -> Result<AppliedChange, ServiceError>;

    /// Status changes of a record in the order they were applied.
    async fn status_history(&self, id: Uuid) -> Result<Vec<StatusChange>, ServiceError>;

    /// Number of non-terminal records for an order.
    async fn count_active_for_order(&self, order_id: &str) -> Result<u64, ServiceError>;

    async fn ping(&self) -> Result<(), ServiceError>;

    fn backend_name(&self) -> &'static str;
}

pub type SharedReturnStore = Arc<dyn ReturnStore>;

pub(crate) fn return_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Return request {} not found", id))
}

pub(crate) fn order_not_found(order_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("No return request found for order {}", order_id))
}

/// Hands out strictly increasing creation timestamps at microsecond
/// resolution, so creation order and timestamp order agree even when the wall
/// clock stalls or steps backwards.
#[derive(Debug, Default)]
pub struct CreationClock {
    last_micros: AtomicI64,
}

impl CreationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the clock so it never hands out a value at or below `floor`.
    pub fn starting_after(floor: DateTime<Utc>) -> Self {
        Self {
            last_micros: AtomicI64::new(floor.timestamp_micros()),
        }
    }

    pub fn next(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let mut prev = self.last_micros.load(Ordering::Relaxed);
        loop {
            let candidate = if now > prev { now } else { prev + 1 };
            match self.last_micros.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return micros_to_datetime(candidate),
                Err(actual) => prev = actual,
            }
        }
    }
}

fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_clock_is_strictly_increasing() {
        let clock = CreationClock::new();
        let mut last = clock.next();
        for _ in 0..10_000 {
            let next = clock.next();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn creation_clock_respects_floor_in_the_future() {
        let floor = Utc::now() + chrono::Duration::hours(1);
        let clock = CreationClock::starting_after(floor);
        assert!(clock.next() > floor);
    }

    #[test]
    fn creation_clock_is_monotonic_across_threads() {
        let clock = Arc::new(CreationClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || (0..1_000).map(|_| clock.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let count = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), count, "timestamps must be unique");
    }
}

use async_trait::async_trait;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{
    order_not_found, return_not_found, AppliedChange, CreationClock, Page, ReturnFilter,
    ReturnStore, StatusUpdate,
};
use crate::entities::return_request::{
    ActiveModel as ReturnActiveModel, Column as ReturnColumn, Entity as ReturnRequest,
};
use crate::entities::return_status_change::{
    ActiveModel as ChangeActiveModel, Column as ChangeColumn, Entity as ReturnStatusChange,
};
use crate::errors::ServiceError;
use crate::models::return_record::{NewReturnRecord, ReturnRecord, ReturnStatus, StatusChange};

/// sea-orm backed store for SQLite and Postgres.
#[derive(Debug)]
pub struct DatabaseReturnStore {
    db: Arc<DatabaseConnection>,
    timeout: Duration,
    clock: CreationClock,
}

impl DatabaseReturnStore {
    /// Opens the store, seeding the creation clock past the newest persisted
    /// record so restarts keep `created_at` increasing.
    pub async fn open(db: Arc<DatabaseConnection>, timeout: Duration) -> Result<Self, ServiceError> {
        let newest = ReturnRequest::find()
            .order_by_desc(ReturnColumn::CreatedAt)
            .one(db.as_ref())
            .await?;

        let clock = match newest {
            Some(model) => CreationClock::starting_after(model.created_at),
            None => CreationClock::new(),
        };

        Ok(Self { db, timeout, clock })
    }

    async fn with_timeout<T, F>(&self, operation: &'static str, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Storage operation timed out"
                );
                metrics::counter!("returns.store.timeouts", 1);
                Err(ServiceError::StorageTimeout(operation.to_string()))
            }
        }
    }

    /// Error for a conditional update that matched no row, read from the
    /// record as it stands now.
    async fn rejected_transition(&self, id: Uuid, requested: ReturnStatus) -> ServiceError {
        match ReturnRequest::find_by_id(id).one(self.db.as_ref()).await {
            Ok(Some(model)) => match ReturnRecord::try_from(model) {
                Ok(record) => ServiceError::InvalidTransition {
                    current: record.status,
                    requested,
                },
                Err(err) => err,
            },
            Ok(None) => return_not_found(id),
            Err(err) => err.into(),
        }
    }

    fn active_statuses() -> Vec<&'static str> {
        ReturnStatus::iter()
            .filter(|s| !s.is_terminal())
            .map(|s| s.as_str())
            .collect()
    }
}

#[async_trait]
impl ReturnStore for DatabaseReturnStore {
    #[instrument(skip(self, new), fields(order_id = %new.order_id))]
    async fn append(&self, new: NewReturnRecord) -> Result<ReturnRecord, ServiceError> {
        self.with_timeout("append", async {
            let now = self.clock.next();
            let model = ReturnActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(new.order_id),
                email: Set(new.email),
                reason: Set(new.reason),
                status: Set(ReturnStatus::Pending.as_str().to_string()),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(self.db.as_ref())
            .await?;

            ReturnRecord::try_from(model)
        })
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<ReturnRecord, ServiceError> {
        self.with_timeout("find_by_id", async {
            let model = ReturnRequest::find_by_id(id)
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| return_not_found(id))?;
            ReturnRecord::try_from(model)
        })
        .await
    }

    async fn find_latest_by_order_id(&self, order_id: &str) -> Result<ReturnRecord, ServiceError> {
        self.with_timeout("find_latest_by_order_id", async {
            let model = ReturnRequest::find()
                .filter(ReturnColumn::OrderId.eq(order_id))
                .order_by_desc(ReturnColumn::CreatedAt)
                .order_by_desc(ReturnColumn::Id)
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| order_not_found(order_id))?;
            ReturnRecord::try_from(model)
        })
        .await
    }

    async fn list(&self, filter: &ReturnFilter) -> Result<Page<ReturnRecord>, ServiceError> {
        self.with_timeout("list", async {
            let mut query = ReturnRequest::find();
            if let Some(status) = filter.status {
                query = query.filter(ReturnColumn::Status.eq(status.as_str()));
            }

            let total = query.clone().count(self.db.as_ref()).await?;

            let mut query = query
                .order_by_asc(ReturnColumn::CreatedAt)
                .order_by_asc(ReturnColumn::Id);
            // SQLite only accepts OFFSET after a LIMIT.
            if filter.limit.is_some() || filter.offset > 0 {
                query = query
                    .limit(filter.limit.unwrap_or(i64::MAX as u64))
                    .offset(filter.offset);
            }

            let items = query
                .all(self.db.as_ref())
                .await?
                .into_iter()
                .map(ReturnRecord::try_from)
                .collect::<Result<Vec<_>, _>>()?;

            Ok::<_, ServiceError>(Page {
                items,
                total,
                offset: filter.offset,
                limit: filter.limit,
            })
        })
        .await
    }

    #[instrument(skip(self, update), fields(requested = %update.status))]
    async fn update_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
    ) -> Result<AppliedChange, ServiceError> {
        self.with_timeout("update_status", async {
            // Nothing transitions into the requested status.
            let Some(expected) = update.status.predecessor() else {
                return Err(self.rejected_transition(id, update.status).await);
            };
            let changed_at = self.clock.next();

            let txn = self.db.begin().await?;

            // The conditional write is the first statement, so the transaction
            // holds the write lock before anything is read and a concurrent
            // writer that lost the race matches no row.
            let result = ReturnRequest::update_many()
                .col_expr(ReturnColumn::Status, Expr::value(update.status.as_str()))
                .col_expr(ReturnColumn::UpdatedAt, Expr::value(changed_at))
                .filter(ReturnColumn::Id.eq(id))
                .filter(ReturnColumn::Status.eq(expected.as_str()))
                .exec(&txn)
                .await?;

            if result.rows_affected == 0 {
                txn.rollback().await?;
                return Err(self.rejected_transition(id, update.status).await);
            }

            let change = ChangeActiveModel {
                id: Set(Uuid::new_v4()),
                return_id: Set(id),
                from_status: Set(expected.as_str().to_string()),
                to_status: Set(update.status.as_str().to_string()),
                changed_by: Set(update.changed_by),
                note: Set(update.note),
                changed_at: Set(changed_at),
            }
            .insert(&txn)
            .await?;

            let model = ReturnRequest::find_by_id(id)
                .one(&txn)
                .await?
                .ok_or_else(|| return_not_found(id))?;

            txn.commit().await?;

            Ok::<_, ServiceError>(AppliedChange {
                record: ReturnRecord::try_from(model)?,
                change: StatusChange::try_from(change)?,
            })
        })
        .await
    }

    async fn status_history(&self, id: Uuid) -> Result<Vec<StatusChange>, ServiceError> {
        self.with_timeout("status_history", async {
            let parent = ReturnRequest::find_by_id(id)
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| return_not_found(id))?;

            ReturnStatusChange::find()
                .filter(ChangeColumn::ReturnId.eq(parent.id))
                .order_by_asc(ChangeColumn::ChangedAt)
                .order_by_asc(ChangeColumn::Id)
                .all(self.db.as_ref())
                .await?
                .into_iter()
                .map(StatusChange::try_from)
                .collect::<Result<Vec<_>, ServiceError>>()
        })
        .await
    }

    async fn count_active_for_order(&self, order_id: &str) -> Result<u64, ServiceError> {
        self.with_timeout("count_active_for_order", async {
            let count = ReturnRequest::find()
                .filter(ReturnColumn::OrderId.eq(order_id))
                .filter(ReturnColumn::Status.is_in(Self::active_statuses()))
                .count(self.db.as_ref())
                .await?;
            Ok::<_, ServiceError>(count)
        })
        .await
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        self.with_timeout("ping", async {
            self.db.ping().await?;
            Ok::<_, ServiceError>(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "database"
    }
}

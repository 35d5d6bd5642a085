use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::return_record::{NewReturnRecord, ReturnRecord, ReturnStatus, StatusChange},
    repositories::{AppliedChange, Page, ReturnFilter, SharedReturnStore, StatusUpdate},
};

pub const MAX_ORDER_ID_LEN: u64 = 128;
pub const MAX_EMAIL_LEN: u64 = 254;
pub const MAX_REASON_LEN: u64 = 2000;
pub const MAX_NOTE_LEN: usize = 2000;

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Customer input for a new return request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitReturnCommand {
    #[serde(default)]
    #[validate(custom = "not_blank", length(max = "MAX_ORDER_ID_LEN"))]
    #[schema(example = "A1")]
    pub order_id: String,
    #[serde(default)]
    #[validate(email, length(max = "MAX_EMAIL_LEN"))]
    #[schema(example = "x@y.com")]
    pub email: String,
    #[serde(default)]
    #[validate(custom = "not_blank", length(max = "MAX_REASON_LEN"))]
    #[schema(example = "damaged")]
    pub reason: String,
}

impl SubmitReturnCommand {
    pub fn new(
        order_id: impl Into<String>,
        email: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            email: email.into(),
            reason: reason.into(),
        }
    }

    /// Copy with surrounding whitespace removed from every field.
    pub fn normalized(&self) -> Self {
        Self {
            order_id: self.order_id.trim().to_string(),
            email: self.email.trim().to_string(),
            reason: self.reason.trim().to_string(),
        }
    }
}

impl From<SubmitReturnCommand> for NewReturnRecord {
    fn from(cmd: SubmitReturnCommand) -> Self {
        NewReturnRecord {
            order_id: cmd.order_id,
            email: cmd.email,
            reason: cmd.reason,
        }
    }
}

/// Current status of the latest return request for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusLookup {
    pub order_id: String,
    pub return_id: Uuid,
    pub status: ReturnStatus,
    pub updated_at: DateTime<Utc>,
}

impl From<&ReturnRecord> for StatusLookup {
    fn from(record: &ReturnRecord) -> Self {
        Self {
            order_id: record.order_id.clone(),
            return_id: record.id,
            status: record.status,
            updated_at: record.updated_at,
        }
    }
}

/// Admin listing parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListReturnsQuery {
    pub status: Option<ReturnStatus>,
    /// Page size, clamped to the configured maximum.
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// An admin's request to move a record to another status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub status: ReturnStatus,
    pub actor: Option<String>,
    pub note: Option<String>,
}

/// Service-level switches taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnPolicy {
    /// Reject a submission while the order already has a non-terminal record.
    pub single_active_per_order: bool,
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for ReturnPolicy {
    fn default() -> Self {
        Self {
            single_active_per_order: false,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl ReturnPolicy {
    pub fn page_limit(&self, requested: Option<u64>) -> u64 {
        let max = self.max_page_size.max(1);
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, max)
    }
}

/// Submission, status lookup and admin review of return requests.
#[derive(Clone)]
pub struct ReturnService {
    store: SharedReturnStore,
    event_sender: EventSender,
    policy: ReturnPolicy,
}

impl ReturnService {
    pub fn new(store: SharedReturnStore, event_sender: EventSender, policy: ReturnPolicy) -> Self {
        Self {
            store,
            event_sender,
            policy,
        }
    }

    /// Validates and records a new return request in `Pending`.
    #[instrument(skip(self, command))]
    pub async fn submit_return(
        &self,
        command: SubmitReturnCommand,
    ) -> Result<ReturnRecord, ServiceError> {
        let command = command.normalized();
        command.validate().map_err(|e| {
            let err = ServiceError::from(e);
            warn!(error = %err, "Rejected return submission");
            metrics::counter!("returns.submissions.rejected", 1);
            err
        })?;

        if self.policy.single_active_per_order
            && self.store.count_active_for_order(&command.order_id).await? > 0
        {
            return Err(ServiceError::Conflict(format!(
                "Order {} already has an open return request",
                command.order_id
            )));
        }

        let record = self.store.append(command.into()).await?;

        info!(return_id = %record.id, order_id = %record.order_id, "Return request submitted");
        metrics::counter!("returns.submissions.accepted", 1);
        self.event_sender.send_or_log(Event::ReturnSubmitted {
            return_id: record.id,
            order_id: record.order_id.clone(),
            created_at: record.created_at,
        });

        Ok(record)
    }

    /// Status of the most recent return request for `order_id`.
    #[instrument(skip(self))]
    pub async fn lookup_status(&self, order_id: &str) -> Result<StatusLookup, ServiceError> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(ServiceError::invalid_field("order_id"));
        }

        match self.store.find_latest_by_order_id(order_id).await {
            Ok(record) => {
                metrics::counter!("returns.lookups", 1, "result" => "hit");
                Ok(StatusLookup::from(&record))
            }
            Err(err @ ServiceError::NotFound(_)) => {
                metrics::counter!("returns.lookups", 1, "result" => "miss");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_returns(
        &self,
        query: ListReturnsQuery,
    ) -> Result<Page<ReturnRecord>, ServiceError> {
        let filter = ReturnFilter {
            status: query.status,
            offset: query.offset.unwrap_or(0),
            limit: Some(self.policy.page_limit(query.limit)),
        };
        self.store.list(&filter).await
    }

    pub async fn get_return(&self, id: Uuid) -> Result<ReturnRecord, ServiceError> {
        self.store.find_by_id(id).await
    }

    pub async fn status_history(&self, id: Uuid) -> Result<Vec<StatusChange>, ServiceError> {
        self.store.status_history(id).await
    }

    /// Moves a record one step through the state machine.
    #[instrument(skip(self, transition), fields(requested = %transition.status))]
    pub async fn transition_status(
        &self,
        id: Uuid,
        transition: StatusTransition,
    ) -> Result<ReturnRecord, ServiceError> {
        let note = transition
            .note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if note.as_ref().map_or(false, |n| n.chars().count() > MAX_NOTE_LEN) {
            return Err(ServiceError::invalid_field("note"));
        }

        let AppliedChange { record, change } = self
            .store
            .update_status(
                id,
                StatusUpdate {
                    status: transition.status,
                    changed_by: transition.actor,
                    note,
                },
            )
            .await
            .map_err(|err| {
                if let ServiceError::InvalidTransition { current, requested } = &err {
                    warn!(return_id = %id, %current, %requested, "Rejected status transition");
                }
                err
            })?;

        info!(
            return_id = %id,
            from = %change.from_status,
            to = %change.to_status,
            "Return status updated"
        );
        metrics::counter!("returns.transitions", 1, "status" => change.to_status.as_str());
        self.event_sender.send_or_log(Event::ReturnStatusChanged {
            return_id: record.id,
            order_id: record.order_id.clone(),
            from: change.from_status,
            to: change.to_status,
            changed_by: change.changed_by,
            changed_at: change.changed_at,
        });

        Ok(record)
    }

    /// Probes the backing store.
    pub async fn check_storage(&self) -> Result<(), ServiceError> {
        self.store.ping().await
    }

    pub fn storage_backend(&self) -> &'static str {
        self.store.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use crate::repositories::InMemoryReturnStore;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn service_with(policy: ReturnPolicy) -> (ReturnService, mpsc::Receiver<Event>) {
        let (sender, rx) = events::channel(64);
        let store: SharedReturnStore = Arc::new(InMemoryReturnStore::new());
        (ReturnService::new(store, sender, policy), rx)
    }

    fn service() -> (ReturnService, mpsc::Receiver<Event>) {
        service_with(ReturnPolicy::default())
    }

    fn approve() -> StatusTransition {
        StatusTransition {
            status: ReturnStatus::Approved,
            actor: Some("admin-1".into()),
            note: None,
        }
    }

    #[tokio::test]
    async fn submit_then_lookup_is_pending() {
        let (svc, mut rx) = service();
        let record = svc
            .submit_return(SubmitReturnCommand::new("A1", "x@y.com", "damaged"))
            .await
            .unwrap();
        assert_eq!(record.status, ReturnStatus::Pending);

        let lookup = svc.lookup_status("A1").await.unwrap();
        assert_eq!(lookup.status, ReturnStatus::Pending);
        assert_eq!(lookup.return_id, record.id);

        assert_matches!(rx.recv().await, Some(Event::ReturnSubmitted { return_id, .. }) if return_id == record.id);
    }

    #[tokio::test]
    async fn submission_trims_fields() {
        let (svc, _rx) = service();
        let record = svc
            .submit_return(SubmitReturnCommand::new("  A1 ", " x@y.com ", " damaged\n"))
            .await
            .unwrap();
        assert_eq!(record.order_id, "A1");
        assert_eq!(record.email, "x@y.com");
        assert_eq!(record.reason, "damaged");
    }

    #[tokio::test]
    async fn empty_reason_is_rejected_and_nothing_stored() {
        let (svc, _rx) = service();
        let err = svc
            .submit_return(SubmitReturnCommand::new("A1", "x@y.com", "   "))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(ref fields) if fields == &vec!["reason".to_string()]);

        let page = svc.list_returns(ListReturnsQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn every_invalid_field_is_named() {
        let (svc, _rx) = service();
        let err = svc
            .submit_return(SubmitReturnCommand::new("", "not-an-email", ""))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ServiceError::ValidationError(fields)
                if fields == vec!["email".to_string(), "order_id".to_string(), "reason".to_string()]
        );
    }

    #[tokio::test]
    async fn overlong_reason_is_rejected() {
        let (svc, _rx) = service();
        let reason = "x".repeat(MAX_REASON_LEN as usize + 1);
        assert_matches!(
            svc.submit_return(SubmitReturnCommand::new("A1", "x@y.com", reason))
                .await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn length_limits_apply_at_the_boundary() {
        let at_limit = SubmitReturnCommand::new(
            "o".repeat(MAX_ORDER_ID_LEN as usize),
            "x@y.com",
            "r".repeat(MAX_REASON_LEN as usize),
        );
        assert!(at_limit.validate().is_ok());

        let over = SubmitReturnCommand::new(
            "o".repeat(MAX_ORDER_ID_LEN as usize + 1),
            "x@y.com",
            "damaged",
        );
        let errors = over.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("order_id"));
    }

    #[tokio::test]
    async fn lookup_of_unknown_order_is_not_found() {
        let (svc, _rx) = service();
        assert_matches!(svc.lookup_status("nope").await, Err(ServiceError::NotFound(_)));
        assert_matches!(
            svc.lookup_status("  ").await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn approve_then_back_to_pending_fails() {
        let (svc, _rx) = service();
        let record = svc
            .submit_return(SubmitReturnCommand::new("A1", "x@y.com", "damaged"))
            .await
            .unwrap();

        let approved = svc.transition_status(record.id, approve()).await.unwrap();
        assert_eq!(approved.status, ReturnStatus::Approved);
        assert_eq!(
            svc.lookup_status("A1").await.unwrap().status,
            ReturnStatus::Approved
        );

        let err = svc
            .transition_status(
                record.id,
                StatusTransition {
                    status: ReturnStatus::Pending,
                    actor: None,
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ServiceError::InvalidTransition {
                current: ReturnStatus::Approved,
                requested: ReturnStatus::Pending,
            }
        );
        assert_eq!(svc.status_history(record.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transition_emits_event_with_actor() {
        let (svc, mut rx) = service();
        let record = svc
            .submit_return(SubmitReturnCommand::new("A1", "x@y.com", "damaged"))
            .await
            .unwrap();
        rx.recv().await.unwrap();

        svc.transition_status(record.id, approve()).await.unwrap();
        assert_matches!(
            rx.recv().await,
            Some(Event::ReturnStatusChanged {
                from: ReturnStatus::Pending,
                to: ReturnStatus::Approved,
                changed_by: Some(actor),
                ..
            }) if actor == "admin-1"
        );
    }

    #[tokio::test]
    async fn completion_event_reports_the_persisted_change() {
        let (svc, mut rx) = service();
        let record = svc
            .submit_return(SubmitReturnCommand::new("A1", "x@y.com", "damaged"))
            .await
            .unwrap();
        svc.transition_status(record.id, approve()).await.unwrap();
        let completed = svc
            .transition_status(
                record.id,
                StatusTransition {
                    status: ReturnStatus::Completed,
                    actor: Some("admin-2".into()),
                    note: None,
                },
            )
            .await
            .unwrap();

        let history = svc.status_history(record.id).await.unwrap();
        let last = history.last().unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_matches!(
            events.last(),
            Some(Event::ReturnStatusChanged {
                from: ReturnStatus::Approved,
                to: ReturnStatus::Completed,
                changed_by: Some(actor),
                changed_at,
                ..
            }) if actor == "admin-2"
                && *changed_at == last.changed_at
                && *changed_at == completed.updated_at
        );
    }

    #[tokio::test]
    async fn blank_note_is_dropped_and_long_note_rejected() {
        let (svc, _rx) = service();
        let record = svc
            .submit_return(SubmitReturnCommand::new("A1", "x@y.com", "damaged"))
            .await
            .unwrap();

        let mut transition = approve();
        transition.note = Some("x".repeat(MAX_NOTE_LEN + 1));
        assert_matches!(
            svc.transition_status(record.id, transition).await,
            Err(ServiceError::ValidationError(_))
        );

        let mut transition = approve();
        transition.note = Some("   ".into());
        svc.transition_status(record.id, transition).await.unwrap();
        let history = svc.status_history(record.id).await.unwrap();
        assert_eq!(history[0].note, None);
    }

    #[tokio::test]
    async fn single_active_policy_blocks_second_open_request() {
        let (svc, _rx) = service_with(ReturnPolicy {
            single_active_per_order: true,
            ..Default::default()
        });
        let first = svc
            .submit_return(SubmitReturnCommand::new("A1", "x@y.com", "damaged"))
            .await
            .unwrap();
        assert_matches!(
            svc.submit_return(SubmitReturnCommand::new("A1", "x@y.com", "again"))
                .await,
            Err(ServiceError::Conflict(_))
        );

        svc.transition_status(
            first.id,
            StatusTransition {
                status: ReturnStatus::Rejected,
                actor: None,
                note: None,
            },
        )
        .await
        .unwrap();
        svc.submit_return(SubmitReturnCommand::new("A1", "x@y.com", "again"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicates_allowed_by_default() {
        let (svc, _rx) = service();
        for _ in 0..3 {
            svc.submit_return(SubmitReturnCommand::new("A1", "x@y.com", "damaged"))
                .await
                .unwrap();
        }
        let page = svc.list_returns(ListReturnsQuery::default()).await.unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn listing_clamps_limit_and_filters() {
        let (svc, _rx) = service_with(ReturnPolicy {
            default_page_size: 2,
            max_page_size: 3,
            ..Default::default()
        });
        for i in 0..5 {
            svc.submit_return(SubmitReturnCommand::new(format!("O{i}"), "x@y.com", "damaged"))
                .await
                .unwrap();
        }

        let page = svc.list_returns(ListReturnsQuery::default()).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.limit, Some(2));

        let page = svc
            .list_returns(ListReturnsQuery {
                limit: Some(50),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);

        let page = svc
            .list_returns(ListReturnsQuery {
                limit: Some(0),
                offset: Some(4),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].order_id, "O4");

        let page = svc
            .list_returns(ListReturnsQuery {
                status: Some(ReturnStatus::Approved),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn page_limit_clamps_into_range() {
        let policy = ReturnPolicy::default();
        assert_eq!(policy.page_limit(None), 20);
        assert_eq!(policy.page_limit(Some(0)), 1);
        assert_eq!(policy.page_limit(Some(1_000)), 100);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::return_record::ReturnStatus;

/// Domain events emitted after a store operation has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReturnSubmitted {
        return_id: Uuid,
        order_id: String,
        created_at: DateTime<Utc>,
    },
    ReturnStatusChanged {
        return_id: Uuid,
        order_id: String,
        from: ReturnStatus,
        to: ReturnStatus,
        changed_by: Option<String>,
        changed_at: DateTime<Utc>,
    },
}

impl Event {
    pub fn return_id(&self) -> Uuid {
        match self {
            Event::ReturnSubmitted { return_id, .. }
            | Event::ReturnStatusChanged { return_id, .. } => *return_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Queues an event without waiting for capacity.
    pub fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .try_send(event)
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Queues an event, logging instead of failing when the channel is full or closed.
    pub fn send_or_log(&self, event: Event) {
        let return_id = event.return_id();
        if let Err(e) = self.send(event) {
            warn!(%return_id, error = %e, "Dropping domain event");
            metrics::counter!("returns.events.dropped", 1);
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::ReturnSubmitted {
                return_id,
                order_id,
                created_at,
            } => {
                info!(%return_id, %order_id, %created_at, "Return request submitted");
            }
            Event::ReturnStatusChanged {
                return_id,
                order_id,
                from,
                to,
                changed_by,
                ..
            } => {
                info!(
                    %return_id,
                    %order_id,
                    %from,
                    %to,
                    changed_by = changed_by.as_deref().unwrap_or("unknown"),
                    "Return request status changed"
                );
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted() -> Event {
        Event::ReturnSubmitted {
            return_id: Uuid::new_v4(),
            order_id: "A1".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn events_reach_the_receiver() {
        let (sender, mut rx) = channel(4);
        let event = submitted();
        sender.send(event.clone()).unwrap();
        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn full_channel_reports_error_without_blocking() {
        let (sender, _rx) = channel(1);
        sender.send(submitted()).unwrap();
        assert!(sender.send(submitted()).is_err());
        sender.send_or_log(submitted());
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (sender, rx) = channel(1);
        drop(rx);
        assert!(sender.send(submitted()).is_err());
    }

    #[tokio::test]
    async fn process_events_ends_when_senders_drop() {
        let (sender, rx) = channel(4);
        let handle = tokio::spawn(process_events(rx));
        sender.send_or_log(submitted());
        drop(sender);
        handle.await.unwrap();
    }
}

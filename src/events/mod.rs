use crate::entities::{lead_source::LeadSourceKind, sync_status};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

/// Row-level change, as streamed to clients on `/changes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChangeNotice {
    pub table: String,
    pub action: ChangeAction,
    pub id: Uuid,
    #[serde(skip)]
    pub branch_id: Uuid,
}

impl ChangeNotice {
    pub fn new(branch_id: Uuid, table: &str, action: ChangeAction, id: Uuid) -> Self {
        Self {
            table: table.to_string(),
            action,
            id,
            branch_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a closed channel is logged and otherwise ignored.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "event dropped");
        }
    }
}

/// Domain events raised by the services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    RowChanged(ChangeNotice),
    OrderStatusChanged {
        branch_id: Uuid,
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    InvoiceIssued {
        branch_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
    },
    PaymentRecorded {
        branch_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
    },
    LeadsImported {
        branch_id: Uuid,
        source: LeadSourceKind,
        new_count: u32,
        updated_count: u32,
    },
    SyncStatusChanged {
        branch_id: Uuid,
        status: sync_status::Model,
    },
    SessionsRevoked {
        user_id: Uuid,
        count: usize,
    },
}

impl Event {
    pub fn created(branch_id: Uuid, table: &str, id: Uuid) -> Self {
        Event::RowChanged(ChangeNotice::new(branch_id, table, ChangeAction::Created, id))
    }

    pub fn updated(branch_id: Uuid, table: &str, id: Uuid) -> Self {
        Event::RowChanged(ChangeNotice::new(branch_id, table, ChangeAction::Updated, id))
    }

    pub fn deleted(branch_id: Uuid, table: &str, id: Uuid) -> Self {
        Event::RowChanged(ChangeNotice::new(branch_id, table, ChangeAction::Deleted, id))
    }

    pub fn branch_id(&self) -> Option<Uuid> {
        match self {
            Event::RowChanged(notice) => Some(notice.branch_id),
            Event::OrderStatusChanged { branch_id, .. }
            | Event::InvoiceIssued { branch_id, .. }
            | Event::PaymentRecorded { branch_id, .. }
            | Event::LeadsImported { branch_id, .. }
            | Event::SyncStatusChanged { branch_id, .. } => Some(*branch_id),
            Event::SessionsRevoked { .. } => None,
        }
    }

    /// The row-level view of this event, if it maps to one.
    pub fn change_notice(&self) -> Option<ChangeNotice> {
        match self {
            Event::RowChanged(notice) => Some(notice.clone()),
            Event::OrderStatusChanged {
                branch_id,
                order_id,
                ..
            } => Some(ChangeNotice::new(
                *branch_id,
                "orders",
                ChangeAction::Updated,
                *order_id,
            )),
            Event::InvoiceIssued {
                branch_id,
                invoice_id,
                ..
            } => Some(ChangeNotice::new(
                *branch_id,
                "invoices",
                ChangeAction::Updated,
                *invoice_id,
            )),
            Event::PaymentRecorded {
                branch_id,
                payment_id,
                ..
            } => Some(ChangeNotice::new(
                *branch_id,
                "payments",
                ChangeAction::Created,
                *payment_id,
            )),
            Event::SyncStatusChanged { branch_id, status } => Some(ChangeNotice::new(
                *branch_id,
                "sync_status",
                ChangeAction::Updated,
                status.id,
            )),
            Event::LeadsImported { .. } | Event::SessionsRevoked { .. } => None,
        }
    }
}

/// Fan-out of branch-scoped events to live subscribers (SSE streams).
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Event>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes to current subscribers; having none is not an error.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

/// Logs every event and forwards branch-scoped ones to the change feed.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, feed: ChangeFeed) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
                ..
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::InvoiceIssued {
                invoice_id, amount, ..
            } => {
                info!(%invoice_id, %amount, "invoice issued");
            }
            Event::PaymentRecorded {
                payment_id, amount, ..
            } => {
                info!(%payment_id, %amount, "payment recorded");
            }
            Event::LeadsImported {
                branch_id,
                source,
                new_count,
                updated_count,
            } => {
                info!(%branch_id, %source, new_count, updated_count, "leads imported");
            }
            Event::SessionsRevoked { user_id, count } => {
                info!(%user_id, count, "sessions revoked");
            }
            Event::RowChanged(_) | Event::SyncStatusChanged { .. } => {
                debug!(?event, "change event");
            }
        }

        if event.branch_id().is_some() {
            feed.publish(event);
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn branch_events_reach_the_feed() {
        let (tx, rx) = mpsc::channel(8);
        let feed = ChangeFeed::new(8);
        let mut sub = feed.subscribe();
        let handle = tokio::spawn(process_events(rx, feed.clone()));

        let sender = EventSender::new(tx);
        let branch = Uuid::new_v4();
        let id = Uuid::new_v4();
        sender
            .send(Event::SessionsRevoked {
                user_id: Uuid::new_v4(),
                count: 1,
            })
            .await
            .unwrap();
        sender.send(Event::created(branch, "customers", id)).await.unwrap();

        let received = sub.recv().await.unwrap();
        let notice = received.change_notice().unwrap();
        assert_eq!(notice.table, "customers");
        assert_eq!(notice.id, id);
        assert_eq!(notice.branch_id, branch);
        assert_eq!(notice.action, ChangeAction::Created);

        drop(sender);
        handle.await.unwrap();
    }

    #[test]
    fn notice_serialises_without_branch() {
        let notice = ChangeNotice::new(Uuid::nil(), "leads", ChangeAction::Deleted, Uuid::nil());
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["action"], "deleted");
        assert!(json.get("branch_id").is_none());
    }
}

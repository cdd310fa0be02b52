//! Domain events and the in-memory notification feed.
//!
//! Services push [`Event`]s onto a bounded channel after their transaction
//! commits. A single background task drains the channel, logs each event
//! and turns the ones people care about into [`Notification`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::rbac::Role;
use crate::workflow::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
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
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        salesperson_id: Uuid,
    },
    OrderUpdated {
        order_id: Uuid,
        order_number: String,
        actor_id: Uuid,
    },
    OrderDeleted {
        order_id: Uuid,
        order_number: String,
        actor_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        order_number: String,
        salesperson_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        actor_id: Uuid,
        note: Option<String>,
    },
    StockAdjusted {
        product_id: Uuid,
        sku: String,
        old_quantity: i32,
        new_quantity: i32,
        actor_id: Uuid,
    },
    UserRoleChanged {
        user_id: Uuid,
        role: Role,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Role(Role),
    User(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: String,
    pub message: String,
    pub order_id: Option<Uuid>,
    #[serde(skip)]
    pub recipients: Vec<Recipient>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_visible_to(&self, user_id: Uuid, role: Role) -> bool {
        self.recipients.iter().any(|recipient| match recipient {
            Recipient::Role(r) => *r == role,
            Recipient::User(id) => *id == user_id,
        })
    }
}

impl Event {
    /// The notification this event produces, if anyone needs to hear about it.
    pub fn to_notification(&self) -> Option<Notification> {
        let (kind, message, order_id, recipients) = match self {
            Event::OrderStatusChanged {
                order_id,
                order_number,
                salesperson_id,
                to,
                note,
                ..
            } => {
                let recipients = match to {
                    OrderStatus::Submitted => vec![Recipient::Role(Role::Manager)],
                    OrderStatus::Approved => vec![
                        Recipient::User(*salesperson_id),
                        Recipient::Role(Role::Warehouse),
                    ],
                    OrderStatus::Rejected => vec![Recipient::User(*salesperson_id)],
                    OrderStatus::Fulfilled => vec![
                        Recipient::User(*salesperson_id),
                        Recipient::Role(Role::Manager),
                    ],
                    OrderStatus::Draft => return None,
                };
                let message = match (to, note) {
                    (OrderStatus::Rejected, Some(reason)) => {
                        format!("Order {} was rejected: {}", order_number, reason)
                    }
                    _ => format!("Order {} is now {}", order_number, to),
                };
                (format!("order_{}", to), message, Some(*order_id), recipients)
            }
            Event::StockAdjusted {
                sku, new_quantity, ..
            } if *new_quantity == 0 => (
                "out_of_stock".to_string(),
                format!("Product {} is out of stock", sku),
                None,
                vec![Recipient::Role(Role::Manager), Recipient::Role(Role::Warehouse)],
            ),
            Event::UserRoleChanged { user_id, role } => (
                "role_changed".to_string(),
                format!("Your role is now {}", role),
                None,
                vec![Recipient::User(*user_id)],
            ),
            _ => return None,
        };

        Some(Notification {
            id: Uuid::new_v4(),
            kind,
            message,
            order_id,
            recipients,
            created_at: Utc::now(),
        })
    }
}

/// Bounded, newest-last list of notifications shared with the handlers.
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    entries: Arc<RwLock<VecDeque<Notification>>>,
    capacity: usize,
}

impl NotificationFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub async fn push(&self, notification: Notification) {
        let mut entries = self.entries.write().await;
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(notification);
    }

    /// Newest first, at most `limit` entries.
    pub async fn visible_to(&self, user_id: Uuid, role: Role, limit: usize) -> Vec<Notification> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|n| n.is_visible_to(user_id, role))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>, feed: NotificationFeed) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderStatusChanged {
                order_id, from, to, actor_id, ..
            } => {
                info!(%order_id, %from, %to, %actor_id, "order status changed");
            }
            Event::StockAdjusted {
                product_id,
                old_quantity,
                new_quantity,
                ..
            } => {
                info!(%product_id, old_quantity, new_quantity, "stock adjusted");
            }
            other => debug!(event = ?other, "event received"),
        }

        if let Some(notification) = event.to_notification() {
            feed.push(notification).await;
        }
    }

    info!("Event channel closed; stopping event processing loop");
}

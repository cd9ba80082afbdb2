use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::DeliveryOrder;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Assigned,
    Delivered,
}

impl NotificationKind {
    fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Assigned => "assigned",
            NotificationKind::Delivered => "delivered",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub order_id: Uuid,
    pub patient_ref: String,
    pub delivery_phone: String,
    pub driver_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn for_order(kind: NotificationKind, order: &DeliveryOrder) -> Self {
        let at = match kind {
            NotificationKind::Assigned => order.assigned_at,
            NotificationKind::Delivered => order.delivered_at,
        };
        Self {
            kind,
            order_id: order.id,
            patient_ref: order.patient_ref.clone(),
            delivery_phone: order.delivery_phone.clone(),
            driver_id: order.driver_id,
            at: at.unwrap_or_else(Utc::now),
        }
    }
}

/// Hook into the external email/SMS service.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), AppError>;
}

/// Default notifier: records the notification in the service log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), AppError> {
        info!(
            kind = notification.kind.as_str(),
            order_id = %notification.order_id,
            patient_ref = %notification.patient_ref,
            "delivery notification"
        );
        Ok(())
    }
}

/// Fire the notification without waiting for it. Failures are logged and
/// counted; the transition that triggered it stays committed.
pub fn dispatch_best_effort(notifier: Arc<dyn Notifier>, metrics: Metrics, notification: Notification) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!(order_id = %notification.order_id, "no runtime; notification skipped");
        metrics
            .notifications_total
            .with_label_values(&[notification.kind.as_str(), "skipped"])
            .inc();
        return;
    };

    handle.spawn(async move {
        let kind = notification.kind.as_str();
        let order_id = notification.order_id;
        match notifier.notify(notification).await {
            Ok(()) => {
                metrics
                    .notifications_total
                    .with_label_values(&[kind, "sent"])
                    .inc();
            }
            Err(err) => {
                metrics
                    .notifications_total
                    .with_label_values(&[kind, "failed"])
                    .inc();
                warn!(order_id = %order_id, kind, error = %err, "notification failed");
            }
        }
    });
}

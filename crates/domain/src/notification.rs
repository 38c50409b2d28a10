//! Persisted user-facing notifications.

use chrono::{DateTime, Utc};
use common::{NotificationId, UserId};
use serde::{Deserialize, Serialize};

/// Channel category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    #[default]
    Portal,
    Email,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Portal => "PORTAL",
            NotificationKind::Email => "EMAIL",
            NotificationKind::System => "SYSTEM",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PORTAL" => Ok(NotificationKind::Portal),
            "EMAIL" => Ok(NotificationKind::Email),
            "SYSTEM" => Ok(NotificationKind::System),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

/// Delivery state. `Pending` means an email was requested but not yet confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Delivered,
    Pending,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Pending => "PENDING",
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DELIVERED" => Ok(DeliveryStatus::Delivered),
            "PENDING" => Ok(DeliveryStatus::Pending),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    /// `None` targets every connected user.
    pub user_id: Option<UserId>,
    pub reference_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    pub status: DeliveryStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates a notification. It starts `Pending` only when an email is
    /// requested for a specific user.
    pub fn new(
        user_id: Option<UserId>,
        reference_id: Option<String>,
        kind: NotificationKind,
        message: impl Into<String>,
        email_requested: bool,
    ) -> Self {
        let now = Utc::now();
        let pending = email_requested && user_id.is_some();
        Self {
            id: NotificationId::new(),
            user_id,
            reference_id,
            kind,
            message: message.into(),
            is_read: false,
            status: if pending {
                DeliveryStatus::Pending
            } else {
                DeliveryStatus::Delivered
            },
            delivered_at: if pending { None } else { Some(now) },
            created_at: now,
        }
    }

    /// Payload pushed over the real-time channel.
    pub fn event(&self) -> NotificationEvent {
        NotificationEvent {
            id: self.id,
            message: self.message.clone(),
            reference_id: self.reference_id.clone(),
            kind: self.kind,
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}

/// Real-time `notification` event body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: NotificationId,
    pub message: String,
    pub reference_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

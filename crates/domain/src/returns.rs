//! Return requests and their status machine.

use chrono::{DateTime, Utc};
use common::{OrderId, ReturnId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of a return request.
///
/// Status transitions:
/// ```text
/// Requested ──┬──► Approved ──► Refunded
///             └──► Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReturnStatus {
    #[default]
    Requested,
    Approved,
    Rejected,
    /// Completed; set when a replacement is issued (terminal state).
    Refunded,
}

impl ReturnStatus {
    /// Returns true if `next` is a legal move from `self`.
    pub fn can_transition_to(&self, next: ReturnStatus) -> bool {
        matches!(
            (self, next),
            (ReturnStatus::Requested, ReturnStatus::Approved)
                | (ReturnStatus::Requested, ReturnStatus::Rejected)
                | (ReturnStatus::Approved, ReturnStatus::Refunded)
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReturnStatus::Rejected | ReturnStatus::Refunded)
    }

    /// Returns true if an admin may set this status directly.
    pub fn is_admin_settable(&self) -> bool {
        !matches!(self, ReturnStatus::Requested)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Requested => "requested",
            ReturnStatus::Approved => "approved",
            ReturnStatus::Rejected => "rejected",
            ReturnStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReturnStatus {
    type Err = ReturnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(ReturnStatus::Requested),
            "approved" => Ok(ReturnStatus::Approved),
            "rejected" => Ok(ReturnStatus::Rejected),
            "refunded" => Ok(ReturnStatus::Refunded),
            other => Err(ReturnError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReturnError {
    #[error("Return reason is required")]
    ReasonRequired,

    #[error("Invalid return transition: cannot move from {current} to {requested}")]
    InvalidTransition {
        current: ReturnStatus,
        requested: ReturnStatus,
    },

    #[error("Unknown return status: {0}")]
    UnknownStatus(String),
}

/// A post-delivery return request. At most one exists per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReturn {
    pub id: ReturnId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub reason: String,
    pub status: ReturnStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderReturn {
    pub fn request(
        order_id: OrderId,
        user_id: UserId,
        reason: impl Into<String>,
    ) -> Result<Self, ReturnError> {
        let reason = reason.into().trim().to_string();
        if reason.is_empty() {
            return Err(ReturnError::ReasonRequired);
        }
        let now = Utc::now();
        Ok(Self {
            id: ReturnId::new(),
            order_id,
            user_id,
            reason,
            status: ReturnStatus::Requested,
            created_at: now,
            updated_at: now,
        })
    }
}

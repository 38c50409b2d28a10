//! The caller's notifications.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::NotificationId;
use domain::Notification;
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use super::parse_id;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub only_unread: bool,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: u64,
}

#[derive(Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

/// GET /notifications?onlyUnread=&limit=
pub async fn list<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = state
        .commerce
        .notifications
        .list(user.user_id, query.only_unread, query.limit)
        .await?;
    Ok(Json(notifications))
}

/// GET /notifications/unread-count
pub async fn unread_count<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread_count = state
        .commerce
        .notifications
        .unread_count(user.user_id)
        .await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

/// PATCH /notifications/{id}/read
pub async fn mark_read<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    let notification_id: NotificationId = parse_id(&id, "notification")?;
    let notification = state
        .commerce
        .notifications
        .mark_read(user.user_id, notification_id)
        .await?;
    Ok(Json(notification))
}

/// PATCH /notifications/read-all
pub async fn mark_all_read<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let updated = state
        .commerce
        .notifications
        .mark_all_read(user.user_id)
        .await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

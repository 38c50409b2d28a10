//! WebSocket stream of live notifications.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use common::UserId;
use domain::NotificationEvent;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use store::CommerceStore;
use tokio::sync::broadcast::error::RecvError;

use crate::auth::{AuthError, AuthUser};
use crate::error::ApiError;
use crate::hub::Subscription;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Frame sent for every pushed notification.
#[derive(Serialize)]
struct Frame<'a> {
    event: &'static str,
    data: &'a NotificationEvent,
}

/// GET /ws — token via `Authorization` header or `?token=`.
///
/// The token is checked before the upgrade request itself.
pub async fn connect<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let user: AuthUser = match (header, query.token.as_deref()) {
        (Some(header), _) => state.auth.authenticate(Some(header))?,
        (None, Some(token)) => state.auth.validate(token)?,
        (None, None) => return Err(AuthError::MissingToken.into()),
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };
    let subscription = state.hub.subscribe(user.user_id);
    Ok(ws.on_upgrade(move |socket| stream(socket, user.user_id, subscription)))
}

async fn stream(socket: WebSocket, user_id: UserId, mut subscription: Subscription) {
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(%user_id, "websocket connected");

    loop {
        let open = tokio::select! {
            event = subscription.user.recv() => forward(&mut sender, user_id, event).await,
            event = subscription.global.recv() => forward(&mut sender, user_id, event).await,
            incoming = receiver.next() => !matches!(
                incoming,
                None | Some(Err(_)) | Some(Ok(Message::Close(_)))
            ),
        };
        if !open {
            break;
        }
    }

    tracing::info!(%user_id, "websocket disconnected");
}

/// Sends one event. Returns false once the connection should close.
async fn forward(
    sender: &mut SplitSink<WebSocket, Message>,
    user_id: UserId,
    event: Result<NotificationEvent, RecvError>,
) -> bool {
    match event {
        Ok(event) => {
            let frame = Frame {
                event: "notification",
                data: &event,
            };
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(%user_id, error = %e, "failed to encode notification frame");
                    return true;
                }
            };
            sender.send(Message::Text(text.into())).await.is_ok()
        }
        Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(%user_id, skipped, "websocket receiver lagged");
            true
        }
        Err(RecvError::Closed) => false,
    }
}

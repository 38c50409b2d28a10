//! Notification fan-out: persist, push, and email.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use common::{NotificationId, UserId};
use domain::{DeliveryStatus, Notification, NotificationKind};
use store::CommerceStore;
use tokio::task::JoinHandle;

use crate::error::{Result, WorkflowError};
use crate::services::{Collaborators, Email, Mailer, PushChannel, UserDirectory};

/// Subject used for every user notification email.
pub const EMAIL_SUBJECT: &str = "Order update";

/// Default page size when listing notifications.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// A notification to send.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub user_id: Option<UserId>,
    pub reference_id: Option<String>,
    pub message: String,
    pub kind: NotificationKind,
    pub send_email: bool,
    /// Email body; the message is used when absent.
    pub email_body: Option<String>,
}

impl Dispatch {
    /// A portal notification for one user.
    pub fn to_user(user_id: UserId, message: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            reference_id: None,
            message: message.into(),
            kind: NotificationKind::Portal,
            send_email: false,
            email_body: None,
        }
    }

    /// A system notification for every connected user.
    pub fn broadcast(message: impl Into<String>) -> Self {
        Self {
            user_id: None,
            reference_id: None,
            message: message.into(),
            kind: NotificationKind::System,
            send_email: false,
            email_body: None,
        }
    }

    pub fn reference(mut self, reference_id: impl ToString) -> Self {
        self.reference_id = Some(reference_id.to_string());
        self
    }

    /// Also email the user.
    pub fn with_email(mut self) -> Self {
        self.send_email = true;
        self
    }

    /// Also email the user with a custom body.
    pub fn with_email_body(mut self, body: impl Into<String>) -> Self {
        self.send_email = true;
        self.email_body = Some(body.into());
        self
    }
}

/// Persists notifications, pushes them to live connections and sends emails
/// in the background.
///
/// Dispatch never fails its caller: every failure is logged and swallowed.
pub struct NotificationDispatcher<S> {
    store: S,
    directory: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    push: Arc<dyn PushChannel>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<S> NotificationDispatcher<S>
where
    S: CommerceStore + Clone + 'static,
{
    pub fn new(store: S, collaborators: &Collaborators) -> Self {
        Self {
            store,
            directory: collaborators.directory.clone(),
            mailer: collaborators.mailer.clone(),
            push: collaborators.push.clone(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Records and pushes a notification, scheduling the email if requested.
    ///
    /// Returns `None` when the notification could not be stored.
    #[tracing::instrument(skip(self, dispatch), fields(user_id = ?dispatch.user_id))]
    pub async fn dispatch(&self, dispatch: Dispatch) -> Option<Notification> {
        let notification = Notification::new(
            dispatch.user_id,
            dispatch.reference_id,
            dispatch.kind,
            dispatch.message,
            dispatch.send_email,
        );

        if let Err(e) = self.store.insert_notification(&notification).await {
            tracing::error!(error = %e, "failed to store notification");
            return None;
        }
        metrics::counter!("notifications_dispatched_total", "kind" => notification.kind.as_str())
            .increment(1);

        self.push.push(notification.user_id, &notification.event());

        if notification.status == DeliveryStatus::Pending
            && let Some(user_id) = notification.user_id
        {
            let body = dispatch
                .email_body
                .unwrap_or_else(|| notification.message.clone());
            self.spawn_email(notification.id, user_id, body);
        }

        Some(notification)
    }

    fn spawn_email(&self, notification_id: NotificationId, user_id: UserId, body: String) {
        let store = self.store.clone();
        let directory = self.directory.clone();
        let mailer = self.mailer.clone();

        let handle = tokio::spawn(async move {
            let Some(to) = directory.email_for(user_id).await else {
                tracing::warn!(%user_id, %notification_id, "no email address, notification left pending");
                metrics::counter!("notification_emails_failed_total").increment(1);
                return;
            };

            if !mailer.send(Email::new(to, EMAIL_SUBJECT, body)).await {
                tracing::warn!(%user_id, %notification_id, "email send failed, notification left pending");
                metrics::counter!("notification_emails_failed_total").increment(1);
                return;
            }

            if let Err(e) = store
                .mark_notification_delivered(notification_id, Utc::now())
                .await
            {
                tracing::warn!(%notification_id, error = %e, "failed to mark notification delivered");
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Waits for every email task scheduled so far.
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "email task panicked");
            }
        }
    }

    /// Notifications of a user, newest first.
    pub async fn list(
        &self,
        user_id: UserId,
        only_unread: bool,
        limit: Option<usize>,
    ) -> Result<Vec<Notification>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        Ok(self
            .store
            .list_notifications(user_id, only_unread, limit)
            .await?)
    }

    pub async fn unread_count(&self, user_id: UserId) -> Result<u64> {
        Ok(self.store.count_unread(user_id).await?)
    }

    /// Marks one of the user's notifications read.
    pub async fn mark_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> Result<Notification> {
        let notification = self
            .store
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("notification", notification_id))?;
        if notification.user_id != Some(user_id) {
            return Err(WorkflowError::Forbidden(
                "Not authorized to modify this notification".to_string(),
            ));
        }
        Ok(self
            .store
            .mark_notification_read(notification_id, Utc::now())
            .await?)
    }

    /// Marks all of the user's notifications read. Returns how many changed.
    pub async fn mark_all_read(&self, user_id: UserId) -> Result<u64> {
        Ok(self.store.mark_all_read(user_id, Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{InMemoryMailer, InMemoryPushChannel, StoreDirectory};
    use domain::{Role, User};
    use store::InMemoryStore;

    struct Harness {
        store: InMemoryStore,
        mailer: InMemoryMailer,
        push: InMemoryPushChannel,
        dispatcher: NotificationDispatcher<InMemoryStore>,
    }

    fn harness() -> Harness {
        let store = InMemoryStore::new();
        let mailer = InMemoryMailer::new();
        let push = InMemoryPushChannel::new();
        let collaborators = Collaborators {
            directory: Arc::new(StoreDirectory::new(store.clone())),
            mailer: Arc::new(mailer.clone()),
            push: Arc::new(push.clone()),
            admin_email: "admin@example.com".to_string(),
        };
        let dispatcher = NotificationDispatcher::new(store.clone(), &collaborators);
        Harness {
            store,
            mailer,
            push,
            dispatcher,
        }
    }

    async fn user_with_email(store: &InMemoryStore) -> User {
        let user = User::new("Ada", Some("ada@example.com".to_string()), Role::User);
        store.insert_user(user.clone()).await.unwrap();
        user
    }

    #[tokio::test]
    async fn email_success_marks_delivered() {
        let h = harness();
        let user = user_with_email(&h.store).await;

        let n = h
            .dispatcher
            .dispatch(Dispatch::to_user(user.id, "Order shipped").with_email())
            .await
            .unwrap();
        assert_eq!(n.status, DeliveryStatus::Pending);
        h.dispatcher.flush().await;

        let stored = h.store.get_notification(n.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Delivered);
        assert!(stored.delivered_at.is_some());
        let sent = h.mailer.sent_to("ada@example.com");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, EMAIL_SUBJECT);
        assert_eq!(h.push.pushed_to(user.id).len(), 1);
    }

    #[tokio::test]
    async fn email_failure_leaves_pending() {
        let h = harness();
        let user = user_with_email(&h.store).await;
        h.mailer.set_fail_on_send(true);

        let n = h
            .dispatcher
            .dispatch(Dispatch::to_user(user.id, "Order shipped").with_email())
            .await
            .unwrap();
        h.dispatcher.flush().await;

        let stored = h.store.get_notification(n.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Pending);
        assert!(stored.delivered_at.is_none());
    }

    #[tokio::test]
    async fn missing_email_leaves_pending() {
        let h = harness();
        let user_id = UserId::new();

        let n = h
            .dispatcher
            .dispatch(Dispatch::to_user(user_id, "hello").with_email())
            .await
            .unwrap();
        h.dispatcher.flush().await;

        let stored = h.store.get_notification(n.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Pending);
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn broadcast_is_delivered_without_email() {
        let h = harness();
        let n = h
            .dispatcher
            .dispatch(Dispatch::broadcast("maintenance tonight").with_email())
            .await
            .unwrap();
        assert_eq!(n.status, DeliveryStatus::Delivered);
        h.dispatcher.flush().await;

        assert!(h.mailer.sent().is_empty());
        let pushed = h.push.pushed();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].0, None);
    }

    #[tokio::test]
    async fn mark_read_rejects_other_users() {
        let h = harness();
        let owner = UserId::new();
        let n = h
            .dispatcher
            .dispatch(Dispatch::to_user(owner, "hi"))
            .await
            .unwrap();

        let err = h.dispatcher.mark_read(UserId::new(), n.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));

        let read = h.dispatcher.mark_read(owner, n.id).await.unwrap();
        assert!(read.is_read);
        assert_eq!(h.dispatcher.unread_count(owner).await.unwrap(), 0);
    }
}

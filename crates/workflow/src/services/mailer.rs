//! Outbound email.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

/// A plain-text email message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Fire-and-forget email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends `email`. Returns false when delivery failed; never errors.
    async fn send(&self, email: Email) -> bool;
}

/// Mailer that only writes the message to the log.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> bool {
        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        true
    }
}

#[derive(Debug, Default)]
struct InMemoryMailerState {
    sent: Vec<Email>,
    fail_on_send: bool,
    delay: Option<Duration>,
}

/// In-memory mailer for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    state: Arc<Mutex<InMemoryMailerState>>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryMailerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures every following send to fail.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state().fail_on_send = fail;
    }

    /// Holds every following send for `delay` before accepting it.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<Email> {
        self.state().sent.clone()
    }

    /// Messages accepted for `to`.
    pub fn sent_to(&self, to: &str) -> Vec<Email> {
        self.state()
            .sent
            .iter()
            .filter(|e| e.to == to)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, email: Email) -> bool {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        if state.fail_on_send {
            return false;
        }
        state.sent.push(email);
        true
    }
}

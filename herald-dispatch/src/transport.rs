//! The outward-facing delivery capability
//!
//! The engine hands a fully rendered message and a sender identity to a
//! [`MessageTransport`] and routes on the pass/fail outcome; the concrete
//! protocol behind it (SMTP, an API relay, a test double) is somebody
//! else's concern. Failures are categorized for event detail only, the
//! engine treats every failure the same way: requeue and continue.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use herald_common::{SenderIdentity, internal};
use thiserror::Error;
use tokio::sync::Notify;

/// Transport failure detail, surfaced through error events.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Could not reach the remote endpoint.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The remote endpoint refused the message.
    #[error("Delivery rejected: {0}")]
    Rejected(String),

    /// The remote endpoint did not answer in time.
    #[error("Delivery timed out: {0}")]
    Timeout(String),
}

/// Capability to hand one rendered message to a remote server.
#[async_trait]
pub trait MessageTransport: Send + Sync + std::fmt::Debug {
    /// Deliver `subject`/`body` to `recipient` as `identity`.
    ///
    /// # Errors
    /// Returns a [`TransportError`] when the remote end rejects the message
    /// or cannot be reached.
    async fn send(
        &self,
        identity: &SenderIdentity,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), TransportError>;
}

/// Transport that logs the would-be delivery and reports success.
///
/// Useful for dry runs and for exercising the engine without a mail
/// server.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevNullTransport;

#[async_trait]
impl MessageTransport for DevNullTransport {
    async fn send(
        &self,
        identity: &SenderIdentity,
        recipient: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), TransportError> {
        internal!(
            level = INFO,
            "Discarding message to {recipient} from {} via {} ({subject:?})",
            identity.address,
            identity.endpoint()
        );
        Ok(())
    }
}

/// A message captured by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub identity: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Mock transport for tests
///
/// Records every send, serves scripted outcomes in order (succeeding once
/// the script runs dry), optionally holds each send open for a configured
/// delay, and notifies waiters after each attempt.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    outcomes: Arc<Mutex<VecDeque<Result<(), TransportError>>>>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    attempts: Arc<Mutex<usize>>,
    delay: Arc<Mutex<Option<Duration>>>,
    notify: Arc<Notify>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of the next unscripted send.
    ///
    /// # Panics
    /// Panics if the outcome mutex is poisoned.
    pub fn push_outcome(&self, outcome: Result<(), TransportError>) {
        self.outcomes
            .lock()
            .expect("MockTransport outcomes mutex poisoned")
            .push_back(outcome);
    }

    /// Script `n` consecutive failures.
    ///
    /// # Panics
    /// Panics if the outcome mutex is poisoned.
    pub fn fail_next(&self, n: usize) {
        let mut outcomes = self
            .outcomes
            .lock()
            .expect("MockTransport outcomes mutex poisoned");
        for _ in 0..n {
            outcomes.push_back(Err(TransportError::Rejected(
                "scripted failure".to_string(),
            )));
        }
    }

    /// Hold every send open for `delay` before resolving.
    ///
    /// # Panics
    /// Panics if the delay mutex is poisoned.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().expect("MockTransport delay mutex poisoned") = delay;
    }

    /// Successfully delivered messages, in order.
    ///
    /// # Panics
    /// Panics if the sent mutex is poisoned.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .expect("MockTransport sent mutex poisoned")
            .clone()
    }

    /// Count of successful deliveries.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent().len()
    }

    /// Count of attempts started, successful or not.
    ///
    /// # Panics
    /// Panics if the attempts mutex is poisoned.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        *self
            .attempts
            .lock()
            .expect("MockTransport attempts mutex poisoned")
    }

    /// Wait until at least `expected` successful deliveries have happened.
    ///
    /// # Errors
    /// Returns the elapsed error if the timeout is reached first.
    pub async fn wait_for_sends(
        &self,
        expected: usize,
        timeout: Duration,
    ) -> Result<(), tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, async {
            loop {
                if self.sent_count() >= expected {
                    return;
                }
                self.notify.notified().await;
            }
        })
        .await
    }

    /// Wait until at least `expected` attempts have happened.
    ///
    /// # Errors
    /// Returns the elapsed error if the timeout is reached first.
    pub async fn wait_for_attempts(
        &self,
        expected: usize,
        timeout: Duration,
    ) -> Result<(), tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, async {
            loop {
                if self.attempt_count() >= expected {
                    return;
                }
                self.notify.notified().await;
            }
        })
        .await
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    #[allow(clippy::expect_used, reason = "Test double; a poisoned mutex is a test bug")]
    async fn send(
        &self,
        identity: &SenderIdentity,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), TransportError> {
        // Count the attempt on entry so tests can react while a delayed
        // send is still in flight.
        *self
            .attempts
            .lock()
            .expect("MockTransport attempts mutex poisoned") += 1;
        self.notify.notify_waiters();

        let delay = *self.delay.lock().expect("MockTransport delay mutex poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .outcomes
            .lock()
            .expect("MockTransport outcomes mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(()));

        if outcome.is_ok() {
            self.sent
                .lock()
                .expect("MockTransport sent mutex poisoned")
                .push(SentMessage {
                    identity: identity.address.clone(),
                    recipient: recipient.to_string(),
                    subject: subject.to_string(),
                    body: body.to_string(),
                });
        }

        self.notify.notify_waiters();
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_mock_serves_scripted_outcomes_in_order() {
        let transport = MockTransport::new();
        transport.fail_next(1);

        let identity = SenderIdentity::new("a@x.com", "s");
        let first = transport.send(&identity, "r@x.com", "s", "b").await;
        let second = transport.send(&identity, "r@x.com", "s", "b").await;

        assert!(first.is_err());
        assert!(second.is_ok());
        assert_eq!(transport.sent_count(), 1);
        assert_eq!(transport.attempt_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_records_message_content() {
        let transport = MockTransport::new();
        let identity = SenderIdentity::new("a@x.com", "s");
        transport
            .send(&identity, "r@x.com", "Hello", "Body text")
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].identity, "a@x.com");
        assert_eq!(sent[0].recipient, "r@x.com");
        assert_eq!(sent[0].subject, "Hello");
    }
}

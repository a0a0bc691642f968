//! Typed error handling for dispatch operations.

use thiserror::Error;

use crate::{template::RenderError, transport::TransportError};

/// Top-level dispatch error type.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Durable state could not be loaded or written.
    #[error("Store error: {0}")]
    Store(#[from] herald_store::StoreError),

    /// A job was rejected at submission time.
    #[error("Submission rejected: {0}")]
    Submit(#[from] SubmitError),

    /// A template failed to render.
    #[error("Render failure: {0}")]
    Render(#[from] RenderError),

    /// The transport reported a delivery failure.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Synchronous rejections at job submission time.
///
/// None of these ever enter the worker loop; a job that passes submission
/// can only fail per-recipient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The subject template is empty.
    #[error("Subject template is empty")]
    EmptySubject,

    /// The body template is empty.
    #[error("Body template is empty")]
    EmptyBody,

    /// No enabled sender identity is configured.
    #[error("No enabled sender identities configured")]
    NoEnabledIdentities,

    /// The pending queue is empty; there is nobody to send to.
    #[error("No pending recipients")]
    NoPendingRecipients,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_error_display() {
        assert_eq!(
            SubmitError::NoEnabledIdentities.to_string(),
            "No enabled sender identities configured"
        );
    }

    #[test]
    fn test_error_conversion_chain() {
        let err: DispatchError = SubmitError::EmptySubject.into();
        assert!(matches!(err, DispatchError::Submit(_)));
        assert!(err.to_string().contains("Subject template is empty"));
    }
}

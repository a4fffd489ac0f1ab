//! Error taxonomy for the completion flow.
//!
//! A `CompletionError` is a rejection surfaced to the caller and never
//! retried. A failed content verification is deliberately NOT an error: it is
//! a normal outcome recorded as an unverified receipt. Export and
//! notification failures are logged where they happen and never reach a
//! caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("registration not found")]
    RegistrationNotFound,

    #[error("registration already completed")]
    AlreadyCompleted,

    #[error("no payment data provided")]
    NoPaymentData,

    #[error("receipt file must be a PDF document")]
    InvalidFormat,

    #[error("failed to store receipt file: {0}")]
    FileStore(#[source] std::io::Error),
}

impl CompletionError {
    /// Whether the rejection is a client-side input problem, as opposed to a
    /// local I/O failure the operator needs to look at.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CompletionError::FileStore(_))
    }
}

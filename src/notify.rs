//! Notification seam invoked after a registration completes.
//!
//! The real collaborator (email with an attached entry QR code) lives
//! outside this service. Whatever the implementation, failures are swallowed
//! by the caller: the state transition is already committed by the time the
//! notifier runs.

use crate::model::Registration;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn payment_confirmed(&self, registration: &Registration) -> Result<()>;
}

/// Default notifier: records the event in the log stream, where the
/// out-of-process mailer picks it up.
pub struct LogNotifier;

#[async_trait]
impl CompletionNotifier for LogNotifier {
    async fn payment_confirmed(&self, registration: &Registration) -> Result<()> {
        info!(
            registration_id = %registration.id,
            email = %registration.email,
            "registration completed, notification queued"
        );
        Ok(())
    }
}

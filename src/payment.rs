//! Payment completion orchestration.
//!
//! One completion attempt takes a registration from pending to completed,
//! exactly once, gated on receipt verification. Attempts for the same
//! registration are serialized through an explicit per-id mutex so two
//! concurrent uploads can never both observe the pending state; attempts for
//! different registrations run fully in parallel.

use crate::error::CompletionError;
use crate::extract::TextExtractor;
use crate::model::{PaymentReceipt, Registration, RegistrationId};
use crate::notify::CompletionNotifier;
use crate::receipt_file::ReceiptFileStore;
use crate::reference::is_valid_reference;
use crate::store::{ReceiptDraft, RegistrationStore, StoreError};
use crate::verify::ReceiptVerifier;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

/// Proof of payment supplied with a completion attempt: an uploaded receipt
/// document, or a bare payment-reference string (legacy path).
#[derive(Debug, Clone)]
pub enum PaymentProof {
    Document { file_name: String, bytes: Vec<u8> },
    Reference(String),
}

pub struct PaymentEngine {
    store: Arc<dyn RegistrationStore>,
    files: ReceiptFileStore,
    verifier: ReceiptVerifier,
    extractor: Arc<dyn TextExtractor>,
    notifier: Arc<dyn CompletionNotifier>,
    // One mutex per registration id seen so far; bounded by event size.
    locks: Mutex<HashMap<RegistrationId, Arc<AsyncMutex<()>>>>,
}

impl PaymentEngine {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        files: ReceiptFileStore,
        verifier: ReceiptVerifier,
        extractor: Arc<dyn TextExtractor>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        Self {
            store,
            files,
            verifier,
            extractor,
            notifier,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn RegistrationStore> {
        self.store.clone()
    }

    /// Runs one completion attempt.
    ///
    /// A rejected attempt (bad input, unknown or already-completed
    /// registration, file-store failure) leaves no trace. A failed content
    /// verification is not a rejection: the receipt is persisted unverified,
    /// the registration stays pending and the returned record carries
    /// `verified=false` so the caller can report "pending review".
    pub async fn complete(
        &self,
        id: RegistrationId,
        proof: Option<PaymentProof>,
    ) -> Result<PaymentReceipt, CompletionError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let registration = self.store.get(id).ok_or(CompletionError::RegistrationNotFound)?;
        if !registration.is_pending() {
            return Err(CompletionError::AlreadyCompleted);
        }

        let proof = proof.ok_or(CompletionError::NoPaymentData)?;
        let draft = match proof {
            PaymentProof::Document { file_name, bytes } => {
                self.attempt_document(&registration, file_name, bytes).await?
            }
            PaymentProof::Reference(code) => self.attempt_reference(&registration, code),
        };

        let verified = draft.verified;
        let receipt = self.store.record_receipt(draft).map_err(map_store_error)?;

        if verified {
            let completed = self
                .store
                .complete_registration(id, Utc::now())
                .map_err(map_store_error)?;
            info!(registration_id = %id, receipt_id = %receipt.id, "registration completed");
            self.notify(&completed).await;
        }

        Ok(receipt)
    }

    async fn attempt_document(
        &self,
        registration: &Registration,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<ReceiptDraft, CompletionError> {
        // Store first: a file-store failure aborts the attempt with no
        // receipt on record.
        let stored = self.files.store(registration, &file_name, &bytes)?;

        // An unparseable document verifies like an empty one.
        let text = match self.extractor.extract(bytes).await {
            Ok(text) => text,
            Err(error) => {
                warn!(registration_id = %registration.id, %error, "receipt text extraction failed");
                String::new()
            }
        };

        let verification = self.verifier.verify(&text);
        if let Some(message) = verification.outcome.message() {
            warn!(
                registration_id = %registration.id,
                reasons = %message,
                "receipt verification failed"
            );
        }

        Ok(ReceiptDraft {
            registration_id: registration.id,
            donation_amount: self.verifier.rules().amount,
            verified: verification.outcome.is_verified(),
            paid: verification.outcome.is_verified(),
            payment_reference: verification.payment_reference,
            file_name: Some(file_name),
            file_path: Some(stored.path),
            file_size: Some(stored.size),
        })
    }

    fn attempt_reference(&self, registration: &Registration, code: String) -> ReceiptDraft {
        let valid = is_valid_reference(Some(&code));
        if !valid {
            warn!(registration_id = %registration.id, "payment reference rejected");
        }
        ReceiptDraft {
            registration_id: registration.id,
            donation_amount: self.verifier.rules().amount,
            verified: valid,
            paid: valid,
            payment_reference: Some(code),
            file_name: None,
            file_path: None,
            file_size: None,
        }
    }

    /// Best-effort: the transition is committed, a notifier failure must not
    /// unwind it.
    async fn notify(&self, registration: &Registration) {
        if let Err(error) = self.notifier.payment_confirmed(registration).await {
            warn!(
                registration_id = %registration.id,
                %error,
                "completion notification failed"
            );
        }
    }

    fn lock_for(&self, id: RegistrationId) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

fn map_store_error(error: StoreError) -> CompletionError {
    match error {
        StoreError::NotFound => CompletionError::RegistrationNotFound,
        StoreError::AlreadyCompleted => CompletionError::AlreadyCompleted,
    }
}

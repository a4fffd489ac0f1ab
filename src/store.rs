//! Durable store interface for registrations and receipts.
//!
//! The production deployment backs this with a relational store; the service
//! only needs by-id access, a full scan for the export job, and two
//! transactional guarantees: the pending-to-completed transition happens at
//! most once, and a registration never holds more than one receipt row.
//! `MemoryStore` provides those guarantees in-process.

use crate::model::{
    PaymentReceipt, ReceiptId, Registration, RegistrationDraft, RegistrationId,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("registration not found")]
    NotFound,
    #[error("registration already completed")]
    AlreadyCompleted,
}

/// Fields of a completion attempt to be recorded. The store assigns the
/// receipt id and creation timestamp.
#[derive(Debug, Clone)]
pub struct ReceiptDraft {
    pub registration_id: RegistrationId,
    pub donation_amount: f64,
    pub verified: bool,
    pub paid: bool,
    pub payment_reference: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<PathBuf>,
    pub file_size: Option<u64>,
}

pub trait RegistrationStore: Send + Sync {
    fn insert(&self, draft: RegistrationDraft) -> Registration;

    fn get(&self, id: RegistrationId) -> Option<Registration>;

    fn all(&self) -> Vec<Registration>;

    fn receipt_for(&self, id: RegistrationId) -> Option<PaymentReceipt>;

    /// Records a completion attempt, keeping at most one receipt per
    /// registration: a retry after a failed attempt replaces the unverified
    /// record in place (same receipt id, same creation timestamp). A receipt
    /// that already verified is never replaced.
    fn record_receipt(&self, draft: ReceiptDraft) -> Result<PaymentReceipt, StoreError>;

    /// Persists mutable receipt state (mirroring flag, public link).
    fn update_receipt(&self, receipt: &PaymentReceipt) -> Result<(), StoreError>;

    /// Compare-and-swap on the pending state: sets `completed_at` iff it is
    /// not set yet. This is the only way a registration completes.
    fn complete_registration(
        &self,
        id: RegistrationId,
        at: DateTime<Utc>,
    ) -> Result<Registration, StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    registrations: RwLock<HashMap<RegistrationId, Registration>>,
    receipts: RwLock<HashMap<RegistrationId, PaymentReceipt>>,
    next_registration_id: AtomicU64,
    next_receipt_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistrationStore for MemoryStore {
    fn insert(&self, draft: RegistrationDraft) -> Registration {
        let id = RegistrationId(self.next_registration_id.fetch_add(1, Ordering::SeqCst) + 1);
        let registration = Registration {
            id,
            first_name: draft.first_name,
            last_name: draft.last_name,
            email: draft.email,
            birth_date: draft.birth_date,
            phone: draft.phone,
            telegram: draft.telegram,
            city: draft.city,
            need_accommodation: draft.need_accommodation,
            church: draft.church,
            role: draft.role,
            parent_full_name: draft.parent_full_name,
            parent_phone: draft.parent_phone,
            was_before: draft.was_before,
            consent_under_14: draft.consent_under_14,
            consent_donation: draft.consent_donation,
            consent_personal_data: draft.consent_personal_data,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.registrations.write().insert(id, registration.clone());
        registration
    }

    fn get(&self, id: RegistrationId) -> Option<Registration> {
        self.registrations.read().get(&id).cloned()
    }

    fn all(&self) -> Vec<Registration> {
        let mut all: Vec<_> = self.registrations.read().values().cloned().collect();
        all.sort_by_key(|r| r.id);
        all
    }

    fn receipt_for(&self, id: RegistrationId) -> Option<PaymentReceipt> {
        self.receipts.read().get(&id).cloned()
    }

    fn record_receipt(&self, draft: ReceiptDraft) -> Result<PaymentReceipt, StoreError> {
        if !self
            .registrations
            .read()
            .contains_key(&draft.registration_id)
        {
            return Err(StoreError::NotFound);
        }

        let mut receipts = self.receipts.write();
        let receipt = match receipts.get(&draft.registration_id) {
            Some(existing) if existing.verified => return Err(StoreError::AlreadyCompleted),
            Some(existing) => PaymentReceipt {
                id: existing.id,
                created_at: existing.created_at,
                registration_id: draft.registration_id,
                donation_amount: draft.donation_amount,
                verified: draft.verified,
                paid: draft.paid,
                payment_reference: draft.payment_reference,
                file_name: draft.file_name,
                file_path: draft.file_path,
                file_size: draft.file_size,
                mirrored: false,
                public_url: None,
            },
            None => PaymentReceipt {
                id: ReceiptId(self.next_receipt_id.fetch_add(1, Ordering::SeqCst) + 1),
                created_at: Utc::now(),
                registration_id: draft.registration_id,
                donation_amount: draft.donation_amount,
                verified: draft.verified,
                paid: draft.paid,
                payment_reference: draft.payment_reference,
                file_name: draft.file_name,
                file_path: draft.file_path,
                file_size: draft.file_size,
                mirrored: false,
                public_url: None,
            },
        };
        receipts.insert(draft.registration_id, receipt.clone());
        Ok(receipt)
    }

    fn update_receipt(&self, receipt: &PaymentReceipt) -> Result<(), StoreError> {
        let mut receipts = self.receipts.write();
        match receipts.get_mut(&receipt.registration_id) {
            Some(existing) => {
                *existing = receipt.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn complete_registration(
        &self,
        id: RegistrationId,
        at: DateTime<Utc>,
    ) -> Result<Registration, StoreError> {
        let mut registrations = self.registrations.write();
        let registration = registrations.get_mut(&id).ok_or(StoreError::NotFound)?;
        if registration.completed_at.is_some() {
            return Err(StoreError::AlreadyCompleted);
        }
        registration.completed_at = Some(at);
        Ok(registration.clone())
    }
}

//! Core data model: registrations and their payment receipts.
//!
//! A `Registration` starts out pending and is finalized exactly once by the
//! payment engine. A `PaymentReceipt` belongs to exactly one registration and
//! records the outcome of a completion attempt, successful or not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Opaque registration identifier, assigned by the store at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(pub u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receipt identifier, assigned by the store when a completion attempt is
/// first recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(pub u64);

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An attendee registration.
///
/// Personal fields are immutable after creation; only `completed_at` changes,
/// and only through the payment engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: RegistrationId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub birth_date: String,
    pub phone: String,
    pub telegram: String,
    pub city: String,
    pub need_accommodation: bool,
    pub church: String,
    pub role: String,
    pub parent_full_name: Option<String>,
    pub parent_phone: Option<String>,
    pub was_before: bool,
    pub consent_under_14: bool,
    pub consent_donation: bool,
    pub consent_personal_data: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Registration {
    pub fn is_pending(&self) -> bool {
        self.completed_at.is_none()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Registration fields supplied by the (external) registration flow.
/// The store assigns the id and the creation timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub birth_date: String,
    pub phone: String,
    pub telegram: String,
    pub city: String,
    pub need_accommodation: bool,
    pub church: String,
    pub role: String,
    pub parent_full_name: Option<String>,
    pub parent_phone: Option<String>,
    pub was_before: bool,
    pub consent_under_14: bool,
    pub consent_donation: bool,
    pub consent_personal_data: bool,
}

/// Recorded outcome of a completion attempt.
///
/// `verified` and `paid` are always set together; the model does not
/// currently distinguish the two. Receipts are never deleted, so a failed
/// attempt stays on record with both flags false.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub id: ReceiptId,
    pub registration_id: RegistrationId,
    pub donation_amount: f64,
    pub verified: bool,
    pub paid: bool,
    pub payment_reference: Option<String>,
    /// Original upload name, kept for display only.
    pub file_name: Option<String>,
    /// On-disk path of the stored receipt document.
    pub file_path: Option<PathBuf>,
    pub file_size: Option<u64>,
    /// Set once the file has been copied to external storage.
    pub mirrored: bool,
    pub public_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registration() -> Registration {
        Registration {
            id: RegistrationId(7),
            first_name: "Иван".to_string(),
            last_name: "Иванов".to_string(),
            email: "ivan@example.com".to_string(),
            birth_date: "2010-05-01".to_string(),
            phone: "+79990001122".to_string(),
            telegram: "@ivan".to_string(),
            city: "Саратов".to_string(),
            need_accommodation: true,
            church: "Слово Жизни".to_string(),
            role: "участник".to_string(),
            parent_full_name: None,
            parent_phone: None,
            was_before: false,
            consent_under_14: false,
            consent_donation: true,
            consent_personal_data: true,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn registration_starts_pending() {
        let reg = sample_registration();
        assert!(reg.is_pending());
    }

    #[test]
    fn full_name_joins_first_and_last() {
        let reg = sample_registration();
        assert_eq!(reg.full_name(), "Иван Иванов");
    }

    #[test]
    fn registration_id_serializes_transparently() {
        let id = RegistrationId(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
    }
}

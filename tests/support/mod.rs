#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use confreg::extract::TextExtractor;
use confreg::model::{Registration, RegistrationDraft, RegistrationId};
use confreg::notify::CompletionNotifier;
use confreg::payment::PaymentEngine;
use confreg::receipt_file::ReceiptFileStore;
use confreg::store::{MemoryStore, RegistrationStore};
use confreg::verify::ReceiptVerifier;
use parking_lot::Mutex;
use std::sync::Arc;

/// Receipt text satisfying every verifier check.
pub const GOOD_RECEIPT_TEXT: &str =
    "ЦЕРКОВЬ СЛОВО ЖИЗНИ_SBP\nИНН: 6453041398\nПАО СБЕРБАНК\nСумма: 500,00 РУБ";

/// Same receipt with the tax id missing, so verification fails on exactly
/// one criterion.
pub const NO_TAX_ID_TEXT: &str = "ЦЕРКОВЬ СЛОВО ЖИЗНИ_SBP\nПАО СБЕРБАНК\nСумма: 500,00 РУБ";

pub const VALID_REFERENCE: &str = "A5317171444036040000080011630701";

/// Extractor stub: the uploaded bytes ARE the text. Lets tests drive the
/// verifier without fabricating real PDF documents.
pub struct TextStubExtractor;

#[async_trait]
impl TextExtractor for TextStubExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String> {
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Extractor that always fails, standing in for a corrupt document.
pub struct FailingExtractor;

#[async_trait]
impl TextExtractor for FailingExtractor {
    async fn extract(&self, _bytes: Vec<u8>) -> Result<String> {
        anyhow::bail!("document parse failed")
    }
}

/// Notifier that records every confirmation it receives and optionally
/// fails, to prove failures never unwind a committed completion.
#[derive(Default)]
pub struct RecordingNotifier {
    pub confirmed: Mutex<Vec<RegistrationId>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            confirmed: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn confirmations(&self) -> Vec<RegistrationId> {
        self.confirmed.lock().clone()
    }
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn payment_confirmed(&self, registration: &Registration) -> Result<()> {
        self.confirmed.lock().push(registration.id);
        if self.fail {
            anyhow::bail!("mailer unavailable")
        }
        Ok(())
    }
}

pub fn draft(first: &str, last: &str) -> RegistrationDraft {
    RegistrationDraft {
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: format!("{first}@example.com"),
        birth_date: "2010-04-15".to_string(),
        phone: "+79990001122".to_string(),
        telegram: "@attendee".to_string(),
        city: "Саратов".to_string(),
        church: "Слово Жизни".to_string(),
        role: "участник".to_string(),
        consent_donation: true,
        consent_personal_data: true,
        ..Default::default()
    }
}

pub struct TestService {
    pub engine: Arc<PaymentEngine>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub upload_dir: tempfile::TempDir,
}

pub fn service() -> TestService {
    service_with(Arc::new(TextStubExtractor), Arc::new(RecordingNotifier::default()))
}

pub fn service_with(
    extractor: Arc<dyn TextExtractor>,
    notifier: Arc<RecordingNotifier>,
) -> TestService {
    let upload_dir = tempfile::tempdir().expect("tempdir");
    let root = upload_dir.path().to_path_buf();
    service_at(extractor, notifier, root, upload_dir)
}

/// Like `service_with`, but stores receipts under `root` instead of the
/// sandbox directory itself. Lets tests point the file store at a path that
/// cannot be written.
pub fn service_at(
    extractor: Arc<dyn TextExtractor>,
    notifier: Arc<RecordingNotifier>,
    root: std::path::PathBuf,
    upload_dir: tempfile::TempDir,
) -> TestService {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(PaymentEngine::new(
        store.clone() as Arc<dyn RegistrationStore>,
        ReceiptFileStore::new(root),
        ReceiptVerifier::with_default_rules().expect("default rules"),
        extractor,
        notifier.clone(),
    ));
    TestService {
        engine,
        store,
        notifier,
        upload_dir,
    }
}

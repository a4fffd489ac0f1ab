//! Periodic export of registrations to a spreadsheet on the remote disk,
//! plus mirroring of stored receipt files.
//!
//! The job is a single sequential loop: mirror any receipts that have not
//! been mirrored yet (so the spreadsheet written right after carries their
//! public links), then rebuild and upload the full export. Runs never
//! overlap. Remote 423 Locked responses are retried a bounded number of
//! times; every other failure is logged and waits for the next tick.

use crate::disk::{RemoteError, RemoteStore};
use crate::model::{PaymentReceipt, Registration};
use crate::store::RegistrationStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use umya_spreadsheet::{Spreadsheet, new_file, writer};

const UPLOAD_ATTEMPTS: u32 = 3;
const LOCKED_RETRY_DELAY: Duration = Duration::from_secs(2);

const SHEET_NAME: &str = "Регистрации";
const MISSING_RECEIPT: &str = "Не загружен";

const HEADERS: [&str; 14] = [
    "ID",
    "Имя",
    "Фамилия",
    "Email",
    "Дата рождения",
    "Телефон",
    "Город",
    "Нужно жилье",
    "Церковь",
    "Роль",
    "ФИО родителя",
    "Телефон родителя",
    "ID оплаты",
    "Ссылка на чек",
];

/// Builds the export workbook from a registration snapshot. Each row pairs a
/// registration with its receipt, when one exists.
pub fn build_export_workbook(rows: &[(Registration, Option<PaymentReceipt>)]) -> Spreadsheet {
    let mut book = new_file();
    let sheet = book.get_sheet_mut(&0).expect("new workbook has a sheet");
    sheet.set_name(SHEET_NAME);

    for (col, header) in HEADERS.iter().enumerate() {
        sheet
            .get_cell_mut((col as u32 + 1, 1))
            .set_value(header.to_string());
    }

    for (idx, (registration, receipt)) in rows.iter().enumerate() {
        let row = idx as u32 + 2;
        let values: [String; 13] = [
            registration.id.to_string(),
            registration.first_name.clone(),
            registration.last_name.clone(),
            registration.email.clone(),
            registration.birth_date.clone(),
            registration.phone.clone(),
            registration.city.clone(),
            yes_no(registration.need_accommodation),
            registration.church.clone(),
            registration.role.clone(),
            registration.parent_full_name.clone().unwrap_or_default(),
            registration.parent_phone.clone().unwrap_or_default(),
            receipt
                .as_ref()
                .map(|r| r.id.to_string())
                .unwrap_or_default(),
        ];
        for (col, value) in values.into_iter().enumerate() {
            sheet.get_cell_mut((col as u32 + 1, row)).set_value(value);
        }

        // Mirrored receipts get a clickable link; the URL doubles as the
        // visible text so the cell degrades to plain text in dumb viewers.
        let link_cell = sheet.get_cell_mut((14u32, row));
        match receipt.as_ref().and_then(|r| r.public_url.as_deref()) {
            Some(url) => {
                link_cell.set_value(url.to_string());
                link_cell.get_hyperlink_mut().set_url(url);
            }
            None => {
                link_cell.set_value(MISSING_RECEIPT.to_string());
            }
        }
    }

    book
}

fn yes_no(value: bool) -> String {
    if value { "Да" } else { "Нет" }.to_string()
}

fn workbook_bytes(book: &Spreadsheet) -> Result<Vec<u8>> {
    let tmp = tempfile::Builder::new()
        .suffix(".xlsx")
        .tempfile()
        .context("failed to create export scratch file")?;
    writer::xlsx::write(book, tmp.path()).context("failed to serialize export workbook")?;
    std::fs::read(tmp.path()).context("failed to read back export workbook")
}

pub struct ExportSyncJob {
    store: Arc<dyn RegistrationStore>,
    remote: Arc<dyn RemoteStore>,
    export_path: String,
    receipts_folder: String,
    mirror_receipts: bool,
    interval: Duration,
    startup_delay: Duration,
}

impl ExportSyncJob {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        remote: Arc<dyn RemoteStore>,
        export_path: String,
        receipts_folder: String,
        mirror_receipts: bool,
        interval: Duration,
        startup_delay: Duration,
    ) -> Self {
        Self {
            store,
            remote,
            export_path,
            receipts_folder,
            mirror_receipts,
            interval,
            startup_delay,
        }
    }

    pub async fn run_forever(self) {
        tokio::time::sleep(self.startup_delay).await;
        loop {
            if let Err(err) = self.run_once().await {
                error!(error = %err, "export sync run failed");
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One full sync: mirror pending receipts, then upload the export.
    pub async fn run_once(&self) -> Result<()> {
        if self.mirror_receipts {
            self.mirror_pending_receipts().await;
        }

        let rows: Vec<_> = self
            .store
            .all()
            .into_iter()
            .map(|reg| {
                let receipt = self.store.receipt_for(reg.id);
                (reg, receipt)
            })
            .collect();
        let count = rows.len();

        let book = build_export_workbook(&rows);
        let bytes = workbook_bytes(&book)?;
        self.upload_with_retry(&self.export_path, bytes)
            .await
            .context("export upload failed")?;

        info!(registrations = count, path = %self.export_path, "export uploaded");
        Ok(())
    }

    /// Mirrors each stored-but-unmirrored receipt file to the remote folder
    /// and records its public link. A receipt is marked mirrored exactly
    /// once; per-receipt failures are logged and retried on the next run.
    async fn mirror_pending_receipts(&self) {
        for registration in self.store.all() {
            let Some(receipt) = self.store.receipt_for(registration.id) else {
                continue;
            };
            if receipt.mirrored {
                continue;
            }
            let Some(path) = receipt.file_path.clone() else {
                continue;
            };

            if let Err(err) = self.mirror_receipt(receipt, &path).await {
                warn!(
                    registration_id = %registration.id,
                    error = %err,
                    "receipt mirroring failed"
                );
            }
        }
    }

    async fn mirror_receipt(
        &self,
        mut receipt: PaymentReceipt,
        local_path: &std::path::Path,
    ) -> Result<()> {
        let bytes = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("failed to read {}", local_path.display()))?;

        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("receipt path has no file name")?;
        let remote_path = format!("{}/{}", self.receipts_folder, file_name);

        self.upload_with_retry(&remote_path, bytes).await?;
        self.remote
            .publish(&remote_path)
            .await
            .context("publish failed")?;
        let public_url = self
            .remote
            .public_url(&remote_path)
            .await
            .context("public link lookup failed")?;

        receipt.mirrored = true;
        receipt.public_url = public_url;
        self.store
            .update_receipt(&receipt)
            .context("failed to persist mirror state")?;

        debug!(remote_path, "receipt mirrored");
        Ok(())
    }

    async fn upload_with_retry(&self, path: &str, bytes: Vec<u8>) -> Result<(), RemoteError> {
        let mut attempt = 1;
        loop {
            match self.remote.upload(path, bytes.clone()).await {
                Ok(()) => return Ok(()),
                Err(RemoteError::Locked) if attempt < UPLOAD_ATTEMPTS => {
                    warn!(path, attempt, "remote path locked, retrying");
                    tokio::time::sleep(LOCKED_RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReceiptId, RegistrationId};
    use chrono::Utc;

    fn registration(id: u64, first: &str, last: &str) -> Registration {
        Registration {
            id: RegistrationId(id),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: format!("{first}@example.com"),
            birth_date: "2010-03-12".to_string(),
            phone: "+79990001122".to_string(),
            telegram: "@x".to_string(),
            city: "Саратов".to_string(),
            need_accommodation: id % 2 == 0,
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

    fn receipt(id: u64, registration_id: u64, url: Option<&str>) -> PaymentReceipt {
        PaymentReceipt {
            id: ReceiptId(id),
            registration_id: RegistrationId(registration_id),
            donation_amount: 500.0,
            verified: true,
            paid: true,
            payment_reference: None,
            file_name: Some("receipt.pdf".to_string()),
            file_path: None,
            file_size: Some(10),
            mirrored: url.is_some(),
            public_url: url.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    fn cell(book: &Spreadsheet, col: u32, row: u32) -> String {
        book.get_sheet(&0).unwrap().get_value((col, row))
    }

    #[test]
    fn header_row_is_fixed() {
        let book = build_export_workbook(&[]);
        assert_eq!(cell(&book, 1, 1), "ID");
        assert_eq!(cell(&book, 8, 1), "Нужно жилье");
        assert_eq!(cell(&book, 14, 1), "Ссылка на чек");
    }

    #[test]
    fn rows_follow_snapshot_order() {
        let rows = vec![
            (registration(1, "Иван", "Иванов"), None),
            (
                registration(2, "Мария", "Петрова"),
                Some(receipt(11, 2, Some("https://yadi.sk/i/abc"))),
            ),
        ];
        let book = build_export_workbook(&rows);

        assert_eq!(cell(&book, 1, 2), "1");
        assert_eq!(cell(&book, 2, 2), "Иван");
        assert_eq!(cell(&book, 8, 2), "Нет");
        assert_eq!(cell(&book, 14, 2), MISSING_RECEIPT);

        assert_eq!(cell(&book, 1, 3), "2");
        assert_eq!(cell(&book, 8, 3), "Да");
        assert_eq!(cell(&book, 13, 3), "11");
        assert_eq!(cell(&book, 14, 3), "https://yadi.sk/i/abc");
    }

    #[test]
    fn mirrored_receipt_cell_is_a_hyperlink() {
        let rows = vec![(
            registration(2, "Мария", "Петрова"),
            Some(receipt(11, 2, Some("https://yadi.sk/i/abc"))),
        )];
        let book = build_export_workbook(&rows);

        let sheet = book.get_sheet(&0).unwrap();
        let link = sheet
            .get_cell((14u32, 2u32))
            .and_then(|cell| cell.get_hyperlink())
            .expect("link cell carries a hyperlink");
        assert_eq!(link.get_url(), "https://yadi.sk/i/abc");

        // The placeholder cell must not be clickable.
        let rows = vec![(registration(1, "Иван", "Иванов"), None)];
        let book = build_export_workbook(&rows);
        let sheet = book.get_sheet(&0).unwrap();
        assert!(
            sheet
                .get_cell((14u32, 2u32))
                .and_then(|cell| cell.get_hyperlink())
                .is_none()
        );
    }

    #[test]
    fn mirrored_receipt_without_link_shows_placeholder() {
        let rows = vec![(registration(3, "Пётр", "Сидоров"), Some(receipt(5, 3, None)))];
        let book = build_export_workbook(&rows);
        assert_eq!(cell(&book, 14, 2), MISSING_RECEIPT);
    }
}

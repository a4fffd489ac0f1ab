//! Text extraction from uploaded receipt documents.
//!
//! Extraction runs on the blocking pool with a hard timeout; a receipt that
//! cannot be parsed yields an empty string and lets the verifier report the
//! document as unreadable instead of failing the whole attempt.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::task;
use tracing::warn;

const EXTRACT_TIMEOUT: Duration = Duration::from_secs(10);

/// Seam for turning uploaded bytes into searchable text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String>;
}

/// PDF extractor over `lopdf`.
pub struct PdfTextExtractor {
    timeout: Duration,
}

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self {
            timeout: EXTRACT_TIMEOUT,
        }
    }
}

impl Default for PdfTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String> {
        let parse = task::spawn_blocking(move || extract_pdf_text(&bytes));
        match tokio::time::timeout(self.timeout, parse).await {
            Ok(joined) => joined.context("pdf extraction task panicked")?,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "pdf extraction timed out");
                anyhow::bail!("pdf extraction timed out");
            }
        }
    }
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    let document = lopdf::Document::load_mem(bytes).context("failed to parse pdf")?;
    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    let text = document
        .extract_text(&pages)
        .context("failed to extract pdf text")?;
    Ok(text)
}

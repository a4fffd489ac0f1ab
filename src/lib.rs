pub mod config;
pub mod disk;
pub mod error;
pub mod export;
pub mod extract;
pub mod http;
pub mod logging;
pub mod model;
pub mod notify;
pub mod payment;
pub mod receipt_file;
pub mod reference;
pub mod store;
pub mod translit;
pub mod verify;

pub use config::{CliArgs, ExportConfig, ServiceConfig};
pub use error::CompletionError;
pub use logging::{LoggingConfig, init_logging};
pub use payment::{PaymentEngine, PaymentProof};

use anyhow::{Context, Result};
use disk::DiskClient;
use export::ExportSyncJob;
use extract::PdfTextExtractor;
use notify::LogNotifier;
use receipt_file::ReceiptFileStore;
use std::sync::Arc;
use store::{MemoryStore, RegistrationStore};
use tokio::net::TcpListener;
use verify::{ReceiptVerifier, VerifierRules};

pub async fn run_service(config: ServiceConfig) -> Result<()> {
    let store: Arc<dyn RegistrationStore> = Arc::new(MemoryStore::new());

    let rules = VerifierRules {
        amount: config.donation_amount,
        ..VerifierRules::default()
    };
    let verifier = ReceiptVerifier::new(rules)?;

    let engine = Arc::new(PaymentEngine::new(
        store.clone(),
        ReceiptFileStore::new(&config.upload_root),
        verifier,
        Arc::new(PdfTextExtractor::new()),
        Arc::new(LogNotifier),
    ));

    if let Some(token) = config.export.access_token.clone() {
        let remote = DiskClient::new(config.export.base_url.clone(), token)?;
        let job = ExportSyncJob::new(
            store.clone(),
            Arc::new(remote),
            config.export.export_path.clone(),
            config.export.receipts_folder.clone(),
            config.export.mirror_receipts,
            config.export.interval,
            config.export.startup_delay,
        );
        tracing::info!(
            interval_secs = config.export.interval.as_secs(),
            path = %config.export.export_path,
            "export sync enabled"
        );
        tokio::spawn(job.run_forever());
    } else {
        tracing::info!("export sync disabled: no disk token configured");
    }

    let router = http::router(engine);
    let listener = TcpListener::bind(config.http_bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.http_bind_address))?;
    let actual_addr = listener.local_addr()?;
    tracing::info!(bind = %actual_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await
        .map_err(anyhow::Error::from)
}

//! Remote disk client used by the export job to mirror files.
//!
//! The wire protocol is the Yandex Disk REST API: uploads are a two-step
//! handshake (fetch an upload href, PUT the bytes to it), publication is a
//! separate call, and the shareable link is read back from resource metadata.
//! The remote returns 423 Locked while it processes a previous write to the
//! same path; that case is surfaced as its own error variant so the caller
//! can retry it and nothing else.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The remote resource is busy; the operation may succeed on retry.
    #[error("remote resource is locked")]
    Locked,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Seam over the remote disk so the export job tests without a network.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Uploads `bytes` to `path`, overwriting any existing file.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), RemoteError>;

    /// Makes `path` publicly readable.
    async fn publish(&self, path: &str) -> Result<(), RemoteError>;

    /// Returns the shareable link for `path`, if one exists.
    async fn public_url(&self, path: &str) -> Result<Option<String>, RemoteError>;
}

pub struct DiskClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct UploadHref {
    href: String,
}

#[derive(Debug, Deserialize)]
struct ResourceMeta {
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default)]
    public_url: Option<String>,
}

impl DiskClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    fn auth(&self) -> String {
        format!("OAuth {}", self.token)
    }

    fn check_status(status: StatusCode) -> Result<(), RemoteError> {
        if status == StatusCode::LOCKED {
            return Err(RemoteError::Locked);
        }
        if !status.is_success() {
            return Err(RemoteError::Other(anyhow::anyhow!(
                "remote disk returned {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for DiskClient {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), RemoteError> {
        let url = format!("{}/v1/disk/resources/upload", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth())
            .query(&[("path", path), ("overwrite", "true")])
            .send()
            .await
            .context("upload href request failed")?;
        Self::check_status(response.status())?;

        let target: UploadHref = response
            .json()
            .await
            .context("upload href response was not json")?;

        let response = self
            .http
            .put(&target.href)
            .body(bytes)
            .send()
            .await
            .context("upload put failed")?;
        Self::check_status(response.status())?;

        debug!(path, "file uploaded to remote disk");
        Ok(())
    }

    async fn publish(&self, path: &str) -> Result<(), RemoteError> {
        let url = format!("{}/v1/disk/resources/publish", self.base_url);
        let response = self
            .http
            .put(&url)
            .header("Authorization", self.auth())
            .query(&[("path", path)])
            .send()
            .await
            .context("publish request failed")?;
        Self::check_status(response.status())
    }

    async fn public_url(&self, path: &str) -> Result<Option<String>, RemoteError> {
        let url = format!("{}/v1/disk/resources", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth())
            .query(&[("path", path), ("fields", "public_key,public_url")])
            .send()
            .await
            .context("resource metadata request failed")?;
        Self::check_status(response.status())?;

        let meta: ResourceMeta = response
            .json()
            .await
            .context("resource metadata was not json")?;

        Ok(Some(resolve_public_url(meta, path)))
    }
}

/// Picks the best available link for a published resource. Short link from
/// the public key when the remote provides one; some accounts only return
/// the long `public_url` form. When neither is present yet, fall back to the
/// web UI path so the export still carries a usable link.
fn resolve_public_url(meta: ResourceMeta, path: &str) -> String {
    if let Some(key) = meta.public_key {
        return format!("https://yadi.sk/i/{key}");
    }
    if let Some(url) = meta.public_url {
        return url;
    }
    format!("https://disk.yandex.ru/client/disk{path}")
}

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";
const DEFAULT_UPLOAD_ROOT: &str = "uploads/receipts";
const DEFAULT_DONATION_AMOUNT: f64 = 500.0;

const DEFAULT_DISK_BASE_URL: &str = "https://cloud-api.yandex.net";
const DEFAULT_EXPORT_PATH: &str = "/Конференция/Регистрации.xlsx";
const DEFAULT_RECEIPTS_FOLDER: &str = "/Конференция/Чеки";
const DEFAULT_EXPORT_INTERVAL_SECS: u64 = 300;
const DEFAULT_EXPORT_STARTUP_DELAY_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub http_bind_address: SocketAddr,
    pub upload_root: PathBuf,
    pub donation_amount: f64,
    pub export: ExportConfig,
}

/// Export-sync settings. The job runs only when an access token is present.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub access_token: Option<String>,
    pub base_url: String,
    pub export_path: String,
    pub receipts_folder: String,
    pub mirror_receipts: bool,
    pub interval: Duration,
    pub startup_delay: Duration,
}

impl ExportConfig {
    pub fn enabled(&self) -> bool {
        self.access_token.is_some()
    }
}

impl ServiceConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            http_bind: cli_http_bind,
            upload_root: cli_upload_root,
            donation_amount: cli_donation_amount,
            disk_token: cli_disk_token,
            disk_base_url: cli_disk_base_url,
            export_path: cli_export_path,
            receipts_folder: cli_receipts_folder,
            no_mirror: cli_no_mirror,
            export_interval_secs: cli_interval,
            export_startup_delay_secs: cli_startup_delay,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            http_bind: file_http_bind,
            upload_root: file_upload_root,
            donation_amount: file_donation_amount,
            disk_token: file_disk_token,
            disk_base_url: file_disk_base_url,
            export_path: file_export_path,
            receipts_folder: file_receipts_folder,
            mirror_receipts: file_mirror_receipts,
            export_interval_secs: file_interval,
            export_startup_delay_secs: file_startup_delay,
        } = file_config;

        let http_bind_address = cli_http_bind.or(file_http_bind).unwrap_or_else(|| {
            DEFAULT_HTTP_BIND
                .parse()
                .expect("default bind address valid")
        });

        let upload_root = cli_upload_root
            .or(file_upload_root)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_ROOT));

        let donation_amount = cli_donation_amount
            .or(file_donation_amount)
            .unwrap_or(DEFAULT_DONATION_AMOUNT);
        anyhow::ensure!(
            donation_amount > 0.0,
            "donation amount must be positive, got {donation_amount}"
        );

        let access_token = cli_disk_token
            .or(file_disk_token)
            .filter(|token| !token.trim().is_empty());

        let mirror_receipts = if cli_no_mirror {
            false
        } else {
            file_mirror_receipts.unwrap_or(true)
        };

        let export = ExportConfig {
            access_token,
            base_url: cli_disk_base_url
                .or(file_disk_base_url)
                .unwrap_or_else(|| DEFAULT_DISK_BASE_URL.to_string()),
            export_path: cli_export_path
                .or(file_export_path)
                .unwrap_or_else(|| DEFAULT_EXPORT_PATH.to_string()),
            receipts_folder: cli_receipts_folder
                .or(file_receipts_folder)
                .unwrap_or_else(|| DEFAULT_RECEIPTS_FOLDER.to_string()),
            mirror_receipts,
            interval: Duration::from_secs(
                cli_interval
                    .or(file_interval)
                    .unwrap_or(DEFAULT_EXPORT_INTERVAL_SECS)
                    .max(1),
            ),
            startup_delay: Duration::from_secs(
                cli_startup_delay
                    .or(file_startup_delay)
                    .unwrap_or(DEFAULT_EXPORT_STARTUP_DELAY_SECS),
            ),
        };

        Ok(Self {
            http_bind_address,
            upload_root,
            donation_amount,
            export,
        })
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(name = "confreg", about = "Conference registration payment service", version)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "CONFREG_HTTP_BIND",
        value_name = "ADDR",
        help = "HTTP bind address"
    )]
    pub http_bind: Option<SocketAddr>,

    #[arg(
        long,
        env = "CONFREG_UPLOAD_ROOT",
        value_name = "DIR",
        help = "Directory receipt files are stored under"
    )]
    pub upload_root: Option<PathBuf>,

    #[arg(
        long,
        env = "CONFREG_DONATION_AMOUNT",
        value_name = "AMOUNT",
        help = "Expected donation amount on receipts",
        value_parser = clap::value_parser!(f64)
    )]
    pub donation_amount: Option<f64>,

    #[arg(
        long,
        env = "CONFREG_DISK_TOKEN",
        value_name = "TOKEN",
        help = "OAuth token for the remote disk; export sync is disabled without it"
    )]
    pub disk_token: Option<String>,

    #[arg(
        long,
        env = "CONFREG_DISK_BASE_URL",
        value_name = "URL",
        help = "Remote disk API base URL"
    )]
    pub disk_base_url: Option<String>,

    #[arg(
        long,
        env = "CONFREG_EXPORT_PATH",
        value_name = "PATH",
        help = "Remote path of the exported spreadsheet"
    )]
    pub export_path: Option<String>,

    #[arg(
        long,
        env = "CONFREG_RECEIPTS_FOLDER",
        value_name = "PATH",
        help = "Remote folder receipt files are mirrored into"
    )]
    pub receipts_folder: Option<String>,

    #[arg(long, help = "Disable receipt mirroring; only the spreadsheet is synced")]
    pub no_mirror: bool,

    #[arg(
        long,
        env = "CONFREG_EXPORT_INTERVAL_SECS",
        value_name = "SECS",
        help = "Seconds between export sync runs",
        value_parser = clap::value_parser!(u64)
    )]
    pub export_interval_secs: Option<u64>,

    #[arg(
        long,
        env = "CONFREG_EXPORT_STARTUP_DELAY_SECS",
        value_name = "SECS",
        help = "Seconds to wait before the first export sync run",
        value_parser = clap::value_parser!(u64)
    )]
    pub export_startup_delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    http_bind: Option<SocketAddr>,
    upload_root: Option<PathBuf>,
    donation_amount: Option<f64>,
    disk_token: Option<String>,
    disk_base_url: Option<String>,
    export_path: Option<String>,
    receipts_folder: Option<String>,
    mirror_receipts: Option<bool>,
    export_interval_secs: Option<u64>,
    export_startup_delay_secs: Option<u64>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

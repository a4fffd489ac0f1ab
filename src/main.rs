use clap::Parser;
use confreg::{CliArgs, LoggingConfig, ServiceConfig, init_logging, run_service};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logging_config = LoggingConfig::from_env();
    let _guard = init_logging(logging_config)?;

    let cli = CliArgs::parse();
    let config = ServiceConfig::from_args(cli)?;

    run_service(config).await
}

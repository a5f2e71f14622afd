use anyhow::Result;
use tracing::{error, info};

mod api;
mod classify;
mod cli;
mod inference;
mod registry;
mod scrape;
mod session;
mod storage;
mod surface;
mod utils;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args();

    let log_file = args.log_file.clone().unwrap_or_else(utils::default_log_file);
    utils::init_logging(args.verbose, Some(log_file))?;

    info!("Starting feed-pilot v{}", env!("CARGO_PKG_VERSION"));

    match cli::process_command(args).await {
        Ok(_) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            Err(e)
        }
    }
}

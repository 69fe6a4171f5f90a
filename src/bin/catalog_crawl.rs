use anyhow::Result;
use tracing::{error, info};

use parts_harvester::catalog;
use parts_harvester::config::Settings;
use parts_harvester::logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env();
    let _log_guard = logging::init(&settings.data_dir)?;

    info!("Starting full-catalog crawl of {}", settings.base_url);

    tokio::select! {
        result = catalog::run_catalog_crawl(settings) => {
            if let Err(e) = result {
                error!("Catalog crawl failed: {:#}", e);
                std::process::exit(1);
            }
            info!("Catalog crawl finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted; the most recent incremental save is kept");
        }
    }

    Ok(())
}

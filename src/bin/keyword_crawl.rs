use anyhow::Result;
use tracing::{error, info};

use parts_harvester::config::Settings;
use parts_harvester::keyword;
use parts_harvester::logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env();
    let _log_guard = logging::init(&settings.data_dir)?;

    info!(
        "Starting keyword crawl for {:?} on {}",
        settings.target_keywords, settings.base_url
    );

    tokio::select! {
        result = keyword::run_keyword_crawl(settings) => {
            if let Err(e) = result {
                error!("Keyword crawl failed: {:#}", e);
                std::process::exit(1);
            }
            info!("Keyword crawl finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted before the merged snapshot was written");
        }
    }

    Ok(())
}

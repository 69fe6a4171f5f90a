use anyhow::Result;
use tracing::error;

use parts_harvester::config::Settings;
use parts_harvester::logging;
use parts_harvester::viewer;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env();
    let _log_guard = logging::init(&settings.data_dir)?;

    let addr = std::env::var("VIEWER_ADDR").unwrap_or_else(|_| "127.0.0.1:8600".to_string());

    if let Err(e) = viewer::serve(settings, &addr).await {
        error!("Viewer failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

mod analysis;
mod comfy_table;
mod error;
mod format_utils;
mod indicators;
mod macro_context;
mod market;
mod perps;
mod report;
mod settings;
mod storage_utils;
mod telegram;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use settings::Settings;
use storage_utils::{AppConfig, AsyncStorageManager};
use tracing::subscriber::set_global_default;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    set_global_default(subscriber)?;

    // Both credentials are required; fail before touching the network.
    let settings =
        Settings::new().context("TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must both be set")?;

    let storage = AsyncStorageManager::new_relative("storage").await?;
    let config: AppConfig = storage
        .load_or_default("config")
        .await
        .with_context(|| format!("invalid config.json in {:?}", storage.base_dir))?;
    info!(?settings, watchlist = config.report.watchlist.len(), "starting digest run");

    match analysis::run_analysis_pipeline(&config, settings).await {
        Ok(summary) => {
            if !summary.delivered {
                info!(
                    sections = summary.report.sections.len(),
                    "digest built but not delivered, see the console copy"
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("Error fetching data: {:#}", e);
            Err(e)
        }
    }
}

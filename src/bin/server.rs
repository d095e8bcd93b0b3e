use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use readme_updater::api::{router, ReadmeService};
use readme_updater::config::get_env_value;
use readme_updater::{logging, Config};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_level = get_env_value("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
    logging::init(&log_level)?;

    let config_path = get_env_value("README_UPDATER_CONFIG").map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("loading configuration")?;
    config.ensure_directories_exist().await?;

    let service = Arc::new(ReadmeService::from_config(&config)?);

    info!("readme-updater server starting...");
    info!("LLM provider: {} ({})", config.llm.provider, config.llm.model);
    info!("Backup directory: {}", config.backup.dir.display());
    info!("Health check: http://{}/health", config.server.bind);

    let app = router(service);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    info!("Server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

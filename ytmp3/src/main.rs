use tokio_util::sync::CancellationToken;
use ytmp3::api::{ApiServer, ApiServerConfig, AppState};
use ytmp3::config::ConverterConfig;
use ytmp3::converter::ArtifactStore;
use ytmp3::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let (logging_config, _log_guard) = logging::init_logging(&log_dir)?;

    let converter_config = ConverterConfig::from_env_or_default();
    converter_config.validate()?;
    let server_config = ApiServerConfig::from_env_or_default();
    tracing::info!(
        ytdlp = %converter_config.ytdlp_path,
        ffmpeg = %converter_config.ffmpeg_path,
        ffprobe = %converter_config.ffprobe_path,
        artifact_dir = %converter_config.artifact_dir.display(),
        work_dir = %converter_config.work_dir.display(),
        "Converter configured"
    );

    ArtifactStore::new(
        converter_config.artifact_dir.clone(),
        converter_config.work_dir.clone(),
    )
    .prepare()
    .await?;

    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        signal_token.cancel();
    });

    let state = AppState::from_config(converter_config, shutdown.clone());
    let server = ApiServer::with_state(server_config, state, shutdown);
    server.run().await?;

    tracing::info!("ytmp3 stopped");
    Ok(())
}

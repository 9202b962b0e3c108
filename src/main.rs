use anyhow::Result;
use card_ocr::config::AppConfig;
use card_ocr::errors::error_logging;
use card_ocr::observability;
use card_ocr::ocr::{OcrService, TesseractRecognizer};
use card_ocr::server::{self, AppState};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Load and validate configuration, failing fast on a missing API token
fn load_configuration() -> Result<AppConfig> {
    let config = AppConfig::from_env()?;
    config.validate().map_err(|e| {
        anyhow::anyhow!("Configuration validation failed: {}. Please check your environment variables.", e)
    })?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let startup_time = Instant::now();

    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = load_configuration()?;
    let metrics_handle = observability::init_observability(&config.observability)?;
    info!("{}", config.summary());

    // Tesseract initialization is blocking and loads the language model
    let recognizer = Arc::new(TesseractRecognizer::new(config.ocr.clone()));
    {
        let recognizer = Arc::clone(&recognizer);
        tokio::task::spawn_blocking(move || recognizer.warm_up())
            .await?
            .map_err(|e| {
                error_logging::log_config_error(&e, "TESSDATA_PATH", "ocr_warm_up");
                anyhow::anyhow!("OCR engine initialization failed: {}", e)
            })?;
    }

    let ocr = Arc::new(OcrService::from_config(recognizer, &config.ocr));
    let state = Arc::new(AppState {
        api_token: config.auth.api_token.clone(),
        max_upload_bytes: config.server.max_upload_bytes,
        ocr,
        metrics: metrics_handle,
    });

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;

    observability::record_startup_metrics(startup_time.elapsed());
    info!(
        startup_ms = startup_time.elapsed().as_millis() as u64,
        "Card OCR service started"
    );

    server::run_server(listener, state, shutdown_signal()).await
}

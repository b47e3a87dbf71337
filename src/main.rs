use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod audio;
mod catalog;
mod config;
mod error;
mod output;
mod pipeline;
mod text;
mod tts;
mod vc;

use api::routes::{create_router, AppState};
use catalog::SpeakerCatalog;
use config::Config;
use output::OutputAllocator;
use pipeline::{GenerationPipeline, HintOverrides};
use tts::vits::VitsEngine;
use tts::TtsAdapter;
use vc::rvc::RvcEngine;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Revoice Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Native voices directory: {}", config.voices_dir.display());
    match &config.models_dir {
        Some(dir) => tracing::info!("Conversion models directory: {}", dir.display()),
        None => tracing::info!("Voice conversion is disabled"),
    }

    // The catalog is built exactly once; a bad speaker layout must not start.
    let catalog = match SpeakerCatalog::build(&config) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            tracing::error!("Speaker catalog build failed: {}", e);
            std::process::exit(1);
        }
    };

    for dir in [&config.scratch_dir, &config.output_dir] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::error!("Cannot create writable directory {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    }

    let pipeline = Arc::new(GenerationPipeline::new(
        Arc::clone(&catalog),
        TtsAdapter::new(
            Arc::new(VitsEngine::new(config.voices_dir.clone())),
            config.scratch_dir.clone(),
        ),
        Arc::new(RvcEngine::new()),
        OutputAllocator::new(config.output_dir.clone()),
        HintOverrides {
            emotion: config.fixed_emotion.clone(),
            speed: config.fixed_speed,
        },
    ));

    let state = Arc::new(AppState {
        catalog,
        pipeline,
        request_timeout: config.request_timeout,
    });

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid address");

    tracing::info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

pub mod audio_toolkit;
pub mod cli;
pub mod client;
pub mod engines;
pub mod error;
pub mod handler;
pub mod managers;
pub mod server;
pub mod settings;
pub mod wyoming;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::sync::Arc;
use tokio::runtime::Runtime;

use cli::CliArgs;
use handler::EventHandler;
use managers::model::load_registry;
use managers::transcription::{InferenceGate, TranscriptionManager};
use server::{Listener, Server};
use settings::{LogFormat, Settings};

pub fn init_logging(debug: bool, format: LogFormat) {
    let level = if debug { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    match format {
        LogFormat::Default => builder.format_target(false),
        LogFormat::Plain => builder.format_timestamp(None).format_target(false),
        LogFormat::Full => builder.format_timestamp_millis().format_target(true),
    };
    builder.init();
}

/// Entry point of the `wyoming-asr` binary.
pub fn run() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.debug, args.log_format);

    let settings = Settings::from_args(args)?;
    debug!(
        "English model: {:?}, multilingual model: {:?}, device: {}",
        settings.english, settings.multilingual, settings.device
    );

    // Models load before the runtime starts; local engines block while loading.
    let registry = load_registry(&settings)?;
    let gate = Arc::new(InferenceGate::new());
    let transcription = Arc::new(TranscriptionManager::new(registry, gate));
    let handler = EventHandler::new(transcription, settings.initial_prompt.as_deref())
        .context("Failed to build the info event")?;

    let rt = Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(serve(settings, Arc::new(handler)))
}

pub async fn serve(settings: Settings, handler: Arc<EventHandler>) -> Result<()> {
    let listener = Listener::bind(&settings.uri).await?;
    let server = Server::new(handler)
        .with_temp_root(settings.temp_dir.clone())
        .close_after_transcript(settings.close_after_transcript);

    info!("Ready, listening on {}", settings.uri);
    server
        .run(listener, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await
}

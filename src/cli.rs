use clap::Parser;
use std::path::PathBuf;

use crate::managers::model::EngineType;
use crate::settings::{Device, ListenUri, LogFormat, Quantization};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "wyoming-asr",
    version,
    about = "Wyoming protocol server for offline speech recognition"
)]
pub struct CliArgs {
    /// Address to listen on: unix:// or tcp://
    #[arg(long)]
    pub uri: ListenUri,

    /// English model (model id for the remote engine, model path for local engines)
    #[arg(long)]
    pub model_en: Option<String>,

    #[arg(long, value_enum, default_value_t = EngineType::Remote)]
    pub engine_en: EngineType,

    /// Multilingual model used for every language other than English
    #[arg(long)]
    pub model_multilingual: Option<String>,

    #[arg(long, value_enum, default_value_t = EngineType::Remote)]
    pub engine_multilingual: EngineType,

    /// Comma-separated languages advertised for the multilingual model
    #[arg(long, value_delimiter = ',')]
    pub multilingual_languages: Vec<String>,

    /// Base URL of an OpenAI-compatible transcription API
    #[arg(long, default_value = "http://127.0.0.1:8000/v1")]
    pub remote_url: String,

    #[arg(long, env = "WYOMING_ASR_API_KEY", hide_env_values = true)]
    pub remote_api_key: Option<String>,

    /// Device to use for local inference
    #[arg(long, value_enum, default_value_t = Device::Cpu)]
    pub device: Device,

    /// Load local models quantized
    #[arg(long, value_enum)]
    pub quantization: Option<Quantization>,

    /// Accepted for compatibility; not applied to any model
    #[arg(long)]
    pub initial_prompt: Option<String>,

    /// Directory in which per-session temporary directories are created
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Close the connection after every transcript
    #[arg(long)]
    pub close_after_transcript: bool,

    /// Log DEBUG messages
    #[arg(long)]
    pub debug: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Default)]
    pub log_format: LogFormat,
}

//! Stream a WAV file to a Wyoming ASR server and print the transcript.

use anyhow::{anyhow, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use wyoming_asr::client::{describe, load_pcm, transcribe_pcm};
use wyoming_asr::settings::{ListenUri, LogFormat};
use wyoming_asr::wyoming::Event;

#[derive(Parser, Debug)]
#[command(name = "asr-client", version, about = "Transcribe a WAV file using a Wyoming ASR service")]
struct ClientArgs {
    /// Path to the WAV file to transcribe
    wav_file: PathBuf,

    #[arg(long, default_value = "tcp://127.0.0.1:10300")]
    uri: ListenUri,

    /// Language to request for this utterance
    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    debug: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Default)]
    log_format: LogFormat,
}

async fn transcribe_wav(args: &ClientArgs) -> Result<String> {
    let (format, audio) = load_pcm(&args.wav_file)?;
    info!("Streaming {:?} ({}, {} bytes)", args.wav_file, format, audio.len());

    let server_info = describe(&args.uri).await?;
    for program in &server_info.asr {
        for model in &program.models {
            info!("Server model: {} {:?}", model.name, model.languages);
        }
    }

    let request = args
        .language
        .as_deref()
        .map(|language| Event::transcribe(Some(language)));
    transcribe_pcm(&args.uri, request.as_ref(), format, &audio).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ClientArgs::parse();
    wyoming_asr::init_logging(args.debug, args.log_format);

    if !args.wav_file.exists() {
        return Err(anyhow!("WAV file {:?} does not exist", args.wav_file));
    }

    let text = transcribe_wav(&args).await?;
    if text.starts_with("ERROR: ") {
        warn!("Server could not transcribe the audio");
    }
    println!("Transcription: {}", text);
    Ok(())
}

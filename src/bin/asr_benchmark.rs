//! Time repeated transcriptions of one WAV file against each model a Wyoming
//! ASR server advertises.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use wyoming_asr::client::{describe, load_pcm, transcribe_pcm};
use wyoming_asr::managers::model::ENGLISH;
use wyoming_asr::settings::{ListenUri, LogFormat};
use wyoming_asr::wyoming::{AsrModel, AudioFormat, Event};

#[derive(Parser, Debug)]
#[command(name = "asr-benchmark", version, about = "Benchmark Wyoming ASR models")]
struct BenchmarkArgs {
    /// Path to the WAV file to transcribe
    wav_file: PathBuf,

    #[arg(long, default_value = "tcp://127.0.0.1:10300")]
    uri: ListenUri,

    /// Transcriptions per model
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    iterations: u32,

    /// Models to test (default: every model the server advertises)
    #[arg(long, num_args = 1..)]
    models: Vec<String>,

    /// Save the results as JSON
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    debug: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Default)]
    log_format: LogFormat,
}

#[derive(Debug, Serialize, PartialEq)]
struct ModelResult {
    mean_time: f64,
    std_dev: f64,
    min_time: f64,
    max_time: f64,
    successful_iterations: usize,
    transcripts: Vec<String>,
}

/// Timing summary in seconds. `None` when no iteration succeeded.
fn summarize(times: &[f64], transcripts: Vec<String>) -> Option<ModelResult> {
    if times.is_empty() {
        return None;
    }

    let n = times.len() as f64;
    let mean = times.iter().sum::<f64>() / n;
    // sample standard deviation
    let std_dev = if times.len() > 1 {
        (times.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };

    Some(ModelResult {
        mean_time: mean,
        std_dev,
        min_time: times.iter().copied().fold(f64::INFINITY, f64::min),
        max_time: times.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        successful_iterations: times.len(),
        transcripts,
    })
}

/// Language that makes the server route to `model`. The server picks models by
/// language, so a multilingual model is reached with any of its non-English
/// languages.
fn routing_language(model: &AsrModel) -> Option<&str> {
    model
        .languages
        .iter()
        .find(|language| language.as_str() != ENGLISH)
        .or_else(|| model.languages.first())
        .map(String::as_str)
}

async fn benchmark_model(
    args: &BenchmarkArgs,
    name: &str,
    language: Option<&str>,
    format: AudioFormat,
    audio: &[u8],
) -> Option<ModelResult> {
    info!("Benchmarking model: {} (language {:?})", name, language);
    let request = Event::transcribe_model(name, language);

    let mut times = Vec::new();
    let mut transcripts = Vec::new();
    for i in 0..args.iterations {
        let st = Instant::now();
        match transcribe_pcm(&args.uri, Some(&request), format, audio).await {
            Ok(text) => {
                let elapsed = st.elapsed().as_secs_f64();
                info!("  Iteration {}/{}: {:.2}s", i + 1, args.iterations, elapsed);
                times.push(elapsed);
                transcripts.push(text);
            }
            Err(e) => {
                warn!("Error with model {}: {:#}", name, e);
                break;
            }
        }
    }

    summarize(&times, transcripts)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = BenchmarkArgs::parse();
    wyoming_asr::init_logging(args.debug, args.log_format);

    if !args.wav_file.exists() {
        return Err(anyhow!("WAV file {:?} does not exist", args.wav_file));
    }
    let (format, audio) = load_pcm(&args.wav_file)?;

    info!("Discovering available models...");
    let advertised: Vec<AsrModel> = describe(&args.uri)
        .await?
        .asr
        .into_iter()
        .flat_map(|program| program.models)
        .collect();

    let models: Vec<String> = if args.models.is_empty() {
        advertised.iter().map(|model| model.name.clone()).collect()
    } else {
        args.models.clone()
    };
    if models.is_empty() {
        return Err(anyhow!("No models found"));
    }
    info!("Found models: {}", models.join(", "));

    let mut results = BTreeMap::new();
    for name in &models {
        let language = match advertised.iter().find(|model| &model.name == name) {
            Some(model) => routing_language(model),
            None => {
                warn!("Model {} is not advertised by the server", name);
                None
            }
        };
        if let Some(result) = benchmark_model(&args, name, language, format, &audio).await {
            results.insert(name.clone(), result);
        }
    }

    println!("\nBenchmark Results:");
    println!("{}", "-".repeat(80));
    for (model, result) in &results {
        println!("\nModel: {}", model);
        println!(
            "  Average Time: {:.2}s ± {:.2}s",
            result.mean_time, result.std_dev
        );
        println!("  Range: {:.2}s - {:.2}s", result.min_time, result.max_time);
        println!(
            "  Successful Iterations: {}/{}",
            result.successful_iterations, args.iterations
        );
        if let Some(transcript) = result.transcripts.first() {
            println!("  Sample Transcript: {}", transcript);
        }
    }

    if let Some(output) = &args.output {
        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(output, json)
            .with_context(|| format!("Failed to write results to {:?}", output))?;
        println!("\nResults saved to {:?}", output);
    }

    Ok(())
}

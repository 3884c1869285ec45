use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use transcribe_rs::{
    engines::{
        parakeet::{
            ParakeetEngine, ParakeetInferenceParams, ParakeetModelParams, TimestampGranularity,
        },
        whisper::{WhisperEngine, WhisperInferenceParams, WhisperModelParams},
    },
    TranscriptionEngine,
};

use super::Recognizer;
use crate::audio_toolkit::resample_linear;
use crate::managers::model::EngineType;
use crate::settings::{Device, Quantization};

/// Sample rate every transcribe-rs engine expects.
const ENGINE_SAMPLE_RATE: u32 = 16000;

enum LoadedEngine {
    Whisper(WhisperEngine),
    Parakeet(ParakeetEngine),
}

/// An in-process Whisper or Parakeet model.
pub struct LocalRecognizer {
    engine: Arc<Mutex<LoadedEngine>>,
    model_path: PathBuf,
}

impl LocalRecognizer {
    pub fn load(
        engine_type: EngineType,
        model_path: &Path,
        device: Device,
        quantization: Option<Quantization>,
    ) -> Result<Self> {
        let load_start = Instant::now();

        let loaded_engine = match engine_type {
            EngineType::Whisper => {
                let mut engine = WhisperEngine::new();
                let params = WhisperModelParams {
                    use_gpu: device == Device::Gpu,
                };
                engine
                    .load_model_with_params(model_path, params)
                    .map_err(|e| {
                        anyhow!("Failed to load whisper model {:?}: {}", model_path, e)
                    })?;
                LoadedEngine::Whisper(engine)
            }
            EngineType::Parakeet => {
                let params = match quantization {
                    Some(Quantization::Int8) => ParakeetModelParams::int8(),
                    None => ParakeetModelParams::default(),
                };
                let mut engine = ParakeetEngine::new();
                engine
                    .load_model_with_params(model_path, params)
                    .map_err(|e| {
                        anyhow!("Failed to load parakeet model {:?}: {}", model_path, e)
                    })?;
                LoadedEngine::Parakeet(engine)
            }
            EngineType::Remote => {
                return Err(anyhow!("The remote engine is not a local model"));
            }
        };

        info!(
            "Loaded {:?} model {:?} in {}ms",
            engine_type,
            model_path,
            load_start.elapsed().as_millis()
        );

        Ok(Self {
            engine: Arc::new(Mutex::new(loaded_engine)),
            model_path: model_path.to_path_buf(),
        })
    }
}

#[async_trait]
impl Recognizer for LocalRecognizer {
    async fn recognize(&self, samples: Vec<f32>, sample_rate: u32, language: &str) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        let audio = if sample_rate != ENGINE_SAMPLE_RATE {
            debug!("Resampling {} Hz audio to {} Hz", sample_rate, ENGINE_SAMPLE_RATE);
            resample_linear(&samples, sample_rate, ENGINE_SAMPLE_RATE)
        } else {
            samples
        };

        let whisper_language = match language {
            "" | "auto" => None,
            other => Some(other.to_string()),
        };

        let engine = self.engine.clone();
        let model_path = self.model_path.clone();
        let transcription_start = Instant::now();

        let text = tokio::task::spawn_blocking(move || -> Result<String> {
            let mut engine = engine
                .lock()
                .map_err(|_| anyhow!("Engine for {:?} is poisoned", model_path))?;

            let result = match &mut *engine {
                LoadedEngine::Whisper(whisper_engine) => {
                    let params = WhisperInferenceParams {
                        language: whisper_language,
                        ..Default::default()
                    };
                    whisper_engine
                        .transcribe_samples(audio, Some(params))
                        .map_err(|e| anyhow!("Whisper transcription failed: {}", e))?
                }
                LoadedEngine::Parakeet(parakeet_engine) => {
                    let params = ParakeetInferenceParams {
                        timestamp_granularity: TimestampGranularity::Segment,
                        ..Default::default()
                    };
                    parakeet_engine
                        .transcribe_samples(audio, Some(params))
                        .map_err(|e| anyhow!("Parakeet transcription failed: {}", e))?
                }
            };

            Ok(result.text.trim().to_string())
        })
        .await
        .map_err(|e| anyhow!("Transcription task panicked: {}", e))??;

        debug!(
            "Transcription completed in {}ms",
            transcription_start.elapsed().as_millis()
        );
        Ok(text)
    }
}

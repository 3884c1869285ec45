use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::engines::{Recognizer, RemoteRecognizer};
use crate::settings::{ModelSettings, Settings};
use crate::wyoming::{AsrModel, AsrProgram, Attribution, Info};

pub const ENGLISH: &str = "en";
pub const MULTILINGUAL: &str = "multi";

/// Languages advertised for a multilingual model unless overridden.
pub const WHISPER_LANGUAGES: &[&str] = &[
    "af", "am", "ar", "as", "az", "ba", "be", "bg", "bn", "bo", "br", "bs", "ca", "cs", "cy",
    "da", "de", "el", "en", "es", "et", "eu", "fa", "fi", "fo", "fr", "gl", "gu", "ha", "haw",
    "he", "hi", "hr", "ht", "hu", "hy", "id", "is", "it", "ja", "jw", "ka", "kk", "km", "kn",
    "ko", "la", "lb", "ln", "lo", "lt", "lv", "mg", "mi", "mk", "ml", "mn", "mr", "ms", "mt",
    "my", "ne", "nl", "nn", "no", "oc", "pa", "pl", "ps", "pt", "ro", "ru", "sa", "sd", "si",
    "sk", "sl", "sn", "so", "sq", "sr", "su", "sv", "sw", "ta", "te", "tg", "th", "tk", "tl",
    "tr", "tt", "uk", "ur", "uz", "vi", "yi", "yo", "yue", "zh",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// OpenAI-compatible HTTP transcription endpoint
    Remote,
    Whisper,
    Parakeet,
}

impl EngineType {
    fn attribution(self, remote_url: &str) -> Attribution {
        match self {
            EngineType::Remote => Attribution {
                name: "Remote transcription service".to_string(),
                url: remote_url.to_string(),
            },
            EngineType::Whisper => Attribution {
                name: "OpenAI".to_string(),
                url: "https://github.com/openai/whisper".to_string(),
            },
            EngineType::Parakeet => Attribution {
                name: "NVIDIA".to_string(),
                url: "https://github.com/NVIDIA/NeMo".to_string(),
            },
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineType::Remote => "remote",
            EngineType::Whisper => "whisper",
            EngineType::Parakeet => "parakeet",
        };
        f.write_str(name)
    }
}

/// One loaded model plus the metadata advertised for it.
#[derive(Clone)]
pub struct ModelEntry {
    pub name: String,
    pub engine: EngineType,
    pub languages: Vec<String>,
    pub recognizer: Arc<dyn Recognizer>,
}

/// Pick the registry key for a request.
///
/// English requests (and requests with no language) prefer the English model.
/// Anything else goes to the multilingual model, falling back to English.
pub fn select_model_key(
    requested: Option<&str>,
    is_available: impl Fn(&str) -> bool,
) -> Option<&'static str> {
    let language = requested.unwrap_or(ENGLISH);

    if language == ENGLISH && is_available(ENGLISH) {
        Some(ENGLISH)
    } else if is_available(MULTILINGUAL) {
        Some(MULTILINGUAL)
    } else if is_available(ENGLISH) {
        Some(ENGLISH)
    } else {
        None
    }
}

/// Read-only map from `en` / `multi` to a loaded model, built once at startup.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    entries: BTreeMap<String, ModelEntry>,
    remote_url: String,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, entry: ModelEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The registry key and entry that should serve `requested`.
    pub fn select(&self, requested: Option<&str>) -> Option<(&'static str, &ModelEntry)> {
        let key = select_model_key(requested, |key| self.entries.contains_key(key))?;
        self.entries.get(key).map(|entry| (key, entry))
    }

    /// Capability advertisement: one program with one model per registry key.
    pub fn info(&self) -> Info {
        let models = self
            .entries
            .iter()
            .map(|(key, entry)| {
                let description = if key == MULTILINGUAL {
                    format!("Multilingual model: {}", entry.name)
                } else {
                    format!("English model: {}", entry.name)
                };
                AsrModel {
                    name: entry.name.clone(),
                    attribution: entry.engine.attribution(&self.remote_url),
                    installed: true,
                    description: Some(description),
                    version: None,
                    languages: entry.languages.clone(),
                }
            })
            .collect();

        Info {
            asr: vec![AsrProgram {
                name: env!("CARGO_PKG_NAME").to_string(),
                attribution: Attribution {
                    name: "Wyoming".to_string(),
                    url: "https://github.com/rhasspy/wyoming".to_string(),
                },
                installed: true,
                description: Some("Offline speech recognition over Wyoming".to_string()),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
                models,
            }],
        }
    }
}

/// Load every configured model. Fails if any configured model cannot be loaded.
pub fn load_registry(settings: &Settings) -> Result<ModelRegistry> {
    let mut registry = ModelRegistry {
        entries: BTreeMap::new(),
        remote_url: settings.remote.base_url.clone(),
    };

    let configured = [
        (ENGLISH, settings.english.as_ref()),
        (MULTILINGUAL, settings.multilingual.as_ref()),
    ];

    for (key, model) in configured {
        let Some(model) = model else {
            continue;
        };
        let recognizer = load_recognizer(settings, model)
            .with_context(|| format!("Failed to load {} model '{}'", key, model.model))?;
        info!("Loaded {} model '{}' ({} engine)", key, model.model, model.engine);
        registry.insert(
            key,
            ModelEntry {
                name: model.model.clone(),
                engine: model.engine,
                languages: model.languages.clone(),
                recognizer,
            },
        );
    }

    if registry.is_empty() {
        warn!("No ASR model configured; every transcription request will fail");
    }

    Ok(registry)
}

fn load_recognizer(settings: &Settings, model: &ModelSettings) -> Result<Arc<dyn Recognizer>> {
    match model.engine {
        EngineType::Remote => {
            let recognizer = RemoteRecognizer::new(
                &settings.remote.base_url,
                &model.model,
                settings.remote.api_key.as_deref(),
            )?;
            Ok(Arc::new(recognizer))
        }
        #[cfg(feature = "local-engines")]
        engine @ (EngineType::Whisper | EngineType::Parakeet) => {
            let recognizer = crate::engines::LocalRecognizer::load(
                engine,
                std::path::Path::new(&model.model),
                settings.device,
                settings.quantization,
            )?;
            Ok(Arc::new(recognizer))
        }
        #[cfg(not(feature = "local-engines"))]
        engine @ (EngineType::Whisper | EngineType::Parakeet) => Err(anyhow::anyhow!(
            "The {} engine requires building with the `local-engines` feature",
            engine
        )),
    }
}

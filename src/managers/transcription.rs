use log::{debug, error, info};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};

use super::model::{ModelRegistry, ENGLISH};
use crate::error::TranscribeError;

/// Process-wide lock around model inference.
///
/// Shared by every session and every model: at most one `recognize` call is
/// in flight at a time.
#[derive(Debug, Default)]
pub struct InferenceGate {
    lock: Mutex<()>,
}

impl InferenceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

pub struct TranscriptionManager {
    registry: ModelRegistry,
    gate: Arc<InferenceGate>,
}

impl TranscriptionManager {
    pub fn new(registry: ModelRegistry, gate: Arc<InferenceGate>) -> Self {
        Self { registry, gate }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &Arc<InferenceGate> {
        &self.gate
    }

    /// Run mono `samples` through the model selected for `requested`.
    pub async fn transcribe(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        requested: Option<&str>,
    ) -> Result<String, TranscribeError> {
        let Some((key, entry)) = self.registry.select(requested) else {
            return Err(match requested {
                Some(language) => TranscribeError::UnsupportedLanguage {
                    language: language.to_string(),
                    available: self.registry.keys(),
                },
                None => TranscribeError::NoModel,
            });
        };

        let language = requested.unwrap_or(ENGLISH);
        debug!(
            "Transcribing {} samples at {} Hz with the {} model '{}' (language {})",
            samples.len(),
            sample_rate,
            key,
            entry.name,
            language
        );

        let wait_start = Instant::now();
        let _guard = self.gate.acquire().await;
        debug!("Inference gate acquired after {}ms", wait_start.elapsed().as_millis());

        let st = Instant::now();
        let result = entry
            .recognizer
            .recognize(samples, sample_rate, language)
            .await;

        match result {
            Ok(text) => {
                info!(
                    "Transcription completed in {}ms: {}",
                    st.elapsed().as_millis(),
                    text
                );
                Ok(text)
            }
            Err(e) => {
                error!("Transcription with '{}' failed: {:#}", entry.name, e);
                Err(TranscribeError::Recognition(format!("{:#}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::testing::MockRecognizer;
    use crate::managers::model::{EngineType, ModelEntry, MULTILINGUAL};
    use std::time::Duration;

    fn manager(models: &[(&str, Arc<MockRecognizer>)]) -> TranscriptionManager {
        let mut registry = ModelRegistry::new();
        for (key, recognizer) in models {
            registry.insert(
                key,
                ModelEntry {
                    name: format!("{}-model", key),
                    engine: EngineType::Remote,
                    languages: vec![key.to_string()],
                    recognizer: recognizer.clone(),
                },
            );
        }
        TranscriptionManager::new(registry, Arc::new(InferenceGate::new()))
    }

    #[tokio::test]
    async fn passes_language_and_rate_to_the_selected_model() {
        let en = Arc::new(MockRecognizer::replying("english"));
        let multi = Arc::new(MockRecognizer::replying("meertalig"));
        let manager = manager(&[(ENGLISH, en.clone()), (MULTILINGUAL, multi.clone())]);

        let text = manager.transcribe(vec![0.0; 10], 22050, Some("nl")).await.unwrap();
        assert_eq!(text, "meertalig");
        assert!(en.calls().is_empty());
        let calls = multi.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].language, "nl");
        assert_eq!(calls[0].sample_rate, 22050);
        assert_eq!(calls[0].samples, 10);

        assert_eq!(manager.transcribe(vec![0.0; 4], 16000, None).await.unwrap(), "english");
        assert_eq!(en.calls()[0].language, "en");
    }

    #[tokio::test]
    async fn missing_models_produce_descriptive_errors() {
        let manager = manager(&[]);

        assert_eq!(
            manager.transcribe(vec![0.0], 16000, None).await.unwrap_err(),
            TranscribeError::NoModel
        );
        assert_eq!(
            manager.transcribe(vec![0.0], 16000, Some("fr")).await.unwrap_err().to_string(),
            "Language 'fr' is not supported. Available models: []"
        );
    }

    #[tokio::test]
    async fn recognizer_failures_are_wrapped() {
        let en = Arc::new(MockRecognizer::failing("model exploded"));
        let manager = manager(&[(ENGLISH, en)]);

        let err = manager.transcribe(vec![0.0], 16000, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Transcription failed: model exploded");

        // the gate is released after a failure
        let _guard = tokio::time::timeout(Duration::from_secs(1), manager.gate().acquire())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn inference_is_serialized_across_models() {
        // one recognizer behind both keys so overlap between models is observable
        let shared = Arc::new(MockRecognizer::replying("a").with_delay(Duration::from_millis(30)));
        let manager = Arc::new(manager(&[
            (ENGLISH, shared.clone()),
            (MULTILINGUAL, shared.clone()),
        ]));

        let mut handles = Vec::new();
        for i in 0..6 {
            let manager = manager.clone();
            let language = if i % 2 == 0 { "en" } else { "de" };
            handles.push(tokio::spawn(async move {
                manager.transcribe(vec![0.0; 8], 16000, Some(language)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let calls = shared.calls();
        assert_eq!(calls.len(), 6);
        assert_eq!(calls.iter().filter(|c| c.language == "de").count(), 3);
        assert_eq!(shared.max_in_flight(), 1);
    }
}

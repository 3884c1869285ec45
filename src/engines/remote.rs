use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::Recognizer;
use crate::audio_toolkit::samples_to_wav_bytes;

#[derive(Debug, Deserialize)]
struct RemoteTranscriptionResponse {
    text: String,
}

/// Client for an OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct RemoteRecognizer {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl RemoteRecognizer {
    pub fn new(base_url: &str, model: &str, api_key: Option<&str>) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(anyhow!("Remote transcription base URL is empty"));
        }

        let model = model.trim();
        if model.is_empty() {
            return Err(anyhow!("Remote transcription model is empty"));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url: format!("{}/audio/transcriptions", base_url),
            model: model.to_string(),
            api_key: api_key
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Recognizer for RemoteRecognizer {
    async fn recognize(&self, samples: Vec<f32>, sample_rate: u32, language: &str) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        debug!(
            "Sending {} samples at {} Hz to {} (model {})",
            samples.len(),
            sample_rate,
            self.url,
            self.model
        );

        let wav_bytes =
            samples_to_wav_bytes(&samples, sample_rate).context("Failed to encode WAV audio")?;
        let file_part = Part::bytes(wav_bytes)
            .file_name("speech.wav")
            .mime_str("audio/wav")
            .context("Failed to build multipart audio part")?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "json".to_string());

        let language = language.trim();
        if !language.is_empty() && language != "auto" {
            form = form.text("language", language.to_string());
        }

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .context("Remote transcription HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(anyhow!(
                "Remote transcription failed with status {}: {}",
                status,
                error_text
            ));
        }

        let body: RemoteTranscriptionResponse = response
            .json()
            .await
            .context("Failed to parse remote transcription response")?;

        Ok(body.text.trim().to_string())
    }
}

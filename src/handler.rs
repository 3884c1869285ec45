use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use crate::audio_toolkit::{downmix_to_mono, read_wav_samples, AudioSink};
use crate::error::{CodecError, SessionError};
use crate::managers::transcription::TranscriptionManager;
use crate::wyoming::{AudioFormat, ClientEvent, Event};

/// Everything one client connection owns between events.
///
/// The temporary directory is removed when the state is dropped, whether or
/// not any audio was ever buffered.
pub struct SessionState {
    id: Uuid,
    temp_dir: TempDir,
    sink: Option<AudioSink>,
    requested_language: Option<String>,
}

impl SessionState {
    pub fn new(temp_root: Option<&Path>) -> Result<Self, SessionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("wyoming-asr-");
        let temp_dir = match temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        Ok(Self {
            id: Uuid::new_v4(),
            temp_dir,
            sink: None,
            requested_language: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn is_buffering(&self) -> bool {
        self.sink.is_some()
    }

    pub fn requested_language(&self) -> Option<&str> {
        self.requested_language.as_deref()
    }

    fn append_chunk(&mut self, format: AudioFormat, audio: &[u8]) -> Result<(), SessionError> {
        if let Some(sink) = self.sink.as_mut() {
            if sink.format() != format {
                return Err(SessionError::Format(format!(
                    "chunk format {} does not match the utterance format {}",
                    format,
                    sink.format()
                )));
            }
            return sink.append(audio);
        }

        let mut sink = AudioSink::open(self.temp_dir.path(), format)?;
        sink.append(audio)?;
        debug!("Session {} started buffering {}", self.id, format);
        self.sink = Some(sink);
        Ok(())
    }
}

/// What the connection should do after an event was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue,
    Reply(Event),
    /// A transcript ending the current utterance.
    TurnComplete(Event),
}

/// Stateless event handler shared by every session.
pub struct EventHandler {
    info_event: Event,
    transcription: Arc<TranscriptionManager>,
}

impl EventHandler {
    pub fn new(
        transcription: Arc<TranscriptionManager>,
        initial_prompt: Option<&str>,
    ) -> Result<Self, CodecError> {
        if let Some(prompt) = initial_prompt {
            info!("Initial prompt is not applied to any model: {:?}", prompt);
        }

        let info_event = transcription.registry().info().to_event()?;
        Ok(Self {
            info_event,
            transcription,
        })
    }

    pub fn transcription(&self) -> &Arc<TranscriptionManager> {
        &self.transcription
    }

    pub async fn handle_event(
        &self,
        state: &mut SessionState,
        event: Event,
    ) -> Result<Outcome, SessionError> {
        match ClientEvent::from_event(event)? {
            ClientEvent::Describe => Ok(Outcome::Reply(self.info_event.clone())),
            ClientEvent::Transcribe { language } => {
                debug!("Session {} requested language {:?}", state.id, language);
                state.requested_language = language;
                Ok(Outcome::Continue)
            }
            ClientEvent::AudioChunk { format, audio } => {
                state.append_chunk(format, &audio)?;
                Ok(Outcome::Continue)
            }
            ClientEvent::AudioStop => self.finish_utterance(state).await,
            ClientEvent::AudioStart => Ok(Outcome::Continue),
            ClientEvent::Other(event_type) => {
                debug!("Ignoring unexpected event: {}", event_type);
                Ok(Outcome::Continue)
            }
        }
    }

    async fn finish_utterance(&self, state: &mut SessionState) -> Result<Outcome, SessionError> {
        // consumed by this stop whatever happens next
        let language = state.requested_language.take();

        let Some(sink) = state.sink.take() else {
            return Err(SessionError::Protocol(
                "audio-stop received before any audio-chunk".to_string(),
            ));
        };

        let path = sink.close()?;
        let (samples, spec) = read_wav_samples(&path)?;
        let samples = downmix_to_mono(samples, spec.channels);
        debug!(
            "Session {} finished utterance: {} mono samples at {} Hz",
            state.id,
            samples.len(),
            spec.sample_rate
        );

        let text = match self
            .transcription
            .transcribe(samples, spec.sample_rate, language.as_deref())
            .await
        {
            Ok(text) => text,
            Err(e) => format!("ERROR: {}", e),
        };

        Ok(Outcome::TurnComplete(Event::transcript(&text)))
    }
}

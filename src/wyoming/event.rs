use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{CodecError, SessionError};

pub const PROTOCOL_VERSION: &str = "1.5.2";

pub const DESCRIBE: &str = "describe";
pub const INFO: &str = "info";
pub const TRANSCRIBE: &str = "transcribe";
pub const TRANSCRIPT: &str = "transcript";
pub const AUDIO_START: &str = "audio-start";
pub const AUDIO_CHUNK: &str = "audio-chunk";
pub const AUDIO_STOP: &str = "audio-stop";
pub const ERROR: &str = "error";

/// Upper bounds on what a peer may ask us to buffer for a single event.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;
pub const MAX_DATA_BYTES: usize = 1024 * 1024;
pub const MAX_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct EventHeaderIn {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    data_length: Option<usize>,
    #[serde(default)]
    payload_length: Option<usize>,
}

#[derive(Serialize)]
struct EventHeaderOut<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    version: &'static str,
    #[serde(skip_serializing_if = "is_empty_map")]
    data: &'a Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_length: Option<usize>,
}

fn is_empty_map(map: &&Map<String, Value>) -> bool {
    map.is_empty()
}

/// A single framed Wyoming event: a type, a JSON object of data and an
/// optional binary payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub data: Map<String, Value>,
    pub payload: Option<Vec<u8>>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Map::new(),
            payload: None,
        }
    }

    /// Non-object `data` values are dropped; Wyoming data is always an object.
    pub fn with_data(event_type: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            event_type: event_type.into(),
            data,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_type(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    pub fn describe() -> Self {
        Self::new(DESCRIBE)
    }

    pub fn transcribe(language: Option<&str>) -> Self {
        match language {
            Some(language) => Self::with_data(TRANSCRIBE, json!({ "language": language })),
            None => Self::new(TRANSCRIBE),
        }
    }

    /// `transcribe` that also names the model the client wants. The server
    /// routes on `language` only, so `name` is informational.
    pub fn transcribe_model(name: &str, language: Option<&str>) -> Self {
        let mut event = Self::transcribe(language);
        event
            .data
            .insert("name".to_string(), Value::String(name.to_string()));
        event
    }

    pub fn audio_start(format: AudioFormat) -> Self {
        Self::with_data(AUDIO_START, format.to_value())
    }

    pub fn audio_chunk(format: AudioFormat, audio: Vec<u8>) -> Self {
        Self::with_data(AUDIO_CHUNK, format.to_value()).with_payload(audio)
    }

    pub fn audio_stop() -> Self {
        Self::new(AUDIO_STOP)
    }

    pub fn transcript(text: &str) -> Self {
        Self::with_data(TRANSCRIPT, json!({ "text": text }))
    }

    pub fn error(text: &str, code: &str) -> Self {
        Self::with_data(ERROR, json!({ "text": text, "code": code }))
    }

    /// Text field of `transcript` and `error` events.
    pub fn text(&self) -> Option<&str> {
        self.data.get("text").and_then(Value::as_str)
    }
}

/// Sample layout of raw PCM audio carried in `audio-start` / `audio-chunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Samples per second
    pub rate: u32,
    /// Bytes per sample
    pub width: u16,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(rate: u32, width: u16, channels: u16) -> Self {
        Self {
            rate,
            width,
            channels,
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.rate == 0 {
            return Err(SessionError::Format("sample rate must be positive".to_string()));
        }
        if !(1..=4).contains(&self.width) {
            return Err(SessionError::Format(format!(
                "unsupported sample width {} (expected 1 to 4 bytes)",
                self.width
            )));
        }
        if self.channels == 0 {
            return Err(SessionError::Format(
                "channel count must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Bytes per frame (one sample for every channel).
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    fn from_data(data: &Map<String, Value>) -> Result<Self, SessionError> {
        serde_json::from_value(Value::Object(data.clone()))
            .map_err(|e| SessionError::Format(format!("invalid audio format: {}", e)))
    }

    fn to_value(self) -> Value {
        json!({ "rate": self.rate, "width": self.width, "channels": self.channels })
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz/{}-bit/{} channel(s)",
            self.rate,
            self.width * 8,
            self.channels
        )
    }
}

/// Events a client may send to the server, decoded from raw [`Event`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Describe,
    Transcribe { language: Option<String> },
    AudioStart,
    AudioChunk { format: AudioFormat, audio: Vec<u8> },
    AudioStop,
    Other(String),
}

impl ClientEvent {
    pub fn from_event(event: Event) -> Result<Self, SessionError> {
        let client_event = match event.event_type.as_str() {
            DESCRIBE => ClientEvent::Describe,
            TRANSCRIBE => {
                // An empty string means "no preference", same as a missing field.
                let language = event
                    .data
                    .get("language")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|language| !language.is_empty())
                    .map(str::to_string);
                ClientEvent::Transcribe { language }
            }
            AUDIO_START => ClientEvent::AudioStart,
            AUDIO_CHUNK => {
                let format = AudioFormat::from_data(&event.data)?;
                ClientEvent::AudioChunk {
                    format,
                    audio: event.payload.unwrap_or_default(),
                }
            }
            AUDIO_STOP => ClientEvent::AudioStop,
            _ => ClientEvent::Other(event.event_type),
        };
        Ok(client_event)
    }
}

/// Read the next event. Returns `Ok(None)` on a clean end of stream.
pub async fn read_event<R>(reader: &mut R) -> Result<Option<Event>, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = (&mut *reader)
            .take(MAX_HEADER_BYTES as u64)
            .read_line(&mut line)
            .await?;
        if bytes_read == 0 {
            return Ok(None);
        }
        if !line.ends_with('\n') {
            if bytes_read >= MAX_HEADER_BYTES {
                return Err(CodecError::TooLarge {
                    section: "header",
                    limit: MAX_HEADER_BYTES,
                });
            }
            return Err(CodecError::Truncated("header"));
        }
        if !line.trim().is_empty() {
            break;
        }
    }

    let header: EventHeaderIn =
        serde_json::from_str(line.trim_end()).map_err(CodecError::Header)?;

    let mut data = header.data.unwrap_or_default();
    if let Some(data_length) = header.data_length.filter(|len| *len > 0) {
        let bytes = read_section(reader, data_length, "data", MAX_DATA_BYTES).await?;
        let extra: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(CodecError::Data)?;
        data.extend(extra);
    }

    let payload = match header.payload_length {
        Some(payload_length) => Some(
            read_section(reader, payload_length, "payload", MAX_PAYLOAD_BYTES).await?,
        ),
        None => None,
    };

    Ok(Some(Event {
        event_type: header.event_type,
        data,
        payload,
    }))
}

async fn read_section<R>(
    reader: &mut R,
    length: usize,
    section: &'static str,
    limit: usize,
) -> Result<Vec<u8>, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    if length > limit {
        return Err(CodecError::TooLarge { section, limit });
    }

    let mut bytes = vec![0_u8; length];
    match reader.read_exact(&mut bytes).await {
        Ok(_) => Ok(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(CodecError::Truncated(section))
        }
        Err(err) => Err(CodecError::Io(err)),
    }
}

pub async fn write_event<W>(writer: &mut W, event: &Event) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let header = EventHeaderOut {
        event_type: &event.event_type,
        version: PROTOCOL_VERSION,
        data: &event.data,
        payload_length: event.payload.as_ref().map(Vec::len),
    };

    let mut line = serde_json::to_vec(&header).map_err(CodecError::Header)?;
    line.push(b'\n');
    writer.write_all(&line).await?;

    if let Some(payload) = &event.payload {
        writer.write_all(payload).await?;
    }

    writer.flush().await?;
    Ok(())
}

use thiserror::Error;

/// Failures while framing or unframing Wyoming events. These end the connection.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid event header: {0}")]
    Header(#[source] serde_json::Error),
    #[error("invalid event data: {0}")]
    Data(#[source] serde_json::Error),
    #[error("stream ended in the middle of an event {0}")]
    Truncated(&'static str),
    #[error("event {section} exceeds {limit} bytes")]
    TooLarge { section: &'static str, limit: usize },
}

/// Errors raised while handling a single client event.
///
/// All of these are recoverable: the server reports them to the client as an
/// `error` event and keeps the session alive.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("format error: {0}")]
    Format(String),
    #[error("audio error: {0}")]
    Audio(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Machine readable code sent alongside the message in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Protocol(_) => "protocol-error",
            SessionError::Format(_) => "format-error",
            SessionError::Audio(_) => "audio-error",
            SessionError::Io(_) => "io-error",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscribeError {
    #[error("Language '{language}' is not supported. Available models: [{}]", quote_keys(.available))]
    UnsupportedLanguage {
        language: String,
        available: Vec<String>,
    },
    #[error("No ASR model is available for transcription")]
    NoModel,
    #[error("Transcription failed: {0}")]
    Recognition(String),
}

fn quote_keys(keys: &[String]) -> String {
    keys.iter()
        .map(|key| format!("'{}'", key))
        .collect::<Vec<_>>()
        .join(", ")
}

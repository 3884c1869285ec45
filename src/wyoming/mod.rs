//! Wyoming protocol framing and the subset of events this server speaks.
//!
//! Every event is a JSON header line, optionally followed by a JSON data
//! section (`data_length` bytes) and a binary payload (`payload_length` bytes).

mod event;
mod info;

pub use event::{
    read_event, write_event, AudioFormat, ClientEvent, Event, AUDIO_CHUNK, AUDIO_START,
    AUDIO_STOP, DESCRIBE, ERROR, INFO, MAX_DATA_BYTES, MAX_HEADER_BYTES, MAX_PAYLOAD_BYTES,
    PROTOCOL_VERSION, TRANSCRIBE, TRANSCRIPT,
};
pub use info::{AsrModel, AsrProgram, Attribution, Info};

pub mod model;
pub mod transcription;

// Re-export all audio components
pub mod sink;
pub mod utils;

pub use sink::{AudioSink, SPEECH_FILE_NAME};
pub use utils::{downmix_to_mono, read_wav_samples, resample_linear, samples_to_wav_bytes};

use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, warn};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::SessionError;
use crate::wyoming::AudioFormat;

pub const SPEECH_FILE_NAME: &str = "speech.wav";

/// Write-through WAV container for one utterance.
///
/// Raw PCM bytes are written in arrival order. Bytes that do not yet form a
/// whole frame are held back until the next append completes the frame.
pub struct AudioSink {
    path: PathBuf,
    format: AudioFormat,
    writer: WavWriter<BufWriter<File>>,
    pending: Vec<u8>,
    bytes_written: usize,
}

impl AudioSink {
    /// Create `speech.wav` inside `dir`, truncating any previous utterance.
    pub fn open(dir: &Path, format: AudioFormat) -> Result<Self, SessionError> {
        format.validate()?;

        let path = dir.join(SPEECH_FILE_NAME);
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.rate,
            bits_per_sample: format.width * 8,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(&path, spec)?;
        debug!("Opened audio sink {:?} ({})", path, format);

        Ok(Self {
            path,
            format,
            writer,
            pending: Vec::new(),
            bytes_written: 0,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Bytes committed to the container so far (whole frames only).
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn append(&mut self, audio: &[u8]) -> Result<(), SessionError> {
        self.pending.extend_from_slice(audio);

        let frame_bytes = self.format.frame_bytes();
        let whole = self.pending.len() - self.pending.len() % frame_bytes;
        let width = self.format.width as usize;

        let writer = &mut self.writer;
        let (consumed, result) = drain_samples(&mut self.pending, whole, width, |sample| {
            write_raw_sample(writer, sample)
        });
        self.bytes_written += consumed;
        result?;
        Ok(())
    }

    /// Finalize the WAV header so the file can be decoded. Returns its path.
    pub fn close(self) -> Result<PathBuf, SessionError> {
        if !self.pending.is_empty() {
            warn!(
                "Dropping {} trailing bytes that do not form a whole frame",
                self.pending.len()
            );
        }

        self.writer.finalize()?;
        debug!(
            "Closed audio sink {:?} after {} bytes",
            self.path, self.bytes_written
        );
        Ok(self.path)
    }
}

/// Hand the first `len` bytes of `pending` to `write` one sample at a time.
/// Written samples are removed even if a later one fails, so a retry never
/// repeats them. Returns the number of bytes consumed.
fn drain_samples<F>(
    pending: &mut Vec<u8>,
    len: usize,
    width: usize,
    mut write: F,
) -> (usize, Result<(), hound::Error>)
where
    F: FnMut(&[u8]) -> Result<(), hound::Error>,
{
    let mut consumed = 0;
    let mut result = Ok(());
    for sample in pending[..len].chunks_exact(width) {
        if let Err(err) = write(sample) {
            result = Err(err);
            break;
        }
        consumed += width;
    }

    pending.drain(..consumed);
    (consumed, result)
}

/// Little-endian signed PCM, except 8-bit which WAV stores unsigned.
fn write_raw_sample(
    writer: &mut WavWriter<BufWriter<File>>,
    bytes: &[u8],
) -> Result<(), hound::Error> {
    match bytes {
        [b0] => writer.write_sample((*b0 as i16 - 128) as i8),
        [b0, b1] => writer.write_sample(i16::from_le_bytes([*b0, *b1])),
        [b0, b1, b2] => {
            // sign-extend the 24-bit value
            let value = i32::from_le_bytes([0, *b0, *b1, *b2]) >> 8;
            writer.write_sample(value)
        }
        [b0, b1, b2, b3] => writer.write_sample(i32::from_le_bytes([*b0, *b1, *b2, *b3])),
        _ => Err(hound::Error::Unsupported),
    }
}

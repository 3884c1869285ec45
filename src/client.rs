//! Client side of a Wyoming ASR session, used by `asr-client` and `asr-benchmark`.

use anyhow::{anyhow, Context, Result};
use hound::{SampleFormat, WavReader};
use log::debug;
use std::path::Path;
use tokio::io::BufReader;

use crate::server::connect;
use crate::settings::ListenUri;
use crate::wyoming::{read_event, write_event, AudioFormat, Event, Info, ERROR, INFO, TRANSCRIPT};

/// Frames sent per `audio-chunk` event.
pub const SAMPLES_PER_CHUNK: usize = 1024;

/// Read a WAV file as raw little-endian PCM. Float files are converted to 16-bit.
pub fn load_pcm(path: &Path) -> Result<(AudioFormat, Vec<u8>)> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("Failed to open WAV file {:?}", path))?;
    let spec = reader.spec();

    let mut audio = Vec::new();
    let width = match spec.sample_format {
        SampleFormat::Int => {
            let width = spec.bits_per_sample.div_ceil(8);
            for sample in reader.samples::<i32>() {
                let sample = sample?;
                match width {
                    1 => audio.push((sample + 128) as u8),
                    2 => audio.extend_from_slice(&(sample as i16).to_le_bytes()),
                    3 => audio.extend_from_slice(&sample.to_le_bytes()[..3]),
                    4 => audio.extend_from_slice(&sample.to_le_bytes()),
                    other => return Err(anyhow!("Unsupported sample width: {} bytes", other)),
                }
            }
            width
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                let sample = (sample?.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                audio.extend_from_slice(&sample.to_le_bytes());
            }
            2
        }
    };

    Ok((AudioFormat::new(spec.sample_rate, width, spec.channels), audio))
}

/// Ask the server what it can do.
pub async fn describe(uri: &ListenUri) -> Result<Info> {
    let connection = connect(uri).await?;
    let (read_half, mut writer) = tokio::io::split(connection);
    let mut reader = BufReader::new(read_half);

    write_event(&mut writer, &Event::describe()).await?;
    while let Some(event) = read_event(&mut reader).await? {
        if event.is_type(INFO) {
            return Ok(Info::from_event(&event)?);
        }
        debug!("Ignoring {} event", event.event_type);
    }

    Err(anyhow!("Server closed the connection without sending info"))
}

/// Stream one utterance over a fresh connection and wait for its transcript.
///
/// `request` is sent before `audio-start` when given. A server `error` event
/// becomes an `Err`; an `ERROR: ...` transcript is returned as text.
pub async fn transcribe_pcm(
    uri: &ListenUri,
    request: Option<&Event>,
    format: AudioFormat,
    audio: &[u8],
) -> Result<String> {
    let connection = connect(uri).await?;
    let (read_half, mut writer) = tokio::io::split(connection);
    let mut reader = BufReader::new(read_half);

    if let Some(request) = request {
        write_event(&mut writer, request).await?;
    }
    write_event(&mut writer, &Event::audio_start(format)).await?;
    for chunk in audio.chunks(SAMPLES_PER_CHUNK * format.frame_bytes()) {
        write_event(&mut writer, &Event::audio_chunk(format, chunk.to_vec())).await?;
    }
    write_event(&mut writer, &Event::audio_stop()).await?;

    while let Some(event) = read_event(&mut reader).await? {
        if event.is_type(TRANSCRIPT) {
            return Ok(event.text().unwrap_or_default().to_string());
        }
        if event.is_type(ERROR) {
            return Err(anyhow!(
                "Server error: {}",
                event.text().unwrap_or("unknown error")
            ));
        }
        debug!("Ignoring {} event", event.event_type);
    }

    Err(anyhow!("No transcription received"))
}

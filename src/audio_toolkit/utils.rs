use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;
use std::io::Cursor;
use std::path::Path;

use crate::error::SessionError;

/// Load every sample of a WAV file as `f32` in `[-1.0, 1.0)`, interleaved.
pub fn read_wav_samples<P: AsRef<Path>>(file_path: P) -> Result<(Vec<f32>, WavSpec), SessionError> {
    let mut reader = WavReader::open(file_path.as_ref())?;
    let spec = reader.spec();

    debug!("Loading WAV file: {:?}, spec: {:?}", file_path.as_ref(), spec);

    let samples: Result<Vec<f32>, _> = match spec.sample_format {
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / scale))
                .collect()
        }
        SampleFormat::Float => reader.samples::<f32>().collect(),
    };

    let samples = samples?;
    debug!("Loaded {} samples from WAV file", samples.len());
    Ok((samples, spec))
}

/// Average interleaved frames down to a single channel.
pub fn downmix_to_mono(samples: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

pub fn resample_linear(samples: &[f32], in_rate: u32, out_rate: u32) -> Vec<f32> {
    if samples.is_empty() || in_rate == 0 || out_rate == 0 || in_rate == out_rate {
        return samples.to_vec();
    }

    let ratio = out_rate as f64 / in_rate as f64;
    let out_len = ((samples.len() as f64) * ratio).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(out_len);

    for idx in 0..out_len {
        let src = idx as f64 / ratio;
        let left = (src.floor() as usize).min(samples.len() - 1);
        let right = (left + 1).min(samples.len() - 1);
        let frac = (src - left as f64) as f32;
        out.push(samples[left] + (samples[right] - samples[left]) * frac);
    }

    out
}

/// Encode mono samples as an in-memory 16-bit PCM WAV.
pub fn samples_to_wav_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(sample_i16)?;
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stereo_frames_are_averaged() {
        let mono = downmix_to_mono(vec![0.5, -0.5, 1.0, 0.0, 0.25, 0.75], 2);
        assert_eq!(mono, vec![0.0, 0.5, 0.5]);
    }

    #[test]
    fn mono_passes_through_downmix() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix_to_mono(samples.clone(), 1), samples);
    }

    #[test]
    fn int_samples_are_normalised_by_bit_depth() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("norm.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for sample in [i16::MIN, 0, 16384] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let (samples, read_spec) = read_wav_samples(&path).unwrap();
        assert_eq!(read_spec, spec);
        assert_eq!(samples, vec![-1.0, 0.0, 0.5]);
    }

    #[test]
    fn resample_changes_length_by_rate_ratio() {
        let samples = vec![0.0_f32; 8000];
        assert_eq!(resample_linear(&samples, 8000, 16000).len(), 16000);
        assert_eq!(resample_linear(&samples, 48000, 16000).len(), 2667);
        assert_eq!(resample_linear(&samples, 16000, 16000).len(), 8000);
    }

    #[test]
    fn resample_interpolates_between_neighbours() {
        let out = resample_linear(&[0.0, 1.0], 1, 2);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.5);
        assert_eq!(out[2], 1.0);
    }

    #[test]
    fn wav_bytes_carry_the_requested_rate() {
        let bytes = samples_to_wav_bytes(&[0.0, 0.5, -0.5], 22050).unwrap();
        let reader = WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 3);
    }
}

//! WAV file input and output for offline tooling.
//!
//! Loads any 16-bit WAV as mono PCM bytes at a requested rate, and writes
//! synthesized PCM back out.

use crate::audio::frame::{bytes_to_samples, samples_to_bytes};
use crate::error::{Result, VoxbotError};
use std::io::{Read, Seek, Write};
use std::path::Path;

/// Read a 16-bit WAV and return mono little-endian PCM at `target_rate`.
pub fn read_pcm<R: Read>(reader: R, target_rate: u32) -> Result<Vec<u8>> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| VoxbotError::AudioFile {
        message: format!("Failed to parse WAV file: {}", e),
    })?;

    let spec = wav_reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(VoxbotError::AudioFormatMismatch {
            expected: "16-bit integer PCM".to_string(),
            actual: format!("{}-bit {:?}", spec.bits_per_sample, spec.sample_format),
        });
    }

    let raw_samples: Vec<i16> = wav_reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| VoxbotError::AudioFile {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

    let channels = usize::from(spec.channels.max(1));
    let mono: Vec<i16> = if channels > 1 {
        raw_samples
            .chunks_exact(channels)
            .map(|frame| (frame.iter().map(|&s| s as i32).sum::<i32>() / channels as i32) as i16)
            .collect()
    } else {
        raw_samples
    };

    Ok(samples_to_bytes(&resample(&mono, spec.sample_rate, target_rate)))
}

/// Read a WAV file from disk.
pub fn read_pcm_file(path: &Path, target_rate: u32) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    read_pcm(std::io::BufReader::new(file), target_rate)
}

/// Write mono 16-bit PCM as a WAV stream.
pub fn write_pcm<W: Write + Seek>(writer: W, pcm: &[u8], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wav_error = |e: hound::Error| VoxbotError::AudioFile {
        message: format!("Failed to write WAV: {}", e),
    };
    let mut wav_writer = hound::WavWriter::new(writer, spec).map_err(wav_error)?;
    for sample in bytes_to_samples(pcm) {
        wav_writer.write_sample(sample).map_err(wav_error)?;
    }
    wav_writer.finalize().map_err(wav_error)
}

/// Write mono 16-bit PCM to a WAV file on disk.
pub fn write_pcm_file(path: &Path, pcm: &[u8], sample_rate: u32) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_pcm(std::io::BufWriter::new(file), pcm, sample_rate)
}

/// Linear-interpolation resampler.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(last);
            let fraction = source_pos - source_idx as f64;

            if source_idx >= last {
                samples[last]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

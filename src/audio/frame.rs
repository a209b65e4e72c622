//! Fixed-duration PCM frames.
//!
//! All audio in voxbot is linear PCM, 16-bit little-endian, mono.

use crate::defaults;

/// Geometry of a classifier frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            frame_duration_ms: defaults::FRAME_DURATION_MS,
        }
    }
}

impl FrameSpec {
    pub fn new(sample_rate: u32, frame_duration_ms: u32) -> Self {
        Self {
            sample_rate,
            frame_duration_ms,
        }
    }

    /// Samples per frame.
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    /// Bytes per frame (two bytes per sample).
    pub fn frame_bytes(&self) -> usize {
        self.frame_samples() * 2
    }

    /// Normalize `pcm` to exactly one frame: zero-pad short input, truncate long input.
    pub fn coerce(&self, pcm: &[u8]) -> AudioFrame {
        let size = self.frame_bytes();
        let mut bytes = Vec::with_capacity(size);
        bytes.extend_from_slice(&pcm[..pcm.len().min(size)]);
        bytes.resize(size, 0);
        AudioFrame { bytes }
    }
}

/// Exactly one frame of PCM bytes, as produced by [`FrameSpec::coerce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    bytes: Vec<u8>,
}

impl AudioFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn samples(&self) -> Vec<i16> {
        bytes_to_samples(&self.bytes)
    }
}

/// Decode little-endian PCM bytes. A trailing odd byte is ignored.
pub fn bytes_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples as little-endian PCM bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_bytes_for_30ms_at_16khz() {
        let spec = FrameSpec::new(16000, 30);
        assert_eq!(spec.frame_samples(), 480);
        assert_eq!(spec.frame_bytes(), 960);
    }

    #[test]
    fn frame_bytes_for_10ms_at_8khz() {
        assert_eq!(FrameSpec::new(8000, 10).frame_bytes(), 160);
    }

    #[test]
    fn coerce_zero_pads_short_input() {
        let spec = FrameSpec::new(16000, 10);
        let frame = spec.coerce(&[1, 2, 3]);
        assert_eq!(frame.as_bytes().len(), 320);
        assert_eq!(&frame.as_bytes()[..3], &[1, 2, 3]);
        assert!(frame.as_bytes()[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn coerce_truncates_long_input() {
        let spec = FrameSpec::new(16000, 10);
        let long = vec![7u8; 1000];
        let frame = spec.coerce(&long);
        assert_eq!(frame.as_bytes(), &long[..320]);
    }

    #[test]
    fn coerce_empty_input_is_silence() {
        let frame = FrameSpec::default().coerce(&[]);
        assert_eq!(frame.as_bytes().len(), 960);
        assert!(frame.samples().iter().all(|&s| s == 0));
    }

    #[test]
    fn sample_conversion_is_little_endian() {
        let bytes = samples_to_bytes(&[1, -2, i16::MAX]);
        assert_eq!(bytes, vec![0x01, 0x00, 0xFE, 0xFF, 0xFF, 0x7F]);
        assert_eq!(bytes_to_samples(&bytes), vec![1, -2, i16::MAX]);
    }

    #[test]
    fn odd_trailing_byte_is_ignored() {
        assert_eq!(bytes_to_samples(&[0x10, 0x00, 0x05]), vec![16]);
    }
}

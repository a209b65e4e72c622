//! Per-frame speech/silence classification.
//!
//! Classifiers are stateless: the decision for a frame depends only on that
//! frame and the classifier's fixed settings. Stateful smoothing lives in
//! [`crate::audio::tracker`].

use crate::audio::frame::{AudioFrame, FrameSpec};
use crate::defaults;
use crate::error::{Result, VoxbotError};
use std::slice::ChunksExact;

/// Decides whether a single PCM frame contains speech.
pub trait FrameClassifier: Send + Sync {
    /// Frame geometry this classifier works on.
    fn spec(&self) -> FrameSpec;

    /// Classify a frame already normalized to [`FrameSpec::frame_bytes`].
    fn classify(&self, frame: &AudioFrame) -> bool;

    /// Classify arbitrary PCM bytes.
    ///
    /// Input is zero-padded or truncated to one frame first, so malformed
    /// lengths never fail.
    fn is_speech(&self, pcm: &[u8]) -> bool {
        self.classify(&self.spec().coerce(pcm))
    }

    /// Slice `pcm` into consecutive full frames and classify each.
    fn frames<'a>(&'a self, pcm: &'a [u8]) -> Frames<'a>
    where
        Self: Sized,
    {
        frames(self, pcm)
    }
}

/// Lazy `(frame, is_speech)` sequence over a PCM buffer.
///
/// A trailing partial frame is not yielded. Clone the iterator to replay it.
#[derive(Clone)]
pub struct Frames<'a> {
    classifier: &'a dyn FrameClassifier,
    chunks: ChunksExact<'a, u8>,
}

impl<'a> Iterator for Frames<'a> {
    type Item = (&'a [u8], bool);

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.chunks.next()?;
        Some((frame, self.classifier.is_speech(frame)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Frames<'_> {}

/// Frame sequence for a trait object.
pub fn frames<'a>(classifier: &'a dyn FrameClassifier, pcm: &'a [u8]) -> Frames<'a> {
    let frame_bytes = classifier.spec().frame_bytes().max(1);
    Frames {
        classifier,
        chunks: pcm.chunks_exact(frame_bytes),
    }
}

/// RMS energy classifier.
///
/// A frame is speech when its normalized RMS exceeds the threshold selected
/// by the aggressiveness level (see [`defaults::ENERGY_THRESHOLDS`]).
#[derive(Debug, Clone, Copy)]
pub struct EnergyClassifier {
    spec: FrameSpec,
    aggressiveness: u8,
    threshold: f32,
}

impl EnergyClassifier {
    pub fn new(spec: FrameSpec, aggressiveness: u8) -> Result<Self> {
        let threshold = defaults::ENERGY_THRESHOLDS
            .get(usize::from(aggressiveness))
            .copied()
            .ok_or_else(|| VoxbotError::ConfigInvalidValue {
                key: "audio.vad_aggressiveness".to_string(),
                message: format!("{aggressiveness} is outside 0..=3"),
            })?;
        if !defaults::SUPPORTED_FRAME_DURATIONS_MS.contains(&spec.frame_duration_ms) {
            return Err(VoxbotError::ConfigInvalidValue {
                key: "audio.frame_duration_ms".to_string(),
                message: format!("{} ms is not one of 10, 20, 30", spec.frame_duration_ms),
            });
        }
        Ok(Self {
            spec,
            aggressiveness,
            threshold,
        })
    }

    pub fn aggressiveness(&self) -> u8 {
        self.aggressiveness
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        let aggressiveness = defaults::VAD_AGGRESSIVENESS;
        Self {
            spec: FrameSpec::default(),
            aggressiveness,
            threshold: defaults::ENERGY_THRESHOLDS[usize::from(aggressiveness)],
        }
    }
}

impl FrameClassifier for EnergyClassifier {
    fn spec(&self) -> FrameSpec {
        self.spec
    }

    fn classify(&self, frame: &AudioFrame) -> bool {
        calculate_rms(&frame.samples()) > self.threshold
    }
}

/// Root mean square of samples, normalized to 0.0..=1.0.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::samples_to_bytes;

    fn tone(samples: usize, amplitude: i16) -> Vec<u8> {
        let pcm: Vec<i16> = (0..samples)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect();
        samples_to_bytes(&pcm)
    }

    #[test]
    fn silence_is_not_speech() {
        let classifier = EnergyClassifier::default();
        assert!(!classifier.is_speech(&vec![0u8; 960]));
    }

    #[test]
    fn loud_frame_is_speech() {
        let classifier = EnergyClassifier::default();
        assert!(classifier.is_speech(&tone(480, 8000)));
    }

    #[test]
    fn quiet_noise_depends_on_aggressiveness() {
        // RMS of a square wave equals its amplitude: 500 / 32767 ≈ 0.015
        let pcm = tone(480, 500);
        let permissive = EnergyClassifier::new(FrameSpec::default(), 0).unwrap();
        let strict = EnergyClassifier::new(FrameSpec::default(), 3).unwrap();
        assert!(permissive.is_speech(&pcm));
        assert!(!strict.is_speech(&pcm));
    }

    #[test]
    fn short_and_long_input_never_fail() {
        let classifier = EnergyClassifier::default();
        assert!(!classifier.is_speech(&[]));
        assert!(!classifier.is_speech(&[0u8; 3]));
        assert!(classifier.is_speech(&tone(5000, 8000)));
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(EnergyClassifier::new(FrameSpec::default(), 4).is_err());
        assert!(EnergyClassifier::new(FrameSpec::new(16000, 25), 2).is_err());
    }

    #[test]
    fn frames_yields_only_full_frames() {
        let classifier = EnergyClassifier::default();
        let mut pcm = tone(480, 8000);
        pcm.extend(vec![0u8; 960]);
        pcm.extend(vec![0u8; 100]); // partial tail

        let results: Vec<bool> = classifier.frames(&pcm).map(|(_, speech)| speech).collect();
        assert_eq!(results, vec![true, false]);
    }

    #[test]
    fn frames_is_restartable() {
        let classifier = EnergyClassifier::default();
        let pcm = tone(480 * 3, 8000);
        let sequence = classifier.frames(&pcm);
        assert_eq!(sequence.len(), 3);
        let first: Vec<_> = sequence.clone().collect();
        let second: Vec<_> = sequence.collect();
        assert_eq!(first, second);
        assert!(first.iter().all(|(frame, _)| frame.len() == 960));
    }

    #[test]
    fn frames_over_trait_object() {
        let classifier: Box<dyn FrameClassifier> = Box::new(EnergyClassifier::default());
        let pcm = vec![0u8; 960 * 2];
        assert_eq!(frames(classifier.as_ref(), &pcm).count(), 2);
    }

    #[test]
    fn rms_of_empty_is_zero() {
        assert_eq!(calculate_rms(&[]), 0.0);
        assert!((calculate_rms(&[i16::MAX, i16::MAX]) - 1.0).abs() < 1e-6);
    }
}

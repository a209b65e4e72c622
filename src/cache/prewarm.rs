//! Pre-synthesizing common phrases.

use crate::cache::SynthesisCache;
use crate::defaults::COMMON_PHRASES;
use crate::services::tts::SpeechSynthesizer;

/// Counts from one pre-warm run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrewarmReport {
    pub synthesized: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Copy of the built-in phrase list.
pub fn common_phrases() -> Vec<String> {
    COMMON_PHRASES.iter().map(|p| p.to_string()).collect()
}

/// Synthesize and cache each phrase for each voice, skipping phrases already cached.
///
/// Per-phrase failures are logged and counted; they never abort the run.
pub fn prewarm(
    cache: &SynthesisCache,
    synthesizer: &dyn SpeechSynthesizer,
    voices: &[String],
    phrases: &[String],
    speed: f32,
) -> PrewarmReport {
    let mut report = PrewarmReport::default();
    if !cache.is_connected() {
        tracing::info!("synthesis cache unavailable, skipping pre-warm");
        return report;
    }

    for voice in voices {
        for phrase in phrases {
            if cache.get(phrase, voice, speed).is_some() {
                report.skipped += 1;
                continue;
            }
            match synthesizer.synthesize(phrase, voice, speed) {
                Ok(audio) if !audio.is_empty() => {
                    cache.set(phrase, voice, &audio, speed, None);
                    report.synthesized += 1;
                }
                Ok(_) => {
                    tracing::warn!(voice = %voice, phrase = %phrase, "synthesis returned no audio");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(voice = %voice, phrase = %phrase, error = %e, "pre-warm failed");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(voice = %voice, "pre-warmed voice");
    }
    report
}

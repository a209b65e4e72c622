use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use voxbot::audio::classifier::{EnergyClassifier, FrameClassifier};
use voxbot::audio::frame::FrameSpec;
use voxbot::audio::tracker::{SpeechActivityTracker, SpeechEvent, TrackerConfig};
use voxbot::audio::wav::{read_pcm_file, write_pcm_file};
use voxbot::cache::{CacheKey, SynthesisCache, normalize_text};
use voxbot::cli::{Cli, Commands, ConfigAction};
use voxbot::config::Config;
use voxbot::pipeline::{ConversationTurn, Role, Services, VoiceBot};
use voxbot::services::{
    MockLanguageModel, MockRecognizer, MockSynthesizer, MockTransport, SpeechSynthesizer, Transcript,
};
#[cfg(feature = "http")]
use voxbot::services::{ConnectionPool, LanguageModel, MinimaxClient, OpenRouterClient};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let rendered =
                    toml::to_string_pretty(&config).context("Failed to render configuration")?;
                print!("{}", rendered);
            }
            ConfigAction::Path => match Config::default_path() {
                Some(path) => println!("{}", path.display()),
                None => bail!("No configuration directory on this platform"),
            },
        },
        Commands::CacheKey { text, voice, speed } => {
            let voice = voice.unwrap_or_else(|| config.assistant.voice_id.clone());
            let speed = speed.unwrap_or(config.assistant.speed);
            let key = CacheKey::new(&text, &voice, speed);
            println!("normalized: {:?}", normalize_text(&text));
            println!("key:        {}", key.key);
            println!("digest:     {}", key.digest);
        }
        Commands::Classify { wav, frames } => classify(&config, &wav, frames)?,
        Commands::Speak {
            text,
            output,
            voice,
            speed,
            mock,
        } => {
            let voice = voice.unwrap_or_else(|| config.assistant.voice_id.clone());
            let speed = speed.unwrap_or(config.assistant.speed);
            let audio = if mock {
                synthesize(&config, &MockSynthesizer::new(), &text, &voice, speed)?
            } else {
                synthesize_hosted(&config, &text, &voice, speed)?
            };
            if audio.is_empty() {
                bail!("Synthesizer returned no audio for {:?}", text);
            }
            write_pcm_file(&output, &audio, config.audio.sample_rate)?;
            let seconds = audio.len() as f64 / (f64::from(config.audio.sample_rate) * 2.0);
            println!("Wrote {:.2}s of audio to {}", seconds, output.display());
        }
        Commands::Simulate {
            wav,
            transcript,
            reply,
            output,
            timeout,
            live,
        } => simulate(
            config,
            &wav,
            &transcript,
            &reply,
            output.as_deref(),
            timeout,
            live,
        )?,
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "voxbot=info",
        1 => "voxbot=debug",
        _ => "voxbot=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        match Config::default_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        }
    };

    Ok(config.with_env_overrides())
}

fn classify(config: &Config, wav: &Path, print_frames: bool) -> Result<()> {
    let spec = FrameSpec::new(config.audio.sample_rate, config.audio.frame_duration_ms);
    let classifier = EnergyClassifier::new(spec, config.audio.vad_aggressiveness)?;
    let pcm = read_pcm_file(wav, config.audio.sample_rate)?;
    let mut tracker = SpeechActivityTracker::new(TrackerConfig {
        frame_duration_ms: config.audio.frame_duration_ms,
        speech_threshold_ms: config.vad.speech_threshold_ms,
        silence_threshold_ms: config.vad.silence_threshold_ms,
    });

    let mut total = 0usize;
    let mut speech = 0usize;
    for (index, (_, is_speech)) in classifier.frames(&pcm).enumerate() {
        let at_ms = index as u64 * u64::from(config.audio.frame_duration_ms);
        total += 1;
        if is_speech {
            speech += 1;
        }
        if print_frames {
            println!("{:>8}ms {}", at_ms, if is_speech { "speech" } else { "-" });
        }
        match tracker.update(is_speech) {
            Some(SpeechEvent::SpeechStarted) => println!("{:>8}ms speech started", at_ms),
            Some(SpeechEvent::SpeechEnded) => println!("{:>8}ms speech ended", at_ms),
            None => {}
        }
    }

    println!(
        "{} frames, {} speech ({:.1}%), threshold {:.3}",
        total,
        speech,
        if total == 0 {
            0.0
        } else {
            speech as f64 * 100.0 / total as f64
        },
        classifier.threshold()
    );
    Ok(())
}

/// Synthesize through an in-process cache.
fn synthesize(
    config: &Config,
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
    voice: &str,
    speed: f32,
) -> Result<Vec<u8>> {
    let cache = SynthesisCache::in_memory(&config.cache);
    if let Some(audio) = cache.get(text, voice, speed) {
        return Ok(audio);
    }
    let audio = synthesizer.synthesize(text, voice, speed)?;
    cache.set(text, voice, &audio, speed, None);
    Ok(audio)
}

#[cfg(feature = "http")]
fn synthesize_hosted(config: &Config, text: &str, voice: &str, speed: f32) -> Result<Vec<u8>> {
    require_key(&config.services.minimax.api_key, "MINIMAX_API_KEY")?;
    let pool = http_pool(config)?;
    let audio = synthesize(config, &minimax(config, pool.clone()), text, voice, speed);
    pool.close();
    audio
}

#[cfg(not(feature = "http"))]
fn synthesize_hosted(_config: &Config, _text: &str, _voice: &str, _speed: f32) -> Result<Vec<u8>> {
    bail!("Built without the `http` feature; use --mock")
}

#[cfg(feature = "http")]
fn require_key(key: &Option<String>, name: &str) -> Result<()> {
    if key.as_deref().is_none_or(str::is_empty) {
        bail!("{name} is not set");
    }
    Ok(())
}

/// One pool for every hosted collaborator of a run.
#[cfg(feature = "http")]
fn http_pool(config: &Config) -> Result<Arc<ConnectionPool>> {
    let timeout = config
        .services
        .openrouter
        .timeout_secs
        .max(config.services.minimax.timeout_secs);
    Ok(Arc::new(ConnectionPool::new(Duration::from_secs(timeout))?))
}

#[cfg(feature = "http")]
fn minimax(config: &Config, pool: Arc<ConnectionPool>) -> MinimaxClient {
    MinimaxClient::new(
        pool,
        config.services.minimax.clone(),
        config.audio.sample_rate,
        config.pipeline.playback_chunk_bytes,
    )
}

/// Bot whose replies come from OpenRouter and are voiced by Minimax.
#[cfg(feature = "http")]
fn live_bot(config: Config, mut services: Services) -> Result<VoiceBot> {
    require_key(&config.services.openrouter.api_key, "OPENROUTER_API_KEY")?;
    require_key(&config.services.minimax.api_key, "MINIMAX_API_KEY")?;
    let pool = http_pool(&config)?;
    let language_model: Arc<dyn LanguageModel> = Arc::new(OpenRouterClient::new(
        pool.clone(),
        config.services.openrouter.clone(),
        &config.assistant.llm_model,
    ));
    services.language_model = language_model;
    services.synthesizer = Arc::new(minimax(&config, pool.clone()));
    Ok(VoiceBot::new(config, services).with_connection_pool(pool))
}

#[cfg(not(feature = "http"))]
fn live_bot(_config: Config, _services: Services) -> Result<VoiceBot> {
    bail!("Built without the `http` feature; drop --live")
}

fn simulate(
    config: Config,
    wav: &Path,
    transcript: &str,
    reply: &str,
    output: Option<&Path>,
    timeout: Duration,
    live: bool,
) -> Result<()> {
    let spec = FrameSpec::new(config.audio.sample_rate, config.audio.frame_duration_ms);
    let classifier = EnergyClassifier::new(spec, config.audio.vad_aggressiveness)?;
    let pcm = read_pcm_file(wav, config.audio.sample_rate)?;

    let inbound: Vec<Vec<u8>> = pcm
        .chunks_exact(spec.frame_bytes())
        .map(<[u8]>::to_vec)
        .collect();
    let speech_frames = inbound.iter().filter(|f| classifier.is_speech(f)).count();

    let recognizer =
        Arc::new(MockRecognizer::new().with_utterance_after(speech_frames.max(1), transcript));
    let transport = Arc::new(MockTransport::new().with_inbound(inbound));
    let tokens: Vec<&str> = reply.split_inclusive(' ').collect();
    let services = Services {
        recognizer: recognizer.clone(),
        language_model: Arc::new(MockLanguageModel::new().with_reply(&tokens)),
        synthesizer: Arc::new(MockSynthesizer::new()),
        transport: transport.clone(),
        cache: Arc::new(SynthesisCache::in_memory(&config.cache)),
    };

    if speech_frames == 0 {
        tracing::warn!("no speech detected in caller audio, delivering transcript directly");
        recognizer.push_transcript(Transcript::final_text(transcript));
    }

    let sample_rate = config.audio.sample_rate;
    let bot = if live {
        live_bot(config, services)?
    } else {
        VoiceBot::new(config, services)
    };
    let handle = bot.start()?;
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline
        && handle.is_running()
        && !replied(&handle.history())
    {
        std::thread::sleep(Duration::from_millis(20));
    }
    let history = handle.stop();

    for turn in &history {
        println!("{:>9}: {}", format!("{:?}", turn.role).to_lowercase(), turn.content);
    }
    if !replied(&history) {
        bail!("Bot did not reply within {}", humantime::format_duration(timeout));
    }

    if let Some(path) = output {
        let audio: Vec<u8> = transport.sent_frames().concat();
        write_pcm_file(path, &audio, sample_rate)?;
        println!("Wrote {} bytes of bot audio to {}", audio.len(), path.display());
    }
    Ok(())
}

/// True once the bot has answered the caller at least once.
fn replied(history: &[ConversationTurn]) -> bool {
    history
        .iter()
        .skip_while(|turn| turn.role != Role::User)
        .any(|turn| turn.role == Role::Assistant)
}

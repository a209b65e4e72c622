//! Command-line interface for voxbot
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Real-time spoken conversation core
#[derive(Parser, Debug)]
#[command(name = "voxbot", version, about = "Real-time spoken conversation core")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`), and compound (`1m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the synthesis cache key for a sentence
    CacheKey {
        /// Text to key
        text: String,
        /// Voice id (default: configured voice)
        #[arg(long, value_name = "VOICE")]
        voice: Option<String>,
        /// Speed multiplier (default: configured speed)
        #[arg(long, value_name = "SPEED")]
        speed: Option<f32>,
    },

    /// Run the frame classifier and speech tracker over a WAV file
    Classify {
        /// 16-bit PCM WAV file
        wav: PathBuf,
        /// Print the decision for every frame
        #[arg(long)]
        frames: bool,
    },

    /// Synthesize a sentence to a WAV file
    Speak {
        /// Text to speak
        text: String,
        /// Output WAV path
        #[arg(long, short = 'o', value_name = "PATH")]
        output: PathBuf,
        /// Voice id (default: configured voice)
        #[arg(long, value_name = "VOICE")]
        voice: Option<String>,
        /// Speed multiplier (default: configured speed)
        #[arg(long, value_name = "SPEED")]
        speed: Option<f32>,
        /// Use the built-in test tone instead of the hosted synthesizer
        #[arg(long)]
        mock: bool,
    },

    /// Play a caller WAV into an offline bot and record what it says back
    Simulate {
        /// Caller audio (16-bit PCM WAV)
        wav: PathBuf,
        /// What the caller is heard saying once their audio has been sent
        #[arg(long, value_name = "TEXT")]
        transcript: String,
        /// Scripted bot reply (ignored with --live)
        #[arg(long, value_name = "TEXT", default_value = "Sure thing. How can I help?")]
        reply: String,
        /// Bot audio output WAV path
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
        /// Give up after this long (e.g. 10s, 1m)
        #[arg(long, value_name = "DURATION", default_value = "10s", value_parser = parse_duration)]
        timeout: Duration,
        /// Generate and voice replies with the hosted services
        #[arg(long)]
        live: bool,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved configuration as TOML
    Show,
    /// Print the default configuration file path
    Path,
}

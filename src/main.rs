use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lector::api::{ApiServer, ApiState};
use lector::audio::{
    AudioOutput, AudioPlayback, PcmBuffer, SAMPLE_RATE, SpeechAnnouncer, SystemAnnouncer,
    decode_pcm16,
};
use lector::{Config, ImageCapture, Orchestrator, Outcome, synthesis};

/// Extra time after the last sample before the process may exit
const DRAIN_MARGIN: Duration = Duration::from_millis(500);

/// Upper bound on waiting for speech to finish
const MAX_DRAIN: Duration = Duration::from_secs(300);

/// Lector - reads printed text aloud from a photo
#[derive(Parser)]
#[command(name = "lector", version, about)]
struct Cli {
    /// Language of the text (e.g., "en", "es", "fr-FR")
    #[arg(short, long, env = "LECTOR_LANGUAGE")]
    language: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Read the text in an image aloud
    Read {
        /// Image file
        image: PathBuf,
        /// MIME type, if the file extension does not tell
        #[arg(long)]
        mime: Option<String>,
        /// Replay the result once afterwards
        #[arg(long)]
        replay: bool,
    },
    /// Run the HTTP API
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
    /// List configured languages
    Languages,
    /// Test speaker output
    TestSpeaker {
        /// Write the test tone to a WAV file instead of playing it
        #[arg(long)]
        wav: Option<PathBuf>,
    },
    /// Test TTS output through the configured backend
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Test the local speech fallback
    TestAnnouncer {
        /// Text to speak; defaults to the language's ready message
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,lector=info",
        1 => "info,lector=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(language) = cli.language.as_deref() {
        config.set_language(language);
    }

    match cli.command {
        Command::Read {
            image,
            mime,
            replay,
        } => read(&config, &image, mime.as_deref(), replay).await,
        Command::Serve { port } => serve(&config, port).await,
        Command::Languages => {
            list_languages(&config);
            Ok(())
        }
        Command::TestSpeaker { wav } => test_speaker(wav.as_deref()).await,
        Command::TestTts { text } => test_tts(&config, &text).await,
        Command::TestAnnouncer { text } => test_announcer(&config, text.as_deref()).await,
    }
}

/// Playback that remembers when the last buffer stops sounding
struct TrackedPlayback {
    inner: AudioPlayback,
    until: Mutex<Option<Instant>>,
}

impl TrackedPlayback {
    const fn new() -> Self {
        Self {
            inner: AudioPlayback::new(),
            until: Mutex::new(None),
        }
    }

    fn remaining(&self) -> Duration {
        self.until
            .lock()
            .ok()
            .and_then(|until| *until)
            .map_or(Duration::ZERO, |until| {
                until.saturating_duration_since(Instant::now())
            })
    }
}

impl AudioOutput for TrackedPlayback {
    fn play(&self, buffer: &PcmBuffer) -> lector::Result<()> {
        self.inner.play(buffer)?;
        let end = Instant::now() + buffer.duration();
        if let Ok(mut until) = self.until.lock() {
            *until = Some(until.map_or(end, |current| current.max(end)));
        }
        Ok(())
    }
}

/// Host announcer honoring `speech.command = "none"`
fn system_announcer(config: &Config) -> SystemAnnouncer {
    if config.speech.is_silent() {
        SystemAnnouncer::with_backend(None, config.speech.rate)
    } else {
        SystemAnnouncer::from_config(config.speech.command.as_deref(), config.speech.rate)
    }
}

/// Wait until playback and speech have finished
async fn drain(playback: &TrackedPlayback, announcer: &SystemAnnouncer) {
    let started = Instant::now();
    tokio::time::sleep(playback.remaining()).await;

    while announcer.is_speaking() && started.elapsed() < MAX_DRAIN {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    tokio::time::sleep(DRAIN_MARGIN).await;
}

/// Run one capture from a file
async fn read(
    config: &Config,
    path: &Path,
    mime: Option<&str>,
    replay: bool,
) -> anyhow::Result<()> {
    let capture = match mime {
        Some(mime) => ImageCapture::new(std::fs::read(path)?, mime, config.max_image_bytes)?,
        None => ImageCapture::from_path(path, config.max_image_bytes)?,
    };

    let playback = Arc::new(TrackedPlayback::new());
    let announcer = Arc::new(system_announcer(config));
    let orchestrator = Arc::new(Orchestrator::from_config_with(
        config,
        playback.clone(),
        announcer.clone(),
    )?);

    let outcome = orchestrator
        .process_image(capture, config.language_profile())
        .await?;
    let session = orchestrator.snapshot().await;

    if let Some(text) = &session.text {
        println!("{text}");
    }

    drain(&playback, &announcer).await;

    if replay && orchestrator.replay().await? {
        drain(&playback, &announcer).await;
    }

    match outcome {
        Outcome::Played | Outcome::Announced { .. } => {
            tracing::info!(outcome = ?outcome, "done");
            Ok(())
        }
        Outcome::Failed { kind, message } => anyhow::bail!("{kind}: {message}"),
    }
}

async fn serve(config: &Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.server.port);
    tracing::info!(
        port,
        language = %config.language,
        backend = ?config.synthesis.backend,
        "starting lector API"
    );

    let state = ApiState::from_config(config)?;
    ApiServer::new(state, port).run().await?;
    Ok(())
}

fn list_languages(config: &Config) {
    for profile in config.languages.iter() {
        let marker = if profile.code == config.language { "*" } else { " " };
        println!(
            "{marker} {:<4} {:<12} {:<8} voice={}",
            profile.code, profile.name, profile.locale, profile.voice
        );
    }
}

/// Test speaker output with a sine wave
async fn test_speaker(wav: Option<&Path>) -> anyhow::Result<()> {
    // 2 seconds of 440Hz at 30% volume
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let rate = SAMPLE_RATE as f32;
    #[allow(clippy::cast_possible_truncation)]
    let num_samples = SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / rate).sin() * 0.3)
        .collect();
    let buffer = PcmBuffer::from_samples(samples);

    if let Some(path) = wav {
        std::fs::write(path, buffer.to_wav()?)?;
        println!("Wrote {} samples to {}", buffer.len(), path.display());
        return Ok(());
    }

    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new();
    let info = playback.warm_up()?;
    println!(
        "Output: {} ({} Hz, {} channel(s))",
        info.device, info.sample_rate, info.channels
    );

    playback.play(&buffer)?;
    tokio::time::sleep(buffer.duration() + DRAIN_MARGIN).await;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output through the configured backend
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let synthesizer = synthesis::from_config(config)?;
    let language = config.language_profile();

    println!("Synthesizing speech with {}...", synthesizer.name());
    let payload = synthesizer
        .synthesize(text, language)
        .await?
        .ok_or_else(|| anyhow::anyhow!("{} backend returned no audio", synthesizer.name()))?;

    let buffer = decode_pcm16(&payload)?;
    println!(
        "Got {} samples ({:.1}s) of audio",
        buffer.len(),
        buffer.duration().as_secs_f32()
    );

    println!("Playing audio...");
    AudioPlayback::new().play(&buffer)?;
    tokio::time::sleep(buffer.duration() + DRAIN_MARGIN).await;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Test the local speech fallback
async fn test_announcer(config: &Config, text: Option<&str>) -> anyhow::Result<()> {
    let language = config.language_profile();
    let text = text.unwrap_or(&language.ready);

    let announcer = system_announcer(config);
    match announcer.backend() {
        Some(backend) => println!("Speech backend: {backend:?} (rate {})", announcer.rate()),
        None => anyhow::bail!("no speech command found; set LECTOR_SPEECH_COMMAND"),
    }

    announcer.announce(text, &language.locale);

    let started = Instant::now();
    while announcer.is_speaking() && started.elapsed() < MAX_DRAIN {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Ok(())
}

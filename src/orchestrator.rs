//! Capture-to-speech pipeline
//!
//! One capture runs recognize → synthesize → decode + play, falling back to
//! the local announcer whenever audio is unavailable. Only one capture may be
//! in flight; a second one is rejected with [`Error::Busy`]. A capture runs on
//! its own task, so dropping the caller's future does not cut it short.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::audio::{
    AudioOutput, AudioPlayback, SilentAnnouncer, SpeechAnnouncer, SystemAnnouncer, decode_pcm16,
};
use crate::capture::ImageCapture;
use crate::config::Config;
use crate::error::FailureKind;
use crate::gemini::GeminiClient;
use crate::language::{DEFAULT_LOCALE, LanguageProfile};
use crate::recognition::{GeminiRecognizer, RecognitionResult, TextRecognizer};
use crate::synthesis::{self, SpeechSynthesizer};
use crate::{Error, Result};

/// Pipeline stage of the current or last session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Capturing,
    Recognizing,
    Synthesizing,
    Playing,
    Announcing,
    Error,
}

/// Why recognized text was announced instead of played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    SynthesisUnavailable,
    DecodeFailed,
    PlaybackFailed,
}

impl FallbackReason {
    const fn kind(self) -> FailureKind {
        match self {
            Self::SynthesisUnavailable => FailureKind::SynthesisUnavailable,
            Self::DecodeFailed => FailureKind::DecodeError,
            Self::PlaybackFailed => FailureKind::PlaybackError,
        }
    }
}

/// How a capture ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Synthesized audio was handed to the speakers
    Played,
    /// Recognized text was spoken by the local announcer
    Announced { reason: FallbackReason },
    /// The session ended without speaking the text
    Failed { kind: FailureKind, message: String },
}

/// Per-capture state, reset at the start of every capture
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub text: Option<String>,
    pub payload: Option<String>,
    pub in_progress: bool,
    pub last_error: Option<String>,
    pub stage: Stage,
    pub language: Option<String>,
    pub locale: Option<String>,
    /// Localized "reading" notice while a capture is in flight
    pub notice: Option<String>,
}

/// Read-only view of the session for API clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub stage: Stage,
    pub in_progress: bool,
    pub language: Option<String>,
    pub text: Option<String>,
    pub has_audio: bool,
    pub can_replay: bool,
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(state: &SessionState) -> Self {
        Self {
            stage: state.stage,
            in_progress: state.in_progress,
            language: state.language.clone(),
            text: state.text.clone(),
            has_audio: state.payload.is_some(),
            can_replay: state.payload.is_some() || state.text.is_some(),
            last_error: state.last_error.clone(),
            notice: state.notice.clone(),
        }
    }
}

/// Releases the single-flight slot on every exit path
struct FlightGuard(Arc<AtomicBool>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs captures through recognition, synthesis and playback
pub struct Orchestrator {
    recognizer: Arc<dyn TextRecognizer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    announcer: Arc<dyn SpeechAnnouncer>,
    in_flight: Arc<AtomicBool>,
    session: RwLock<SessionState>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        recognizer: Arc<dyn TextRecognizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        announcer: Arc<dyn SpeechAnnouncer>,
    ) -> Self {
        Self {
            recognizer,
            synthesizer,
            output,
            announcer,
            in_flight: Arc::new(AtomicBool::new(false)),
            session: RwLock::new(SessionState::default()),
        }
    }

    /// Wire up the real collaborators from configuration
    ///
    /// # Errors
    ///
    /// Returns error if no Gemini API key is configured, or the selected
    /// synthesis backend is missing its settings
    pub fn from_config(config: &Config) -> Result<Self> {
        let announcer: Arc<dyn SpeechAnnouncer> = if config.speech.is_silent() {
            tracing::info!("local speech disabled, announcements are logged only");
            Arc::new(SilentAnnouncer)
        } else {
            Arc::new(SystemAnnouncer::from_config(
                config.speech.command.as_deref(),
                config.speech.rate,
            ))
        };
        Self::from_config_with(config, Arc::new(AudioPlayback::new()), announcer)
    }

    /// Build recognition and synthesis from configuration around the given
    /// audio collaborators
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_config`]
    pub fn from_config_with(
        config: &Config,
        output: Arc<dyn AudioOutput>,
        announcer: Arc<dyn SpeechAnnouncer>,
    ) -> Result<Self> {
        let key = config
            .api_keys
            .gemini
            .as_ref()
            .ok_or_else(|| Error::Config("GEMINI_API_KEY not set".to_string()))?;

        let recognizer = GeminiRecognizer::new(
            GeminiClient::new(
                SecretString::from(key.expose_secret().to_string()),
                config.recognition.api_url.clone(),
            )?
            .with_timeout(config.request_timeout),
            config.recognition.model.clone(),
        );

        let synthesizer = synthesis::from_config(config)?;
        tracing::info!(
            recognizer = recognizer.name(),
            synthesizer = synthesizer.name(),
            "pipeline ready"
        );

        Ok(Self::new(Arc::new(recognizer), synthesizer, output, announcer))
    }

    /// Run one capture to completion
    ///
    /// Returns once audio has been handed off or an announcement started;
    /// neither is awaited. The capture keeps running if this future is
    /// dropped, and holds the slot until it ends.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if another capture or replay is in flight.
    /// Every pipeline failure is reported through [`Outcome`] instead.
    pub async fn process_image(
        self: &Arc<Self>,
        capture: ImageCapture,
        language: &LanguageProfile,
    ) -> Result<Outcome> {
        let slot = self.claim()?;

        *self.session.write().await = SessionState {
            in_progress: true,
            stage: Stage::Capturing,
            language: Some(language.code.clone()),
            locale: Some(language.locale.clone()),
            notice: Some(language.processing.clone()),
            ..SessionState::default()
        };

        tracing::info!(
            language = %language.code,
            image_bytes = capture.bytes().len(),
            mime_type = capture.mime_type(),
            notice = %language.processing,
            "capture started"
        );

        let this = Arc::clone(self);
        let profile = language.clone();
        let task = tokio::spawn(async move {
            let _slot = slot;
            this.run_to_completion(&capture, &profile).await
        });

        match task.await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(error = %e, "capture task did not finish");
                self.finish().await;
                Ok(Outcome::Failed {
                    kind: FailureKind::GenericFailure,
                    message: language.generic_error.clone(),
                })
            }
        }
    }

    async fn run_to_completion(
        &self,
        capture: &ImageCapture,
        language: &LanguageProfile,
    ) -> Outcome {
        let outcome = match AssertUnwindSafe(self.run(capture, language))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                tracing::error!(
                    kind = %FailureKind::GenericFailure,
                    panic = panic_message(panic.as_ref()),
                    "pipeline panicked"
                );
                self.fail(FailureKind::GenericFailure, &language.generic_error, language)
                    .await
            }
        };

        self.finish().await;
        tracing::info!(outcome = ?outcome, "capture finished");
        outcome
    }

    async fn finish(&self) {
        let mut session = self.session.write().await;
        session.in_progress = false;
        session.notice = None;
        session.stage = Stage::Idle;
    }

    /// Replay the last session's audio, or announce its text
    ///
    /// Returns whether anything was replayed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while a capture is in flight
    pub async fn replay(&self) -> Result<bool> {
        let _slot = self.claim()?;

        let session = self.session.read().await.clone();
        let locale = session.locale.as_deref().unwrap_or(DEFAULT_LOCALE);

        if let Some(payload) = &session.payload {
            match self.play_payload(payload).await {
                Ok(()) => {
                    tracing::info!("replayed stored audio");
                    return Ok(true);
                }
                Err(e) => {
                    tracing::warn!(kind = %e.failure_kind(), error = %e, "replay playback failed");
                }
            }
        }

        match &session.text {
            Some(text) => {
                tracing::info!("replaying stored text");
                self.announcer.announce(text, locale);
                Ok(true)
            }
            None => {
                tracing::debug!("nothing to replay");
                Ok(false)
            }
        }
    }

    /// Whether [`Self::replay`] has anything to play
    pub async fn can_replay(&self) -> bool {
        let session = self.session.read().await;
        session.payload.is_some() || session.text.is_some()
    }

    /// Current session state
    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&*self.session.read().await)
    }

    /// Whether a capture or replay is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn claim(&self) -> Result<FlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(FlightGuard(Arc::clone(&self.in_flight)))
    }

    async fn run(&self, capture: &ImageCapture, language: &LanguageProfile) -> Outcome {
        self.set_stage(Stage::Recognizing).await;

        let text = match self.recognizer.recognize(capture, &language.prompt_hint).await {
            RecognitionResult::Text(text) if !text.trim().is_empty() => text,
            RecognitionResult::Text(_) | RecognitionResult::NoTextFound => {
                let err = Error::NoTextFound;
                tracing::info!(kind = %err.failure_kind(), "no text in image");
                return self.fail(err.failure_kind(), &language.no_text, language).await;
            }
            RecognitionResult::ApiError(message) => {
                let err = Error::Recognition(message);
                tracing::warn!(kind = %err.failure_kind(), error = %err, "recognition failed");
                return self
                    .fail(err.failure_kind(), &language.recognition_failed, language)
                    .await;
            }
        };

        {
            let mut session = self.session.write().await;
            session.text = Some(text.clone());
            session.stage = Stage::Synthesizing;
        }

        let payload = self
            .synthesizer
            .synthesize(&text, language)
            .await
            .and_then(|payload| {
                payload.ok_or_else(|| Error::Synthesis("no audio returned".to_string()))
            });

        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    kind = %FailureKind::SynthesisUnavailable,
                    synthesizer = self.synthesizer.name(),
                    error = %e,
                    "synthesis unavailable"
                );
                return self
                    .announce_text(&text, language, FallbackReason::SynthesisUnavailable)
                    .await;
            }
        };

        self.session.write().await.payload = Some(payload.clone());

        match self.play_payload(&payload).await {
            Ok(()) => {
                self.set_stage(Stage::Playing).await;
                Outcome::Played
            }
            Err(e) => {
                let reason = if matches!(e.failure_kind(), FailureKind::DecodeError) {
                    FallbackReason::DecodeFailed
                } else {
                    FallbackReason::PlaybackFailed
                };
                tracing::warn!(kind = %reason.kind(), error = %e, "audio output failed");
                self.announce_text(&text, language, reason).await
            }
        }
    }

    /// Decode and hand off to the output on the blocking pool
    async fn play_payload(&self, payload: &str) -> Result<()> {
        let buffer = decode_pcm16(payload)?;
        if buffer.is_empty() {
            tracing::debug!("empty audio payload, nothing to play");
            return Ok(());
        }

        tracing::debug!(
            samples = buffer.len(),
            duration_ms = u64::try_from(buffer.duration().as_millis()).unwrap_or(u64::MAX),
            "playing synthesized audio"
        );

        let output = Arc::clone(&self.output);
        tokio::task::spawn_blocking(move || output.play(&buffer))
            .await
            .map_err(|e| Error::Playback(format!("playback task failed: {e}")))?
    }

    async fn announce_text(
        &self,
        text: &str,
        language: &LanguageProfile,
        reason: FallbackReason,
    ) -> Outcome {
        self.set_stage(Stage::Announcing).await;
        tracing::info!(kind = %reason.kind(), "announcing recognized text");
        self.announcer.announce(text, &language.locale);
        Outcome::Announced { reason }
    }

    async fn fail(
        &self,
        kind: FailureKind,
        message: &str,
        language: &LanguageProfile,
    ) -> Outcome {
        {
            let mut session = self.session.write().await;
            session.last_error = Some(message.to_string());
            session.stage = Stage::Error;
        }
        self.announcer.announce(message, &language.locale);
        Outcome::Failed {
            kind,
            message: message.to_string(),
        }
    }

    async fn set_stage(&self, stage: Stage) {
        tracing::debug!(stage = ?stage, "stage");
        self.session.write().await.stage = stage;
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

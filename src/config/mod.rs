//! Configuration management for Lector
//!
//! Values are layered env > TOML file > defaults.

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::language::{LanguageProfile, LanguageTable, DEFAULT_LANGUAGE};
use crate::{Error, Result};

use file::LectorConfigFile;

/// Gemini REST API base
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default recognition model
pub const DEFAULT_OCR_MODEL: &str = "gemini-2.5-flash";

/// Default speech model
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Default ElevenLabs model used by the TTS proxy
pub const DEFAULT_ELEVENLABS_MODEL: &str = "eleven_multilingual_v2";

/// Default API server port
pub const DEFAULT_PORT: u16 = 18790;

/// Default image size limit (10MB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Default limit for one recognition or synthesis request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lector configuration
#[derive(Debug)]
pub struct Config {
    /// Active reading language code
    pub language: String,

    /// Language profiles
    pub languages: LanguageTable,

    /// Largest accepted image in bytes
    pub max_image_bytes: usize,

    /// Limit for each outbound OCR or TTS request
    pub request_timeout: Duration,

    /// Text recognition configuration
    pub recognition: RecognitionConfig,

    /// Speech synthesis configuration
    pub synthesis: SynthesisConfig,

    /// Local speech fallback configuration
    pub speech: SpeechConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// HTTP API server configuration
    pub server: ServerConfig,
}

/// Text recognition configuration
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Gemini model (e.g. "gemini-2.5-flash")
    pub model: String,

    /// Gemini API base URL
    pub api_url: String,
}

/// Which synthesis client to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisBackend {
    /// Direct Gemini TTS model call
    Gemini,
    /// `POST {url}/api/tts/{provider}` proxy
    Http,
    /// No synthesis; always use local speech
    None,
}

impl FromStr for SynthesisBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "http" | "proxy" => Ok(Self::Http),
            "none" | "local" | "off" => Ok(Self::None),
            other => Err(Error::Config(format!("unknown synthesis backend: {other}"))),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Selected backend
    pub backend: SynthesisBackend,

    /// Gemini TTS model
    pub model: String,

    /// Gemini API base URL
    pub api_url: String,

    /// TTS proxy base URL (http backend)
    pub proxy_url: Option<String>,

    /// Provider path segment on the proxy
    pub provider: String,
}

/// Local speech fallback configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Speaking rate multiplier (default 0.9)
    pub rate: f32,

    /// Speech command overriding detection; `"none"` disables local speech
    pub command: Option<String>,
}

impl SpeechConfig {
    /// Whether local speech is turned off
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.command
            .as_deref()
            .is_some_and(|cmd| cmd.trim().eq_ignore_ascii_case("none"))
    }
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// Gemini API key (recognition and Gemini TTS)
    pub gemini: Option<SecretString>,

    /// ElevenLabs API key (TTS proxy)
    pub elevenlabs: Option<SecretString>,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Default ElevenLabs voice for the TTS proxy
    pub elevenlabs_voice_id: Option<String>,

    /// ElevenLabs model for the TTS proxy
    pub elevenlabs_model: String,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn from_sources(
        fc: LectorConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let secret = |value: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };

        let api_keys = ApiKeys {
            gemini: secret(
                env("GEMINI_API_KEY")
                    .or_else(|| env("GOOGLE_API_KEY"))
                    .or(fc.api_keys.gemini),
            ),
            elevenlabs: secret(env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs)),
        };

        let gemini_url = env("LECTOR_GEMINI_URL")
            .or(fc.recognition.api_url)
            .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let recognition = RecognitionConfig {
            model: env("LECTOR_OCR_MODEL")
                .or(fc.recognition.model)
                .unwrap_or_else(|| DEFAULT_OCR_MODEL.to_string()),
            api_url: gemini_url.clone(),
        };

        let backend = env("LECTOR_TTS_BACKEND")
            .or(fc.synthesis.backend)
            .map_or(Ok(SynthesisBackend::Gemini), |b| b.parse())?;

        let synthesis = SynthesisConfig {
            backend,
            model: env("LECTOR_TTS_MODEL")
                .or(fc.synthesis.model)
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            api_url: gemini_url,
            proxy_url: env("LECTOR_TTS_URL")
                .or(fc.synthesis.url)
                .map(|u| u.trim_end_matches('/').to_string()),
            provider: env("LECTOR_TTS_PROVIDER")
                .or(fc.synthesis.provider)
                .unwrap_or_else(|| "elevenlabs".to_string()),
        };

        if synthesis.backend == SynthesisBackend::Http && synthesis.proxy_url.is_none() {
            return Err(Error::Config(
                "http synthesis backend requires LECTOR_TTS_URL".to_string(),
            ));
        }

        let rate = match env("LECTOR_SPEECH_RATE") {
            Some(raw) => raw
                .trim()
                .parse::<f32>()
                .map_err(|e| Error::Config(format!("invalid LECTOR_SPEECH_RATE {raw:?}: {e}")))?,
            None => fc.speech.rate.unwrap_or(crate::audio::DEFAULT_RATE),
        };

        if !(0.1..=4.0).contains(&rate) {
            return Err(Error::Config(format!(
                "speech rate must be between 0.1 and 4.0, got {rate}"
            )));
        }

        let speech = SpeechConfig {
            rate,
            command: env("LECTOR_SPEECH_COMMAND").or(fc.speech.command),
        };

        let port = match env("LECTOR_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid LECTOR_PORT {raw:?}: {e}")))?,
            None => fc.server.port.unwrap_or(DEFAULT_PORT),
        };

        let server = ServerConfig {
            port,
            elevenlabs_voice_id: env("ELEVENLABS_VOICE_ID").or(fc.server.elevenlabs_voice_id),
            elevenlabs_model: env("ELEVENLABS_MODEL")
                .or(fc.server.elevenlabs_model)
                .unwrap_or_else(|| DEFAULT_ELEVENLABS_MODEL.to_string()),
        };

        let max_image_bytes = match env("LECTOR_MAX_IMAGE_BYTES") {
            Some(raw) => raw.trim().parse().map_err(|e| {
                Error::Config(format!("invalid LECTOR_MAX_IMAGE_BYTES {raw:?}: {e}"))
            })?,
            None => fc.max_image_bytes.unwrap_or(DEFAULT_MAX_IMAGE_BYTES),
        };

        let request_timeout = match env("LECTOR_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map(Duration::from_secs).map_err(|e| {
                Error::Config(format!("invalid LECTOR_REQUEST_TIMEOUT_SECS {raw:?}: {e}"))
            })?,
            None => fc
                .request_timeout_secs
                .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs),
        };
        if request_timeout.is_zero() {
            return Err(Error::Config("request timeout must be positive".to_string()));
        }

        let languages = LanguageTable::with_overrides(fc.languages);
        let language = env("LECTOR_LANGUAGE")
            .or(fc.language)
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        let language = languages.resolve(&language).code.clone();

        Ok(Self {
            language,
            languages,
            max_image_bytes,
            request_timeout,
            recognition,
            synthesis,
            speech,
            api_keys,
            server,
        })
    }

    /// Profile of the active language
    #[must_use]
    pub fn language_profile(&self) -> &LanguageProfile {
        self.languages.resolve(&self.language)
    }

    /// Switch the active language, falling back to English if unknown
    pub fn set_language(&mut self, code: &str) {
        self.language = self.languages.resolve(code).code.clone();
    }
}

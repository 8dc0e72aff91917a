//! TOML configuration file loading
//!
//! Supports `~/.config/omni/lector/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::language::LanguageOverride;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LectorConfigFile {
    /// Active reading language (e.g. "fr")
    #[serde(default)]
    pub language: Option<String>,

    /// Largest accepted image in bytes
    #[serde(default)]
    pub max_image_bytes: Option<usize>,

    /// Per-request limit for OCR and TTS calls, in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Text recognition configuration
    #[serde(default)]
    pub recognition: RecognitionFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    /// Local speech fallback configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Per-language overrides and additions
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageOverride>,
}

/// Recognition (OCR) configuration
#[derive(Debug, Default, Deserialize)]
pub struct RecognitionFileConfig {
    /// Model identifier (e.g. "gemini-2.5-flash")
    pub model: Option<String>,

    /// Gemini API base URL
    pub api_url: Option<String>,
}

/// Synthesis (TTS) configuration
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    /// Backend: "gemini", "http" or "none"
    pub backend: Option<String>,

    /// Gemini TTS model
    pub model: Option<String>,

    /// Base URL of a TTS proxy (for the "http" backend)
    pub url: Option<String>,

    /// Provider path segment on the proxy (e.g. "elevenlabs")
    pub provider: Option<String>,
}

/// Local speech fallback configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// Speaking rate multiplier
    pub rate: Option<f32>,

    /// Speech command overriding detection (e.g. "espeak-ng")
    pub command: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub gemini: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Default ElevenLabs voice for the TTS proxy
    pub elevenlabs_voice_id: Option<String>,

    /// ElevenLabs model for the TTS proxy
    pub elevenlabs_model: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `LectorConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> LectorConfigFile {
    config_file_path().map_or_else(LectorConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or invalid files yield defaults; problems are logged.
pub fn load_config_from(path: &Path) -> LectorConfigFile {
    if !path.exists() {
        return LectorConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                LectorConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            LectorConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/lector/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("lector")
            .join("config.toml")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
language = "fr"

[synthesis]
backend = "http"
url = "http://localhost:8787"

[languages.fr]
voice = "Zephyr"
"#,
        )
        .unwrap();

        let file = load_config_from(&path);
        assert_eq!(file.language.as_deref(), Some("fr"));
        assert_eq!(file.synthesis.backend.as_deref(), Some("http"));
        assert_eq!(file.synthesis.url.as_deref(), Some("http://localhost:8787"));
        assert!(file.recognition.model.is_none());
        assert_eq!(file.languages["fr"].voice.as_deref(), Some("Zephyr"));
    }

    #[test]
    fn invalid_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "language = [not toml").unwrap();

        let file = load_config_from(&path);
        assert!(file.language.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let file = load_config_from(Path::new("/nonexistent/lector/config.toml"));
        assert!(file.language.is_none());
        assert!(file.languages.is_empty());
    }
}

//! Text-to-speech (TTS) clients
//!
//! Every backend returns the same thing: an optional base64 string of raw
//! 24 kHz PCM16LE mono audio. `None` is not an error; it tells the caller to
//! speak the text locally instead.

mod gemini;
mod http;

pub use gemini::GeminiSynthesizer;
pub use http::{HttpSynthesizer, TtsProxyRequest, TtsProxyResponse};

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{Config, SynthesisBackend};
use crate::gemini::GeminiClient;
use crate::language::LanguageProfile;
use crate::{Error, Result};

/// Synthesizes speech from text
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` in the voice configured for `language`
    ///
    /// # Errors
    ///
    /// Returns error if the provider fails; callers treat this the same as
    /// `Ok(None)`
    async fn synthesize(&self, text: &str, language: &LanguageProfile) -> Result<Option<String>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Backend that never returns audio
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSynthesizer;

#[async_trait]
impl SpeechSynthesizer for NoSynthesizer {
    async fn synthesize(&self, _text: &str, _language: &LanguageProfile) -> Result<Option<String>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Build the configured synthesis backend
///
/// The Gemini backend without an API key degrades to [`NoSynthesizer`].
///
/// # Errors
///
/// Returns error if the HTTP backend has no proxy URL
pub fn from_config(config: &Config) -> Result<Arc<dyn SpeechSynthesizer>> {
    let synthesis = &config.synthesis;

    match synthesis.backend {
        SynthesisBackend::Gemini => match &config.api_keys.gemini {
            Some(key) => Ok(Arc::new(GeminiSynthesizer::new(
                GeminiClient::new(
                    SecretString::from(key.expose_secret().to_string()),
                    synthesis.api_url.clone(),
                )?
                .with_timeout(config.request_timeout),
                synthesis.model.clone(),
            ))),
            None => {
                tracing::warn!("no Gemini API key, speech falls back to the announcer");
                Ok(Arc::new(NoSynthesizer))
            }
        },
        SynthesisBackend::Http => {
            let url = synthesis.proxy_url.as_deref().ok_or_else(|| {
                Error::Config("http synthesis backend requires LECTOR_TTS_URL".to_string())
            })?;
            Ok(Arc::new(
                HttpSynthesizer::new(url, &synthesis.provider)?.with_timeout(config.request_timeout),
            ))
        }
        SynthesisBackend::None => Ok(Arc::new(NoSynthesizer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::LectorConfigFile;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_sources(LectorConfigFile::default(), move |key| {
            pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn selects_backend() {
        assert_eq!(from_config(&config(&[])).unwrap().name(), "none");
        assert_eq!(
            from_config(&config(&[("GEMINI_API_KEY", "k")])).unwrap().name(),
            "gemini"
        );
        assert_eq!(
            from_config(&config(&[
                ("LECTOR_TTS_BACKEND", "http"),
                ("LECTOR_TTS_URL", "http://localhost:3000")
            ]))
            .unwrap()
            .name(),
            "http"
        );
        assert_eq!(
            from_config(&config(&[("GEMINI_API_KEY", "k"), ("LECTOR_TTS_BACKEND", "none")]))
                .unwrap()
                .name(),
            "none"
        );
    }
}

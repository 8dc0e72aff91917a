//! Server-side TTS proxy
//!
//! `POST /api/tts/{provider}` keeps provider credentials on the server and
//! always answers with base64 raw 24 kHz PCM16LE mono, the format the capture
//! pipeline plays directly.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{ApiError, ApiState};
use crate::Config;
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::gemini::{GeminiClient, http_client};
use crate::language::{DEFAULT_LANGUAGE, LanguageProfile, LanguageTable};
use crate::synthesis::{GeminiSynthesizer, SpeechSynthesizer, TtsProxyRequest, TtsProxyResponse};
use crate::{Error, Result};

/// ElevenLabs REST API base
pub const DEFAULT_ELEVENLABS_URL: &str = "https://api.elevenlabs.io";

/// Raw PCM output matching the local playback format
const ELEVENLABS_OUTPUT_FORMAT: &str = "pcm_24000";

/// Build TTS router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/{provider}", post(synthesize))
        .with_state(state)
}

/// ElevenLabs text-to-speech client
pub struct ElevenLabs {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    voice_id: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

impl ElevenLabs {
    #[must_use]
    pub fn new(api_key: SecretString, voice_id: Option<String>, model: String) -> Self {
        Self {
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
            api_key,
            base_url: DEFAULT_ELEVENLABS_URL.to_string(),
            voice_id,
            model,
        }
    }

    /// Give up on requests that take longer than `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Point at a different API host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Voice for a language: per-language override, else the default voice
    fn voice_for<'a>(&'a self, language: &'a LanguageProfile) -> Option<&'a str> {
        language
            .elevenlabs_voice
            .as_deref()
            .or(self.voice_id.as_deref())
    }

    /// Synthesize raw 24 kHz PCM16LE bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no voice is configured, [`Error::Provider`]
    /// on a non-success status
    pub async fn synthesize(&self, text: &str, language: &LanguageProfile) -> Result<Vec<u8>> {
        let voice = self
            .voice_for(language)
            .ok_or_else(|| Error::Config("ELEVENLABS_VOICE_ID not set".to_string()))?;

        let url = format!("{}/v1/text-to-speech/{voice}", self.base_url);
        tracing::debug!(voice, model = %self.model, language = %language.code, "requesting ElevenLabs synthesis");

        let response = self
            .client
            .post(&url)
            .query(&[("output_format", ELEVENLABS_OUTPUT_FORMAT)])
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&ElevenLabsRequest {
                text,
                model_id: &self.model,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Providers the proxy can reach
pub struct TtsProxy {
    languages: LanguageTable,
    elevenlabs: Option<ElevenLabs>,
    gemini: Option<GeminiSynthesizer>,
}

impl TtsProxy {
    #[must_use]
    pub const fn new(
        languages: LanguageTable,
        elevenlabs: Option<ElevenLabs>,
        gemini: Option<GeminiSynthesizer>,
    ) -> Self {
        Self {
            languages,
            elevenlabs,
            gemini,
        }
    }

    /// Build the proxy from server-held credentials
    ///
    /// # Errors
    ///
    /// Returns error if a configured Gemini key is rejected
    pub fn from_config(config: &Config) -> Result<Self> {
        let elevenlabs = config.api_keys.elevenlabs.as_ref().map(|key| {
            ElevenLabs::new(
                SecretString::from(key.expose_secret().to_string()),
                config.server.elevenlabs_voice_id.clone(),
                config.server.elevenlabs_model.clone(),
            )
            .with_timeout(config.request_timeout)
        });

        let gemini = match &config.api_keys.gemini {
            Some(key) => Some(GeminiSynthesizer::new(
                GeminiClient::new(
                    SecretString::from(key.expose_secret().to_string()),
                    config.synthesis.api_url.clone(),
                )?
                .with_timeout(config.request_timeout),
                config.synthesis.model.clone(),
            )),
            None => None,
        };

        Ok(Self::new(config.languages.clone(), elevenlabs, gemini))
    }

    /// Resolve a BCP-47 code such as `es-ES` to a language profile
    fn language(&self, code: Option<&str>) -> &LanguageProfile {
        self.languages.resolve(code.unwrap_or(DEFAULT_LANGUAGE))
    }
}

/// Synthesize text through a named provider
async fn synthesize(
    State(state): State<Arc<ApiState>>,
    Path(provider): Path<String>,
    Json(request): Json<TtsProxyRequest>,
) -> std::result::Result<Json<TtsProxyResponse>, ApiError> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("text is required".to_string()));
    }

    let proxy = &state.tts;
    let language = proxy.language(request.language_code.as_deref());

    let audio_data = match provider.as_str() {
        "elevenlabs" => {
            let client = proxy
                .elevenlabs
                .as_ref()
                .ok_or(ApiError::NotConfigured("ELEVENLABS_API_KEY not set"))?;
            let bytes = client.synthesize(text, language).await.map_err(|e| match e {
                Error::Config(_) => ApiError::NotConfigured("ELEVENLABS_VOICE_ID not set"),
                other => other.into(),
            })?;
            base64::engine::general_purpose::STANDARD.encode(bytes)
        }
        "gemini" => {
            let synthesizer = proxy
                .gemini
                .as_ref()
                .ok_or(ApiError::NotConfigured("GEMINI_API_KEY not set"))?;
            synthesizer
                .synthesize(text, language)
                .await?
                .ok_or_else(|| ApiError::Upstream("provider returned no audio".to_string()))?
        }
        other => return Err(ApiError::NotFound(format!("unknown TTS provider: {other}"))),
    };

    tracing::info!(provider, language = %language.code, payload_chars = audio_data.len(), "proxied synthesis");

    Ok(Json(TtsProxyResponse {
        audio_data: Some(audio_data),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_voice_overrides_default() {
        let client = ElevenLabs::new(
            SecretString::from("k".to_string()),
            Some("default-voice".to_string()),
            "eleven_multilingual_v2".to_string(),
        );
        let mut profile = LanguageTable::builtin().resolve("es").clone();
        assert_eq!(client.voice_for(&profile), Some("default-voice"));

        profile.elevenlabs_voice = Some("spanish-voice".to_string());
        assert_eq!(client.voice_for(&profile), Some("spanish-voice"));
    }

    #[test]
    fn resolves_locale_codes() {
        let proxy = TtsProxy::new(LanguageTable::builtin(), None, None);
        assert_eq!(proxy.language(Some("fr-FR")).code, "fr");
        assert_eq!(proxy.language(None).code, "en");
    }
}

//! TTS through a `POST /api/tts/{provider}` proxy
//!
//! The proxy holds the provider credential and voice; the client only sends
//! the text and language.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::SpeechSynthesizer;
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::gemini::http_client;
use crate::language::LanguageProfile;
use crate::{Error, Result};

/// Request body understood by the proxy
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsProxyRequest {
    pub text: String,
    #[serde(default)]
    pub language_code: Option<String>,
}

/// Success body returned by the proxy
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsProxyResponse {
    #[serde(default)]
    pub audio_data: Option<String>,
}

/// Synthesizes speech through a TTS proxy
pub struct HttpSynthesizer {
    client: reqwest::Client,
    url: String,
}

impl HttpSynthesizer {
    /// Create a client for `{base_url}/api/tts/{provider}`
    ///
    /// # Errors
    ///
    /// Returns error if the base URL or provider is empty
    pub fn new(base_url: &str, provider: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        let provider = provider.trim().trim_matches('/');

        if base_url.is_empty() || provider.is_empty() {
            return Err(Error::Config(
                "TTS proxy URL and provider required".to_string(),
            ));
        }

        Ok(Self {
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
            url: format!("{base_url}/api/tts/{provider}"),
        })
    }

    /// Give up on requests that take longer than `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, language: &LanguageProfile) -> Result<Option<String>> {
        let request = TtsProxyRequest {
            text: text.to_string(),
            language_code: Some(language.locale.clone()),
        };

        tracing::debug!(url = %self.url, language = %language.locale, "requesting proxy synthesis");

        let response = self.client.post(&self.url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "TTS proxy error");
            return Err(Error::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let result: TtsProxyResponse = response.json().await?;
        Ok(result.audio_data.filter(|data| !data.is_empty()))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

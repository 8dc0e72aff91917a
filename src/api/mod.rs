//! HTTP API server for Lector

pub mod capture;
pub mod health;
pub mod tts;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::language::LanguageTable;
use crate::orchestrator::Orchestrator;
use crate::{Config, Error, Result};

pub use tts::{DEFAULT_ELEVENLABS_URL, ElevenLabs, TtsProxy};

/// Shared state for API handlers
pub struct ApiState {
    /// Capture pipeline; absent when no Gemini key is configured
    pub pipeline: Option<Arc<Orchestrator>>,
    pub tts: TtsProxy,
    pub languages: LanguageTable,
    pub default_language: String,
    pub max_image_bytes: usize,
}

impl ApiState {
    /// Build API state from configuration
    ///
    /// The TTS proxy still runs without a Gemini key; only the capture
    /// endpoints need one.
    ///
    /// # Errors
    ///
    /// Returns error if the configured pipeline cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        let pipeline = if config.api_keys.gemini.is_some() {
            Some(Arc::new(Orchestrator::from_config(config)?))
        } else {
            tracing::warn!("GEMINI_API_KEY not set, capture endpoints disabled");
            None
        };

        Ok(Self {
            pipeline,
            tts: TtsProxy::from_config(config)?,
            languages: config.languages.clone(),
            default_language: config.language.clone(),
            max_image_bytes: config.max_image_bytes,
        })
    }

    fn pipeline(&self) -> std::result::Result<&Arc<Orchestrator>, ApiError> {
        self.pipeline
            .as_ref()
            .ok_or(ApiError::Unavailable("capture pipeline not configured"))
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", capture::router(state.clone()))
        .nest("/api/tts", tts::router(state))
        .merge(health::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// HTTP server bound to one port
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: ApiState, port: u16) -> Self {
        Self {
            state: Arc::new(state),
            port,
        }
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            capture = self.state.pipeline.is_some(),
            "API server listening"
        );

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}

/// API errors
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Busy,
    /// A server-held credential or setting is missing
    NotConfigured(&'static str),
    Unavailable(&'static str),
    /// Upstream provider answered with an error status
    Provider { status: u16, details: String },
    Upstream(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Busy => Self::Busy,
            Error::InvalidImage(msg) => Self::BadRequest(msg),
            Error::Provider { status, body } => Self::Provider {
                status,
                details: body,
            },
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, error, details) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            Self::Busy => (StatusCode::CONFLICT, Error::Busy.to_string(), None),
            Self::NotConfigured(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string(), None),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.to_string(), None),
            Self::Provider { status, details } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                "provider request failed".to_string(),
                Some(details),
            ),
            Self::Upstream(details) => (
                StatusCode::BAD_GATEWAY,
                "provider request failed".to_string(),
                Some(details),
            ),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %error, details = ?details, "API error");
        }

        (status, Json(ErrorResponse { error, details })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_crate_errors() {
        assert!(matches!(ApiError::from(Error::Busy), ApiError::Busy));
        assert!(matches!(
            ApiError::from(Error::InvalidImage("empty".into())),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(Error::Provider { status: 401, body: "bad key".into() }),
            ApiError::Provider { status: 401, .. }
        ));
    }

    #[test]
    fn provider_status_passes_through() {
        let response = ApiError::Provider {
            status: 429,
            details: "quota".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = ApiError::Provider {
            status: 42,
            details: String::new(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}

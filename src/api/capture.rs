//! Capture, replay and session endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, header},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::capture::ImageCapture;
use crate::language::LanguageProfile;
use crate::orchestrator::{Outcome, SessionSnapshot};

/// Headroom over the image limit so oversized uploads reach validation
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Build capture router
pub fn router(state: Arc<ApiState>) -> Router {
    let body_limit = state.max_image_bytes.saturating_add(BODY_LIMIT_SLACK);

    Router::new()
        .route(
            "/capture",
            post(capture).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/replay", post(replay))
        .route("/session", get(session))
        .route("/languages", get(languages))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CaptureQuery {
    pub language: Option<String>,
}

/// Capture response
#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub outcome: Outcome,
    pub session: SessionSnapshot,
}

/// Run one image through the pipeline
///
/// The body is the raw image; `Content-Type` carries its MIME type.
async fn capture(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<CaptureQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CaptureResponse>, ApiError> {
    let pipeline = state.pipeline()?;

    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let image = ImageCapture::new(body.to_vec(), mime_type, state.max_image_bytes)?;

    let language = state
        .languages
        .resolve(query.language.as_deref().unwrap_or(&state.default_language));

    let outcome = pipeline.process_image(image, language).await?;
    let session = pipeline.snapshot().await;

    Ok(Json(CaptureResponse { outcome, session }))
}

/// Replay response
#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    pub replayed: bool,
}

async fn replay(State(state): State<Arc<ApiState>>) -> Result<Json<ReplayResponse>, ApiError> {
    let replayed = state.pipeline()?.replay().await?;
    Ok(Json(ReplayResponse { replayed }))
}

async fn session(State(state): State<Arc<ApiState>>) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.pipeline()?.snapshot().await))
}

/// Configured languages
#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub default: String,
    pub languages: Vec<LanguageProfile>,
}

async fn languages(State(state): State<Arc<ApiState>>) -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        default: state.default_language.clone(),
        languages: state.languages.iter().cloned().collect(),
    })
}

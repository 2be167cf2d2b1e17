use crate::{
    errors::AppError,
    identity::MaybeSession,
    models::{VoteDirection, VoteOutcome},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Image payload as a base64 data URI, exactly as a file reader emits it.
    pub image: String,
    pub content_type: Option<String>,
    pub filename: Option<String>,
}

#[derive(Serialize)]
pub struct GenerateResponse {
    pub captions: Vec<String>,
}

/// Handler for POST /api/captions/generate: runs the full pipeline and
/// returns the candidate captions.
pub async fn generate_captions(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
    Json(request): Json<GenerateRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Browser pickers occasionally omit the content type; fall back to a
    // lookup on the filename before the orchestrator's allow-list check.
    let content_type = match request.content_type {
        Some(ct) if !ct.is_empty() => ct,
        _ => request
            .filename
            .as_deref()
            .and_then(|name| mime_guess::from_path(name).first_raw())
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::InvalidInput("missing content type".to_string()))?,
    };

    tracing::debug!(content_type = %content_type, "generating captions via handler");

    let captions = state
        .orchestrator
        .process_image(session.as_ref(), &request.image, &content_type)
        .await?;

    tracing::info!(count = captions.len(), "captions generated via handler");
    Ok(Json(GenerateResponse { captions }))
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub direction: VoteDirection,
}

/// Handler for POST /api/captions/{id}/votes: applies the toggle/change/
/// insert transition for the current user.
pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
    Path(caption_id): Path<String>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<VoteOutcome>, AppError> {
    let user = session.as_ref().map(|s| &s.user);
    let outcome = state
        .recorder
        .vote(user, &caption_id, request.direction)
        .await?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
pub struct MyVoteResponse {
    pub direction: Option<VoteDirection>,
}

/// Handler for GET /api/captions/{id}/votes/me.
pub async fn get_my_vote(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
    Path(caption_id): Path<String>,
) -> Result<Json<MyVoteResponse>, AppError> {
    let user = session.as_ref().map(|s| &s.user);
    let direction = state.recorder.current_vote(user, &caption_id).await?;
    Ok(Json(MyVoteResponse { direction }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedImage {
    pub id: String,
    pub url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub id: String,
    pub content: String,
    pub like_count: i64,
    pub image: FeedImage,
}

#[derive(Serialize)]
pub struct FeedResponse {
    pub captions: Vec<FeedEntry>,
}

/// Handler for GET /api/feed: the link-checked rating feed. An empty list is
/// a normal response ("no captions found" is the client's rendering of it).
pub async fn rating_feed(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
) -> Result<Json<FeedResponse>, AppError> {
    if session.is_none() {
        return Err(AppError::Unauthorized);
    }

    let captions = state
        .feed
        .assemble()
        .await?
        .into_iter()
        .map(|c| FeedEntry {
            id: c.caption_id,
            content: c.content,
            like_count: c.like_count,
            image: FeedImage {
                id: c.image.image_id,
                url: c.image.url,
            },
        })
        .collect();

    Ok(Json(FeedResponse { captions }))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
}

/// Handler for GET /auth/callback: redirect leg of the authorization-code
/// flow. Success hands the token to the client in the URL fragment; any
/// failure bounces back with an error marker instead of surfacing a 5xx.
pub async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let redirect_base = &state.post_auth_redirect;

    if let Some(code) = params.code {
        match state.identity.exchange_code(&code).await {
            Ok(session) => {
                tracing::info!(user_id = %session.user.id, "authorization code exchanged");
                return Redirect::to(&format!(
                    "{}#access_token={}",
                    redirect_base, session.access_token
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "authorization code exchange failed");
            }
        }
    }

    Redirect::to(&format!("{}?error=auth-code-error", redirect_base))
}

/// Handler for POST /auth/sign-out: revokes the session upstream. Signing
/// out while already signed out is a no-op.
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
) -> Result<StatusCode, AppError> {
    if let Some(session) = session {
        state.identity.sign_out(&session.access_token).await?;
        tracing::info!(user_id = %session.user.id, "user signed out");
    }
    Ok(StatusCode::NO_CONTENT)
}

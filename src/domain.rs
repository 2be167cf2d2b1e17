use crate::errors::{AuthError, PipelineError, RepoError};
use crate::models::{CaptionVote, FeedCaption, Session, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A presigned upload slot issued by the pipeline: where to PUT the bytes,
/// and the public URL they will be served from afterwards.
#[derive(Debug, Clone)]
pub struct PresignedUpload {
    pub presigned_url: String,
    pub cdn_url: String,
}

/// One outbound call per pipeline stage. Each method is a single attempt;
/// retry policy lives with the orchestrator.
#[async_trait]
pub trait PipelineGateway: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Ask the pipeline for a presigned upload URL for the given content type.
    async fn presigned_upload_url(
        &self,
        token: &str,
        content_type: &str,
    ) -> Result<PresignedUpload, PipelineError>;

    /// PUT raw image bytes to a presigned URL.
    async fn upload_bytes(
        &self,
        presigned_url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PipelineError>;

    /// Register a now-public image URL; returns the pipeline's image id.
    async fn register_image(&self, token: &str, image_url: &str) -> Result<String, PipelineError>;

    /// One caption-generation attempt. A gateway timeout surfaces as
    /// `CaptionGeneration { status: 504 }` so the caller can retry it.
    async fn request_captions(
        &self,
        token: &str,
        image_id: &str,
    ) -> Result<Vec<serde_json::Value>, PipelineError>;
}

/// Operations on the vote table. All mutations are conditional writes: the
/// store must refuse an insert when a row already exists, and refuse an
/// update/delete when the stored value no longer matches `expected_value`,
/// reporting `RepoError::Conflict` in either case.
#[async_trait]
pub trait VoteStore: Send + Sync + 'static {
    /// The current user's vote on a caption, if any.
    async fn find_vote(
        &self,
        caption_id: &str,
        profile_id: Uuid,
    ) -> Result<Option<CaptionVote>, RepoError>;

    /// Insert a new vote row; fails with `Conflict` if one already exists.
    async fn insert_vote(&self, vote: &CaptionVote) -> Result<(), RepoError>;

    /// Flip an existing vote's value and stamp the modification time.
    async fn update_vote(
        &self,
        caption_id: &str,
        profile_id: Uuid,
        expected_value: i8,
        new_value: i8,
        modified_at: DateTime<Utc>,
    ) -> Result<(), RepoError>;

    /// Remove an existing vote row (toggle-off).
    async fn delete_vote(
        &self,
        caption_id: &str,
        profile_id: Uuid,
        expected_value: i8,
    ) -> Result<(), RepoError>;
}

/// Read surface over the caption and image tables. Rows are created
/// externally (pipeline backend or seeding); this service never writes them.
#[async_trait]
pub trait CaptionStore: Send + Sync + 'static {
    /// Up to `limit` captions that have an image with an http(s) URL,
    /// ordered by like_count descending.
    async fn feed_candidates(&self, limit: usize) -> Result<Vec<FeedCaption>, RepoError>;
}

/// The session/identity boundary: current-user lookup, authorization-code
/// exchange, and sign-out. Everything else about identity is external.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Resolve an access token to its user. `Ok(None)` means the token is
    /// missing, expired, or revoked — not an error.
    async fn user_from_token(&self, access_token: &str) -> Result<Option<User>, AuthError>;

    /// Exchange a redirect-flow authorization code for a session.
    async fn exchange_code(&self, code: &str) -> Result<Session, AuthError>;

    /// Revoke the session behind an access token.
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}

/// Liveness probe for image URLs in the rating feed.
#[async_trait]
pub trait LinkProbe: Send + Sync + 'static {
    /// True when the URL answers a HEAD request with a success status within
    /// the probe's deadline. Errors and timeouts are just `false`.
    async fn is_live(&self, url: &str) -> bool;
}

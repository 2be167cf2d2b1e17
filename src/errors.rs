use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error; // Use thiserror for cleaner error definitions

// --- Domain/Infrastructure Errors ---

/// The four outbound stages of the caption pipeline, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    UploadUrl,
    Upload,
    Registration,
    Captions,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::UploadUrl => "upload URL request",
            PipelineStage::Upload => "image upload",
            PipelineStage::Registration => "image registration",
            PipelineStage::Captions => "caption generation",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error("unsupported image type: {0} (supported: JPEG, PNG, WebP, GIF, HEIC)")]
    UnsupportedContentType(String),

    #[error("not authenticated, please log in")]
    NotAuthenticated,

    #[error("invalid image payload: {0}")]
    InvalidPayload(String),

    #[error("failed to generate upload URL")]
    UploadUrlFailed,

    #[error("invalid response from upload service")]
    UploadUrlMalformed,

    #[error("failed to upload image")]
    UploadFailed,

    #[error("failed to register image")]
    RegistrationFailed,

    #[error("invalid response from pipeline service")]
    RegistrationMalformed,

    #[error("failed to generate captions (status {status})")]
    CaptionGeneration { status: u16 },

    #[error("invalid response from caption service")]
    CaptionsMalformed,

    #[error("no captions found in response")]
    NoCaptions,

    #[error("{0} timed out")]
    Timeout(PipelineStage),

    #[error("failed to reach {0}")]
    Transport(PipelineStage),
}

#[derive(Error, Debug)]
pub enum RepoError {
    /// A conditional write lost a race against a concurrent mutation of the
    /// same (caption, user) pair.
    #[error("conflicting vote write for caption {0}")]
    Conflict(String),

    #[error("stored item is malformed: {0}")]
    DataCorruption(String),

    #[error("database backend error: {0}")]
    BackendError(#[from] anyhow::Error), // Wrap Anyhow errors from DB layer
}

#[derive(Error, Debug)]
pub enum VoteError {
    #[error("you must be logged in to vote")]
    NotLoggedIn,

    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("identity service request failed: {0}")]
    Transport(String),

    #[error("identity service returned status {0}")]
    Service(u16),

    #[error("malformed identity response: {0}")]
    Malformed(String),

    #[error("authorization code exchange failed")]
    CodeExchange,
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not authenticated, please log in")]
    Unauthorized,

    // Domain/Service level errors
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error("Could not read caption data")]
    Repository(#[source] RepoError),
    #[error("Identity service error")]
    Auth(#[source] AuthError),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String), // Keep simple string for now
    #[error("Initialization error: {0}")]
    InitError(String),

    // Generic Internal Server Error
    #[error("Internal server error: {0}")]
    InternalServerError(String), // Catch-all or specific internal issues
}

// --- Conversions from Domain Errors to AppError ---

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        AppError::Repository(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

// Add From impl for ConfigError so Config::load can fail in main with ?
impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // 4xx Client Errors
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Pipeline(e) => {
                let status = match e {
                    PipelineError::UnsupportedContentType(_) | PipelineError::InvalidPayload(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    PipelineError::NotAuthenticated => StatusCode::UNAUTHORIZED,
                    PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    // Upstream failures, malformed upstream responses, empty results
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, e.to_string())
            }
            AppError::Vote(VoteError::NotLoggedIn) => {
                (StatusCode::UNAUTHORIZED, VoteError::NotLoggedIn.to_string())
            }
            AppError::Vote(VoteError::Repo(RepoError::Conflict(_)))
            | AppError::Repository(RepoError::Conflict(_)) => (
                StatusCode::CONFLICT,
                "Vote was changed concurrently, try again".to_string(),
            ),

            // 5xx Server Errors
            AppError::Vote(VoteError::Repo(e)) => {
                tracing::error!(error.source = ?e, "Vote store error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database operation failed".to_string())
            }
            AppError::Repository(e) => {
                tracing::error!(error.source = ?e, "Repository error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database operation failed".to_string())
            }
            AppError::Auth(e) => {
                tracing::error!(error.source = ?e, "Identity service error occurred");
                (StatusCode::BAD_GATEWAY, "Identity service unavailable".to_string())
            }
            AppError::ConfigError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error".to_string())
            }
            AppError::InitError(msg) => {
                tracing::error!("Initialization error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server initialization error".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal server error occurred".to_string())
            }
        };

        // Log the specific error variant and message
        tracing::error!(error.message = %error_message, error.detail = %self, "Responding with error");

        // Build JSON response
        let body = Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}

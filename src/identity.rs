use crate::{
    domain::IdentityProvider,
    errors::AuthError,
    models::{Session, User},
    AppState,
};
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the external identity service: current-user lookup,
/// authorization-code exchange, and sign-out.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpIdentityProvider {
    pub fn new(base_url: String, api_key: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct UserResponse {
    id: Uuid,
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: UserResponse,
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn user_from_token(&self, access_token: &str) -> Result<Option<User>, AuthError> {
        let response = self
            .client
            .get(format!("{}/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // An expired or revoked token is an anonymous caller, not a failure.
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AuthError::Service(status.as_u16()));
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        Ok(Some(User {
            id: user.id,
            email: user.email,
        }))
    }

    async fn exchange_code(&self, code: &str) -> Result<Session, AuthError> {
        let response = self
            .client
            .post(format!(
                "{}/token?grant_type=authorization_code",
                self.base_url
            ))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "auth_code": code }))
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "authorization code exchange rejected");
            return Err(AuthError::CodeExchange);
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        Ok(Session {
            access_token: payload.access_token,
            user: User {
                id: payload.user.id,
                email: payload.user.email,
            },
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(format!("{}/logout", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Service(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Resolves the request's bearer token to an optional session. Never
/// rejects: handlers and the operations behind them decide what a missing
/// session means for them.
pub struct MaybeSession(pub Option<Session>);

impl FromRequestParts<Arc<AppState>> for MaybeSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeSession(None));
        };

        match state.identity.user_from_token(&token).await {
            Ok(Some(user)) => Ok(MaybeSession(Some(Session {
                access_token: token,
                user,
            }))),
            Ok(None) => Ok(MaybeSession(None)),
            Err(e) => {
                tracing::warn!(error = %e, "identity lookup failed, treating request as anonymous");
                Ok(MaybeSession(None))
            }
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
}

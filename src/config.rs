use std::{env, net::SocketAddr, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

#[derive(Clone, Debug)] // Clone needed if passed around, Debug for logging
pub struct Config {
    pub bind_address: SocketAddr,
    /// Base endpoint of the third-party captioning pipeline.
    pub pipeline_base_url: String,
    /// Base endpoint of the identity service (user lookup, code exchange, logout).
    pub auth_base_url: String,
    /// Public API key sent alongside every identity request.
    pub auth_api_key: String,
    /// Where the auth callback sends the browser after a successful exchange.
    pub post_auth_redirect: String,
    // Store region as string for simplicity here, aws_clients can convert
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();

        let bind_address_str = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let pipeline_base_url = env::var("PIPELINE_BASE_URL")
            .unwrap_or_else(|_| "https://api.almostcrackd.ai".to_string());

        let auth_base_url = env::var("AUTH_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("AUTH_BASE_URL".into()))?;

        let auth_api_key = env::var("AUTH_API_KEY")
            .map_err(|_| ConfigError::MissingVar("AUTH_API_KEY".into()))?;

        let post_auth_redirect =
            env::var("POST_AUTH_REDIRECT").unwrap_or_else(|_| "/".to_string());

        let aws_region = env::var("AWS_DEFAULT_REGION")
            .unwrap_or_else(|_| "ca-central-1".to_string());

        // Allow overriding endpoint for localstack/testing
        let localstack_endpoint = env::var("AWS_ENDPOINT_URL").ok(); // Optional

        Ok(Config {
            bind_address,
            pipeline_base_url,
            auth_base_url,
            auth_api_key,
            post_auth_redirect,
            aws_region,
            localstack_endpoint,
        })
    }
}

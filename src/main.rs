use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aws_clients;
mod config;
mod domain;
mod errors;
mod feed;
mod handlers;
mod identity;
mod models;
mod orchestrator;
mod pipeline;
mod repositories;
mod routes;
mod startup;
mod votes;

use crate::config::Config;
use crate::domain::IdentityProvider;
use crate::errors::AppError;
use crate::feed::{RatingFeed, ReqwestLinkProbe};
use crate::identity::HttpIdentityProvider;
use crate::orchestrator::CaptionOrchestrator;
use crate::pipeline::HttpPipelineGateway;
use crate::repositories::{DynamoCaptionStore, DynamoVoteStore};
use crate::votes::VoteRecorder;

/// AppState holds the wired-up services for the web server. Each one carries
/// its own handles; there are no module-level singletons.
pub struct AppState {
    pub orchestrator: CaptionOrchestrator,
    pub recorder: VoteRecorder,
    pub feed: RatingFeed,
    pub identity: Arc<dyn IdentityProvider>,
    pub post_auth_redirect: String,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "meme_captions=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = Config::load()?;

    // --- AWS Client Initialization ---
    tracing::info!("Initializing AWS DynamoDB client...");
    let sdk_config = aws_clients::create_sdk_config(&config).await?;
    let db_client = aws_clients::create_dynamodb_client(&sdk_config);

    // --- Resource Creation (Consider moving to IaC eventually) ---
    startup::init_resources(&db_client).await?;

    // --- Outbound clients ---
    let gateway = Arc::new(
        HttpPipelineGateway::new(config.pipeline_base_url.clone())
            .map_err(|e| AppError::InitError(format!("Failed to build pipeline client: {}", e)))?,
    );
    let identity: Arc<dyn IdentityProvider> = Arc::new(
        HttpIdentityProvider::new(config.auth_base_url.clone(), config.auth_api_key.clone())
            .map_err(|e| AppError::InitError(format!("Failed to build identity client: {}", e)))?,
    );
    let probe = Arc::new(
        ReqwestLinkProbe::new()
            .map_err(|e| AppError::InitError(format!("Failed to build link probe: {}", e)))?,
    );

    // --- Stores ---
    let vote_store = Arc::new(DynamoVoteStore::new(
        db_client.clone(),
        startup::VOTES_TABLE.to_string(),
    ));
    let caption_store = Arc::new(DynamoCaptionStore::new(
        db_client,
        startup::CAPTIONS_TABLE.to_string(),
        startup::IMAGES_TABLE.to_string(),
    ));

    // --- Application State ---
    let state = Arc::new(AppState {
        orchestrator: CaptionOrchestrator::new(gateway),
        recorder: VoteRecorder::new(vote_store),
        feed: RatingFeed::new(caption_store, probe),
        identity,
        post_auth_redirect: config.post_auth_redirect.clone(),
    });

    // --- Router Definition ---
    let app = routes::create_router(state);

    // --- Server Startup ---
    tracing::info!("Server listening on http://{}", config.bind_address);

    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

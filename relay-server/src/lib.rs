//! GraphRAG Relay - WebSocket chat relay grounded in a child knowledge graph.
//!
//! This crate provides the relay service:
//! - Session registry and per-session graph context cache
//! - Prompt schema validation (text prompts and image prompts)
//! - Neo4j graph lookups and Amazon Bedrock generation
//! - Upload helpers and health checks
//!
//! ## Architecture
//!
//! ```text
//! Client ⇄ /ws/graphrag → ConversationController → ContextCache ─miss→ GraphStore (Neo4j)
//!                                    ↓
//!                              ModelProvider (Bedrock) → SessionRegistry → Client
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod cache;
pub mod conversation;
pub mod graph;
pub mod image;
pub mod message;
pub mod provider;
pub mod registry;
pub mod routes;
pub mod schema;
pub mod uploads;

pub use cache::{CacheOutcome, ContextCache};
pub use conversation::{ConversationController, ConversationState, RelayServices, TurnError};
pub use graph::{ChildRecord, GraphError, GraphStore, Neo4jStore};
pub use message::{InboundFrame, ServerMessage, SessionInfo};
pub use provider::{BedrockProvider, GenerationRequest, GenerationResponse, ModelProvider, ProviderError};
pub use registry::{ConnectionHandle, SessionRegistry};
pub use routes::AppState;
pub use schema::{validate_prompt, PromptShape, SchemaError, ValidatedPrompt};

use axum::Router;
use relay_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the relay router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_all_routes(state).layer(cors)
}

/// Wire the production collaborators from configuration.
pub fn build_services(config: &Config) -> anyhow::Result<RelayServices> {
    let graph = Neo4jStore::from_config(config)?;
    let model = BedrockProvider::from_config(config);
    Ok(RelayServices::new(Arc::new(graph), Arc::new(model)))
}

/// Start the relay server and run until Ctrl-C.
pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.bind_address().parse::<std::net::IpAddr>()?,
        config.port(),
    ));

    let services = build_services(&config)?;
    let router = build_router(AppState::new(config, services));

    tracing::info!("Starting GraphRAG relay on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("GraphRAG relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

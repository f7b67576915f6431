//! Per-connection conversation loop.
//!
//! A connection starts in [`ConversationState::AwaitingSessionInfo`]. The
//! first frame must identify the session and child; anything else is answered
//! with an error and the connection is closed. Once bound, every frame is a
//! prompt, processed strictly in order: validate, resolve context (cached per
//! session), decode any attached image, ask the model, reply. Failures in a
//! turn are reported to the client and the session stays open.

use crate::cache::{CacheOutcome, ContextCache};
use crate::graph::{self, GraphError, GraphStore};
use crate::image::{decode_image, ImageError};
use crate::message::{InboundFrame, ServerMessage, SessionInfo, INTERNAL_SERVER_ERROR, INVALID_SESSION_INFO};
use crate::provider::{GenerationRequest, ModelProvider, ProviderError};
use crate::registry::{ConnectionHandle, SessionRegistry};
use crate::schema::{validate_prompt, SchemaError};
use futures_util::{FutureExt, Stream, StreamExt};
use relay_common::logging::truncate_for_log;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Shared collaborators and session state used by every connection.
#[derive(Clone)]
pub struct RelayServices {
    pub registry: Arc<SessionRegistry>,
    pub cache: Arc<ContextCache>,
    pub graph: Arc<dyn GraphStore>,
    pub model: Arc<dyn ModelProvider>,
}

impl RelayServices {
    pub fn new(graph: Arc<dyn GraphStore>, model: Arc<dyn ModelProvider>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            cache: Arc::new(ContextCache::new()),
            graph,
            model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    AwaitingSessionInfo,
    Bound(SessionInfo),
    Closed,
}

/// Why a single turn failed.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Invalid message format: {0}")]
    Malformed(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("No prompt provided")]
    EmptyPrompt,

    #[error("graph lookup failed: {0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("model invocation failed: {0}")]
    Model(#[from] ProviderError),
}

impl TurnError {
    /// Classify the failure as a client mistake or a collaborator fault.
    pub fn to_common(&self) -> relay_common::Error {
        match self {
            Self::Graph(_) | Self::Model(_) => relay_common::Error::External(self.to_string()),
            other => relay_common::Error::InvalidInput(other.to_string()),
        }
    }

    /// Text sent to the client. Collaborator details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::Graph(_) => "Error retrieving graph context.".to_string(),
            Self::Model(_) => "Error generating response from Bedrock.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Drives one client connection through its states.
pub struct ConversationController {
    services: RelayServices,
    handle: ConnectionHandle,
    state: ConversationState,
}

impl ConversationController {
    pub fn new(services: RelayServices, handle: ConnectionHandle) -> Self {
        Self {
            services,
            handle,
            state: ConversationState::AwaitingSessionInfo,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Consume inbound frames until the client leaves or the handshake fails.
    pub async fn run<S>(mut self, mut inbound: S) -> ConversationState
    where
        S: Stream<Item = InboundFrame> + Unpin,
    {
        while let Some(frame) = inbound.next().await {
            let bound = match &self.state {
                ConversationState::AwaitingSessionInfo => None,
                ConversationState::Bound(session) => Some(session.clone()),
                ConversationState::Closed => break,
            };

            match (bound, frame) {
                (_, InboundFrame::Close) => break,
                (None, frame) => self.handshake(frame),
                (Some(session), InboundFrame::Text(text)) => {
                    self.handle_prompt(&session, &text).await;
                }
                (Some(session), InboundFrame::Binary) => {
                    self.services.registry.send(
                        &session.session_id,
                        ServerMessage::error("Invalid message format: expected a JSON text frame"),
                    );
                }
            }

            if self.state == ConversationState::Closed {
                break;
            }
        }

        self.close();
        self.state
    }

    fn handshake(&mut self, frame: InboundFrame) {
        let parsed = match frame {
            InboundFrame::Text(text) => SessionInfo::parse(&text),
            _ => Err("expected a JSON text frame".to_string()),
        };

        let session = match parsed {
            Ok(session) => session,
            Err(reason) => {
                tracing::warn!(
                    connection_id = %self.handle.id(),
                    reason = %reason,
                    "Rejected session info"
                );
                self.handle.send(ServerMessage::error(INVALID_SESSION_INFO));
                self.state = ConversationState::Closed;
                return;
            }
        };

        let services = &self.services;
        if let Some(previous) = services.registry.register(&session.session_id, self.handle.clone()) {
            if previous.id() != self.handle.id() {
                // The new binding may concern a different child.
                services.cache.remove(&session.session_id);
            }
        }

        tracing::info!(
            session_id = %session.session_id,
            child_id = %session.child_id,
            "Session bound"
        );
        services.registry.send(
            &session.session_id,
            ServerMessage::info(format!("Session {} connected", session.session_id)),
        );
        self.state = ConversationState::Bound(session);
    }

    async fn handle_prompt(&self, session: &SessionInfo, text: &str) {
        let turn = AssertUnwindSafe(self.process_turn(session, text))
            .catch_unwind()
            .await;

        let reply = match turn {
            Ok(Ok(response)) => ServerMessage::response(response),
            Ok(Err(err)) => {
                let common = err.to_common();
                if common.is_external() {
                    tracing::warn!(
                        session_id = %session.session_id,
                        child_id = %session.child_id,
                        error = %err,
                        status = common.status_code(),
                        "Turn failed"
                    );
                } else {
                    tracing::info!(
                        session_id = %session.session_id,
                        error = %err,
                        "Rejected prompt"
                    );
                }
                ServerMessage::error(err.client_message())
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(
                    session_id = %session.session_id,
                    detail = %detail,
                    "Unexpected failure while processing prompt"
                );
                ServerMessage::error(INTERNAL_SERVER_ERROR)
            }
        };

        self.services.registry.send(&session.session_id, reply);
    }

    async fn process_turn(&self, session: &SessionInfo, text: &str) -> Result<String, TurnError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| TurnError::Malformed(e.to_string()))?;
        let prompt = validate_prompt(&value)?;
        if prompt.prompt().is_empty() {
            return Err(TurnError::EmptyPrompt);
        }

        tracing::info!(
            session_id = %session.session_id,
            shape = %prompt.shape(),
            prompt = %truncate_for_log(prompt.prompt(), 80),
            "Prompt received"
        );

        let context = self.resolve_context(session).await?;

        let mut request = GenerationRequest::text(context, prompt.prompt());
        if let Some(data) = prompt.image_data() {
            request = request.with_image(decode_image(data)?);
        }

        let response = self.services.model.generate(request).await?;
        tracing::info!(
            session_id = %session.session_id,
            model = %response.model,
            latency_ms = response.latency_ms,
            output_tokens = response.usage.output_tokens,
            "Response generated"
        );
        Ok(response.content)
    }

    async fn resolve_context(&self, session: &SessionInfo) -> Result<String, GraphError> {
        let services = &self.services;
        if let Some(context) = services.cache.get(&session.session_id) {
            tracing::debug!(session_id = %session.session_id, "Context cache hit");
            return Ok(context);
        }

        let context = graph::child_context(services.graph.as_ref(), &session.child_id).await?;
        match services.cache.set(
            &session.session_id,
            self.handle.id(),
            context.clone(),
            &services.registry,
        ) {
            CacheOutcome::NotLive { .. } => {
                tracing::debug!(session_id = %session.session_id, "Session gone, context not cached");
            }
            CacheOutcome::Superseded => {
                tracing::debug!(session_id = %session.session_id, "Session rebound, context not cached");
            }
            CacheOutcome::Stored | CacheOutcome::AlreadyCached => {}
        }
        Ok(context)
    }

    fn close(&mut self) {
        if let ConversationState::Bound(ref session) = self.state {
            if self
                .services
                .registry
                .release(&session.session_id, self.handle.id())
            {
                self.services.cache.remove(&session.session_id);
            }
        }
        tracing::debug!(connection_id = %self.handle.id(), "Conversation closed");
        self.state = ConversationState::Closed;
    }
}

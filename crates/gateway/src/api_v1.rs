//! HTTP API v1 — conversation management and chat turns.
//!
//! Endpoints:
//!
//! - `GET    /v1/conversations`                   — List conversations
//! - `POST   /v1/conversations`                   — Create a conversation
//! - `GET    /v1/conversations/{id}`              — Get a conversation with its messages
//! - `DELETE /v1/conversations/{id}`              — Delete a conversation
//! - `POST   /v1/conversations/{id}/messages`     — Send a message, get the reply
//! - `POST   /v1/conversations/{id}/messages/stream` — Send a message, get SSE stream

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use taconite_chat::{FragmentObserver, ReplyMode, ReplyStreamEvent, ResponseAssembler, SessionTurns, TurnGuard};
use taconite_core::error::{GatewayError, RegistryError};
use taconite_core::inference::InferenceRequest;
use taconite_core::message::{Message, Role};
use taconite_core::registry::{SessionRegistry, SessionSpec, SessionSummary};
use taconite_core::session::{SessionId, default_session_name};

/// System prompt for conversations created over the API without one.
pub const DEFAULT_API_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

// ── State ─────────────────────────────────────────────────────────────────

/// Settings applied to conversations created without explicit values.
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub model: String,
    pub max_tokens: usize,
}

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub registry: RwLock<SessionRegistry>,
    pub turns: SessionTurns,
    pub assembler: ResponseAssembler,
    pub defaults: SessionDefaults,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

pub type SharedApiState = Arc<ApiV1State>;

impl ApiV1State {
    pub fn new(
        registry: SessionRegistry,
        assembler: ResponseAssembler,
        defaults: SessionDefaults,
    ) -> Self {
        Self {
            registry: RwLock::new(registry),
            turns: SessionTurns::new(),
            assembler,
            defaults,
            start_time: chrono::Utc::now(),
        }
    }
}

/// Build the v1 API router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route(
            "/conversations",
            get(list_conversations_handler).post(create_conversation_handler),
        )
        .route(
            "/conversations/{id}",
            get(get_conversation_handler).delete(delete_conversation_handler),
        )
        .route("/conversations/{id}/messages", post(send_message_handler))
        .route(
            "/conversations/{id}/messages/stream",
            post(send_message_stream_handler),
        )
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct CreateConversationRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<usize>,
}

#[derive(Serialize, Deserialize)]
struct ConversationListResponse {
    conversations: Vec<SessionSummary>,
    count: usize,
}

#[derive(Serialize, Deserialize)]
struct CreateConversationResponse {
    status: String,
    conversation: SessionSummary,
}

#[derive(Serialize, Deserialize)]
struct ConversationDetailResponse {
    conversation: SessionSummary,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    content: String,
}

#[derive(Serialize, Deserialize)]
struct SendMessageResponse {
    reply: String,
    conversation: SessionSummary,
}

#[derive(Serialize, Deserialize)]
struct DeleteConversationResponse {
    status: String,
    id: SessionId,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            hint: None,
        }),
    )
}

fn registry_error(err: RegistryError) -> ApiError {
    let status = match err {
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::DuplicateSession(_) | RegistryError::CannotDeleteCurrent(_) => {
            StatusCode::CONFLICT
        }
    };
    api_error(status, err.to_string())
}

fn gateway_error(err: GatewayError) -> ApiError {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            error: err.to_string(),
            hint: err.troubleshooting_hint().map(String::from),
        }),
    )
}

fn busy(id: &SessionId) -> ApiError {
    api_error(
        StatusCode::CONFLICT,
        format!("Conversation {id} is already processing a message"),
    )
}

fn summary_of(registry: &SessionRegistry, id: &SessionId) -> Result<SessionSummary, ApiError> {
    let transcript = registry
        .get(id)
        .ok_or_else(|| registry_error(RegistryError::NotFound(id.clone())))?;
    Ok(SessionSummary {
        meta: transcript.meta(),
        current: registry.current_id() == id,
    })
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn list_conversations_handler(
    State(state): State<SharedApiState>,
) -> Json<ConversationListResponse> {
    let conversations = state.registry.read().await.list();
    Json(ConversationListResponse {
        count: conversations.len(),
        conversations,
    })
}

async fn create_conversation_handler(
    State(state): State<SharedApiState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateConversationResponse>), ApiError> {
    // An empty body means "all defaults"
    let payload: CreateConversationRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateConversationRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid request: {e}")))?
    };

    let max_tokens = payload.max_tokens.unwrap_or(state.defaults.max_tokens);
    if max_tokens == 0 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "max_tokens must be greater than 0",
        ));
    }

    let spec = SessionSpec::new(
        SessionId::generate(),
        payload
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_session_name(chrono::Local::now())),
        payload
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| state.defaults.model.clone()),
        payload
            .system_prompt
            .unwrap_or_else(|| DEFAULT_API_SYSTEM_PROMPT.to_string()),
        max_tokens,
    );
    let id = spec.id.clone();

    let mut registry = state.registry.write().await;
    registry.create(spec).map_err(registry_error)?;
    let conversation = summary_of(&registry, &id)?;
    drop(registry);

    info!(conversation = %id, "Conversation created");

    Ok((
        StatusCode::CREATED,
        Json(CreateConversationResponse {
            status: "created".into(),
            conversation,
        }),
    ))
}

async fn get_conversation_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let id = SessionId::from(id);
    let registry = state.registry.read().await;
    let conversation = summary_of(&registry, &id)?;
    let messages = registry
        .get(&id)
        .map(|t| t.messages().to_vec())
        .unwrap_or_default();

    Ok(Json(ConversationDetailResponse {
        conversation,
        messages,
    }))
}

async fn delete_conversation_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteConversationResponse>, ApiError> {
    let id = SessionId::from(id);
    let guard = state.turns.try_begin(&id).ok_or_else(|| busy(&id))?;

    let result = state.registry.write().await.delete(&id);
    drop(guard);
    // A failed delete leaves the session live, so its lock entry must stay.
    if result.is_ok() {
        state.turns.forget(&id);
    }

    result.map_err(registry_error)?;
    info!(conversation = %id, "Conversation deleted");

    Ok(Json(DeleteConversationResponse {
        status: "deleted".into(),
        id,
    }))
}

/// Claim the session's turn and append the user message.
///
/// Returns the turn guard and the inference request built from the
/// transcript including the new message.
async fn begin_turn(
    state: &ApiV1State,
    id: &SessionId,
    content: &str,
) -> Result<(TurnGuard, InferenceRequest), ApiError> {
    if content.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "content must not be empty"));
    }

    if !state.registry.read().await.contains(id) {
        return Err(registry_error(RegistryError::NotFound(id.clone())));
    }

    let guard = state.turns.try_begin(id).ok_or_else(|| busy(id))?;

    let mut registry = state.registry.write().await;
    let Some(transcript) = registry.get_mut(id) else {
        // Deleted between the check and the claim.
        drop(registry);
        drop(guard);
        state.turns.forget(id);
        return Err(registry_error(RegistryError::NotFound(id.clone())));
    };
    transcript.append(Role::User, content);
    let request = InferenceRequest::for_transcript(transcript);

    Ok((guard, request))
}

/// Append the assistant reply and summarize the conversation.
async fn commit_turn(
    state: &ApiV1State,
    id: &SessionId,
    reply: &str,
) -> Result<SessionSummary, ApiError> {
    let mut registry = state.registry.write().await;
    let transcript = registry
        .get_mut(id)
        .ok_or_else(|| registry_error(RegistryError::NotFound(id.clone())))?;
    transcript.append(Role::Assistant, reply);
    summary_of(&registry, id)
}

async fn send_message_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let id = SessionId::from(id);
    info!(conversation = %id, "v1/messages request");

    let (guard, request) = begin_turn(&state, &id, &payload.content).await?;

    let reply = match state.assembler.acquire(request, ReplyMode::Batch).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(conversation = %id, error = %e, "Inference failed");
            return Err(gateway_error(e));
        }
    };

    let conversation = commit_turn(&state, &id, &reply).await?;
    drop(guard);

    Ok(Json(SendMessageResponse {
        reply,
        conversation,
    }))
}

/// Forwards fragments into the SSE channel as `chunk` events.
struct ChunkForwarder {
    tx: mpsc::UnboundedSender<ReplyStreamEvent>,
}

impl FragmentObserver for ChunkForwarder {
    fn on_fragment(&self, text: &str) {
        // A closed channel means the client went away; the turn still commits
        let _ = self.tx.send(ReplyStreamEvent::Chunk {
            content: text.to_string(),
        });
    }
}

async fn send_message_stream_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let id = SessionId::from(id);
    info!(conversation = %id, "v1/messages/stream SSE request");

    let (guard, request) = begin_turn(&state, &id, &payload.content).await?;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let _guard = guard;
        let forwarder = ChunkForwarder { tx: tx.clone() };

        let event = match state
            .assembler
            .acquire_observed(request, ReplyMode::Stream, &forwarder)
            .await
        {
            Ok(reply) => match commit_turn(&state, &id, &reply).await {
                Ok(conversation) => ReplyStreamEvent::Done {
                    conversation_id: id.to_string(),
                    reply,
                    token_count: conversation.meta.token_count,
                    message_count: conversation.meta.message_count,
                },
                Err((_, Json(err))) => ReplyStreamEvent::Error { message: err.error },
            },
            Err(e) => {
                warn!(conversation = %id, error = %e, "Streaming inference failed");
                ReplyStreamEvent::Error {
                    message: e.to_string(),
                }
            }
        };

        let _ = tx.send(event);
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        let event_type = event.event_type().to_string();
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event_type).data(data))
    });

    Ok(Sse::new(stream))
}

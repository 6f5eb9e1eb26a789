//! End-to-end integration tests for Taconite.
//!
//! These tests exercise the full pipeline from operator input to committed
//! transcript: token budgeting and eviction, batch and streamed replies,
//! persistence through the file store, and the REST API on top of it all.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use taconite_chat::{FragmentObserver, ReplyMode, ResponseAssembler};
use taconite_core::error::{GatewayError, RegistryError};
use taconite_core::estimator::CharRatioEstimator;
use taconite_core::export::{ConversationStore, SavedConversation, SessionConfig};
use taconite_core::inference::{Fragment, FragmentStream, InferenceGateway, InferenceRequest};
use taconite_core::message::Role;
use taconite_core::registry::{SessionRegistry, SessionSpec};
use taconite_core::session::{DEFAULT_SESSION_NAME, SessionId};
use taconite_core::transcript::{EvictionNotice, EvictionObserver};
use taconite_gateway::{ApiV1State, SessionDefaults, build_router};
use taconite_store::FileStore;

// ── Mock Gateway ─────────────────────────────────────────────────────────

/// A gateway that replies from a script and records every request.
/// Streamed replies are split on spaces, one fragment per word.
struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<String, GatewayError>>>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedGateway {
    fn new(replies: Vec<Result<String, GatewayError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn texts(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    fn next(&self, request: InferenceRequest) -> Result<String, GatewayError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedGateway exhausted")
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> InferenceRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait::async_trait]
impl InferenceGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn send_batch(&self, request: InferenceRequest) -> Result<String, GatewayError> {
        self.next(request)
    }

    async fn send_stream(&self, request: InferenceRequest) -> Result<FragmentStream, GatewayError> {
        let reply = self.next(request)?;
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            let words: Vec<&str> = reply.split_inclusive(' ').collect();
            for word in words {
                if tx.send(Ok(Fragment::new(word, false))).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(Ok(Fragment::new("", true))).await;
        });
        Ok(rx)
    }
}

// ── Observers ────────────────────────────────────────────────────────────

#[derive(Default)]
struct EvictionLog(Mutex<Vec<EvictionNotice>>);

impl EvictionObserver for EvictionLog {
    fn on_evicted(&self, notice: &EvictionNotice) {
        self.0.lock().unwrap().push(notice.clone());
    }
}

#[derive(Default)]
struct FragmentLog(Mutex<Vec<String>>);

impl FragmentObserver for FragmentLog {
    fn on_fragment(&self, text: &str) {
        self.0.lock().unwrap().push(text.to_string());
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

const SYSTEM_PROMPT: &str = "You are Taconite."; // 4 tokens

fn registry(max_tokens: usize, observer: Option<Arc<dyn EvictionObserver>>) -> SessionRegistry {
    SessionRegistry::new(
        SessionSpec::new(
            SessionId::default_session(),
            DEFAULT_SESSION_NAME,
            "llama3.1:8b",
            SYSTEM_PROMPT,
            max_tokens,
        ),
        Arc::new(CharRatioEstimator::default()),
        observer,
    )
}

/// A 40-byte (10-token) message tagged with `label`.
fn padded(label: &str) -> String {
    format!("{label:-<40}")
}

// ── Bounded context ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_long_conversation_stays_within_floor_and_keeps_system_prompt() {
    let replies: Vec<String> = (1..=3).map(|n| padded(&format!("a{n}"))).collect();
    let gateway = ScriptedGateway::texts(&replies.iter().map(String::as_str).collect::<Vec<_>>());
    let log = Arc::new(EvictionLog::default());
    let mut registry = registry(20, Some(log.clone()));
    let assembler = ResponseAssembler::new(gateway.clone());

    for n in 1..=3 {
        assembler
            .respond(registry.current_mut(), &padded(&format!("u{n}")), ReplyMode::Batch)
            .await
            .unwrap();
    }

    let current = registry.current();
    let roles: Vec<Role> = current.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    assert_eq!(current.messages()[0].content, SYSTEM_PROMPT);
    assert!(current.messages()[1].content.starts_with("u3"));
    assert!(current.messages()[2].content.starts_with("a3"));
    // The floor leaves the transcript over budget rather than dropping the last exchange.
    assert_eq!(current.token_count(), 24);

    let evicted: Vec<(Role, String)> = log
        .0
        .lock()
        .unwrap()
        .iter()
        .map(|n| (n.removed_role, n.content_preview[..2].to_string()))
        .collect();
    assert_eq!(
        evicted,
        vec![
            (Role::User, "u1".to_string()),
            (Role::Assistant, "a1".to_string()),
            (Role::User, "u2".to_string()),
            (Role::Assistant, "a2".to_string()),
        ]
    );

    // The third request was taken after u2 was evicted to make room for u3.
    let third = gateway.request(2);
    let sent: Vec<Role> = third.messages.iter().map(|m| m.role).collect();
    assert_eq!(sent, vec![Role::System, Role::Assistant, Role::User]);
}

#[tokio::test]
async fn e2e_failed_turn_keeps_user_message_and_next_turn_resends_it() {
    let gateway = ScriptedGateway::new(vec![
        Err(GatewayError::ConnectionRefused("localhost:11434".into())),
        Ok("Back online.".into()),
    ]);
    let mut registry = registry(4000, None);
    let assembler = ResponseAssembler::new(gateway.clone());

    let err = assembler
        .respond(registry.current_mut(), "first try", ReplyMode::Batch)
        .await
        .unwrap_err();
    assert!(err.troubleshooting_hint().is_some());
    assert_eq!(registry.current().len(), 2);

    assembler
        .respond(registry.current_mut(), "second try", ReplyMode::Batch)
        .await
        .unwrap();

    let second = gateway.request(1);
    let contents: Vec<&str> = second.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec![SYSTEM_PROMPT, "first try", "second try"]);
}

// ── Streaming ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_streamed_reply_is_observed_in_order_and_committed_whole() {
    let gateway = ScriptedGateway::texts(&["Rust has no garbage collector."]);
    let fragments = Arc::new(FragmentLog::default());
    let mut registry = registry(4000, None);
    let assembler = ResponseAssembler::new(gateway).with_observer(fragments.clone());

    let reply = assembler
        .respond(registry.current_mut(), "Does Rust have a GC?", ReplyMode::Stream)
        .await
        .unwrap();

    assert_eq!(reply, "Rust has no garbage collector.");
    assert_eq!(
        *fragments.0.lock().unwrap(),
        vec!["Rust ", "has ", "no ", "garbage ", "collector."]
    );
    assert_eq!(registry.current().messages()[2].content, reply);
}

// ── Persistence ──────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_save_to_disk_restore_and_continue() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    let gateway = ScriptedGateway::texts(&["Lisbon.", "About 550,000."]);
    let assembler = ResponseAssembler::new(gateway.clone());

    let mut original = registry(4000, None);
    assembler
        .respond(original.current_mut(), "Capital of Portugal?", ReplyMode::Batch)
        .await
        .unwrap();

    let saved = SavedConversation::from_transcript(
        original.current(),
        SessionConfig {
            model: String::new(),
            system_prompt: SYSTEM_PROMPT.into(),
            max_tokens: 0,
            stream_mode: false,
        },
    );
    store.save("portugal", &saved).unwrap();
    assert!(dir.path().join("portugal.json").exists());

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].meta.as_ref().unwrap().message_count, 3);

    // A fresh process: new registry, conversation loaded from disk.
    let mut restored = registry(4000, None);
    let loaded = store.load("portugal.json").unwrap();
    assert_eq!(loaded.config.max_tokens, 4000);
    assert!(matches!(
        restored.restore(loaded),
        Err(RegistryError::DuplicateSession(_))
    ));
    assert_eq!(restored.session_count(), 1);

    let mut loaded = store.load("portugal").unwrap();
    loaded.meta.id = SessionId::from("conv_restored");
    restored.restore(loaded).unwrap();
    restored.switch_current(&SessionId::from("conv_restored")).unwrap();
    assert_eq!(
        restored.current().created_at(),
        original.current().created_at()
    );

    assembler
        .respond(restored.current_mut(), "Population?", ReplyMode::Batch)
        .await
        .unwrap();

    let request = gateway.request(1);
    let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![SYSTEM_PROMPT, "Capital of Portugal?", "Lisbon.", "Population?"]
    );
    assert_eq!(restored.current().len(), 5);
}

// ── REST API ─────────────────────────────────────────────────────────────

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn e2e_api_create_chat_and_inspect() {
    let gateway = ScriptedGateway::texts(&["Hi! How can I help?"]);
    let state = Arc::new(ApiV1State::new(
        registry(4000, None),
        ResponseAssembler::new(gateway.clone()),
        SessionDefaults {
            model: "llama3.1:8b".into(),
            max_tokens: 4000,
        },
    ));
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(post_json("/v1/conversations", serde_json::json!({"name": "Support"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["conversation"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["conversation"]["name"], "Support");

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/v1/conversations/{id}/messages"),
            serde_json::json!({"content": "hello"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reply = body_json(response).await;
    assert_eq!(reply["reply"], "Hi! How can I help?");
    assert_eq!(reply["conversation"]["message_count"], 3);

    // The new conversation got the API's default system prompt.
    let first = gateway.request(0);
    assert_eq!(first.messages[0].role, Role::System);
    assert_eq!(first.messages[0].content, "You are a helpful assistant.");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/conversations/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body_json(response).await;
    let messages = detail["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["content"], "hello");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/conversations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let list = body_json(response).await;
    assert_eq!(list["count"], 2);
    assert_eq!(gateway.calls(), 1);
}

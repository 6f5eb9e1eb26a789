//! The interactive chat loop.
//!
//! `ChatSession` owns the registry and dispatches each input line either to a
//! [`ChatCommand`] handler or to the assembler as a chat turn.

pub mod command;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use taconite_chat::{ReplyMode, ResponseAssembler};
use taconite_core::export::{ConversationStore, SavedConversation, SessionConfig};
use taconite_core::message::Role;
use taconite_core::registry::{SessionRegistry, SessionSpec};
use taconite_core::session::{SessionId, default_session_name};
use taconite_store::normalize_name;

use crate::render::TerminalRenderer;
pub use command::{ChatCommand, Input};

/// Whether the loop keeps reading after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct ChatSession {
    registry: SessionRegistry,
    assembler: ResponseAssembler,
    store: Arc<dyn ConversationStore>,
    renderer: Arc<TerminalRenderer>,
    /// Model, prompt and budget for sessions opened with `new`.
    defaults: SessionConfig,
    mode: ReplyMode,
}

impl ChatSession {
    pub fn new(
        registry: SessionRegistry,
        assembler: ResponseAssembler,
        store: Arc<dyn ConversationStore>,
        renderer: Arc<TerminalRenderer>,
        defaults: SessionConfig,
    ) -> Self {
        let mode = ReplyMode::from_stream_flag(defaults.stream_mode);
        Self {
            registry,
            assembler,
            store,
            renderer,
            defaults,
            mode,
        }
    }

    pub fn mode(&self) -> ReplyMode {
        self.mode
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Drive the loop until `quit` or end of input.
    pub async fn run(
        &mut self,
        mut lines: mpsc::Receiver<std::io::Result<String>>,
    ) -> std::io::Result<()> {
        self.renderer.welcome(self.registry.current().model(), self.mode);

        loop {
            self.renderer.prompt();
            let Some(line) = lines.recv().await else {
                // EOF (Ctrl+D)
                self.farewell();
                break;
            };
            if self.handle_line(&line?).await == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    pub async fn handle_line(&mut self, line: &str) -> Flow {
        match Input::parse(line) {
            Input::Blank => Flow::Continue,
            Input::Usage(usage) => {
                self.renderer.error(format!("Usage: {usage}"));
                Flow::Continue
            }
            Input::Message(text) => {
                self.chat(&text).await;
                Flow::Continue
            }
            Input::Command(command) => self.execute(command),
        }
    }

    async fn chat(&mut self, text: &str) {
        let streaming = self.mode.is_stream();
        if streaming {
            self.renderer.assistant_prefix();
        }

        let transcript = self.registry.current_mut();
        let result = self.assembler.respond(transcript, text, self.mode).await;

        match result {
            Ok(reply) if streaming => {
                debug!(chars = reply.len(), "Streamed reply finished");
                self.renderer.end_stream();
            }
            Ok(reply) => self.renderer.reply(&reply),
            Err(e) => {
                if streaming {
                    self.renderer.end_stream();
                }
                self.renderer.gateway_error(&e);
            }
        }
    }

    fn execute(&mut self, command: ChatCommand) -> Flow {
        debug!(?command, "Chat command");
        match command {
            ChatCommand::Help => self.renderer.welcome(self.registry.current().model(), self.mode),
            ChatCommand::Quit => {
                self.farewell();
                return Flow::Quit;
            }
            ChatCommand::New(name) => self.open_session(name),
            ChatCommand::List => {
                self.renderer.session_list(&self.registry.list());
                match self.store.list() {
                    Ok(entries) => self.renderer.saved_list(&entries),
                    Err(e) => self.renderer.error(format!("Could not list saved conversations: {e}")),
                }
            }
            ChatCommand::Switch(id) => {
                let id = SessionId::from(id);
                match self.registry.switch_current(&id) {
                    Ok(()) => self.renderer.success(format!(
                        "✓ Switched to conversation: {}",
                        self.registry.current().name()
                    )),
                    Err(e) => self.renderer.error(e.to_string()),
                }
            }
            ChatCommand::Delete(id) => match self.registry.delete(&SessionId::from(id)) {
                Ok(removed) => self
                    .renderer
                    .success(format!("🗑️ Deleted conversation: {}", removed.name())),
                Err(e) => self.renderer.error(e.to_string()),
            },
            ChatCommand::Clear => {
                self.registry.current_mut().clear();
                self.renderer.success("🧹 Conversation history cleared");
            }
            ChatCommand::Debug => self.renderer.debug(self.registry.current()),
            ChatCommand::Stats => self.renderer.stats(&self.registry.current().stats()),
            ChatCommand::Model => self
                .renderer
                .system(format!("🤖 Current model: {}", self.registry.current().model())),
            ChatCommand::Save(name) => self.save(&name),
            ChatCommand::Load(name) => self.load(&name),
            ChatCommand::Stream => {
                self.mode = self.mode.toggled();
                match self.mode {
                    ReplyMode::Stream => self.renderer.success("✨ Streaming mode enabled"),
                    ReplyMode::Batch => self.renderer.success("📦 Batch mode enabled"),
                }
            }
        }
        Flow::Continue
    }

    fn farewell(&self) {
        self.renderer.system("👋 Goodbye!");
        self.renderer.stats(&self.registry.current().stats());
    }

    fn open_session(&mut self, name: Option<String>) {
        let id = SessionId::generate();
        let name = name.unwrap_or_else(|| default_session_name(chrono::Local::now()));
        let spec = SessionSpec::new(
            id.clone(),
            name,
            self.defaults.model.clone(),
            self.defaults.system_prompt.clone(),
            self.defaults.max_tokens,
        );

        if let Err(e) = self.registry.create(spec) {
            self.renderer.error(e.to_string());
            return;
        }
        match self.registry.switch_current(&id) {
            Ok(()) => self.renderer.success(format!(
                "✓ Created new conversation: {} ({id})",
                self.registry.current().name()
            )),
            Err(e) => self.renderer.error(e.to_string()),
        }
    }

    fn save(&self, name: &str) {
        let transcript = self.registry.current();
        // The prompt the transcript opened with, if it still leads.
        let system_prompt = transcript
            .messages()
            .first()
            .filter(|m| m.role == Role::System)
            .map_or_else(|| self.defaults.system_prompt.clone(), |m| m.content.clone());
        let saved = SavedConversation::from_transcript(
            transcript,
            SessionConfig {
                model: transcript.model().to_string(),
                system_prompt,
                max_tokens: transcript.max_tokens(),
                stream_mode: self.mode.is_stream(),
            },
        );

        match self.store.save(name, &saved) {
            Ok(()) => {
                let stem = normalize_name(name).unwrap_or(name);
                info!(session = %transcript.id(), name = stem, "Conversation saved");
                self.renderer.success(format!("💾 Saved as: {stem}.json"));
            }
            Err(e) => self.renderer.error(format!("Could not save: {e}")),
        }
    }

    fn load(&mut self, name: &str) {
        let mut saved = match self.store.load(name) {
            Ok(saved) => saved,
            Err(e) => {
                self.renderer.error(format!("Could not load: {e}"));
                return;
            }
        };

        // Loading the same file twice, or a save of a live session, must not
        // collide with an open session.
        if self.registry.contains(&saved.meta.id) {
            let fresh = SessionId::generate();
            debug!(old = %saved.meta.id, new = %fresh, "Saved id in use, assigning a new one");
            saved.meta.id = fresh;
        }

        let id = saved.meta.id.clone();
        if let Err(e) = self.registry.restore(saved) {
            self.renderer.error(e.to_string());
            return;
        }
        match self.registry.switch_current(&id) {
            Ok(()) => {
                let current = self.registry.current();
                self.renderer.success(format!(
                    "📂 Loaded conversation: {} ({} messages)",
                    current.name(),
                    current.len()
                ));
            }
            Err(e) => self.renderer.error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::{SharedBuffer, captured};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use taconite_core::error::GatewayError;
    use taconite_core::estimator::CharRatioEstimator;
    use taconite_core::inference::{InferenceGateway, InferenceRequest};
    use taconite_core::export::ConversationMeta;
    use taconite_core::message::Message;
    use taconite_core::session::DEFAULT_SESSION_NAME;
    use taconite_store::InMemoryStore;

    /// Replies from a queue, recording every request.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, GatewayError>>>,
        requests: Mutex<Vec<InferenceRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, GatewayError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl InferenceGateway for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send_batch(&self, request: InferenceRequest) -> Result<String, GatewayError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("(no more replies)".into()))
        }
    }

    fn defaults(stream_mode: bool) -> SessionConfig {
        SessionConfig {
            model: "llama3.1:8b".into(),
            system_prompt: "You are Taconite.".into(),
            max_tokens: 4000,
            stream_mode,
        }
    }

    fn session_with(
        gateway: Arc<Scripted>,
        stream_mode: bool,
    ) -> (ChatSession, SharedBuffer, Arc<InMemoryStore>) {
        let (renderer, buf) = captured();
        let renderer = Arc::new(renderer);
        let config = defaults(stream_mode);
        let registry = SessionRegistry::new(
            SessionSpec::new(
                SessionId::default_session(),
                DEFAULT_SESSION_NAME,
                config.model.clone(),
                config.system_prompt.clone(),
                config.max_tokens,
            ),
            Arc::new(CharRatioEstimator::default()),
            Some(renderer.clone()),
        );
        let assembler = ResponseAssembler::new(gateway)
            .with_indicator(renderer.clone())
            .with_observer(renderer.clone());
        let store = Arc::new(InMemoryStore::new());
        let session = ChatSession::new(registry, assembler, store.clone(), renderer, config);
        (session, buf, store)
    }

    #[tokio::test]
    async fn batch_turn_prints_and_commits_reply() {
        let gateway = Scripted::new(vec![Ok("Hello there!".into())]);
        let (mut session, buf, _) = session_with(gateway.clone(), false);

        assert_eq!(session.handle_line("hi").await, Flow::Continue);

        let messages = session.registry().current().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[2].role, Role::Assistant);
        assert!(buf.text().contains("Hello there!"));

        let requests = gateway.requests.lock().unwrap();
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].model, "llama3.1:8b");
    }

    #[tokio::test]
    async fn stream_turn_forwards_fragments() {
        let gateway = Scripted::new(vec![Ok("streamed words".into())]);
        let (mut session, buf, _) = session_with(gateway, true);

        session.handle_line("tell me").await;
        assert!(buf.text().contains("streamed words"));
        assert_eq!(session.registry().current().len(), 3);
    }

    #[tokio::test]
    async fn gateway_failure_keeps_user_message_and_shows_tip() {
        let gateway = Scripted::new(vec![Err(GatewayError::Timeout("60s".into()))]);
        let (mut session, buf, _) = session_with(gateway, false);

        session.handle_line("slow question").await;

        let current = session.registry().current();
        assert_eq!(current.len(), 2);
        assert_eq!(current.messages()[1].content, "slow question");
        assert!(buf.text().contains("Try a shorter message"));
    }

    #[tokio::test]
    async fn keyword_sentence_goes_to_model() {
        let gateway = Scripted::new(vec![Ok("Sure.".into())]);
        let (mut session, _, _) = session_with(gateway.clone(), false);

        session.handle_line("help me with borrowing").await;
        assert_eq!(gateway.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_switch_and_delete() {
        let (mut session, buf, _) = session_with(Scripted::new(vec![]), false);

        session.handle_line("new \"Side Project\"").await;
        let side = session.registry().current().id().clone();
        assert_ne!(side.as_str(), SessionId::DEFAULT);
        assert!(side.as_str().starts_with("conv_"));
        assert_eq!(session.registry().current().name(), "Side Project");
        assert_eq!(session.registry().current().len(), 1);

        session.handle_line(&format!("delete {side}")).await;
        assert!(buf.text().contains("Cannot delete the current session"));
        assert_eq!(session.registry().session_count(), 2);

        session.handle_line("switch default").await;
        assert_eq!(session.registry().current_id().as_str(), "default");

        session.handle_line(&format!("delete {side}")).await;
        assert_eq!(session.registry().session_count(), 1);

        session.handle_line("switch nowhere").await;
        assert!(buf.text().contains("Session not found: nowhere"));
    }

    #[tokio::test]
    async fn new_without_name_uses_clock_name() {
        let (mut session, _, _) = session_with(Scripted::new(vec![]), false);
        session.handle_line("new").await;
        assert!(session.registry().current().name().starts_with("Conversation "));
    }

    #[tokio::test]
    async fn save_then_load_assigns_fresh_id() {
        let gateway = Scripted::new(vec![Ok("Paris.".into())]);
        let (mut session, buf, store) = session_with(gateway, false);

        session.handle_line("capital of France?").await;
        session.handle_line("save geo").await;
        assert!(buf.text().contains("Saved as: geo.json"));

        let saved = store.load("geo").unwrap();
        assert_eq!(saved.meta.id.as_str(), "default");
        assert_eq!(saved.messages.len(), 3);
        assert!(!saved.config.stream_mode);

        session.handle_line("load geo").await;
        let current = session.registry().current();
        assert_ne!(current.id().as_str(), "default");
        assert_eq!(current.len(), 3);
        assert_eq!(current.messages()[2].content, "Paris.");
        assert_eq!(session.registry().session_count(), 2);
    }

    #[tokio::test]
    async fn resave_keeps_loaded_system_prompt() {
        let gateway = Scripted::new(vec![Ok("Arr.".into())]);
        let (mut session, _, store) = session_with(gateway, false);

        let now = chrono::Utc::now();
        let pirate = SavedConversation {
            meta: ConversationMeta {
                id: SessionId::from("conv_pirate"),
                name: "Pirate".into(),
                created: now,
                last_used: now,
                message_count: 1,
            },
            messages: vec![Message::system("You are a pirate.")],
            config: SessionConfig {
                system_prompt: "You are a pirate.".into(),
                ..defaults(false)
            },
        };
        store.save("pirate", &pirate).unwrap();

        session.handle_line("load pirate").await;
        session.handle_line("ahoy").await;
        session.handle_line("save pirate2").await;
        assert_eq!(
            store.load("pirate2").unwrap().config.system_prompt,
            "You are a pirate."
        );

        session.handle_line("clear").await;
        session.handle_line("save cleared").await;
        assert_eq!(
            store.load("cleared").unwrap().config.system_prompt,
            "You are Taconite."
        );
    }

    #[tokio::test]
    async fn load_missing_reports_error() {
        let (mut session, buf, _) = session_with(Scripted::new(vec![]), false);
        session.handle_line("load ghost").await;
        assert!(buf.text().contains("Saved conversation not found: ghost"));
        assert_eq!(session.registry().session_count(), 1);
    }

    #[tokio::test]
    async fn clear_empties_history() {
        let gateway = Scripted::new(vec![Ok("ok".into())]);
        let (mut session, _, _) = session_with(gateway, false);

        session.handle_line("remember this").await;
        session.handle_line("clear").await;
        assert!(session.registry().current().is_empty());
        assert_eq!(session.registry().current().token_count(), 0);
    }

    #[tokio::test]
    async fn stream_toggles_mode() {
        let (mut session, buf, _) = session_with(Scripted::new(vec![]), true);

        session.handle_line("stream").await;
        assert_eq!(session.mode(), ReplyMode::Batch);
        session.handle_line("STREAM").await;
        assert_eq!(session.mode(), ReplyMode::Stream);

        let text = buf.text();
        assert!(text.contains("Batch mode enabled"));
        assert!(text.contains("Streaming mode enabled"));
    }

    #[tokio::test]
    async fn list_shows_open_and_saved() {
        let (mut session, buf, _) = session_with(Scripted::new(vec![]), false);
        session.handle_line("save snapshot").await;
        session.handle_line("list").await;

        let text = buf.text();
        assert!(text.contains("default: Default Chat (current) - 1 messages"));
        assert!(text.contains("snapshot: Default Chat (1 messages"));
    }

    #[tokio::test]
    async fn missing_argument_prints_usage() {
        let (mut session, buf, _) = session_with(Scripted::new(vec![]), false);
        session.handle_line("save").await;
        assert!(buf.text().contains("Usage: save <name>"));
    }

    #[tokio::test]
    async fn run_stops_on_quit_and_prints_stats() {
        let gateway = Scripted::new(vec![Ok("hey".into())]);
        let (mut session, buf, _) = session_with(gateway.clone(), false);

        let (tx, rx) = mpsc::channel(8);
        for line in ["", "hello", "quit", "never sent"] {
            tx.send(Ok(line.to_string())).await.unwrap();
        }
        session.run(rx).await.unwrap();

        let text = buf.text();
        assert!(text.contains("Goodbye!"));
        assert!(text.contains("User messages: 1"));
        assert!(text.contains("AI responses: 1"));
        assert_eq!(gateway.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_ends_on_eof() {
        let (mut session, buf, _) = session_with(Scripted::new(vec![]), false);
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        session.run(rx).await.unwrap();
        assert!(buf.text().contains("Goodbye!"));
    }
}

//! Terminal rendering for the interactive chat.
//!
//! `TerminalRenderer` is handed to the assembler (spinner + streamed text) and
//! to the registry (eviction notices); the chat loop uses it for everything
//! else. All output goes through one locked writer so the spinner task and
//! the loop never interleave half-lines.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use colored::{Color, Colorize};
use taconite_chat::{FragmentObserver, ProgressIndicator, ReplyMode};
use taconite_core::error::GatewayError;
use taconite_core::export::SavedEntry;
use taconite_core::registry::SessionSummary;
use taconite_core::transcript::{EvictionNotice, EvictionObserver, Transcript, TranscriptStats};

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SPINNER_COLORS: [Color; 6] = [
    Color::Red,
    Color::Yellow,
    Color::Green,
    Color::Cyan,
    Color::Blue,
    Color::Magenta,
];

/// Messages shown by `debug`.
const DEBUG_RECENT: usize = 3;
/// Characters of each message shown by `debug`.
const DEBUG_PREVIEW_CHARS: usize = 60;

pub struct TerminalRenderer {
    out: Mutex<Box<dyn Write + Send>>,
}

impl TerminalRenderer {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Write and flush. Terminal write failures are not actionable here.
    fn emit(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn line(&self, text: impl AsRef<str>) {
        self.emit(&format!("{}\n", text.as_ref()));
    }

    pub fn welcome(&self, model: &str, mode: ReplyMode) {
        self.line("");
        self.line("🤖 Taconite - an interactive ai chat bot".green().to_string());
        self.line(format!("Model: {model}").yellow().to_string());
        self.line(format!("Reply mode: {mode}").yellow().to_string());
        self.line("Commands:".yellow().to_string());
        for (usage, what) in [
            ("help", "Show this help message"),
            ("quit/exit", "Exit the chatbot"),
            ("new [name]", "Create a new conversation (quote multi-word names)"),
            ("list", "List conversations, open and saved"),
            ("switch <id>", "Switch to another conversation"),
            ("delete <id>", "Delete a conversation"),
            ("clear", "Clear conversation history"),
            ("debug", "Show debug information"),
            ("stats", "Show conversation statistics"),
            ("model", "Show the current model"),
            ("save <name>", "Save the current conversation"),
            ("load <name>", "Load a saved conversation"),
            ("stream", "Toggle streaming and batch replies"),
        ] {
            self.line(format!("    {usage:<14} - {what}"));
        }
        self.line("");
        self.line("💡 Tip: Just type your message to chat!".yellow().to_string());
    }

    pub fn prompt(&self) {
        self.emit(&format!("\n{} ", "👤 You:".cyan().bold()));
    }

    /// Header printed before streamed text.
    pub fn assistant_prefix(&self) {
        self.emit(&format!("{} ", "🤖 AI:".green().bold()));
    }

    /// A complete batch reply.
    pub fn reply(&self, text: &str) {
        self.line(format!("{} {text}", "🤖 AI:".green().bold()));
    }

    /// Terminates a streamed reply.
    pub fn end_stream(&self) {
        self.line("");
    }

    pub fn success(&self, text: impl AsRef<str>) {
        self.line(text.as_ref().green().to_string());
    }

    pub fn system(&self, text: impl AsRef<str>) {
        self.line(text.as_ref().yellow().to_string());
    }

    pub fn error(&self, text: impl AsRef<str>) {
        self.line(format!("❌ {}", text.as_ref()).red().bold().to_string());
    }

    pub fn gateway_error(&self, err: &GatewayError) {
        self.error(format!("Error: {err}"));
        if let Some(hint) = err.troubleshooting_hint() {
            self.system(format!("💡 Tip: {hint}"));
        }
    }

    pub fn stats(&self, stats: &TranscriptStats) {
        self.system("📊 Conversation statistics:");
        self.line(format!("    Total messages: {}", stats.total));
        self.line(format!("    User messages: {}", stats.user));
        self.line(format!("    AI responses: {}", stats.assistant));
        self.line(format!("    System messages: {}", stats.system));
        self.line(format!(
            "    Estimated tokens: {}/{}",
            stats.token_count, stats.max_tokens
        ));
        self.line(format!("    Context usage: {:.1}%", stats.usage_percent()));
    }

    pub fn debug(&self, transcript: &Transcript) {
        let stats = transcript.stats();
        let lines = [
            "🔍 Debug Information:".to_string(),
            format!("    Model: {}", transcript.model()),
            format!("    Messages in conversation: {}", transcript.len()),
            format!(
                "    Estimated tokens: {}/{}",
                stats.token_count, stats.max_tokens
            ),
            format!("    Context usage: {:.1}%", stats.usage_percent()),
            "    Recent messages:".to_string(),
        ];
        for line in lines {
            self.line(line.magenta().to_string());
        }

        let start = transcript.len().saturating_sub(DEBUG_RECENT);
        for (offset, msg) in transcript.recent(DEBUG_RECENT).iter().enumerate() {
            self.line(
                format!(
                    "    {}. [{}] {}",
                    start + offset + 1,
                    msg.role,
                    msg.preview(DEBUG_PREVIEW_CHARS)
                )
                .magenta()
                .to_string(),
            );
        }
    }

    pub fn session_list(&self, sessions: &[SessionSummary]) {
        self.system("📃 All Conversations:");
        for s in sessions {
            let current = if s.current { " (current)" } else { "" };
            self.line(format!(
                "    📝 {}: {}{} - {} messages",
                s.meta.id, s.meta.name, current, s.meta.message_count
            ));
        }
    }

    pub fn saved_list(&self, entries: &[SavedEntry]) {
        if entries.is_empty() {
            return;
        }
        self.system("💾 Saved Conversations:");
        for entry in entries {
            match &entry.meta {
                Some(meta) => self.line(format!(
                    "    💾 {}: {} ({} messages, {})",
                    entry.name,
                    meta.name,
                    meta.message_count,
                    meta.last_used
                        .with_timezone(&chrono::Local)
                        .format("%b %-d %H:%M")
                )),
                None => self.line(format!("    💾 {}", entry.name)),
            }
        }
    }
}

impl ProgressIndicator for TerminalRenderer {
    fn tick(&self, frame: usize) {
        let glyph = SPINNER_FRAMES[frame % SPINNER_FRAMES.len()];
        let color = SPINNER_COLORS[frame % SPINNER_COLORS.len()];
        self.emit(&format!(
            "\r{}",
            format!("🤖 AI: {glyph} Thinking...").color(color)
        ));
    }

    fn stop(&self) {
        // Carriage return + clear to end of line
        self.emit("\r\x1b[K");
    }
}

impl FragmentObserver for TerminalRenderer {
    fn on_fragment(&self, text: &str) {
        self.emit(text);
    }
}

impl EvictionObserver for TerminalRenderer {
    fn on_evicted(&self, notice: &EvictionNotice) {
        self.line(format!(
            "🗑️  Trimmed old message: [{}] {}",
            notice.removed_role, notice.content_preview
        ));
    }
}

//! Reply assembly: turns one gateway call into one committed assistant message.
//!
//! Two acquisition modes:
//! - **Batch**: a single full-reply call while a progress indicator animates
//!   on its own task. The indicator is stopped exactly once as soon as the
//!   reply or error is known, and joined before returning.
//! - **Stream**: fragments are forwarded to a [`FragmentObserver`] as they
//!   arrive and concatenated in arrival order. The fragments themselves are
//!   the progress, so no indicator runs.
//!
//! Either way the assistant message is appended only after a successful
//! reply; a failure leaves the transcript holding just the user's message.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taconite_core::error::GatewayError;
use taconite_core::inference::{InferenceGateway, InferenceRequest};
use taconite_core::message::Role;
use taconite_core::transcript::Transcript;
use tracing::{debug, warn};

use crate::progress::{ProgressIndicator, SilentIndicator, run_indicator, stop_signal};

/// Default indicator frame interval.
pub const DEFAULT_TICK: Duration = Duration::from_millis(120);

/// How a reply is acquired from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    Batch,
    Stream,
}

impl ReplyMode {
    pub fn from_stream_flag(stream: bool) -> Self {
        if stream { Self::Stream } else { Self::Batch }
    }

    pub fn is_stream(self) -> bool {
        self == Self::Stream
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Batch => Self::Stream,
            Self::Stream => Self::Batch,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Stream => "stream",
        }
    }
}

impl fmt::Display for ReplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batch" => Ok(Self::Batch),
            "stream" | "streaming" => Ok(Self::Stream),
            other => Err(format!("unknown reply mode: {other}")),
        }
    }
}

/// Receives streamed reply text as it arrives.
pub trait FragmentObserver: Send + Sync {
    fn on_fragment(&self, text: &str);
}

/// Observer that discards fragments.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl FragmentObserver for SilentObserver {
    fn on_fragment(&self, _text: &str) {}
}

pub struct ResponseAssembler {
    gateway: Arc<dyn InferenceGateway>,
    indicator: Arc<dyn ProgressIndicator>,
    observer: Arc<dyn FragmentObserver>,
    tick: Duration,
    typewriter_delay: Duration,
}

impl ResponseAssembler {
    /// An assembler with a silent indicator and observer.
    pub fn new(gateway: Arc<dyn InferenceGateway>) -> Self {
        Self {
            gateway,
            indicator: Arc::new(SilentIndicator),
            observer: Arc::new(SilentObserver),
            tick: DEFAULT_TICK,
            typewriter_delay: Duration::ZERO,
        }
    }

    pub fn with_indicator(mut self, indicator: Arc<dyn ProgressIndicator>) -> Self {
        self.indicator = indicator;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn FragmentObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Indicator frame interval. Zero is replaced by the default.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = if tick.is_zero() { DEFAULT_TICK } else { tick };
        self
    }

    /// Pause after each streamed fragment.
    pub fn with_typewriter_delay(mut self, delay: Duration) -> Self {
        self.typewriter_delay = delay;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn InferenceGateway> {
        &self.gateway
    }

    /// One full turn: append `input` as the user message, acquire a reply for
    /// the updated transcript, and append the reply on success.
    pub async fn respond(
        &self,
        transcript: &mut Transcript,
        input: &str,
        mode: ReplyMode,
    ) -> Result<String, GatewayError> {
        transcript.append(Role::User, input);
        let request = InferenceRequest::for_transcript(transcript);

        let content = match self.acquire(request, mode).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    session = %transcript.id(),
                    mode = %mode,
                    error = %e,
                    "Reply failed, keeping user message only"
                );
                return Err(e);
            }
        };

        transcript.append(Role::Assistant, content.clone());
        debug!(
            session = %transcript.id(),
            tokens = transcript.token_count(),
            messages = transcript.len(),
            "Reply committed"
        );
        Ok(content)
    }

    /// Acquire a reply without touching any transcript. Streamed fragments go
    /// to the configured observer.
    pub async fn acquire(
        &self,
        request: InferenceRequest,
        mode: ReplyMode,
    ) -> Result<String, GatewayError> {
        self.acquire_observed(request, mode, self.observer.as_ref()).await
    }

    /// Like [`acquire`](Self::acquire) with a per-call fragment observer.
    pub async fn acquire_observed(
        &self,
        request: InferenceRequest,
        mode: ReplyMode,
        observer: &dyn FragmentObserver,
    ) -> Result<String, GatewayError> {
        match mode {
            ReplyMode::Batch => self.acquire_batch(request).await,
            ReplyMode::Stream => self.acquire_stream(request, observer).await,
        }
    }

    async fn acquire_batch(&self, request: InferenceRequest) -> Result<String, GatewayError> {
        let (signal, listener) = stop_signal();
        let indicator = tokio::spawn(run_indicator(self.indicator.clone(), self.tick, listener));

        let result = self.gateway.send_batch(request).await;

        signal.fire();
        if let Err(e) = indicator.await {
            warn!(error = %e, "Progress indicator task failed");
        }

        result
    }

    async fn acquire_stream(
        &self,
        request: InferenceRequest,
        observer: &dyn FragmentObserver,
    ) -> Result<String, GatewayError> {
        let mut fragments = self.gateway.send_stream(request).await?;
        let mut content = String::new();
        let mut count = 0usize;

        while let Some(item) = fragments.recv().await {
            let fragment = item?;
            count += 1;

            if !fragment.content.is_empty() {
                observer.on_fragment(&fragment.content);
                content.push_str(&fragment.content);
                if !self.typewriter_delay.is_zero() {
                    tokio::time::sleep(self.typewriter_delay).await;
                }
            }

            if fragment.done {
                break;
            }
        }

        debug!(fragments = count, chars = content.len(), "Stream assembled");
        Ok(content)
    }
}

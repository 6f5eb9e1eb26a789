//! Reply assembly for Taconite.
//!
//! Drives an `InferenceGateway` for one conversational turn at a time:
//! appends the user's message, acquires the reply in batch or stream mode,
//! and commits the assistant message only when the reply succeeds.

pub mod assembler;
pub mod progress;
pub mod stream_event;
pub mod turns;

pub use assembler::{FragmentObserver, ReplyMode, ResponseAssembler, SilentObserver};
pub use progress::{ProgressIndicator, SilentIndicator, StopListener, StopSignal, stop_signal};
pub use stream_event::ReplyStreamEvent;
pub use turns::{SessionTurns, TurnGuard};

//! Progress indicator shown while a batch reply is pending.
//!
//! The indicator runs on its own task and is stopped through a one-shot
//! [`StopSignal`] owned by the invocation that started it. Firing consumes the
//! signal, and dropping it unfired stops the indicator as well.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

/// Renders the waiting animation. `frame` counts up from 0.
pub trait ProgressIndicator: Send + Sync {
    fn tick(&self, frame: usize);

    /// Called once, after the last `tick`. Clears whatever `tick` drew.
    fn stop(&self);
}

/// Indicator that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentIndicator;

impl ProgressIndicator for SilentIndicator {
    fn tick(&self, _frame: usize) {}
    fn stop(&self) {}
}

/// Sending half of the stop channel.
#[derive(Debug)]
pub struct StopSignal {
    tx: oneshot::Sender<()>,
}

impl StopSignal {
    pub fn fire(self) {
        // The listener may already be gone if its task ended early
        let _ = self.tx.send(());
    }
}

/// Receiving half of the stop channel, moved into the indicator task.
#[derive(Debug)]
pub struct StopListener {
    rx: oneshot::Receiver<()>,
}

/// Create a linked signal/listener pair.
pub fn stop_signal() -> (StopSignal, StopListener) {
    let (tx, rx) = oneshot::channel();
    (StopSignal { tx }, StopListener { rx })
}

/// Drive `indicator` every `tick` until the listener resolves.
///
/// The first frame is drawn one tick after start. No frame is drawn after the
/// stop signal is observed, and `indicator.stop()` runs exactly once.
pub async fn run_indicator(
    indicator: Arc<dyn ProgressIndicator>,
    tick: Duration,
    listener: StopListener,
) {
    let mut rx = listener.rx;
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // interval() completes its first tick immediately
    ticker.tick().await;

    let mut frame = 0usize;
    loop {
        tokio::select! {
            biased;
            _ = &mut rx => break,
            _ = ticker.tick() => {
                indicator.tick(frame);
                frame = frame.wrapping_add(1);
            }
        }
    }

    indicator.stop();
}

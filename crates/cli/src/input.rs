//! Terminal input: stdin lines delivered over a channel.

use std::io::{self, BufRead};

use tokio::sync::mpsc;

/// Spawn a reader thread forwarding stdin lines until EOF (Ctrl+D).
///
/// A plain thread rather than `tokio::io::stdin`: a pending blocking read
/// would otherwise hold up runtime shutdown after `quit`. Lines are passed
/// through untrimmed; the chat loop classifies them. A read error is
/// forwarded once and ends the thread.
pub fn stdin_lines() -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(32);

    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });

    rx
}

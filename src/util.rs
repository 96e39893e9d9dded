//! Utility functions and helpers.

use tokio::sync::mpsc;

/// Send a value through a channel, logging a warning if the receiver is gone.
///
/// Returns whether the value was delivered so loops can stop once their
/// consumer has shut down.
pub async fn send_or_log<T>(tx: &mpsc::Sender<T>, value: T, context: &str) -> bool {
    match tx.send(value).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to send {}: {}", context, e);
            false
        }
    }
}

use std::sync::Arc;

use tokio::sync::Mutex;

/// The most recent transport error of one connector, shared by all its calls.
///
/// Cloning shares the slot. The lock is only held for a single read or write,
/// never across network I/O or a backoff sleep. Last writer wins.
#[derive(Debug, Clone, Default)]
pub struct ConnectorState {
    last_error: Arc<Mutex<Option<String>>>,
}

impl ConnectorState {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the recorded message.
    pub async fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut slot = self.last_error.lock().await;
        *slot = Some(message);
    }

    /// The last recorded message, if any call has failed so far.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }
}

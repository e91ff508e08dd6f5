//! Recording Notifier
//!
//! For tests and demos. Forwards every message to a channel the caller reads.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::Notifier;
use crate::error::{AssistantError, Result};

/// Notifier that hands messages to an in-process channel
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<String>,
}

impl RecordingNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, message: &str) -> Result<()> {
        self.tx
            .send(message.to_string())
            .map_err(|_| AssistantError::Notification("receiver dropped".into()))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

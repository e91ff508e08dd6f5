use async_trait::async_trait;

use super::Notifier;
use crate::error::Result;

/// Writes notifications to the tracing log
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, message: &str) -> Result<()> {
        tracing::info!(target: "persona_assistant::push", "Push: {}", message);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

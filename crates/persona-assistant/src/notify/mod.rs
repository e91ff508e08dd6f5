//! Notifications
//!
//! Sinks for "someone wants to get in touch" pings. Delivery is
//! fire-and-forget: tools hand the message off with [`dispatch`] and return
//! straight away, failures are only logged.

mod log;
mod pushover;
mod recording;

pub use log::LogNotifier;
pub use pushover::{PushoverConfig, PushoverNotifier};
pub use recording::RecordingNotifier;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Notification sink (Strategy pattern)
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message, reporting whether the sink accepted it
    async fn deliver(&self, message: &str) -> Result<()>;

    /// Sink name
    fn name(&self) -> &str;
}

/// Send `message` in the background
///
/// Outside a tokio runtime the message is logged and dropped.
pub fn dispatch(notifier: &Arc<dyn Notifier>, message: impl Into<String>) {
    let message = message.into();
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(sink = notifier.name(), "No async runtime, notification dropped: {}", message);
        return;
    };
    let notifier = Arc::clone(notifier);

    runtime.spawn(async move {
        if let Err(e) = notifier.deliver(&message).await {
            tracing::warn!(sink = notifier.name(), "Notification failed: {}", e);
        }
    });
}

/// Pushover when `PUSHOVER_USER` and `PUSHOVER_TOKEN` are set, logging otherwise
pub fn notifier_from_env() -> Result<Arc<dyn Notifier>> {
    match PushoverConfig::from_env() {
        Some(config) => {
            tracing::info!("Pushover notifications enabled");
            Ok(Arc::new(PushoverNotifier::new(config)?))
        }
        None => {
            tracing::info!("Pushover not configured, notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

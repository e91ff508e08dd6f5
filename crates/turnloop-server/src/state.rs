//! Application State

use std::sync::Arc;

use turnloop_core::{Agent, ReviewedAgent};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Conversation loop with the persona prompt and tools
    pub agent: Arc<Agent>,

    /// Evaluator-backed wrapper around `agent` (None if no evaluator model is configured)
    pub reviewer: Option<Arc<ReviewedAgent>>,
}

impl AppState {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self {
            agent,
            reviewer: None,
        }
    }

    pub fn with_reviewer(mut self, reviewer: Arc<ReviewedAgent>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }
}

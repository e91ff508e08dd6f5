//! # persona-assistant
//!
//! A career chat persona on top of the turnloop conversation loop: it speaks
//! for one person using their profile documents, captures leads, and pings the
//! owner when a visitor leaves an email or asks something it cannot answer.
//!
//! ```text
//! ┌────────────┐   system prompt   ┌──────────────┐
//! │  Profile   │ ────────────────► │    Agent     │
//! │ summary.txt│                   │ (turnloop)   │
//! │ *.txt *.md │                   └──────┬───────┘
//! └────────────┘                          │ tool calls
//!                      ┌──────────────────┴──────────────────┐
//!                      ▼                                     ▼
//!          record_user_details                  record_unknown_question
//!                      └──────────────┬──────────────────────┘
//!                                     ▼
//!                         Notifier (Pushover / log)
//! ```

pub mod error;
pub mod notify;
pub mod profile;
pub mod tools;

pub use error::{AssistantError, Result};
pub use notify::{LogNotifier, Notifier, PushoverConfig, PushoverNotifier, notifier_from_env};
pub use profile::{Profile, ProfileDocument};
pub use tools::{RecordUnknownQuestionTool, RecordUserDetailsTool, register_tools};

/// Default directory holding `summary.txt` and friends
pub const DEFAULT_PROFILE_DIR: &str = "me";

/// Persona name used when `PERSONA_NAME` is unset
pub const DEFAULT_PERSONA_NAME: &str = "Ed Donner";

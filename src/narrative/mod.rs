//! Narrative generation.
//!
//! Builds the statement-free payload handed to an external text generator, validates
//! whatever comes back, and falls back to a deterministic template when the service is
//! disabled, slow or misbehaving. The score never depends on this step.

pub mod payload;
pub mod prompt;
pub mod sanitize;
pub mod service;

#[cfg(feature = "openai")]
pub mod openai;

pub use payload::*;
pub use sanitize::{consume_narrative, fallback_narrative};
pub use service::*;

#[cfg(feature = "openai")]
pub use openai::OpenAiNarrativeService;

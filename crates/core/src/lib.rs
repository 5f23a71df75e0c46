//! Relaybot core - shared types for the chat/generation/queue bridge
//!
//! - **Configuration** (`config`) - layered defaults, TOML file, env, overrides
//! - **Command detection** (`command`) - trigger prefix and self-message filter
//! - **Wire format** (`envelope`) - correlation envelope and generation result schema
//! - **Errors** (`errors`) - the pipeline failure taxonomy and user notices

pub mod command;
pub mod config;
pub mod envelope;
pub mod errors;

pub use command::{BotIdentity, CommandDetector, CommandMatch, DEFAULT_TRIGGER_PREFIX};
pub use envelope::{
    Candidate, CandidateContent, CorrelationEnvelope, Destination, EnvelopeError,
    GenerationResult, SCHEMA_VERSION,
};
pub use errors::{GenerationError, PipelineError};

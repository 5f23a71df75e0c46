//! Generation and relay runtime
//!
//! This crate holds both halves of the bridge:
//! - Calls the generative backend for each chat command (`requestor`, `gemini`)
//! - Turns a command into one queued reply envelope (`pipeline`)
//! - Drains the reply queue back into chat messages (`consumer`)
//!
//! # Architecture
//!
//! The two halves never share memory; the queue is the only link:
//! 1. **Command Pipeline** (`pipeline`) - detect `/B `, generate, enqueue
//! 2. **Consumer Loop** (`consumer`) - read, decode, deliver fragments in order
//!
//! # Key Types
//!
//! - `CommandPipeline` - chat-event side, registered as a `MessageService`
//! - `ConsumerLoop` / `ConsumerHandle` - cancellable queue reader task
//! - `GenerativeBackend` - pluggable trait, implemented by `GeminiBackend`

pub mod consumer;
pub mod gemini;
pub mod llm;
pub mod pipeline;
pub mod requestor;

pub use consumer::{ConsumerError, ConsumerHandle, ConsumerLoop, ConsumerState, ProcessOutcome};
pub use gemini::GeminiBackend;
pub use llm::GenerativeBackend;
pub use pipeline::{CommandOutcome, CommandPipeline};
pub use requestor::GenerationRequestor;

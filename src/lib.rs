//! LLM-powered clinical code finder
//!
//! Resolves a free-text clinical query into structured codes from six
//! medical coding vocabularies (ICD-10-CM, LOINC, RxNorm, HCPCS, UCUM, HPO)
//! served by the NIH Clinical Tables API.
//!
//! ## Architecture
//!
//! ```text
//! Query -> IntentResolver -> Dispatch (primary + bounded secondary fan-out)
//!       -> Aggregator -> ResultNarrator -> PipelineState
//! ```
//!
//! ## Backend Selection
//!
//! Set `AGENT_BACKEND` environment variable:
//! - `anthropic` (default): Anthropic Claude API
//! - `openai`: OpenAI API
//! - `ollama`: locally-hosted Ollama server

// Completion client abstraction
pub mod anthropic_client;
pub mod backend;
pub mod client_factory;
pub mod completion;
pub mod ollama_client;
pub mod openai_client;

// Core pipeline modules
pub mod aggregate;
pub mod error;
pub mod intent;
pub mod pipeline;
pub mod search;
pub mod summarize;
pub mod vocabulary;

// Re-exports for convenience
pub use backend::AgentBackend;
pub use client_factory::create_completion_client;
pub use completion::CompletionClient;
pub use error::AgentError;
pub use intent::{ConversationTurn, IntentResolver, SearchIntent};
pub use pipeline::{ApiCall, CodeFinderAgent, PipelineState};
pub use search::{ClinicalTablesClient, CodeHit, VocabularySearch};
pub use summarize::ResultNarrator;
pub use vocabulary::{CodingSystem, ConceptKind};

//! Agent error types
//!
//! Most failures inside a run degrade locally (classification falls back,
//! per-vocabulary searches return empty). The only failure surfaced to the
//! caller is a failed narrative, which has no safe synthetic substitute.

use thiserror::Error;

/// Run-fatal errors returned by the pipeline
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("narrative generation failed: {source}")]
    Summarization {
        #[source]
        source: anyhow::Error,
    },
}

//! Result Narrator
//!
//! Turns the aggregated, confidence-scored results into a plain-English
//! explanation via the completion service. Unlike classification there is no
//! safe synthetic substitute for a narrative, so completion failures
//! propagate to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

use crate::completion::CompletionClient;
use crate::intent::SearchIntent;
use crate::search::CodeHit;
use crate::vocabulary::CodingSystem;

/// Lines of codes included per vocabulary in the narrator prompt
const CODES_PER_SYSTEM: usize = 5;

const SUMMARIZE_SYSTEM_PROMPT: &str = "For each code found, explain why it matches the query. \
Generate a clear, minimal explanation with traceable reasoning.";

/// LLM-backed narrator over a filtered result set
pub struct ResultNarrator {
    client: Arc<dyn CompletionClient>,
}

impl ResultNarrator {
    /// Create a narrator over an injected completion client
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Produce the narrative for one run's results. Completion failures are
    /// returned as errors, not papered over.
    pub async fn summarize(
        &self,
        query: &str,
        filtered: &BTreeMap<CodingSystem, Vec<CodeHit>>,
        intent: &SearchIntent,
        confidence: &BTreeMap<CodingSystem, f64>,
    ) -> Result<String> {
        let user_prompt = format!(
            "Query: {}\nConcept type: {} (primary system {})\n\nResults:\n{}",
            query,
            intent.concept,
            intent.primary_system,
            format_results(filtered, confidence)
        );

        let narrative = self
            .client
            .complete(SUMMARIZE_SYSTEM_PROMPT, &user_prompt)
            .await?;

        tracing::info!(chars = narrative.len(), "narrative generated");
        Ok(narrative)
    }
}

/// Render the compact per-vocabulary code block the narrator reasons over
fn format_results(
    filtered: &BTreeMap<CodingSystem, Vec<CodeHit>>,
    confidence: &BTreeMap<CodingSystem, f64>,
) -> String {
    let mut lines = Vec::new();

    for (system, hits) in filtered {
        if hits.is_empty() {
            continue;
        }
        let score = confidence.get(system).copied().unwrap_or(0.0);
        lines.push(format!(
            "{} ({} codes, confidence {:.1}):",
            system.as_str().to_uppercase(),
            hits.len(),
            score
        ));
        for hit in hits.iter().take(CODES_PER_SYSTEM) {
            lines.push(format!("  {}: {}", hit.code, hit.display));
        }
    }

    if lines.is_empty() {
        "No codes found".to_string()
    } else {
        lines.join("\n")
    }
}

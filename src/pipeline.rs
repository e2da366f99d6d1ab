//! Query-Resolution Pipeline
//!
//! Wires the stages into a small state machine:
//!
//! ```text
//! ClassifyIntent -> SearchPrimary -> {SearchSecondary | AggregateResults}
//!                -> Summarize -> Done
//! ```
//!
//! The secondary branch is the pipeline's only conditional edge, taken iff
//! the resolved intent carries secondary systems. Each stage returns only the
//! fields it updates; the controller merges them into the running
//! [`PipelineState`]. There are no retry or loop-back edges.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use crate::aggregate::aggregate;
use crate::completion::CompletionClient;
use crate::error::AgentError;
use crate::intent::{ConversationTurn, IntentResolver, SearchIntent};
use crate::search::{CodeHit, VocabularySearch};
use crate::summarize::ResultNarrator;
use crate::vocabulary::CodingSystem;

/// Result cap for the primary vocabulary search
const PRIMARY_LIMIT: usize = 10;

/// Result cap per secondary vocabulary search
const SECONDARY_LIMIT: usize = 5;

/// At most this many secondary vocabularies are dispatched per run
const MAX_SECONDARY: usize = 3;

/// One dispatch attempt, recorded for observability only
#[derive(Debug, Clone, Serialize)]
pub struct ApiCall {
    pub system: CodingSystem,
    pub query: String,
    pub result_count: usize,
}

/// The aggregate record threaded through the stages and returned to the
/// caller at the end of a run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    /// Raw user query for this run
    pub query: String,
    /// Resolved intent, always set after classification
    pub intent: SearchIntent,
    /// Append-only audit trail, one entry per dispatch attempt
    pub api_calls: Vec<ApiCall>,
    /// Raw per-vocabulary results. The primary system is always keyed here,
    /// even with zero results; empty secondary results are not stored.
    pub raw_results: BTreeMap<CodingSystem, Vec<CodeHit>>,
    /// Filtered, ranked results per vocabulary
    pub filtered_results: BTreeMap<CodingSystem, Vec<CodeHit>>,
    /// Confidence per vocabulary with results
    pub confidence_scores: BTreeMap<CodingSystem, f64>,
    /// Final narrative
    pub summary: String,
}

impl PipelineState {
    fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            intent: SearchIntent::fallback(query),
            api_calls: Vec::new(),
            raw_results: BTreeMap::new(),
            filtered_results: BTreeMap::new(),
            confidence_scores: BTreeMap::new(),
            summary: String::new(),
        }
    }

    /// Condense this run into the trail entry the caller retains for the
    /// next run's Query Context
    pub fn to_turn(&self) -> ConversationTurn {
        ConversationTurn {
            query: self.query.clone(),
            concept: self.intent.concept,
            refined_query: self.intent.refined_query.clone(),
            result_count: self.filtered_results.len(),
        }
    }
}

/// Partial state update produced by a dispatch stage
#[derive(Debug, Default)]
struct DispatchOutcome {
    calls: Vec<ApiCall>,
    results: BTreeMap<CodingSystem, Vec<CodeHit>>,
}

/// Pipeline states. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ClassifyIntent,
    SearchPrimary,
    SearchSecondary,
    AggregateResults,
    Summarize,
    Done,
}

/// The clinical code finder agent: resolver, narrator, and search adapter
/// injected once at construction and shared across runs.
pub struct CodeFinderAgent {
    resolver: IntentResolver,
    narrator: ResultNarrator,
    search: Arc<dyn VocabularySearch>,
}

impl CodeFinderAgent {
    /// Create an agent over injected completion and search clients
    pub fn new(completion: Arc<dyn CompletionClient>, search: Arc<dyn VocabularySearch>) -> Self {
        Self {
            resolver: IntentResolver::new(Arc::clone(&completion)),
            narrator: ResultNarrator::new(completion),
            search,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let completion = crate::client_factory::create_completion_client()?;
        let search = Arc::new(crate::search::ClinicalTablesClient::from_env()?);
        Ok(Self::new(completion, search))
    }

    /// Run the pipeline for one query. Returns the final state, or an error
    /// only when narrative generation fails.
    pub async fn run(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<PipelineState, AgentError> {
        let mut state = PipelineState::new(query);
        let mut stage = Stage::ClassifyIntent;

        loop {
            stage = match stage {
                Stage::ClassifyIntent => {
                    state.intent = self.resolver.classify(query, history).await;
                    Stage::SearchPrimary
                }
                Stage::SearchPrimary => {
                    let outcome = self.search_primary(&state.intent).await;
                    merge(&mut state, outcome);
                    if state.intent.secondary_systems.is_empty() {
                        Stage::AggregateResults
                    } else {
                        Stage::SearchSecondary
                    }
                }
                Stage::SearchSecondary => {
                    let outcome = self.search_secondary(&state.intent).await;
                    merge(&mut state, outcome);
                    Stage::AggregateResults
                }
                Stage::AggregateResults => {
                    let agg = aggregate(&state.raw_results);
                    state.filtered_results = agg.filtered;
                    state.confidence_scores = agg.confidence;
                    Stage::Summarize
                }
                Stage::Summarize => {
                    state.summary = self
                        .narrator
                        .summarize(
                            query,
                            &state.filtered_results,
                            &state.intent,
                            &state.confidence_scores,
                        )
                        .await
                        .map_err(|source| AgentError::Summarization { source })?;
                    Stage::Done
                }
                Stage::Done => break,
            };
        }

        Ok(state)
    }

    /// Search the primary vocabulary. Its results are always stored, even
    /// when empty: the primary system's absence of results is itself signal
    /// for the aggregator.
    async fn search_primary(&self, intent: &SearchIntent) -> DispatchOutcome {
        let hits = self
            .search
            .search(intent.primary_system, &intent.refined_query, PRIMARY_LIMIT)
            .await;

        let mut outcome = DispatchOutcome::default();
        outcome.calls.push(ApiCall {
            system: intent.primary_system,
            query: intent.refined_query.clone(),
            result_count: hits.len(),
        });
        outcome.results.insert(intent.primary_system, hits);
        outcome
    }

    /// Fan out to at most the first [`MAX_SECONDARY`] secondary vocabularies
    /// concurrently. Every attempt lands in the audit trail; only non-empty
    /// result lists are stored.
    async fn search_secondary(&self, intent: &SearchIntent) -> DispatchOutcome {
        let targets: Vec<CodingSystem> = intent
            .secondary_systems
            .iter()
            .copied()
            .take(MAX_SECONDARY)
            .collect();

        let searches = targets.into_iter().map(|system| {
            let search = Arc::clone(&self.search);
            let query = intent.refined_query.clone();
            async move {
                let hits = search.search(system, &query, SECONDARY_LIMIT).await;
                (system, query, hits)
            }
        });

        let mut outcome = DispatchOutcome::default();
        for (system, query, hits) in join_all(searches).await {
            outcome.calls.push(ApiCall {
                system,
                query,
                result_count: hits.len(),
            });
            if !hits.is_empty() {
                outcome.results.insert(system, hits);
            }
        }
        outcome
    }
}

/// Merge a dispatch stage's partial update into the running state. Dispatch
/// stages write disjoint result keys, so extend is last-writer-wins in name
/// only.
fn merge(state: &mut PipelineState, outcome: DispatchOutcome) {
    state.api_calls.extend(outcome.calls);
    state.raw_results.extend(outcome.results);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::ConceptKind;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Search stub with canned per-vocabulary results and a call recorder
    struct StubSearch {
        results: BTreeMap<CodingSystem, Vec<CodeHit>>,
        calls: Mutex<Vec<(CodingSystem, usize)>>,
    }

    impl StubSearch {
        fn new(results: BTreeMap<CodingSystem, Vec<CodeHit>>) -> Arc<Self> {
            Arc::new(Self {
                results,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn recorded_calls(&self) -> Vec<(CodingSystem, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VocabularySearch for StubSearch {
        async fn search(&self, system: CodingSystem, _query: &str, limit: usize) -> Vec<CodeHit> {
            self.calls.lock().unwrap().push((system, limit));
            self.results.get(&system).cloned().unwrap_or_default()
        }
    }

    /// Completion stub: canned classification JSON, echoing narrator
    struct StubCompletion {
        intent_json: Option<String>,
        narrate: bool,
    }

    #[async_trait]
    impl CompletionClient for StubCompletion {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            if self.narrate {
                Ok(format!("Explanation of matches.\n{}", user))
            } else {
                Err(anyhow!("narrator offline"))
            }
        }

        async fn complete_json(&self, _system: &str, _user: &str) -> Result<String> {
            self.intent_json
                .clone()
                .ok_or_else(|| anyhow!("classifier offline"))
        }

        fn model_name(&self) -> &str {
            "stub"
        }

        fn provider_name(&self) -> &str {
            "Stub"
        }
    }

    fn hit(system: CodingSystem, code: &str, display: &str) -> CodeHit {
        CodeHit {
            code: code.to_string(),
            display: display.to_string(),
            system,
            relevance: None,
        }
    }

    fn icd_intent_json(secondaries: &[&str]) -> String {
        let list: Vec<String> = secondaries.iter().map(|s| format!("\"{s}\"")).collect();
        format!(
            r#"{{"primary_system": "icd10cm", "secondary_systems": [{}], "refined_query": "diabetes type 2", "concept_type": "diagnosis"}}"#,
            list.join(", ")
        )
    }

    fn agent_with(
        intent_json: &str,
        search: Arc<StubSearch>,
    ) -> CodeFinderAgent {
        let completion = Arc::new(StubCompletion {
            intent_json: Some(intent_json.to_string()),
            narrate: true,
        });
        CodeFinderAgent::new(completion, search)
    }

    #[tokio::test]
    async fn test_secondary_fanout_capped_at_three() {
        let mut results = BTreeMap::new();
        results.insert(
            CodingSystem::Icd10Cm,
            vec![hit(CodingSystem::Icd10Cm, "E11.9", "Type 2 diabetes")],
        );
        let search = StubSearch::new(results);
        let agent = agent_with(
            &icd_intent_json(&["loinc", "rxnorm", "hcpcs", "ucum"]),
            Arc::clone(&search),
        );

        agent.run("diabetes type 2", &[]).await.unwrap();

        let calls = search.recorded_calls();
        assert_eq!(calls.len(), 4); // 1 primary + 3 secondary
        assert_eq!(calls[0], (CodingSystem::Icd10Cm, PRIMARY_LIMIT));
        let secondaries: Vec<CodingSystem> = calls[1..].iter().map(|(s, _)| *s).collect();
        assert_eq!(
            secondaries,
            vec![CodingSystem::Loinc, CodingSystem::RxNorm, CodingSystem::Hcpcs]
        );
        assert!(!secondaries.contains(&CodingSystem::Ucum));
        for (_, limit) in &calls[1..] {
            assert_eq!(*limit, SECONDARY_LIMIT);
        }
    }

    #[tokio::test]
    async fn test_primary_zero_results_recorded_secondary_zero_not_stored() {
        // Primary (ICD) and secondary (LOINC) both return nothing
        let search = StubSearch::new(BTreeMap::new());
        let agent = agent_with(&icd_intent_json(&["loinc"]), Arc::clone(&search));

        let state = agent.run("diabetes type 2", &[]).await.unwrap();

        // Primary: audit entry with count 0 AND raw-results key present
        let primary_call = &state.api_calls[0];
        assert_eq!(primary_call.system, CodingSystem::Icd10Cm);
        assert_eq!(primary_call.result_count, 0);
        assert!(state.raw_results.contains_key(&CodingSystem::Icd10Cm));
        assert!(state.raw_results[&CodingSystem::Icd10Cm].is_empty());

        // Secondary: audit entry present, no raw-results key
        let loinc_call = state
            .api_calls
            .iter()
            .find(|c| c.system == CodingSystem::Loinc)
            .unwrap();
        assert_eq!(loinc_call.result_count, 0);
        assert!(!state.raw_results.contains_key(&CodingSystem::Loinc));
    }

    #[tokio::test]
    async fn test_branch_skipped_without_secondaries() {
        let mut results = BTreeMap::new();
        results.insert(
            CodingSystem::Icd10Cm,
            vec![hit(CodingSystem::Icd10Cm, "E11.9", "Type 2 diabetes")],
        );
        let search = StubSearch::new(results);
        let agent = agent_with(&icd_intent_json(&[]), Arc::clone(&search));

        let state = agent.run("diabetes type 2", &[]).await.unwrap();

        assert_eq!(search.recorded_calls().len(), 1);
        assert_eq!(state.api_calls.len(), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_diabetes() {
        let mut results = BTreeMap::new();
        results.insert(
            CodingSystem::Icd10Cm,
            vec![
                hit(
                    CodingSystem::Icd10Cm,
                    "E11.9",
                    "Type 2 diabetes mellitus without complications",
                ),
                hit(
                    CodingSystem::Icd10Cm,
                    "E11.65",
                    "Type 2 diabetes mellitus with hyperglycemia",
                ),
            ],
        );
        let search = StubSearch::new(results);
        let agent = agent_with(&icd_intent_json(&[]), search);

        let state = agent.run("diabetes type 2", &[]).await.unwrap();

        assert_eq!(state.intent.primary_system, CodingSystem::Icd10Cm);
        assert_eq!(state.intent.concept, ConceptKind::Diagnosis);
        assert!(!state.filtered_results[&CodingSystem::Icd10Cm].is_empty());
        assert!(state.confidence_scores[&CodingSystem::Icd10Cm] > 0.0);
        assert!(!state.summary.is_empty());
        assert!(state.summary.contains("diabetes type 2"));

        let turn = state.to_turn();
        assert_eq!(turn.concept, ConceptKind::Diagnosis);
        assert_eq!(turn.result_count, 1);
    }

    #[tokio::test]
    async fn test_summarization_failure_surfaces() {
        let search = StubSearch::new(BTreeMap::new());
        let completion = Arc::new(StubCompletion {
            intent_json: Some(icd_intent_json(&[])),
            narrate: false,
        });
        let agent = CodeFinderAgent::new(completion, search);

        let result = agent.run("diabetes type 2", &[]).await;
        assert!(matches!(result, Err(AgentError::Summarization { .. })));
    }

    #[tokio::test]
    async fn test_classifier_failure_still_completes_run() {
        let search = StubSearch::new(BTreeMap::new());
        let completion = Arc::new(StubCompletion {
            intent_json: None,
            narrate: true,
        });
        let agent = CodeFinderAgent::new(completion, search);

        let state = agent.run("rare query", &[]).await.unwrap();
        assert_eq!(state.intent.primary_system, CodingSystem::Icd10Cm);
        assert_eq!(state.intent.refined_query, "rare query");
        assert!(!state.summary.is_empty());
    }
}

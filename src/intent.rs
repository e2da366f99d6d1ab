//! Intent Resolver
//!
//! Classifies a free-text clinical query into a [`SearchIntent`]: which
//! vocabulary to search first, which to fan out to, a refined search term,
//! and the concept category. Classification is delegated to the completion
//! service; every failure path degrades to a deterministic fallback, so
//! `classify` never fails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::completion::CompletionClient;
use crate::vocabulary::{CodingSystem, ConceptKind};

/// Classifier instruction set: enumerates the six vocabularies, the concept
/// categories, and the domain-specific query-refinement rules.
const CLASSIFY_SYSTEM_PROMPT: &str = r#"Analyze medical queries and return strict JSON with:
- primary_system: one of [icd10cm, loinc, rxnorm, hcpcs, ucum, hpo]
- secondary_systems: list of other relevant systems
- refined_query: search term
- concept_type: one of [diagnosis, lab, drug, equipment, unit, phenotype]

Examples:
"diabetes" -> primary: icd10cm, type: diagnosis
"glucose test" -> primary: loinc, type: lab
"wheelchair" -> primary: hcpcs, type: equipment
"mg/dL" -> primary: ucum, type: unit
"ataxia" -> primary: hpo, type: phenotype
"metformin" -> primary: rxnorm, type: drug

Never interpret equipment/supply queries as diagnoses.
If type is diagnosis or lab, do not map to type drug.
Identify secondary systems as applicable as well.
Consider the conversation context when resolving references like 'it', 'that', or 'those'.
When refining queries about lab tests for conditions, use the most specific common test:
- high cholesterol -> lipid profile
- kidney disease -> creatinine, eGFR
- liver disease -> liver function panel, ALT/AST
- thyroid -> TSH, T3/T4
- anemia -> CBC, hemoglobin
Return only the JSON, no explanations."#;

/// Resolved search intent for one query run. Created once per run, never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIntent {
    /// The vocabulary to search first, always a valid member
    pub primary_system: CodingSystem,
    /// Additional vocabularies worth fanning out to, in preference order
    pub secondary_systems: Vec<CodingSystem>,
    /// Search term submitted to the vocabularies, may differ from the raw query
    pub refined_query: String,
    /// Concept category the query was classified as
    pub concept: ConceptKind,
}

impl SearchIntent {
    /// Deterministic fallback used when the completion call itself fails:
    /// ICD-10 primary with the raw query untouched.
    pub fn fallback(query: &str) -> Self {
        Self {
            primary_system: CodingSystem::Icd10Cm,
            secondary_systems: Vec::new(),
            refined_query: query.to_string(),
            concept: ConceptKind::Unknown,
        }
    }
}

/// One prior turn of the conversational trail, retained by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// The raw query of that turn
    pub query: String,
    /// Concept category it resolved to
    pub concept: ConceptKind,
    /// Refined query it resolved to
    pub refined_query: String,
    /// How many vocabularies returned results
    pub result_count: usize,
}

/// Shape of the JSON object the classifier is asked to return
#[derive(Debug, Deserialize)]
struct RawIntent {
    primary_system: String,
    #[serde(default)]
    secondary_systems: Vec<String>,
    refined_query: Option<String>,
    concept_type: Option<String>,
}

/// LLM-backed intent classifier
pub struct IntentResolver {
    client: Arc<dyn CompletionClient>,
}

impl IntentResolver {
    /// Create a resolver over an injected completion client
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Classify a query in the light of recent conversation. Never fails.
    pub async fn classify(&self, query: &str, history: &[ConversationTurn]) -> SearchIntent {
        let context = build_context(history);
        let user_prompt = format!("{}\n\nCurrent query: {}", context, query);

        let response = match self
            .client
            .complete_json(CLASSIFY_SYSTEM_PROMPT, &user_prompt)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "intent classification call failed");
                return SearchIntent::fallback(query);
            }
        };

        tracing::debug!(response = %response, "classification response");

        match extract_json_object(&response).and_then(|json| parse_intent(json, query)) {
            Some(intent) => {
                tracing::info!(
                    concept = %intent.concept,
                    primary = %intent.primary_system,
                    refined = %intent.refined_query,
                    "classified intent"
                );
                intent
            }
            None => {
                tracing::warn!("unusable classification response, using keyword fallback");
                keyword_fallback(query)
            }
        }
    }
}

/// Render at most the last 3 turns as classifier context
fn build_context(history: &[ConversationTurn]) -> String {
    let start = history.len().saturating_sub(3);
    let parts: Vec<String> = history[start..]
        .iter()
        .map(|turn| {
            format!(
                "Query: '{}' -> Found {} ({})",
                turn.query, turn.concept, turn.refined_query
            )
        })
        .collect();

    if parts.is_empty() {
        "No previous context".to_string()
    } else {
        parts.join("\n")
    }
}

/// Extract the first balanced JSON object from completion text, tolerating
/// surrounding prose. Brace tracking is string-aware so embedded `{`/`}` in
/// values do not unbalance the scan.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the classifier's JSON into a SearchIntent. Returns None when the
/// JSON is malformed or names a vocabulary outside the six recognized values;
/// an unrecognized vocabulary must fail the whole classification rather than
/// be silently dropped.
fn parse_intent(json: &str, query: &str) -> Option<SearchIntent> {
    let raw: RawIntent = serde_json::from_str(json).ok()?;

    let primary_system = raw.primary_system.parse::<CodingSystem>().ok()?;
    let mut secondary_systems = Vec::with_capacity(raw.secondary_systems.len());
    for name in &raw.secondary_systems {
        secondary_systems.push(name.parse::<CodingSystem>().ok()?);
    }

    Some(SearchIntent {
        primary_system,
        secondary_systems,
        refined_query: raw
            .refined_query
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| query.to_string()),
        concept: raw
            .concept_type
            .as_deref()
            .map(ConceptKind::parse_lossy)
            .unwrap_or_default(),
    })
}

/// Three-rule keyword matcher used when the completion responds but its
/// output is unusable
fn keyword_fallback(query: &str) -> SearchIntent {
    let query_lower = query.to_lowercase();
    let contains_any =
        |words: &[&str]| words.iter().any(|w| query_lower.contains(w));

    if contains_any(&["diabetes", "hypertension", "infection"]) {
        SearchIntent {
            primary_system: CodingSystem::Icd10Cm,
            secondary_systems: Vec::new(),
            refined_query: query.to_string(),
            concept: ConceptKind::Diagnosis,
        }
    } else if contains_any(&["test", "lab", "glucose", "hemoglobin"]) {
        SearchIntent {
            primary_system: CodingSystem::Loinc,
            secondary_systems: Vec::new(),
            refined_query: query.to_string(),
            concept: ConceptKind::Lab,
        }
    } else if contains_any(&["mg", "tablet", "medication", "drug"]) {
        SearchIntent {
            primary_system: CodingSystem::RxNorm,
            secondary_systems: Vec::new(),
            refined_query: query.to_string(),
            concept: ConceptKind::Drug,
        }
    } else {
        SearchIntent {
            primary_system: CodingSystem::Icd10Cm,
            secondary_systems: vec![CodingSystem::Loinc],
            refined_query: query.to_string(),
            concept: ConceptKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    /// Completion stub returning a canned response or a failure
    struct StubCompletion {
        response: Option<String>,
    }

    impl StubCompletion {
        fn ok(text: &str) -> Arc<dyn CompletionClient> {
            Arc::new(Self {
                response: Some(text.to_string()),
            })
        }

        fn failing() -> Arc<dyn CompletionClient> {
            Arc::new(Self { response: None })
        }
    }

    #[async_trait]
    impl CompletionClient for StubCompletion {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            self.response
                .clone()
                .ok_or_else(|| anyhow!("provider unavailable"))
        }

        async fn complete_json(&self, system: &str, user: &str) -> Result<String> {
            self.complete(system, user).await
        }

        fn model_name(&self) -> &str {
            "stub"
        }

        fn provider_name(&self) -> &str {
            "Stub"
        }
    }

    #[test]
    fn test_extract_json_from_prose() {
        let text = r#"Sure! Here is the classification: {"primary_system": "loinc", "secondary_systems": []} Hope that helps."#;
        let json = extract_json_object(text).unwrap();
        assert!(json.starts_with('{') && json.ends_with('}'));
        assert!(json.contains("loinc"));
    }

    #[test]
    fn test_extract_json_nested_and_braces_in_strings() {
        let text = r#"{"refined_query": "a {weird} term", "inner": {"x": 1}} trailing"#;
        let json = extract_json_object(text).unwrap();
        assert_eq!(json, r#"{"refined_query": "a {weird} term", "inner": {"x": 1}}"#);
    }

    #[test]
    fn test_extract_json_none_when_absent() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{unclosed").is_none());
    }

    #[test]
    fn test_parse_intent_rejects_unknown_system() {
        let json = r#"{"primary_system": "icd10cm", "secondary_systems": ["snomed"]}"#;
        assert!(parse_intent(json, "q").is_none());

        let json = r#"{"primary_system": "snomed"}"#;
        assert!(parse_intent(json, "q").is_none());
    }

    #[test]
    fn test_parse_intent_defaults() {
        let json = r#"{"primary_system": "ucum"}"#;
        let intent = parse_intent(json, "mg/dL").unwrap();
        assert_eq!(intent.primary_system, CodingSystem::Ucum);
        assert!(intent.secondary_systems.is_empty());
        assert_eq!(intent.refined_query, "mg/dL");
        assert_eq!(intent.concept, ConceptKind::Unknown);
    }

    #[test]
    fn test_keyword_fallback_rules() {
        let intent = keyword_fallback("diabetes complications");
        assert_eq!(intent.primary_system, CodingSystem::Icd10Cm);
        assert_eq!(intent.concept, ConceptKind::Diagnosis);

        let intent = keyword_fallback("glucose levels");
        assert_eq!(intent.primary_system, CodingSystem::Loinc);

        let intent = keyword_fallback("metformin 500 mg");
        assert_eq!(intent.primary_system, CodingSystem::RxNorm);

        let intent = keyword_fallback("something else entirely");
        assert_eq!(intent.primary_system, CodingSystem::Icd10Cm);
        assert_eq!(intent.secondary_systems, vec![CodingSystem::Loinc]);
    }

    #[test]
    fn test_build_context_caps_at_three_turns() {
        let turns: Vec<ConversationTurn> = (0..5)
            .map(|i| ConversationTurn {
                query: format!("q{i}"),
                concept: ConceptKind::Lab,
                refined_query: format!("r{i}"),
                result_count: 1,
            })
            .collect();

        let context = build_context(&turns);
        assert!(!context.contains("q0"));
        assert!(!context.contains("q1"));
        assert!(context.contains("q2"));
        assert!(context.contains("q4"));
    }

    #[tokio::test]
    async fn test_wheelchair_classifies_as_equipment() {
        let client = StubCompletion::ok(
            r#"{"primary_system": "hcpcs", "secondary_systems": [], "refined_query": "wheelchair", "concept_type": "equipment"}"#,
        );
        let resolver = IntentResolver::new(client);

        let intent = resolver.classify("wheelchair", &[]).await;
        assert_eq!(intent.primary_system, CodingSystem::Hcpcs);
        assert_eq!(intent.concept, ConceptKind::Equipment);
        assert_ne!(intent.concept, ConceptKind::Diagnosis);
    }

    #[tokio::test]
    async fn test_completion_failure_degrades_to_icd_fallback() {
        let resolver = IntentResolver::new(StubCompletion::failing());

        let intent = resolver.classify("anything at all", &[]).await;
        assert_eq!(intent.primary_system, CodingSystem::Icd10Cm);
        assert_eq!(intent.refined_query, "anything at all");
        assert!(intent.secondary_systems.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_system_in_response_falls_back() {
        let client = StubCompletion::ok(
            r#"{"primary_system": "meddra", "refined_query": "x", "concept_type": "diagnosis"}"#,
        );
        let resolver = IntentResolver::new(client);

        let intent = resolver.classify("diabetes", &[]).await;
        // Keyword fallback, not a silently dropped system
        assert_eq!(intent.primary_system, CodingSystem::Icd10Cm);
        assert_eq!(intent.refined_query, "diabetes");
    }
}

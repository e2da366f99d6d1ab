//! Clinical Tables Search Adapter
//!
//! Normalizes the NIH Clinical Tables API's heterogeneous per-vocabulary
//! responses into uniform [`CodeHit`] records. The six vocabularies share one
//! transport but disagree on field layout; the per-vocabulary field tables
//! live on [`CodingSystem`] so the adapter body stays branch-free.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::vocabulary::CodingSystem;

/// Default Clinical Tables API base URL
const DEFAULT_BASE_URL: &str = "https://clinicaltables.nlm.nih.gov/api";

/// Index into the response envelope where result rows live.
///
/// Every Clinical Tables endpoint returns a 4-element array:
/// `[total, codes, extra, display_rows]`.
const RESULT_INDEX: usize = 3;

/// A code normalized out of one vocabulary's raw response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeHit {
    /// The code itself (e.g. "E11.9")
    pub code: String,
    /// Display label, never empty - synthesized when the source omits it
    pub display: String,
    /// Source vocabulary
    pub system: CodingSystem,
    /// Relevance score populated by the aggregator, absent before aggregation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

/// Seam for vocabulary search, so the pipeline can be exercised without the
/// remote service.
#[async_trait]
pub trait VocabularySearch: Send + Sync {
    /// Search one vocabulary. Never fails: transport or shape errors degrade
    /// to an empty result list for that vocabulary only.
    async fn search(&self, system: CodingSystem, query: &str, limit: usize) -> Vec<CodeHit>;
}

/// HTTP client for the Clinical Tables search service
#[derive(Clone)]
pub struct ClinicalTablesClient {
    client: reqwest::Client,
    base_url: String,
}

impl ClinicalTablesClient {
    /// Create a client against the production Clinical Tables service
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client against a specific base URL
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create from environment, honoring `CLINICAL_TABLES_BASE_URL`
    pub fn from_env() -> Result<Self> {
        match std::env::var("CLINICAL_TABLES_BASE_URL") {
            Ok(url) => Self::with_base_url(&url),
            Err(_) => Self::new(),
        }
    }

    async fn call_api(&self, system: CodingSystem, query: &str, limit: usize) -> Result<Value> {
        let url = format!("{}/{}/v3/search", self.base_url, system.endpoint());

        tracing::info!(system = %system, query, "searching clinical tables");

        let max_list = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("sf", system.search_fields()),
                ("df", system.display_fields()),
                ("maxList", max_list.as_str()),
                ("terms", query),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("clinical tables error {} for {}: {}", status, system, body));
        }

        Ok(response.json().await?)
    }
}

/// Parse one vocabulary's raw response envelope into normalized hits.
///
/// Guards: a missing or malformed envelope yields zero results; rows with
/// fewer than two positional fields are skipped; a blank display label is
/// replaced by `"<VOCABULARY-UPPER>: <code>"`.
pub fn parse_response(system: CodingSystem, body: &Value, limit: usize) -> Vec<CodeHit> {
    let rows = match body.get(RESULT_INDEX).and_then(Value::as_array) {
        Some(rows) => rows,
        None => {
            tracing::warn!(system = %system, "unexpected response envelope, treating as zero results");
            return Vec::new();
        }
    };

    let mut hits = Vec::new();
    for row in rows.iter().take(limit) {
        let fields = match row.as_array() {
            Some(fields) if fields.len() >= 2 => fields,
            _ => continue,
        };

        let code = value_as_text(&fields[0]);
        let mut display = value_as_text(&fields[1]);
        if display.trim().is_empty() {
            display = format!("{}: {}", system.as_str().to_uppercase(), code);
        }

        hits.push(CodeHit {
            code,
            display,
            system,
            relevance: None,
        });
    }
    hits
}

/// Positional fields are usually strings but RxTerms returns code arrays
fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

#[async_trait]
impl VocabularySearch for ClinicalTablesClient {
    async fn search(&self, system: CodingSystem, query: &str, limit: usize) -> Vec<CodeHit> {
        match self.call_api(system, query, limit).await {
            Ok(body) => {
                let hits = parse_response(system, &body, limit);
                tracing::info!(system = %system, count = hits.len(), "search complete");
                hits
            }
            Err(e) => {
                tracing::error!(system = %system, error = %e, "search failed");
                Vec::new()
            }
        }
    }
}

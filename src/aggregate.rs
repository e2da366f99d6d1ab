//! Result Aggregator
//!
//! Collapses per-vocabulary raw result lists into a filtered, ranked set plus
//! a confidence score per vocabulary. Pure function, no I/O.
//!
//! Policy: trust the remote service's own ranking. Per vocabulary with
//! results, keep the first [`KEEP_PER_SYSTEM`] hits verbatim and score
//! confidence from the raw result count. Vocabularies with zero raw results
//! are omitted from both output maps.

use std::collections::BTreeMap;

use crate::search::CodeHit;
use crate::vocabulary::CodingSystem;

/// How many hits to keep per vocabulary
const KEEP_PER_SYSTEM: usize = 5;

/// Raw count at which confidence saturates at 1.0
const FULL_CONFIDENCE_COUNT: f64 = 10.0;

/// Output of aggregation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOutcome {
    /// Kept hits per vocabulary, relevance populated
    pub filtered: BTreeMap<CodingSystem, Vec<CodeHit>>,
    /// Confidence per vocabulary, in (0.0, 1.0]
    pub confidence: BTreeMap<CodingSystem, f64>,
}

/// Aggregate raw per-vocabulary results into filtered results and confidence
/// scores
pub fn aggregate(raw_results: &BTreeMap<CodingSystem, Vec<CodeHit>>) -> AggregateOutcome {
    let mut outcome = AggregateOutcome::default();

    for (&system, hits) in raw_results {
        if hits.is_empty() {
            continue;
        }

        let confidence = (hits.len() as f64 / FULL_CONFIDENCE_COUNT).min(1.0);

        let kept: Vec<CodeHit> = hits
            .iter()
            .take(KEEP_PER_SYSTEM)
            .map(|hit| CodeHit {
                relevance: Some(confidence),
                ..hit.clone()
            })
            .collect();

        outcome.filtered.insert(system, kept);
        outcome.confidence.insert(system, confidence);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(system: CodingSystem, n: usize) -> Vec<CodeHit> {
        (0..n)
            .map(|i| CodeHit {
                code: format!("C{i}"),
                display: format!("Code {i}"),
                system,
                relevance: None,
            })
            .collect()
    }

    #[test]
    fn test_count_based_confidence() {
        let mut raw = BTreeMap::new();
        raw.insert(CodingSystem::Icd10Cm, hits(CodingSystem::Icd10Cm, 12));
        raw.insert(CodingSystem::Loinc, hits(CodingSystem::Loinc, 3));

        let outcome = aggregate(&raw);
        assert_eq!(outcome.confidence[&CodingSystem::Icd10Cm], 1.0);
        assert_eq!(outcome.confidence[&CodingSystem::Loinc], 0.3);
        assert_eq!(outcome.filtered[&CodingSystem::Icd10Cm].len(), 5);
        assert_eq!(outcome.filtered[&CodingSystem::Loinc].len(), 3);
    }

    #[test]
    fn test_remote_order_preserved() {
        let mut raw = BTreeMap::new();
        raw.insert(CodingSystem::Hpo, hits(CodingSystem::Hpo, 7));

        let outcome = aggregate(&raw);
        let kept = &outcome.filtered[&CodingSystem::Hpo];
        let codes: Vec<&str> = kept.iter().map(|h| h.code.as_str()).collect();
        assert_eq!(codes, vec!["C0", "C1", "C2", "C3", "C4"]);
    }

    #[test]
    fn test_empty_vocabulary_omitted() {
        let mut raw = BTreeMap::new();
        raw.insert(CodingSystem::Icd10Cm, Vec::new());
        raw.insert(CodingSystem::Ucum, hits(CodingSystem::Ucum, 1));

        let outcome = aggregate(&raw);
        assert!(!outcome.filtered.contains_key(&CodingSystem::Icd10Cm));
        assert!(!outcome.confidence.contains_key(&CodingSystem::Icd10Cm));
        assert_eq!(outcome.confidence[&CodingSystem::Ucum], 0.1);
    }

    #[test]
    fn test_idempotent() {
        let mut raw = BTreeMap::new();
        raw.insert(CodingSystem::RxNorm, hits(CodingSystem::RxNorm, 6));
        raw.insert(CodingSystem::Loinc, hits(CodingSystem::Loinc, 2));

        let first = aggregate(&raw);
        let second = aggregate(&raw);
        assert_eq!(first, second);
    }

    #[test]
    fn test_relevance_populated_on_kept_hits() {
        let mut raw = BTreeMap::new();
        raw.insert(CodingSystem::Hcpcs, hits(CodingSystem::Hcpcs, 4));

        let outcome = aggregate(&raw);
        for hit in &outcome.filtered[&CodingSystem::Hcpcs] {
            assert_eq!(hit.relevance, Some(0.4));
        }
    }
}

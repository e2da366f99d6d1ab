//! Coding System Vocabularies
//!
//! Closed enumeration of the six medical coding vocabularies the agent can
//! query, plus the per-vocabulary request/parse configuration for the NIH
//! Clinical Tables API. Adding a vocabulary is a single-point change here:
//! every table is an exhaustive `match`, so the compiler flags any arm a new
//! member is missing from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A medical coding vocabulary searchable through Clinical Tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodingSystem {
    /// ICD-10-CM diagnosis codes
    Icd10Cm,
    /// LOINC laboratory observations
    Loinc,
    /// RxTerms drug names and strengths (RxNorm-derived)
    RxNorm,
    /// HCPCS procedure/equipment/supply codes
    Hcpcs,
    /// UCUM units of measure
    Ucum,
    /// Human Phenotype Ontology terms
    Hpo,
}

impl CodingSystem {
    /// All six vocabularies, in classifier-prompt order
    pub const ALL: [CodingSystem; 6] = [
        CodingSystem::Icd10Cm,
        CodingSystem::Loinc,
        CodingSystem::RxNorm,
        CodingSystem::Hcpcs,
        CodingSystem::Ucum,
        CodingSystem::Hpo,
    ];

    /// Canonical lowercase name, used as the key in results and audit output
    pub fn as_str(&self) -> &'static str {
        match self {
            CodingSystem::Icd10Cm => "icd10cm",
            CodingSystem::Loinc => "loinc",
            CodingSystem::RxNorm => "rxnorm",
            CodingSystem::Hcpcs => "hcpcs",
            CodingSystem::Ucum => "ucum",
            CodingSystem::Hpo => "hpo",
        }
    }

    /// Clinical Tables endpoint path segment
    pub fn endpoint(&self) -> &'static str {
        match self {
            CodingSystem::Icd10Cm => "icd10cm",
            CodingSystem::Loinc => "loinc_items",
            CodingSystem::RxNorm => "rxterms",
            CodingSystem::Hcpcs => "hcpcs",
            CodingSystem::Ucum => "ucum",
            CodingSystem::Hpo => "hpo",
        }
    }

    /// Fields the remote service should search over (`sf` parameter)
    pub fn search_fields(&self) -> &'static str {
        match self {
            CodingSystem::Icd10Cm => "code,name",
            CodingSystem::Loinc => {
                "text,COMPONENT,CONSUMER_NAME,RELATEDNAMES2,METHOD_TYP,SHORTNAME,LONG_COMMON_NAME,LOINC_NUM"
            }
            CodingSystem::RxNorm => "DISPLAY_NAME,STRENGTHS_AND_FORMS,DISPLAY_NAME_SYNONYM",
            CodingSystem::Hcpcs => "code,short_desc,long_desc",
            CodingSystem::Ucum => "cs_code,name,synonyms,cs_code_tokens",
            CodingSystem::Hpo => "id,name,synonym.term",
        }
    }

    /// Fields the remote service should return (`df` parameter).
    ///
    /// Always two fields: positional field 0 is the code, field 1 the display.
    pub fn display_fields(&self) -> &'static str {
        match self {
            CodingSystem::Icd10Cm => "code,name",
            CodingSystem::Loinc => "LOINC_NUM,LONG_COMMON_NAME",
            CodingSystem::RxNorm => "RXCUIS,DISPLAY_NAME",
            CodingSystem::Hcpcs => "code,display",
            CodingSystem::Ucum => "cs_code,name",
            CodingSystem::Hpo => "id,name",
        }
    }
}

impl fmt::Display for CodingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error type for parsing a CodingSystem name
#[derive(Debug)]
pub struct UnknownSystemError(String);

impl fmt::Display for UnknownSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown coding system '{}'. Valid values: icd10cm, loinc, rxnorm, hcpcs, ucum, hpo",
            self.0
        )
    }
}

impl std::error::Error for UnknownSystemError {}

impl FromStr for CodingSystem {
    type Err = UnknownSystemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "icd10cm" | "icd10" | "icd-10-cm" => Ok(CodingSystem::Icd10Cm),
            "loinc" | "loinc_items" => Ok(CodingSystem::Loinc),
            "rxnorm" | "rxterms" => Ok(CodingSystem::RxNorm),
            "hcpcs" => Ok(CodingSystem::Hcpcs),
            "ucum" => Ok(CodingSystem::Ucum),
            "hpo" => Ok(CodingSystem::Hpo),
            other => Err(UnknownSystemError(other.to_string())),
        }
    }
}

/// The clinical concept category a query resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConceptKind {
    Diagnosis,
    Lab,
    Drug,
    Equipment,
    Unit,
    Phenotype,
    #[default]
    Unknown,
}

impl ConceptKind {
    /// Parse a concept name, mapping anything unrecognized to `Unknown`
    pub fn parse_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "diagnosis" => ConceptKind::Diagnosis,
            "lab" => ConceptKind::Lab,
            "drug" => ConceptKind::Drug,
            "equipment" => ConceptKind::Equipment,
            "unit" => ConceptKind::Unit,
            "phenotype" => ConceptKind::Phenotype,
            _ => ConceptKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptKind::Diagnosis => "diagnosis",
            ConceptKind::Lab => "lab",
            ConceptKind::Drug => "drug",
            ConceptKind::Equipment => "equipment",
            ConceptKind::Unit => "unit",
            ConceptKind::Phenotype => "phenotype",
            ConceptKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ConceptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

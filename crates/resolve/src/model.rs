use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Constituency code recorded when no boundary contains the address or centroid.
pub const UNKNOWN_CONSTITUENCY: &str = "UNKNOWN";

/// UPRN evidence keeps at most this many ranked candidates per postcode.
pub const MAX_UPRN_CANDIDATES: usize = 5;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Address-level point-in-polygon, aggregated per postcode.
    Uprn,
    /// ONS Postcode Directory centroid point-in-polygon.
    Onspd,
    /// MySociety postcode to constituency table.
    MySociety,
}

impl Source {
    /// Share of the total confidence this source can contribute.
    pub fn share(self) -> f64 {
        match self {
            Self::Uprn => 0.50,
            Self::Onspd => 0.25,
            Self::MySociety => 0.25,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uprn => write!(f, "uprn"),
            Self::Onspd => write!(f, "onspd"),
            Self::MySociety => write!(f, "mysociety"),
        }
    }
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// One constituency named by one source, with the source-local weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub code: String,
    pub weight: f64,
}

impl Candidate {
    pub fn new(code: impl Into<String>, weight: f64) -> Self {
        Self {
            code: code.into(),
            weight,
        }
    }

    /// Single-answer sources carry an implicit weight of 1.0.
    pub fn certain(code: impl Into<String>) -> Self {
        Self::new(code, 1.0)
    }
}

/// Descending by weight, then ascending by code.
pub fn rank_order(a_code: &str, a_weight: f64, b_code: &str, b_weight: f64) -> Ordering {
    b_weight.total_cmp(&a_weight).then_with(|| a_code.cmp(b_code))
}

/// Everything known about one postcode, keyed by its canonical (unspaced) form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceBundle {
    pub postcode: String,
    /// Ranked, at most [`MAX_UPRN_CANDIDATES`] entries.
    pub uprn: Vec<Candidate>,
    pub onspd: Option<Candidate>,
    pub mysociety: Option<Candidate>,
}

impl EvidenceBundle {
    pub fn new(postcode: impl Into<String>) -> Self {
        Self {
            postcode: postcode.into(),
            ..Self::default()
        }
    }

    /// Replace UPRN evidence, ranking and truncating it.
    pub fn with_uprn(mut self, candidates: Vec<Candidate>) -> Self {
        self.uprn = rank_uprn(candidates);
        self
    }

    pub fn with_onspd(mut self, code: impl Into<String>) -> Self {
        self.onspd = Some(Candidate::certain(code));
        self
    }

    pub fn with_mysociety(mut self, code: impl Into<String>) -> Self {
        self.mysociety = Some(Candidate::certain(code));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.uprn.is_empty() && self.onspd.is_none() && self.mysociety.is_none()
    }
}

/// Sort UPRN candidates into rank order and keep the top five.
pub fn rank_uprn(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| rank_order(&a.code, a.weight, &b.code, b.weight));
    if candidates.len() > MAX_UPRN_CANDIDATES {
        tracing::debug!(
            dropped = candidates.len() - MAX_UPRN_CANDIDATES,
            "truncating UPRN candidates"
        );
        candidates.truncate(MAX_UPRN_CANDIDATES);
    }
    candidates
}

/// Counters gathered while reading evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub invalid_postcodes: u64,
    pub terminated_postcodes: u64,
    pub skipped_records: u64,
}

/// All bundles for a run, in ascending canonical postcode order.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSet {
    pub bundles: BTreeMap<String, EvidenceBundle>,
    pub stats: LoadStats,
}

/// Pre-loaded evidence plus the optional known-constituency list.
pub struct LookupInput {
    pub evidence: EvidenceSet,
    pub known_constituencies: Option<BTreeSet<String>>,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConstituency {
    pub code: String,
    pub confidence: f64,
}

/// Ranked confidences for one postcode. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMapping {
    pub postcode: String,
    pub constituencies: Vec<ResolvedConstituency>,
}

impl ResolvedMapping {
    pub fn is_empty(&self) -> bool {
        self.constituencies.is_empty()
    }

    pub fn confidence_of(&self, code: &str) -> Option<f64> {
        self.constituencies
            .iter()
            .find(|c| c.code == code)
            .map(|c| c.confidence)
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub postcodes_resolved: u64,
    /// Postcodes present in the input with no usable evidence.
    pub empty_postcodes: u64,
    /// As reported by the sink (CSV lines, or lookup table rows).
    pub rows_written: u64,
    pub truncated_rows: u64,
    pub invalid_postcodes: u64,
    pub terminated_postcodes: u64,
    pub skipped_records: u64,
    pub unknown_constituency_rows: u64,
    pub unknown_constituency_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupResult {
    pub meta: LookupMeta,
    pub summary: RunSummary,
}

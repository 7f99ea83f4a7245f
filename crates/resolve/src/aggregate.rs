use std::collections::{BTreeMap, BTreeSet};

use crate::model::{rank_uprn, Candidate, EvidenceBundle, Source};

/// A single-answer source named two different constituencies for one postcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConflict {
    pub source: Source,
    pub postcode: String,
    pub existing: String,
    pub incoming: String,
}

impl std::fmt::Display for SourceConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} names both '{}' and '{}' for postcode {}",
            self.source, self.existing, self.incoming, self.postcode
        )
    }
}

/// Collects per-source assignments keyed by canonical postcode and turns them
/// into [`EvidenceBundle`]s.
///
/// Postcodes must already be canonical keys; validation happens in the loaders.
#[derive(Debug, Default)]
pub struct SourceAggregator {
    /// postcode -> constituency -> address count
    address_counts: BTreeMap<String, BTreeMap<String, u64>>,
    onspd: BTreeMap<String, String>,
    mysociety: BTreeMap<String, String>,
}

impl SourceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one address. Each address counts once towards its postcode.
    pub fn add_address(&mut self, postcode: &str, constituency: &str) {
        *self
            .address_counts
            .entry(postcode.to_string())
            .or_default()
            .entry(constituency.to_string())
            .or_insert(0) += 1;
    }

    pub fn add_onspd(&mut self, postcode: &str, constituency: &str) -> Result<(), SourceConflict> {
        insert_single(&mut self.onspd, Source::Onspd, postcode, constituency)
    }

    pub fn add_mysociety(
        &mut self,
        postcode: &str,
        constituency: &str,
    ) -> Result<(), SourceConflict> {
        insert_single(&mut self.mysociety, Source::MySociety, postcode, constituency)
    }

    /// Evidence for one postcode. Absent sources contribute nothing.
    pub fn bundle_for(&self, postcode: &str) -> EvidenceBundle {
        EvidenceBundle {
            postcode: postcode.to_string(),
            uprn: self
                .address_counts
                .get(postcode)
                .map(uprn_candidates)
                .unwrap_or_default(),
            onspd: self.onspd.get(postcode).map(Candidate::certain),
            mysociety: self.mysociety.get(postcode).map(Candidate::certain),
        }
    }

    /// Every postcode named by any source, ascending by canonical key.
    pub fn postcodes(&self) -> BTreeSet<&str> {
        self.address_counts
            .keys()
            .chain(self.onspd.keys())
            .chain(self.mysociety.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn build(&self) -> BTreeMap<String, EvidenceBundle> {
        self.postcodes()
            .into_iter()
            .map(|postcode| (postcode.to_string(), self.bundle_for(postcode)))
            .collect()
    }
}

fn insert_single(
    map: &mut BTreeMap<String, String>,
    source: Source,
    postcode: &str,
    constituency: &str,
) -> Result<(), SourceConflict> {
    match map.get(postcode) {
        Some(existing) if existing == constituency => Ok(()),
        Some(existing) => Err(SourceConflict {
            source,
            postcode: postcode.to_string(),
            existing: existing.clone(),
            incoming: constituency.to_string(),
        }),
        None => {
            map.insert(postcode.to_string(), constituency.to_string());
            Ok(())
        }
    }
}

/// Proportion of the postcode's addresses per constituency, top five by rank.
pub fn uprn_candidates(counts: &BTreeMap<String, u64>) -> Vec<Candidate> {
    let total: u64 = counts.values().sum();
    if total == 0 {
        return Vec::new();
    }
    let candidates = counts
        .iter()
        .map(|(code, count)| Candidate::new(code.clone(), *count as f64 / total as f64))
        .collect();
    rank_uprn(candidates)
}

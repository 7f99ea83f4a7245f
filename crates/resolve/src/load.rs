//! Evidence loading from CSV, plus the row validation shared with other readers.
//!
//! Two input shapes are supported. The combined shape carries one row per
//! postcode with up to five ranked UPRN pairs and one pair each for ONSPD and
//! MySociety. The sources shape is the three raw tables, which are run
//! through [`SourceAggregator`].

use std::collections::BTreeMap;
use std::io::Read;

use pcon_core::Postcode;

use crate::aggregate::SourceAggregator;
use crate::config::{CorruptPolicy, SourceColumns, SourcesConfig};
use crate::error::ResolveError;
use crate::model::{
    rank_uprn, Candidate, EvidenceBundle, EvidenceSet, LoadStats, MAX_UPRN_CANDIDATES,
    UNKNOWN_CONSTITUENCY,
};

/// UPRN proportions may overshoot 1.0 by rounding in upstream SQL.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Combined rows
// ---------------------------------------------------------------------------

/// Raw `(constituency, confidence)` cells as read from the input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPair {
    pub code: Option<String>,
    pub confidence: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedRow {
    pub postcode: String,
    pub uprn: Vec<RawPair>,
    pub onspd: RawPair,
    pub mysociety: RawPair,
}

pub fn uprn_column(rank: usize) -> String {
    format!("uprn_pcon_{rank}")
}

pub fn uprn_confidence_column(rank: usize) -> String {
    format!("uprn_pcon_{rank}_confidence")
}

/// Column positions of the combined shape within a header row.
#[derive(Debug, Clone)]
pub struct CombinedColumns {
    postcode: usize,
    uprn: Vec<(usize, usize)>,
    onspd: (usize, Option<usize>),
    mysociety: (usize, Option<usize>),
}

impl CombinedColumns {
    /// ONSPD and MySociety confidence columns are optional; everything else is required.
    pub fn locate(input: &str, headers: &[String]) -> Result<Self, ResolveError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| ResolveError::MissingColumn {
                input: input.into(),
                column: name.into(),
            })
        };

        let mut uprn = Vec::with_capacity(MAX_UPRN_CANDIDATES);
        for rank in 1..=MAX_UPRN_CANDIDATES {
            uprn.push((
                require(&uprn_column(rank))?,
                require(&uprn_confidence_column(rank))?,
            ));
        }

        Ok(Self {
            postcode: require("postcode")?,
            uprn,
            onspd: (require("onspd_pcon")?, find("onspd_pcon_confidence")),
            mysociety: (require("mysociety_pcon")?, find("mysociety_pcon_confidence")),
        })
    }

    /// Build a row from a cell accessor. Empty cells become `None`.
    pub fn row<F>(&self, cell: F) -> CombinedRow
    where
        F: Fn(usize) -> Option<String>,
    {
        let get = |idx: usize| cell(idx).filter(|v| !v.trim().is_empty());
        let pair = |(code, confidence): (usize, Option<usize>)| RawPair {
            code: get(code),
            confidence: confidence.and_then(|idx| get(idx)),
        };

        CombinedRow {
            postcode: cell(self.postcode).unwrap_or_default(),
            uprn: self
                .uprn
                .iter()
                .map(|&(code, confidence)| pair((code, Some(confidence))))
                .collect(),
            onspd: pair(self.onspd),
            mysociety: pair(self.mysociety),
        }
    }
}

/// Why a combined row could not become a bundle.
#[derive(Debug, Clone, PartialEq)]
pub enum RowIssue {
    InvalidPostcode,
    Corrupt(String),
}

/// Validate a combined row and turn it into a bundle keyed by canonical postcode.
pub fn bundle_from_row(row: &CombinedRow) -> Result<EvidenceBundle, RowIssue> {
    let key = Postcode::parse(&row.postcode)
        .key()
        .ok_or(RowIssue::InvalidPostcode)?;

    let mut uprn = Vec::new();
    for (i, pair) in row.uprn.iter().enumerate() {
        let Some(ref code) = pair.code else {
            if pair.confidence.is_some() {
                return Err(orphan_confidence(&uprn_confidence_column(i + 1)));
            }
            continue;
        };
        let column = uprn_column(i + 1);
        let raw = pair
            .confidence
            .as_deref()
            .ok_or_else(|| RowIssue::Corrupt(format!("{column} '{code}' has no confidence")))?;
        uprn.push(Candidate::new(code.trim(), parse_weight(&column, raw)?));
    }
    let total: f64 = uprn.iter().map(|c| c.weight).sum();
    if total > 1.0 + WEIGHT_SUM_TOLERANCE {
        return Err(RowIssue::Corrupt(format!(
            "UPRN confidences sum to {total}, above 1.0"
        )));
    }

    Ok(EvidenceBundle {
        postcode: key,
        uprn: rank_uprn(uprn),
        onspd: single_candidate("onspd_pcon", &row.onspd)?,
        mysociety: single_candidate("mysociety_pcon", &row.mysociety)?,
    })
}

fn single_candidate(column: &str, pair: &RawPair) -> Result<Option<Candidate>, RowIssue> {
    let Some(ref code) = pair.code else {
        return match pair.confidence {
            Some(_) => Err(orphan_confidence(&format!("{column}_confidence"))),
            None => Ok(None),
        };
    };
    let weight = match pair.confidence.as_deref() {
        Some(raw) => parse_weight(column, raw)?,
        None => 1.0,
    };
    Ok(Some(Candidate::new(code.trim(), weight)))
}

fn orphan_confidence(column: &str) -> RowIssue {
    RowIssue::Corrupt(format!("{column} is set but its constituency is blank"))
}

fn parse_weight(column: &str, raw: &str) -> Result<f64, RowIssue> {
    let weight: f64 = raw
        .trim()
        .parse()
        .map_err(|_| RowIssue::Corrupt(format!("{column}: cannot parse confidence '{raw}'")))?;
    if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
        return Err(RowIssue::Corrupt(format!(
            "{column}: confidence {weight} outside [0, 1]"
        )));
    }
    Ok(weight)
}

// ---------------------------------------------------------------------------
// Policy + collection
// ---------------------------------------------------------------------------

/// Applies the corrupt-record policy and keeps the load counters.
#[derive(Debug)]
pub struct LoadTally {
    policy: CorruptPolicy,
    stats: LoadStats,
}

impl LoadTally {
    pub fn new(policy: CorruptPolicy) -> Self {
        Self {
            policy,
            stats: LoadStats::default(),
        }
    }

    /// Abort returns the error; skip logs and counts it.
    pub fn corrupt(&mut self, input: &str, line: u64, reason: String) -> Result<(), ResolveError> {
        match self.policy {
            CorruptPolicy::Abort => Err(ResolveError::CorruptRecord {
                input: input.into(),
                line,
                reason,
            }),
            CorruptPolicy::Skip => {
                tracing::warn!(input, line, %reason, "skipping corrupt evidence record");
                self.stats.skipped_records += 1;
                Ok(())
            }
        }
    }

    pub fn invalid_postcode(&mut self, input: &str, line: u64, raw: &str) {
        tracing::warn!(input, line, postcode = raw, "invalid postcode, record skipped");
        self.stats.invalid_postcodes += 1;
    }

    pub fn terminated_postcode(&mut self) {
        self.stats.terminated_postcodes += 1;
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    pub fn into_stats(self) -> LoadStats {
        self.stats
    }
}

/// Accumulates combined rows from any reader into an [`EvidenceSet`].
#[derive(Debug)]
pub struct EvidenceCollector {
    input: String,
    bundles: BTreeMap<String, EvidenceBundle>,
    tally: LoadTally,
}

impl EvidenceCollector {
    pub fn new(input: impl Into<String>, policy: CorruptPolicy) -> Self {
        Self {
            input: input.into(),
            bundles: BTreeMap::new(),
            tally: LoadTally::new(policy),
        }
    }

    pub fn push(&mut self, line: u64, row: &CombinedRow) -> Result<(), ResolveError> {
        match bundle_from_row(row) {
            Ok(bundle) => {
                if self.bundles.contains_key(&bundle.postcode) {
                    let reason = format!("duplicate postcode {}", bundle.postcode);
                    return self.tally.corrupt(&self.input, line, reason);
                }
                self.bundles.insert(bundle.postcode.clone(), bundle);
                Ok(())
            }
            Err(RowIssue::InvalidPostcode) => {
                self.tally.invalid_postcode(&self.input, line, &row.postcode);
                Ok(())
            }
            Err(RowIssue::Corrupt(reason)) => self.tally.corrupt(&self.input, line, reason),
        }
    }

    /// Reject a record that never became a row, such as one with the wrong field count.
    pub fn reject(&mut self, line: u64, reason: String) -> Result<(), ResolveError> {
        self.tally.corrupt(&self.input, line, reason)
    }

    pub fn finish(self) -> EvidenceSet {
        tracing::info!(
            input = %self.input,
            postcodes = self.bundles.len(),
            "loaded combined evidence"
        );
        EvidenceSet {
            bundles: self.bundles,
            stats: self.tally.into_stats(),
        }
    }
}

// ---------------------------------------------------------------------------
// CSV readers
// ---------------------------------------------------------------------------

fn csv_reader<R: Read>(data: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data)
}

fn csv_headers<R: Read>(reader: &mut csv::Reader<R>) -> Result<Vec<String>, ResolveError> {
    Ok(reader
        .headers()
        .map_err(|e| ResolveError::Io(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect())
}

fn record_line(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

/// Field count check for flexible readers; a mismatch is a corrupt record.
fn width_mismatch(headers: &[String], record: &csv::StringRecord) -> Option<String> {
    (record.len() != headers.len()).then(|| {
        format!("expected {} fields, found {}", headers.len(), record.len())
    })
}

/// Load the combined shape from CSV.
pub fn load_combined_csv<R: Read>(
    input: &str,
    data: R,
    policy: CorruptPolicy,
) -> Result<EvidenceSet, ResolveError> {
    let mut reader = csv_reader(data);
    let headers = csv_headers(&mut reader)?;
    let columns = CombinedColumns::locate(input, &headers)?;
    let mut collector = EvidenceCollector::new(input, policy);

    for record in reader.records() {
        let record = record.map_err(|e| ResolveError::Io(format!("{input}: {e}")))?;
        let line = record_line(&record);
        if let Some(reason) = width_mismatch(&headers, &record) {
            collector.reject(line, reason)?;
            continue;
        }
        let row = columns.row(|idx| record.get(idx).map(str::to_string));
        collector.push(line, &row)?;
    }

    Ok(collector.finish())
}

/// One validated row of a raw source table. For the address table each row
/// is one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAssignment {
    /// Canonical key.
    pub postcode: String,
    /// Constituency code, or [`UNKNOWN_CONSTITUENCY`].
    pub constituency: String,
}

/// CSV inputs for the sources shape.
pub struct SourceReaders<A, O, M> {
    pub addresses: A,
    pub onspd: O,
    pub mysociety: M,
}

/// Load the three raw tables and aggregate them per postcode.
pub fn load_sources_csv<A: Read, O: Read, M: Read>(
    config: &SourcesConfig,
    readers: SourceReaders<A, O, M>,
    policy: CorruptPolicy,
) -> Result<EvidenceSet, ResolveError> {
    let mut aggregator = SourceAggregator::new();
    let mut tally = LoadTally::new(policy);

    let mut addresses = 0u64;
    for_each_assignment(
        &config.addresses.file,
        readers.addresses,
        &config.addresses.columns,
        &mut tally,
        |_, a, _| {
            aggregator.add_address(&a.postcode, &a.constituency);
            addresses += 1;
            Ok(())
        },
    )?;
    tracing::info!(addresses, "aggregated address assignments");

    for_each_assignment(
        &config.onspd.file,
        readers.onspd,
        &config.onspd.columns,
        &mut tally,
        |line, a, tally| match aggregator.add_onspd(&a.postcode, &a.constituency) {
            Ok(()) => Ok(()),
            Err(conflict) => tally.corrupt(&config.onspd.file, line, conflict.to_string()),
        },
    )?;

    for_each_assignment(
        &config.mysociety.file,
        readers.mysociety,
        &config.mysociety.columns,
        &mut tally,
        |line, a, tally| {
            match aggregator.add_mysociety(&a.postcode, &a.constituency) {
                Ok(()) => Ok(()),
                Err(conflict) => tally.corrupt(&config.mysociety.file, line, conflict.to_string()),
            }
        },
    )?;

    let bundles = aggregator.build();
    tracing::info!(postcodes = bundles.len(), "aggregated source evidence");
    Ok(EvidenceSet {
        bundles,
        stats: tally.into_stats(),
    })
}

/// Stream validated assignments from one raw source table.
///
/// Invalid postcodes and terminated rows are counted and skipped. A blank
/// constituency becomes [`UNKNOWN_CONSTITUENCY`].
fn for_each_assignment<R, F>(
    input: &str,
    data: R,
    columns: &SourceColumns,
    tally: &mut LoadTally,
    mut f: F,
) -> Result<(), ResolveError>
where
    R: Read,
    F: FnMut(u64, SourceAssignment, &mut LoadTally) -> Result<(), ResolveError>,
{
    let mut reader = csv_reader(data);
    let headers = csv_headers(&mut reader)?;
    let idx = |name: &str| {
        headers.iter().position(|h| h == name).ok_or_else(|| ResolveError::MissingColumn {
            input: input.into(),
            column: name.into(),
        })
    };
    let postcode_idx = idx(&columns.postcode)?;
    let constituency_idx = idx(&columns.constituency)?;
    let terminated_idx = match columns.terminated {
        Some(ref name) => Some(idx(name)?),
        None => None,
    };

    for record in reader.records() {
        let record = record.map_err(|e| ResolveError::Io(format!("{input}: {e}")))?;
        let line = record_line(&record);
        if let Some(reason) = width_mismatch(&headers, &record) {
            tally.corrupt(input, line, reason)?;
            continue;
        }

        if let Some(ti) = terminated_idx {
            if !record.get(ti).unwrap_or("").trim().is_empty() {
                tally.terminated_postcode();
                continue;
            }
        }

        let raw_postcode = record.get(postcode_idx).unwrap_or("");
        let Some(key) = Postcode::parse(raw_postcode).key() else {
            tally.invalid_postcode(input, line, raw_postcode);
            continue;
        };

        let constituency = match record.get(constituency_idx).map(str::trim) {
            Some(code) if !code.is_empty() => code,
            _ => UNKNOWN_CONSTITUENCY,
        };

        let assignment = SourceAssignment {
            postcode: key,
            constituency: constituency.to_string(),
        };
        f(line, assignment, tally)?;
    }

    Ok(())
}

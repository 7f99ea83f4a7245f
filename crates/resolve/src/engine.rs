use std::collections::BTreeSet;

use rayon::prelude::*;

use crate::config::LookupConfig;
use crate::error::ResolveError;
use crate::model::{
    EvidenceBundle, LookupInput, LookupMeta, LookupResult, ResolvedMapping, RunSummary,
};
use crate::resolver::resolve;
use crate::sink::OutputSink;

/// Postcodes resolved per parallel batch before being handed to the sink.
pub const CHUNK_SIZE: usize = 10_000;

/// Resolve every postcode in `input` and write the results to `sink` in
/// ascending canonical postcode order.
///
/// Fails fast: the first sink error or evidence error aborts the batch.
/// Rows already written stay durable.
pub fn run<S: OutputSink>(
    config: &LookupConfig,
    input: &LookupInput,
    mut sink: S,
) -> Result<LookupResult, ResolveError> {
    let run_at = chrono::Utc::now().to_rfc3339();
    let stats = &input.evidence.stats;
    let mut summary = RunSummary {
        invalid_postcodes: stats.invalid_postcodes,
        terminated_postcodes: stats.terminated_postcodes,
        skipped_records: stats.skipped_records,
        ..RunSummary::default()
    };

    sink.initialize().map_err(ResolveError::sink)?;

    let bundles: Vec<&EvidenceBundle> = input.evidence.bundles.values().collect();
    tracing::info!(
        postcodes = bundles.len(),
        parallel = config.parallel,
        "resolving postcodes"
    );

    let mut unknown: BTreeSet<String> = BTreeSet::new();
    for (chunk_no, chunk) in bundles.chunks(CHUNK_SIZE).enumerate() {
        let resolved: Vec<ResolvedMapping> = if config.parallel {
            chunk.par_iter().map(|bundle| resolve(bundle)).collect()
        } else {
            chunk.iter().map(|bundle| resolve(bundle)).collect()
        };

        for mapping in &resolved {
            record_mapping(
                mapping,
                input.known_constituencies.as_ref(),
                &mut unknown,
                &mut summary,
            );
            sink.write_row(mapping).map_err(ResolveError::sink)?;
        }

        tracing::debug!(
            chunk = chunk_no + 1,
            resolved = summary.postcodes_resolved,
            total = bundles.len(),
            "chunk written"
        );
    }

    let sink_stats = sink.finalize().map_err(ResolveError::sink)?;
    summary.rows_written = sink_stats.rows_written;
    summary.truncated_rows = sink_stats.truncated_rows;
    summary.unknown_constituency_codes = unknown.into_iter().collect();

    tracing::info!(
        postcodes = summary.postcodes_resolved,
        rows = summary.rows_written,
        empty = summary.empty_postcodes,
        unknown_rows = summary.unknown_constituency_rows,
        "lookup complete"
    );

    Ok(LookupResult {
        meta: LookupMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at,
        },
        summary,
    })
}

/// Count one resolved postcode and flag constituencies missing from the reference list.
fn record_mapping(
    mapping: &ResolvedMapping,
    known: Option<&BTreeSet<String>>,
    unknown: &mut BTreeSet<String>,
    summary: &mut RunSummary,
) {
    summary.postcodes_resolved += 1;
    if mapping.is_empty() {
        summary.empty_postcodes += 1;
        tracing::debug!(postcode = %mapping.postcode, "no evidence for postcode");
    }

    let Some(known) = known else {
        return;
    };
    let mut row_has_unknown = false;
    for c in &mapping.constituencies {
        if known.contains(&c.code) {
            continue;
        }
        row_has_unknown = true;
        if unknown.insert(c.code.clone()) {
            tracing::warn!(
                code = %c.code,
                postcode = %mapping.postcode,
                "constituency not in reference list"
            );
        }
    }
    if row_has_unknown {
        summary.unknown_constituency_rows += 1;
    }
}

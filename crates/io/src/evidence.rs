//! Evidence input selection.
//!
//! CSV inputs are parsed by `pcon_resolve::load`; this module opens the files
//! and reads the combined shape out of a SQLite table.

use std::fs::File;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use pcon_resolve::config::{CorruptPolicy, EvidenceConfig, LookupConfig};
use pcon_resolve::load::{load_combined_csv, load_sources_csv, CombinedColumns, EvidenceCollector, SourceReaders};
use pcon_resolve::model::EvidenceSet;

use crate::error::StoreError;
use crate::resolve_path;

/// Load evidence as configured. Relative paths are taken from `base_dir`.
pub fn load_evidence(config: &LookupConfig, base_dir: &Path) -> Result<EvidenceSet, StoreError> {
    let policy = config.on_corrupt;
    let set = match &config.evidence {
        EvidenceConfig::CombinedCsv(c) => {
            let path = resolve_path(base_dir, &c.file);
            tracing::info!(path = %path.display(), "reading combined evidence");
            load_combined_csv(&c.file, File::open(&path)?, policy)?
        }
        EvidenceConfig::CombinedSqlite(c) => {
            let path = resolve_path(base_dir, &c.database);
            load_combined_sqlite(&path, &c.table, policy)?
        }
        EvidenceConfig::Sources(s) => {
            let readers = SourceReaders {
                addresses: File::open(resolve_path(base_dir, &s.addresses.file))?,
                onspd: File::open(resolve_path(base_dir, &s.onspd.file))?,
                mysociety: File::open(resolve_path(base_dir, &s.mysociety.file))?,
            };
            tracing::info!("reading source evidence");
            load_sources_csv(s, readers, policy)?
        }
    };

    let stats = &set.stats;
    tracing::info!(
        postcodes = set.bundles.len(),
        invalid = stats.invalid_postcodes,
        terminated = stats.terminated_postcodes,
        skipped = stats.skipped_records,
        "evidence loaded"
    );
    Ok(set)
}

/// Read the combined shape from a SQLite table.
///
/// `table` must already have passed config validation; it is interpolated
/// into the query. Numeric cells are accepted as well as text.
pub fn load_combined_sqlite(
    path: &Path,
    table: &str,
    policy: CorruptPolicy,
) -> Result<EvidenceSet, StoreError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let input = format!("{}:{table}", path.display());
    tracing::info!(input = %input, "reading combined evidence");

    let mut stmt = conn.prepare(&format!("SELECT * FROM \"{table}\""))?;
    let headers: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let columns = CombinedColumns::locate(&input, &headers)?;
    let mut collector = EvidenceCollector::new(input.as_str(), policy);

    let mut rows = stmt.query([])?;
    let mut line = 0u64;
    while let Some(row) = rows.next()? {
        line += 1;
        let combined = columns.row(|idx| row.get_ref(idx).ok().and_then(cell_text));
        collector.push(line, &combined)?;
    }

    Ok(collector.finish())
}

fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

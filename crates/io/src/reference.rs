//! Constituency reference list.
//!
//! The reference CSV names each constituency by short code. It is used to
//! populate the relational `pcon` table and to flag resolved codes that the
//! list does not know about.

use std::collections::{BTreeSet, HashSet};
use std::io::Read;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use pcon_resolve::config::ReferenceColumns;
use pcon_resolve::ResolveError;

use crate::error::StoreError;
use crate::text::read_file_as_utf8;

static NON_ALPHA_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constituency {
    pub short_code: String,
    pub name: String,
    pub slug: String,
}

impl Constituency {
    pub fn new(short_code: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            short_code: short_code.into(),
            slug: slugify(&name),
            name,
        }
    }
}

/// Lowercase, then collapse each run of characters outside `a-z` into `-`.
///
/// Leading and trailing runs are kept, so `"Ynys Môn"` becomes `"ynys-m-n"`.
pub fn slugify(name: &str) -> String {
    NON_ALPHA_RUN
        .replace_all(&name.to_lowercase(), "-")
        .into_owned()
}

/// Parse the reference CSV. Extra columns are ignored.
///
/// Rows with an empty short code are skipped. A repeated short code keeps
/// the first entry.
pub fn load_reference<R: Read>(
    input: &str,
    data: R,
    columns: &ReferenceColumns,
) -> Result<Vec<Constituency>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let idx = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ResolveError::MissingColumn {
                input: input.into(),
                column: name.into(),
            })
    };
    let code_idx = idx(&columns.short_code)?;
    let name_idx = idx(&columns.name)?;

    let mut seen = HashSet::new();
    let mut constituencies = Vec::new();
    for record in reader.records() {
        let record = record?;
        let code = record.get(code_idx).unwrap_or("").trim();
        if code.is_empty() {
            continue;
        }
        if !seen.insert(code.to_string()) {
            tracing::warn!(input, code, "duplicate constituency in reference list, keeping first");
            continue;
        }
        let name = record.get(name_idx).unwrap_or("").trim();
        constituencies.push(Constituency::new(code, name));
    }

    tracing::info!(input, constituencies = constituencies.len(), "loaded reference list");
    Ok(constituencies)
}

/// Read and parse a reference file from disk.
pub fn load_reference_file(
    path: &Path,
    columns: &ReferenceColumns,
) -> Result<Vec<Constituency>, StoreError> {
    let text = read_file_as_utf8(path)?;
    load_reference(&path.display().to_string(), text.as_bytes(), columns)
}

pub fn known_codes(constituencies: &[Constituency]) -> BTreeSet<String> {
    constituencies.iter().map(|c| c.short_code.clone()).collect()
}

// Tabular CSV lookup output

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use pcon_core::Postcode;
use pcon_resolve::config::TabularConfig;
use pcon_resolve::model::{ResolvedConstituency, ResolvedMapping};
use pcon_resolve::{OutputSink, SinkStats};

use crate::error::StoreError;

/// Ranked constituencies per output row. Longer lists are truncated.
pub const TABULAR_RANKS: usize = 6;

pub fn tabular_header(write_confidences: bool) -> Vec<String> {
    let mut header = vec!["postcode".to_string()];
    for rank in 1..=TABULAR_RANKS {
        header.push(format!("pcon_{rank}"));
        if write_confidences {
            header.push(format!("confidence_{rank}"));
        }
    }
    header
}

/// Writes one fixed-width CSV row per postcode, flushing after every row.
pub struct TabularSink<W: Write = File> {
    writer: csv::Writer<W>,
    write_confidences: bool,
    separator: String,
    initialized: bool,
    stats: SinkStats,
}

impl TabularSink<File> {
    /// Create (or truncate) the output file.
    pub fn create(path: &Path, config: &TabularConfig) -> Result<Self, StoreError> {
        let file = File::create(path)?;
        tracing::info!(path = %path.display(), "writing tabular lookup");
        Ok(Self::from_writer(file, config))
    }
}

impl<W: Write> TabularSink<W> {
    pub fn from_writer(writer: W, config: &TabularConfig) -> Self {
        Self {
            writer: csv::WriterBuilder::new().from_writer(writer),
            write_confidences: config.write_confidences,
            separator: config.separator.clone(),
            initialized: false,
            stats: SinkStats::default(),
        }
    }

    fn record(&self, mapping: &ResolvedMapping) -> Vec<String> {
        let postcode = Postcode::parse(&mapping.postcode)
            .unit_postcode(&self.separator)
            .unwrap_or_else(|| mapping.postcode.clone());

        let mut record = Vec::with_capacity(1 + TABULAR_RANKS * 2);
        record.push(postcode);
        for rank in 0..TABULAR_RANKS {
            let entry = mapping.constituencies.get(rank);
            record.push(entry.map(|c| c.code.clone()).unwrap_or_default());
            if self.write_confidences {
                // `{}` is the shortest representation that parses back to the same f64
                record.push(entry.map(|c| c.confidence.to_string()).unwrap_or_default());
            }
        }
        record
    }
}

impl<W: Write> OutputSink for TabularSink<W> {
    type Error = StoreError;

    fn initialize(&mut self) -> Result<(), StoreError> {
        self.writer.write_record(tabular_header(self.write_confidences))?;
        self.writer.flush()?;
        self.initialized = true;
        Ok(())
    }

    fn write_row(&mut self, mapping: &ResolvedMapping) -> Result<(), StoreError> {
        if !self.initialized {
            return Err(StoreError::NotInitialized);
        }
        if mapping.constituencies.len() > TABULAR_RANKS {
            self.stats.truncated_rows += 1;
            tracing::warn!(
                postcode = %mapping.postcode,
                ranked = mapping.constituencies.len(),
                kept = TABULAR_RANKS,
                "truncating ranked constituencies"
            );
        }
        let record = self.record(mapping);
        self.writer.write_record(&record)?;
        self.writer.flush()?;
        self.stats.rows_written += 1;
        Ok(())
    }

    fn finalize(mut self) -> Result<SinkStats, StoreError> {
        self.writer.flush()?;
        tracing::info!(
            rows = self.stats.rows_written,
            truncated = self.stats.truncated_rows,
            "tabular lookup complete"
        );
        Ok(self.stats)
    }
}

// ---------------------------------------------------------------------------
// Reading back
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TabularEntry {
    pub code: String,
    /// `None` when the file was written without confidence columns.
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabularRow {
    /// Canonical key, whatever separator the file used.
    pub postcode: String,
    pub ranked: Vec<TabularEntry>,
}

impl TabularRow {
    /// The ranked list as a mapping, if every entry carries a confidence.
    pub fn to_mapping(&self) -> Option<ResolvedMapping> {
        let constituencies = self
            .ranked
            .iter()
            .map(|e| {
                e.confidence.map(|confidence| ResolvedConstituency {
                    code: e.code.clone(),
                    confidence,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(ResolvedMapping {
            postcode: self.postcode.clone(),
            constituencies,
        })
    }
}

/// Parse a tabular lookup file. Confidence columns are detected from the header.
pub fn read_tabular<R: Read>(data: R) -> Result<Vec<TabularRow>, StoreError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(data);
    let with_confidences = reader.headers()?.iter().any(|h| h == "confidence_1");
    let stride = if with_confidences { 2 } else { 1 };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let raw = record.get(0).unwrap_or("");
        let postcode = Postcode::parse(raw)
            .key()
            .ok_or_else(|| StoreError::InvalidPostcode(raw.to_string()))?;

        let mut ranked = Vec::new();
        for rank in 0..TABULAR_RANKS {
            let col = 1 + rank * stride;
            let code = record.get(col).unwrap_or("");
            if code.is_empty() {
                continue;
            }
            let confidence = if with_confidences {
                let cell = record.get(col + 1).unwrap_or("");
                Some(cell.parse::<f64>().map_err(|e| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("{raw}: confidence '{cell}': {e}"),
                    )
                })?)
            } else {
                None
            };
            ranked.push(TabularEntry {
                code: code.to_string(),
                confidence,
            });
        }
        rows.push(TabularRow { postcode, ranked });
    }
    Ok(rows)
}

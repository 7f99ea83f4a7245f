use std::path::Path;

use pcon_resolve::config::OutputConfig;
use pcon_resolve::model::ResolvedMapping;
use pcon_resolve::{OutputSink, SinkStats};

use crate::error::StoreError;
use crate::reference::Constituency;
use crate::relational::RelationalSink;
use crate::resolve_path;
use crate::tabular::TabularSink;

/// The configured output, chosen at runtime.
pub enum Sink {
    Tabular(TabularSink),
    Relational(RelationalSink),
}

impl Sink {
    /// Open the configured output. The reference list only feeds the relational `pcon` table.
    pub fn from_config(
        output: &OutputConfig,
        base_dir: &Path,
        reference: Vec<Constituency>,
    ) -> Result<Self, StoreError> {
        Ok(match output {
            OutputConfig::Tabular(t) => {
                Sink::Tabular(TabularSink::create(&resolve_path(base_dir, &t.file), t)?)
            }
            OutputConfig::Relational(r) => {
                Sink::Relational(RelationalSink::open(&resolve_path(base_dir, &r.database), reference)?)
            }
        })
    }
}

impl OutputSink for Sink {
    type Error = StoreError;

    fn initialize(&mut self) -> Result<(), StoreError> {
        match self {
            Sink::Tabular(s) => s.initialize(),
            Sink::Relational(s) => s.initialize(),
        }
    }

    fn write_row(&mut self, mapping: &ResolvedMapping) -> Result<(), StoreError> {
        match self {
            Sink::Tabular(s) => s.write_row(mapping),
            Sink::Relational(s) => s.write_row(mapping),
        }
    }

    fn finalize(self) -> Result<SinkStats, StoreError> {
        match self {
            Sink::Tabular(s) => s.finalize(),
            Sink::Relational(s) => s.finalize(),
        }
    }
}

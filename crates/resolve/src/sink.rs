//! Output sink lifecycle.
//!
//! A sink is prepared once, receives every resolved postcode in ascending
//! canonical key order, then is consumed by `finalize`. Implementations must
//! make each `write_row` durable on its own so a later failure cannot damage
//! rows already written.

use serde::Serialize;

use crate::model::ResolvedMapping;

/// What a sink reports back once it has been finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub rows_written: u64,
    /// Postcodes whose ranked list was longer than the sink could hold.
    pub truncated_rows: u64,
}

pub trait OutputSink {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create headers or schema. Called exactly once before any row.
    fn initialize(&mut self) -> Result<(), Self::Error>;

    /// Persist one postcode's ranked confidences.
    fn write_row(&mut self, mapping: &ResolvedMapping) -> Result<(), Self::Error>;

    /// Flush and release the underlying resource.
    fn finalize(self) -> Result<SinkStats, Self::Error>
    where
        Self: Sized;
}

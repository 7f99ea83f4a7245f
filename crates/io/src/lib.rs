// Lookup storage: evidence readers, constituency reference, output sinks

pub mod error;
pub mod evidence;
pub mod reference;
pub mod relational;
pub mod sink;
pub mod tabular;
pub mod text;

use std::path::{Path, PathBuf};

pub use error::StoreError;
pub use evidence::load_evidence;
pub use reference::{load_reference_file, Constituency};
pub use relational::{lookup, open_lookup, LookupHit, RelationalSink};
pub use sink::Sink;
pub use tabular::{read_tabular, TabularSink};

/// Relational lookup schema version, stored in `meta`.
/// Increment when the schema changes in a way that old readers can't handle.
pub const LOOKUP_SCHEMA_VERSION: u32 = 1;

/// Resolve a configured path against the directory the config was read from.
pub fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

//! `pcon-resolve` - postcode to constituency resolution engine.
//!
//! Pure engine crate: receives per-source evidence, returns ranked
//! confidence lists and drives them into an [`OutputSink`]. Storage backends
//! live in `pcon-io`.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod load;
pub mod model;
pub mod resolver;
pub mod sink;

pub use config::LookupConfig;
pub use engine::run;
pub use error::ResolveError;
pub use model::{EvidenceBundle, EvidenceSet, LookupInput, LookupResult, ResolvedMapping};
pub use resolver::resolve;
pub use sink::{OutputSink, SinkStats};

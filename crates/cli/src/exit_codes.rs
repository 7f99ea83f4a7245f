//! CLI Exit Code Registry
//!
//! Single source of truth for `pcon-lookup` exit codes. Scripts that build
//! the lookup nightly branch on these, so treat them as a contract.
//!
//! | Code | Meaning                                           |
//! |------|---------------------------------------------------|
//! | 0    | Success                                           |
//! | 1    | General error (unspecified)                       |
//! | 2    | Usage error (bad args, unreadable config or file) |
//! | 3    | Config failed to parse or validate                |
//! | 4    | Evidence could not be read or is corrupt          |
//! | 5    | Output sink failed                                |
//! | 6    | Postcode not present in the lookup database       |

use pcon_io::StoreError;
use pcon_resolve::ResolveError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing input file.
pub const EXIT_USAGE: u8 = 2;

/// Config TOML did not parse, or failed validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Evidence input missing a column, unreadable, or holding a corrupt record
/// under `on_corrupt = "abort"`.
pub const EXIT_EVIDENCE: u8 = 4;

/// Output sink could not be opened or a write failed.
pub const EXIT_SINK: u8 = 5;

/// `lookup` found no rows for a well-formed postcode.
pub const EXIT_NOT_FOUND: u8 = 6;

/// Exit code for an error raised by the resolve engine.
pub fn resolve_exit_code(err: &ResolveError) -> u8 {
    match err {
        ResolveError::ConfigParse(_) | ResolveError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ResolveError::MissingColumn { .. }
        | ResolveError::CorruptRecord { .. }
        | ResolveError::Io(_) => EXIT_EVIDENCE,
        ResolveError::Sink(_) => EXIT_SINK,
    }
}

/// Exit code for a storage error. `fallback` applies to raw IO and database
/// errors, whose meaning depends on which phase raised them.
pub fn store_exit_code(err: &StoreError, fallback: u8) -> u8 {
    match err {
        StoreError::Resolve(e) => resolve_exit_code(e),
        StoreError::InvalidPostcode(_) => EXIT_USAGE,
        StoreError::NotInitialized => EXIT_ERROR,
        StoreError::Sqlite(_) | StoreError::Csv(_) | StoreError::Io(_) => fallback,
    }
}

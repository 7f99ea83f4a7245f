use pcon_resolve::ResolveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// A lookup was asked for a string that is not a unit postcode.
    #[error("invalid postcode '{0}'")]
    InvalidPostcode(String),
    /// `write_row` was called before `initialize`.
    #[error("sink used before initialize")]
    NotInitialized,
}

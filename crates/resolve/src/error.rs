use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (empty path, bad table name, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// Missing required column in an evidence input.
    #[error("{input}: missing column '{column}'")]
    MissingColumn { input: String, column: String },
    /// Evidence record that cannot be trusted (bad weight, conflicting entries, ...).
    #[error("{input}, line {line}: corrupt record: {reason}")]
    CorruptRecord { input: String, line: u64, reason: String },
    /// IO error (file read, CSV framing, etc.).
    #[error("IO error: {0}")]
    Io(String),
    /// The output sink failed.
    #[error("sink error: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ResolveError {
    pub fn sink<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Sink(Box::new(err))
    }
}

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

pub const DEFAULT_COMBINED_TABLE: &str = "combined_postcode_to_constituency_multicol";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    pub name: String,
    /// Resolve postcodes on the rayon pool before writing them in order.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub on_corrupt: CorruptPolicy,
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub reference: Option<ReferenceConfig>,
    pub output: OutputConfig,
}

/// What to do with an evidence record that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptPolicy {
    /// Halt the batch with an error.
    #[default]
    Abort,
    /// Log, count, and continue.
    Skip,
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceConfig {
    /// One pre-joined row per postcode, as CSV.
    CombinedCsv(CombinedCsvConfig),
    /// One pre-joined row per postcode, as a SQLite table.
    CombinedSqlite(CombinedSqliteConfig),
    /// The three raw per-source tables, aggregated in-process.
    Sources(SourcesConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombinedCsvConfig {
    pub file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombinedSqliteConfig {
    pub database: String,
    #[serde(default = "default_combined_table")]
    pub table: String,
}

fn default_combined_table() -> String {
    DEFAULT_COMBINED_TABLE.into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub addresses: SourceFileConfig,
    pub onspd: SourceFileConfig,
    pub mysociety: SourceFileConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceFileConfig {
    pub file: String,
    #[serde(default)]
    pub columns: SourceColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceColumns {
    #[serde(default = "default_postcode_column")]
    pub postcode: String,
    #[serde(default = "default_constituency_column")]
    pub constituency: String,
    /// Rows with a non-empty value here are terminated postcodes and skipped.
    #[serde(default)]
    pub terminated: Option<String>,
}

impl Default for SourceColumns {
    fn default() -> Self {
        Self {
            postcode: default_postcode_column(),
            constituency: default_constituency_column(),
            terminated: None,
        }
    }
}

fn default_postcode_column() -> String {
    "postcode".into()
}

fn default_constituency_column() -> String {
    "constituency_code".into()
}

// ---------------------------------------------------------------------------
// Reference
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    pub file: String,
    #[serde(default)]
    pub columns: ReferenceColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceColumns {
    #[serde(default = "default_short_code_column")]
    pub short_code: String,
    #[serde(default = "default_name_column")]
    pub name: String,
}

impl Default for ReferenceColumns {
    fn default() -> Self {
        Self {
            short_code: default_short_code_column(),
            name: default_name_column(),
        }
    }
}

fn default_short_code_column() -> String {
    "short_code".into()
}

fn default_name_column() -> String {
    "name".into()
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputConfig {
    Tabular(TabularConfig),
    Relational(RelationalConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TabularConfig {
    pub file: String,
    #[serde(default)]
    pub write_confidences: bool,
    /// Placed between outcode and incode in the postcode column.
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_separator() -> String {
    " ".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationalConfig {
    pub database: String,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl LookupConfig {
    pub fn from_toml(input: &str) -> Result<Self, ResolveError> {
        let config: LookupConfig =
            toml::from_str(input).map_err(|e| ResolveError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ResolveError> {
        if self.name.trim().is_empty() {
            return Err(ResolveError::ConfigValidation("name must not be empty".into()));
        }

        match &self.evidence {
            EvidenceConfig::CombinedCsv(c) => require_path("evidence.file", &c.file)?,
            EvidenceConfig::CombinedSqlite(c) => {
                require_path("evidence.database", &c.database)?;
                if !is_sql_identifier(&c.table) {
                    return Err(ResolveError::ConfigValidation(format!(
                        "evidence.table '{}' is not a plain identifier",
                        c.table
                    )));
                }
            }
            EvidenceConfig::Sources(s) => {
                for (label, source) in [
                    ("addresses", &s.addresses),
                    ("onspd", &s.onspd),
                    ("mysociety", &s.mysociety),
                ] {
                    require_path(&format!("evidence.{label}.file"), &source.file)?;
                    if source.columns.postcode.is_empty() || source.columns.constituency.is_empty() {
                        return Err(ResolveError::ConfigValidation(format!(
                            "evidence.{label}.columns: column names must not be empty"
                        )));
                    }
                }
            }
        }

        if let Some(ref reference) = self.reference {
            require_path("reference.file", &reference.file)?;
        }

        match &self.output {
            OutputConfig::Tabular(t) => {
                require_path("output.file", &t.file)?;
                if !t.separator.chars().all(char::is_whitespace) {
                    return Err(ResolveError::ConfigValidation(format!(
                        "output.separator {:?} must be empty or whitespace",
                        t.separator
                    )));
                }
            }
            OutputConfig::Relational(r) => require_path("output.database", &r.database)?,
        }

        Ok(())
    }
}

fn require_path(field: &str, value: &str) -> Result<(), ResolveError> {
    if value.trim().is_empty() {
        return Err(ResolveError::ConfigValidation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Table names are interpolated into SQL, so only `[A-Za-z_][A-Za-z0-9_]*` is accepted.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const COMBINED_TABULAR: &str = r#"
name = "2025 constituencies"

[evidence]
kind = "combined_csv"
file = "combined.csv"

[output]
kind = "tabular"
file = "postcode-lookup.csv"
"#;

    #[test]
    fn parse_minimal_with_defaults() {
        let config = LookupConfig::from_toml(COMBINED_TABULAR).unwrap();
        assert_eq!(config.name, "2025 constituencies");
        assert!(!config.parallel);
        assert_eq!(config.on_corrupt, CorruptPolicy::Abort);
        assert!(config.reference.is_none());
        match config.output {
            OutputConfig::Tabular(t) => {
                assert_eq!(t.file, "postcode-lookup.csv");
                assert!(!t.write_confidences);
                assert_eq!(t.separator, " ");
            }
            other => panic!("expected tabular output, got {other:?}"),
        }
    }

    #[test]
    fn parse_sources_with_column_overrides() {
        let input = r#"
name = "Sources"
parallel = true
on_corrupt = "skip"

[evidence]
kind = "sources"

[evidence.addresses]
file = "addresses.csv"

[evidence.onspd]
file = "onspd.csv"
[evidence.onspd.columns]
postcode = "pcds"
constituency = "pcon"
terminated = "doterm"

[evidence.mysociety]
file = "mysociety.csv"
[evidence.mysociety.columns]
constituency = "short_code"

[reference]
file = "constituencies.csv"

[output]
kind = "relational"
database = "lookup.db"
"#;
        let config = LookupConfig::from_toml(input).unwrap();
        assert!(config.parallel);
        assert_eq!(config.on_corrupt, CorruptPolicy::Skip);
        let EvidenceConfig::Sources(sources) = &config.evidence else {
            panic!("expected sources evidence");
        };
        assert_eq!(sources.addresses.columns.postcode, "postcode");
        assert_eq!(sources.addresses.columns.constituency, "constituency_code");
        assert_eq!(sources.onspd.columns.postcode, "pcds");
        assert_eq!(sources.onspd.columns.terminated.as_deref(), Some("doterm"));
        assert_eq!(sources.mysociety.columns.postcode, "postcode");
        assert_eq!(sources.mysociety.columns.constituency, "short_code");

        let reference = config.reference.as_ref().unwrap();
        assert_eq!(reference.columns.short_code, "short_code");
        assert_eq!(reference.columns.name, "name");
        assert!(matches!(config.output, OutputConfig::Relational(ref r) if r.database == "lookup.db"));
    }

    #[test]
    fn sqlite_table_defaults() {
        let input = r#"
name = "SQLite"
[evidence]
kind = "combined_sqlite"
database = "gis.db"
[output]
kind = "tabular"
file = "out.csv"
write_confidences = true
separator = ""
"#;
        let config = LookupConfig::from_toml(input).unwrap();
        let EvidenceConfig::CombinedSqlite(c) = &config.evidence else {
            panic!("expected sqlite evidence");
        };
        assert_eq!(c.table, DEFAULT_COMBINED_TABLE);
        let OutputConfig::Tabular(t) = &config.output else {
            panic!("expected tabular output");
        };
        assert!(t.write_confidences);
        assert_eq!(t.separator, "");
    }

    #[test]
    fn reject_unknown_output_kind() {
        let input = COMBINED_TABULAR.replace("kind = \"tabular\"", "kind = \"parquet\"");
        let err = LookupConfig::from_toml(&input).unwrap_err();
        assert!(matches!(err, ResolveError::ConfigParse(_)));
    }

    #[test]
    fn reject_unknown_corrupt_policy() {
        let input = format!("on_corrupt = \"ignore\"\n{COMBINED_TABULAR}");
        assert!(LookupConfig::from_toml(&input).is_err());
    }

    #[test]
    fn reject_empty_path() {
        let input = COMBINED_TABULAR.replace("file = \"combined.csv\"", "file = \"\"");
        let err = LookupConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("evidence.file must not be empty"));
    }

    #[test]
    fn separator_must_be_whitespace() {
        let with = |sep: &str| {
            LookupConfig::from_toml(&format!("{COMBINED_TABULAR}separator = \"{sep}\"\n"))
        };
        assert!(with("").is_ok());
        assert!(with("\\t").is_ok());
        assert!(with("  ").is_ok());

        let err = with("-").unwrap_err();
        assert!(matches!(err, ResolveError::ConfigValidation(_)));
        assert!(err.to_string().contains("output.separator \"-\""));
        assert!(with(" / ").is_err());
    }

    #[test]
    fn reject_injected_table_name() {
        let input = r#"
name = "Bad"
[evidence]
kind = "combined_sqlite"
database = "gis.db"
table = "t; DROP TABLE pcon"
[output]
kind = "relational"
database = "out.db"
"#;
        let err = LookupConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("not a plain identifier"));
    }

    #[test]
    fn sql_identifiers() {
        assert!(is_sql_identifier("combined_postcode_to_constituency_multicol"));
        assert!(is_sql_identifier("_t1"));
        assert!(!is_sql_identifier("1t"));
        assert!(!is_sql_identifier(""));
        assert!(!is_sql_identifier("a-b"));
    }
}

//! `pcon-lookup generate` and `validate` - config-driven lookup builds.

use std::path::{Path, PathBuf};

use pcon_io::reference::known_codes;
use pcon_io::{load_evidence, load_reference_file, resolve_path, Sink, StoreError};
use pcon_resolve::config::{EvidenceConfig, OutputConfig};
use pcon_resolve::{LookupConfig, LookupInput, ResolveError};

use crate::exit_codes::{resolve_exit_code, store_exit_code, EXIT_ERROR, EXIT_EVIDENCE, EXIT_SINK};
use crate::CliError;

fn read_config(config_path: &Path) -> Result<LookupConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        CliError::usage(format!("cannot read config {}: {e}", config_path.display()))
    })?;
    LookupConfig::from_toml(&config_str)
        .map_err(|e| CliError::new(resolve_exit_code(&e), e.to_string()))
}

fn evidence_error(e: StoreError) -> CliError {
    let err = CliError::new(store_exit_code(&e, EXIT_EVIDENCE), e.to_string());
    match e {
        StoreError::Resolve(ResolveError::CorruptRecord { .. }) => {
            err.with_hint("set on_corrupt = \"skip\" to count and skip bad records")
        }
        _ => err,
    }
}

pub fn cmd_generate(config_path: PathBuf, json_output: bool) -> Result<(), CliError> {
    let config = read_config(&config_path)?;

    // Paths in the config are relative to the config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let constituencies = match config.reference {
        Some(ref reference) => {
            let path = resolve_path(base_dir, &reference.file);
            load_reference_file(&path, &reference.columns).map_err(|e| {
                CliError::new(
                    store_exit_code(&e, EXIT_EVIDENCE),
                    format!("reference {}: {e}", path.display()),
                )
            })?
        }
        None => Vec::new(),
    };

    let evidence = load_evidence(&config, base_dir).map_err(evidence_error)?;

    let input = LookupInput {
        evidence,
        known_constituencies: config.reference.as_ref().map(|_| known_codes(&constituencies)),
    };

    let sink = Sink::from_config(&config.output, base_dir, constituencies)
        .map_err(|e| CliError::new(store_exit_code(&e, EXIT_SINK), e.to_string()))?;

    let result = pcon_resolve::run(&config, &input, sink)
        .map_err(|e| CliError::new(resolve_exit_code(&e), e.to_string()))?;

    if json_output {
        let json_str = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "{}: {} postcodes, {} rows written ({} without evidence)",
        result.meta.config_name, s.postcodes_resolved, s.rows_written, s.empty_postcodes,
    );
    eprintln!(
        "skipped: {} invalid, {} terminated, {} corrupt",
        s.invalid_postcodes, s.terminated_postcodes, s.skipped_records,
    );
    if s.truncated_rows > 0 {
        eprintln!("truncated: {} postcodes had more ranked constituencies than fit", s.truncated_rows);
    }
    if !s.unknown_constituency_codes.is_empty() {
        eprintln!(
            "unknown constituencies in {} postcodes: {}",
            s.unknown_constituency_rows,
            s.unknown_constituency_codes.join(", "),
        );
    }

    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;

    let evidence = match config.evidence {
        EvidenceConfig::CombinedCsv(_) => "combined csv",
        EvidenceConfig::CombinedSqlite(_) => "combined sqlite",
        EvidenceConfig::Sources(_) => "three sources",
    };
    let output = match config.output {
        OutputConfig::Tabular(_) => "tabular",
        OutputConfig::Relational(_) => "relational",
    };
    let reference = if config.reference.is_some() { ", with reference" } else { "" };

    eprintln!("valid: '{}' ({evidence} evidence -> {output} output{reference})", config.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_usage_error() {
        let err = read_config(Path::new("/nonexistent/lookup.toml")).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_USAGE);
    }

    #[test]
    fn corrupt_evidence_gets_skip_hint() {
        let corrupt = StoreError::Resolve(ResolveError::CorruptRecord {
            input: "combined.csv".into(),
            line: 7,
            reason: "expected 15 fields, found 1".into(),
        });
        let err = evidence_error(corrupt);
        assert_eq!(err.code, EXIT_EVIDENCE);
        assert!(err.message.contains("line 7"));
        assert!(err.hint.unwrap().contains("on_corrupt"));

        let missing = StoreError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        let err = evidence_error(missing);
        assert_eq!(err.code, EXIT_EVIDENCE);
        assert!(err.hint.is_none());
    }

    #[test]
    fn bad_config_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lookup.toml");
        std::fs::write(&path, "name = \"\"\n[evidence]\nkind = \"combined_csv\"\nfile = \"c.csv\"\n[output]\nkind = \"tabular\"\nfile = \"o.csv\"\n").unwrap();
        let err = read_config(&path).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_INVALID_CONFIG);
        assert!(err.message.contains("name must not be empty"));
    }
}

//! `pcon-lookup postcode` and `lookup` - inspection commands.

use std::path::PathBuf;

use serde::Serialize;

use pcon_core::{Postcode, PostcodeParts};
use pcon_io::{lookup, open_lookup, LookupHit};

use crate::exit_codes::{store_exit_code, EXIT_ERROR, EXIT_NOT_FOUND, EXIT_USAGE};
use crate::CliError;

#[derive(Serialize)]
struct PostcodeReport<'a> {
    raw: &'a str,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    parts: Option<PostcodeParts>,
}

pub fn cmd_postcode(raws: Vec<String>, json_output: bool) -> Result<(), CliError> {
    let reports: Vec<PostcodeReport> = raws
        .iter()
        .map(|raw| {
            let parts = Postcode::parse(raw).parts();
            PostcodeReport {
                raw,
                valid: parts.is_some(),
                parts,
            }
        })
        .collect();

    if json_output {
        let json_str = serde_json::to_string_pretty(&reports)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    } else {
        for report in &reports {
            match report.parts {
                Some(ref p) => println!(
                    "{}\tkey={} area={} district={} sector={} outcode={} incode={}",
                    p.unit, p.key, p.area, p.district, p.sector, p.outcode, p.incode
                ),
                None => println!("{}\tinvalid", report.raw),
            }
        }
    }

    let invalid = reports.iter().filter(|r| !r.valid).count();
    if invalid > 0 {
        return Err(CliError::new(
            EXIT_ERROR,
            format!("{invalid} of {} postcodes invalid", reports.len()),
        ));
    }
    Ok(())
}

#[derive(Serialize)]
struct LookupReport<'a> {
    postcode: String,
    constituencies: &'a [LookupHit],
}

pub fn cmd_lookup(database: PathBuf, raw: String, json_output: bool) -> Result<(), CliError> {
    let postcode = Postcode::parse(&raw);
    let Some(display) = postcode.unit_postcode(" ") else {
        return Err(CliError::usage(format!("'{raw}' is not a valid unit postcode"))
            .with_hint("expected something like 'SW1A 1AA'"));
    };

    if !database.exists() {
        return Err(CliError::usage(format!("no database at {}", database.display())));
    }
    let conn = open_lookup(&database)
        .map_err(|e| CliError::new(store_exit_code(&e, EXIT_USAGE), e.to_string()))?;
    let hits = lookup(&conn, &raw)
        .map_err(|e| CliError::new(store_exit_code(&e, EXIT_ERROR), e.to_string()))?;

    if hits.is_empty() {
        return Err(CliError::new(EXIT_NOT_FOUND, format!("{display} not found")));
    }

    if json_output {
        let report = LookupReport {
            postcode: display,
            constituencies: &hits,
        };
        let json_str = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    } else {
        println!("{display}");
        for hit in &hits {
            println!(
                "  {:<12} {:<8} {}",
                hit.code,
                hit.confidence,
                hit.name.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

// pcon-lookup - build and query the postcode to constituency lookup

mod exit_codes;
mod generate;
mod query;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "pcon-lookup")]
#[command(about = "Resolve UK postcodes to parliamentary constituencies with confidence scores")]
#[command(version)]
struct Cli {
    /// Only log warnings and errors (PCON_LOG overrides)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the lookup from a TOML config file
    #[command(after_help = "\
Examples:
  pcon-lookup generate lookup.toml
  pcon-lookup generate lookup.toml --json > summary.json
  PCON_LOG=debug pcon-lookup generate lookup.toml")]
    Generate {
        /// Path to the lookup config
        config: PathBuf,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Parse and validate a config without reading any evidence
    #[command(after_help = "\
Examples:
  pcon-lookup validate lookup.toml")]
    Validate {
        /// Path to the lookup config
        config: PathBuf,
    },

    /// Show how postcodes break down into area, district, sector and unit
    #[command(after_help = "\
Examples:
  pcon-lookup postcode SW1A1AA
  pcon-lookup postcode 'sw1a 1aa' E170GF --json")]
    Postcode {
        /// Raw postcodes, spaced or not, any case
        #[arg(required = true)]
        raw: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Look up a postcode in a relational lookup database
    #[command(after_help = "\
Exit code 6 means the postcode is well formed but has no rows.

Examples:
  pcon-lookup lookup lookup.db 'SW1A 1AA'
  pcon-lookup lookup lookup.db sw1a1aa --json")]
    Lookup {
        /// SQLite database written by a relational output
        database: PathBuf,

        postcode: String,

        #[arg(long)]
        json: bool,
    },
}

/// Error surfaced to the shell: message on stderr, code as exit status.
#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_env("PCON_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let result = match cli.command {
        Commands::Generate { config, json } => generate::cmd_generate(config, json),
        Commands::Validate { config } => generate::cmd_validate(config),
        Commands::Postcode { raw, json } => query::cmd_postcode(raw, json),
        Commands::Lookup { database, postcode, json } => query::cmd_lookup(database, postcode, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

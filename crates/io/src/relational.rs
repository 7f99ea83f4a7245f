// Relational SQLite lookup output

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;

use pcon_core::Postcode;
use pcon_resolve::model::{ResolvedMapping, Source};
use pcon_resolve::{OutputSink, SinkStats};

use crate::error::StoreError;
use crate::reference::Constituency;
use crate::LOOKUP_SCHEMA_VERSION;

const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
"#;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pcon (
    id INTEGER PRIMARY KEY,
    short_code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    slug TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS postcode_lookup (
    postcode TEXT NOT NULL,             -- canonical key, no separator
    pcon_code TEXT NOT NULL,
    pcon_id INTEGER NULL REFERENCES pcon(id),
    confidence REAL NOT NULL,
    PRIMARY KEY (postcode, pcon_code)
);

CREATE INDEX IF NOT EXISTS idx_postcode_lookup_on_postcode ON postcode_lookup (postcode);

CREATE VIEW IF NOT EXISTS postcode_lookup_named AS
SELECT l.postcode, l.pcon_code, p.name AS pcon_name, p.slug AS pcon_slug, l.confidence
FROM postcode_lookup l
LEFT JOIN pcon p ON p.short_code = l.pcon_code;

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Writes ranked confidences into `postcode_lookup`, one transaction per postcode.
///
/// Existing rows for a postcode are replaced, so re-running over the same
/// evidence (or resuming after a failure) converges on the same table.
pub struct RelationalSink {
    conn: Connection,
    constituencies: Vec<Constituency>,
    initialized: bool,
    stats: SinkStats,
}

impl RelationalSink {
    /// Open or create the database. Nothing is written until `initialize`.
    pub fn open(path: &Path, constituencies: Vec<Constituency>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "writing relational lookup");
        Ok(Self::with_connection(conn, constituencies))
    }

    pub fn with_connection(conn: Connection, constituencies: Vec<Constituency>) -> Self {
        Self {
            conn,
            constituencies,
            initialized: false,
            stats: SinkStats::default(),
        }
    }

    fn write_meta(&self) -> Result<(), StoreError> {
        let entries = [
            ("schema_version", LOOKUP_SCHEMA_VERSION.to_string()),
            ("engine_version", env!("CARGO_PKG_VERSION").to_string()),
            ("generated_at", chrono::Utc::now().to_rfc3339()),
            ("weight_uprn", Source::Uprn.share().to_string()),
            ("weight_onspd", Source::Onspd.share().to_string()),
            ("weight_mysociety", Source::MySociety.share().to_string()),
        ];
        let mut stmt = self
            .conn
            .prepare("INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)")?;
        for (key, value) in entries {
            stmt.execute(params![key, value])?;
        }
        Ok(())
    }

    fn write_constituencies(&mut self) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO pcon (short_code, name, slug) VALUES (?1, ?2, ?3)
                 ON CONFLICT(short_code) DO UPDATE SET name = excluded.name, slug = excluded.slug",
            )?;
            for c in &self.constituencies {
                stmt.execute(params![c.short_code, c.name, c.slug])?;
            }
        }
        tx.commit()?;
        tracing::info!(constituencies = self.constituencies.len(), "populated pcon");
        Ok(())
    }
}

impl OutputSink for RelationalSink {
    type Error = StoreError;

    fn initialize(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(PRAGMAS)?;
        self.conn.execute_batch(SCHEMA)?;
        self.write_constituencies()?;
        self.write_meta()?;
        self.initialized = true;
        Ok(())
    }

    fn write_row(&mut self, mapping: &ResolvedMapping) -> Result<(), StoreError> {
        if !self.initialized {
            return Err(StoreError::NotInitialized);
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM postcode_lookup WHERE postcode = ?1",
            params![mapping.postcode],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO postcode_lookup (postcode, pcon_code, pcon_id, confidence)
                 VALUES (?1, ?2, (SELECT id FROM pcon WHERE short_code = ?2), ?3)",
            )?;
            for c in &mapping.constituencies {
                stmt.execute(params![mapping.postcode, c.code, c.confidence])?;
            }
        }
        tx.commit()?;

        self.stats.rows_written += mapping.constituencies.len() as u64;
        Ok(())
    }

    fn finalize(self) -> Result<SinkStats, StoreError> {
        self.conn.execute_batch("PRAGMA optimize;")?;
        self.conn.close().map_err(|(_, e)| e)?;
        tracing::info!(rows = self.stats.rows_written, "relational lookup complete");
        Ok(self.stats)
    }
}

// ---------------------------------------------------------------------------
// Point lookup
// ---------------------------------------------------------------------------

/// One ranked answer for a postcode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupHit {
    pub code: String,
    /// `None` when the code is not in the `pcon` table.
    pub name: Option<String>,
    pub confidence: f64,
}

/// Open an existing lookup database. Fails if the file does not exist.
pub fn open_lookup(path: &Path) -> Result<Connection, StoreError> {
    // Read-write without CREATE: a read-only handle cannot rebuild the WAL index
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

/// Ranked constituencies for `raw`, in any accepted spelling.
///
/// Returns an empty list when the postcode is well formed but absent.
pub fn lookup(conn: &Connection, raw: &str) -> Result<Vec<LookupHit>, StoreError> {
    let key = Postcode::parse(raw)
        .key()
        .ok_or_else(|| StoreError::InvalidPostcode(raw.to_string()))?;

    let mut stmt = conn.prepare(
        "SELECT l.pcon_code, p.name, l.confidence
         FROM postcode_lookup l
         LEFT JOIN pcon p ON p.short_code = l.pcon_code
         WHERE l.postcode = ?1
         ORDER BY l.confidence DESC, l.pcon_code ASC",
    )?;
    let hits = stmt
        .query_map(params![key], |row| {
            Ok(LookupHit {
                code: row.get(0)?,
                name: row.get(1)?,
                confidence: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hits)
}

/// Read a value from the `meta` table.
pub fn meta_value(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?)
}

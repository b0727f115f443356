//! SQLite DDL for the cost ledger.

use rusqlite::Connection;

/// Complete DDL for the ledger database. Uses `IF NOT EXISTS` throughout so
/// `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS usage (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    utterance_id        INTEGER NOT NULL UNIQUE,
    tier                TEXT NOT NULL,
    category            TEXT NOT NULL,
    input_tokens        INTEGER NOT NULL,
    output_tokens       INTEGER NOT NULL,
    cost_usd            REAL NOT NULL,
    t_committed_wall    INTEGER NOT NULL,
    period_key          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_usage_period ON usage(period_key);

CREATE TABLE IF NOT EXISTS counters (
    period_key        TEXT PRIMARY KEY,
    day_spend_cents   INTEGER NOT NULL DEFAULT 0,
    month_spend_cents INTEGER NOT NULL DEFAULT 0
);
"#;

/// Apply the schema to an open connection. Safe to call repeatedly.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    // Run an integrity check up front so a corrupted ledger file is caught
    // at startup rather than surfacing as a confusing write failure later.
    conn.query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))?;
    Ok(())
}

//! SQLite connection helpers.
//!
//! Provides [`connect_sqlite`] that opens a connection and applies the PRAGMAs the sync
//! engine relies on: WAL journaling (readers never block the writer), foreign_keys=ON,
//! and a 5000ms busy_timeout.

use anyhow::{Context, bail};
use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

/// Strips an optional `sqlite:` / `sqlite://` scheme and rejects other backends.
pub fn sqlite_path(database_url: &str) -> anyhow::Result<&str> {
    let url = database_url.trim();
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        bail!("Unsupported DATABASE_URL (only SQLite is supported): {url}");
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    if path.is_empty() {
        bail!("DATABASE_URL is empty");
    }
    Ok(path)
}

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let path = sqlite_path(database_url)?;
    let mut conn = SqliteConnection::establish(path)
        .with_context(|| format!("opening sqlite database {path}"))?;

    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA foreign_keys=ON;").execute(&mut conn)?;
    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_forms() {
        assert_eq!(sqlite_path("candles.db").unwrap(), "candles.db");
        assert_eq!(sqlite_path("sqlite:candles.db").unwrap(), "candles.db");
        assert_eq!(sqlite_path("sqlite:///tmp/c.db").unwrap(), "/tmp/c.db");
        assert!(sqlite_path("postgres://localhost/db").is_err());
        assert!(sqlite_path("  ").is_err());
    }
}

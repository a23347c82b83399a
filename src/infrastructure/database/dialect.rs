//! SQL dialect rewriting (spec §4.1, §9).
//!
//! Migrations are authored once, in SQLite-flavored DDL. Dialect-specific
//! DDL is preferred when a backend needs it; otherwise this module
//! mechanically rewrites the SQLite source into Postgres or MySQL flavor.
//! Per spec §9 this stays a textual rewriter rather than a full DDL AST —
//! the long-term fix (a dialect-aware emitter) is noted but out of scope.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

/// Rewrite SQLite DDL into Postgres-flavored DDL.
///
/// Handles: `INTEGER PRIMARY KEY AUTOINCREMENT` -> `SERIAL PRIMARY KEY` /
/// `BIGSERIAL PRIMARY KEY`, bare `BLOB` -> `BYTEA`, backtick identifiers
/// -> double-quoted identifiers, `INTEGER` column type -> `BIGINT` (except
/// where already consumed by the autoincrement rewrite).
pub fn sqlite_to_postgres(ddl: &str) -> String {
    let mut out = ddl.to_string();

    let autoincrement = Regex::new(r"(?i)integer\s+primary\s+key\s+autoincrement").unwrap();
    out = autoincrement.replace_all(&out, "BIGSERIAL PRIMARY KEY").to_string();

    out = rewrite_backticks(&out);

    let blob = Regex::new(r"(?i)\bblob\b").unwrap();
    out = blob.replace_all(&out, "BYTEA").to_string();

    // Rewrite remaining bare INTEGER column types to BIGINT, but don't touch
    // the PRIMARY KEY autoincrement form already rewritten above, and don't
    // touch the word when it already reads BIGINT/BIGSERIAL (case-insensitive
    // word-boundary match avoids clobbering those).
    let integer = Regex::new(r"(?i)\binteger\b").unwrap();
    out = integer.replace_all(&out, "BIGINT").to_string();

    out
}

/// Rewrite SQLite DDL into MySQL-flavored DDL.
pub fn sqlite_to_mysql(ddl: &str) -> String {
    let mut out = ddl.to_string();

    let autoincrement = Regex::new(r"(?i)integer\s+primary\s+key\s+autoincrement").unwrap();
    out = autoincrement
        .replace_all(&out, "BIGINT PRIMARY KEY AUTO_INCREMENT")
        .to_string();

    // MySQL already uses backtick identifiers, so no rewrite needed there.

    let blob = Regex::new(r"(?i)\bblob\b").unwrap();
    out = blob.replace_all(&out, "LONGBLOB").to_string();

    let integer = Regex::new(r"(?i)\binteger\b").unwrap();
    out = integer.replace_all(&out, "BIGINT").to_string();

    out
}

fn rewrite_backticks(sql: &str) -> String {
    // SQLite accepts backtick-quoted identifiers (MySQL compatibility mode);
    // Postgres requires double quotes.
    sql.replace('`', "\"")
}

pub fn rewrite_for(dialect: Dialect, sqlite_ddl: &str) -> String {
    match dialect {
        Dialect::Sqlite => sqlite_ddl.to_string(),
        Dialect::Postgres => sqlite_to_postgres(sqlite_ddl),
        Dialect::MySql => sqlite_to_mysql(sqlite_ddl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "CREATE TABLE `widgets` (\n  id INTEGER PRIMARY KEY AUTOINCREMENT,\n  payload BLOB,\n  count INTEGER NOT NULL\n);";

    #[test]
    fn postgres_rewrite_handles_autoincrement_blob_and_backticks() {
        let out = sqlite_to_postgres(SAMPLE);
        assert!(out.contains("BIGSERIAL PRIMARY KEY"));
        assert!(out.contains("BYTEA"));
        assert!(out.contains("\"widgets\""));
        assert!(!out.contains('`'));
        assert!(out.contains("BIGINT NOT NULL"));
    }

    #[test]
    fn mysql_rewrite_handles_autoincrement_and_blob() {
        let out = sqlite_to_mysql(SAMPLE);
        assert!(out.contains("AUTO_INCREMENT"));
        assert!(out.contains("LONGBLOB"));
        assert!(out.contains('`')); // backticks preserved for MySQL
    }
}

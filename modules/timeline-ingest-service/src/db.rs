//! SQLite persistence for the timeline ingest service.
//!
//! The generic gateway operations (`query_map`, `scalar`, `execute`) own all
//! parameter binding; nothing above them ever interpolates a value into SQL.
//! Failures are logged at this boundary (both to the process log and the
//! error log file) before the error is handed back to the caller.

use crate::errlog::ErrorLog;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, Row, ToSql};
use std::sync::Mutex;
use timeline_ingest_types::{Account, Status, StatusRecord};

pub type NamedParams<'a> = &'a [(&'a str, &'a dyn ToSql)];

pub struct Db {
    conn: Mutex<Connection>,
    errlog: ErrorLog,
}

/// Account fields as observed in one fetched payload. The counters are
/// written on every sighting; the rest only on first insert.
pub struct AccountUpsert<'a> {
    pub id: i64,
    pub name: &'a str,
    pub handle: &'a str,
    pub followers_count: i64,
    pub friends_count: i64,
    pub statuses_count: i64,
    pub created_at: &'a str,
}

pub struct StatusInsert<'a> {
    pub id: i64,
    pub user_id: i64,
    pub text: &'a str,
    pub source: &'a str,
    pub created_at: &'a str,
}

impl Db {
    pub fn open(path: &str, errlog: ErrorLog) -> SqliteResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
            errlog,
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS account (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                handle TEXT NOT NULL,
                followers_count INTEGER NOT NULL DEFAULT 0,
                friends_count INTEGER NOT NULL DEFAULT 0,
                statuses_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS status (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES account(id),
                text TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_status_user ON status(user_id)",
            [],
        )?;

        Ok(())
    }

    // =====================================================
    // Gateway Operations
    // =====================================================

    pub fn query_map<T, F>(&self, sql: &str, params: NamedParams, f: F) -> SqliteResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> SqliteResult<T>,
    {
        let conn = self.conn.lock().unwrap();
        let result: SqliteResult<Vec<T>> = (|| {
            let mut stmt = conn.prepare(sql)?;
            stmt.query_map(params, f)?.collect()
        })();
        drop(conn);
        self.checked("query", sql, result)
    }

    /// Single-value lookup. `Ok(None)` means no row matched; errors are
    /// never folded into the absent case.
    pub fn scalar<T: rusqlite::types::FromSql>(
        &self,
        sql: &str,
        params: NamedParams,
    ) -> SqliteResult<Option<T>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(sql, params, |row| row.get(0)).optional();
        drop(conn);
        self.checked("scalar", sql, result)
    }

    /// Insert/update execution; returns the number of rows affected.
    pub fn execute(&self, sql: &str, params: NamedParams) -> SqliteResult<usize> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(sql, params);
        drop(conn);
        self.checked("execute", sql, result)
    }

    fn checked<T>(&self, op: &str, sql: &str, result: SqliteResult<T>) -> SqliteResult<T> {
        if let Err(ref e) = result {
            let context = sql_context(sql);
            log::error!("{} failed: {} [{}]", op, e, context);
            self.errlog
                .record("SQLITE", &e.to_string(), &format!("{} failed", op), &context);
        }
        result
    }

    // =====================================================
    // Account Operations
    // =====================================================

    /// Single atomic write: insert on first sighting, otherwise refresh only
    /// the mutable counters. `name`, `handle` and `created_at` keep the
    /// values from the first insert.
    pub fn upsert_account(&self, acct: &AccountUpsert) -> SqliteResult<()> {
        self.execute(
            "INSERT INTO account (id, name, handle, followers_count, friends_count, statuses_count, created_at)
             VALUES (:id, :name, :handle, :followers_count, :friends_count, :statuses_count, :created_at)
             ON CONFLICT(id) DO UPDATE SET
                followers_count = excluded.followers_count,
                friends_count = excluded.friends_count,
                statuses_count = excluded.statuses_count",
            &[
                (":id", &acct.id),
                (":name", &acct.name),
                (":handle", &acct.handle),
                (":followers_count", &acct.followers_count),
                (":friends_count", &acct.friends_count),
                (":statuses_count", &acct.statuses_count),
                (":created_at", &acct.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_account(&self, id: i64) -> SqliteResult<Option<Account>> {
        let mut rows = self.query_map(
            "SELECT id, name, handle, followers_count, friends_count, statuses_count, created_at
             FROM account WHERE id = :id",
            &[(":id", &id)],
            row_to_account,
        )?;
        Ok(rows.pop())
    }

    pub fn count_accounts(&self) -> SqliteResult<i64> {
        Ok(self
            .scalar("SELECT COUNT(*) FROM account", &[])?
            .unwrap_or(0))
    }

    // =====================================================
    // Status Operations
    // =====================================================

    /// Statuses are immutable facts: a duplicate id is ignored, never
    /// updated. Returns whether a row was actually inserted.
    pub fn insert_status(&self, status: &StatusInsert) -> SqliteResult<bool> {
        let rows = self.execute(
            "INSERT OR IGNORE INTO status (id, user_id, text, source, created_at)
             VALUES (:id, :user_id, :text, :source, :created_at)",
            &[
                (":id", &status.id),
                (":user_id", &status.user_id),
                (":text", &status.text),
                (":source", &status.source),
                (":created_at", &status.created_at),
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn get_status(&self, id: i64) -> SqliteResult<Option<Status>> {
        let mut rows = self.query_map(
            "SELECT id, user_id, text, source, created_at FROM status WHERE id = :id",
            &[(":id", &id)],
            row_to_status,
        )?;
        Ok(rows.pop())
    }

    pub fn count_statuses(&self) -> SqliteResult<i64> {
        Ok(self
            .scalar("SELECT COUNT(*) FROM status", &[])?
            .unwrap_or(0))
    }

    /// The full join served to the display layer. No filtering or pagination;
    /// ordering is the display layer's concern.
    pub fn list_statuses(&self) -> SqliteResult<Vec<StatusRecord>> {
        self.query_map(
            "SELECT account.handle, account.name, status.text, status.created_at
             FROM status
             JOIN account ON status.user_id = account.id",
            &[],
            |row| {
                Ok(StatusRecord {
                    handle: row.get(0)?,
                    name: row.get(1)?,
                    text: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
    }
}

// =====================================================
// Row Mapping Functions
// =====================================================

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        handle: row.get(2)?,
        followers_count: row.get(3)?,
        friends_count: row.get(4)?,
        statuses_count: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_status(row: &Row) -> rusqlite::Result<Status> {
    Ok(Status {
        id: row.get(0)?,
        user_id: row.get(1)?,
        text: row.get(2)?,
        source: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// One-line statement context for log entries.
fn sql_context(sql: &str) -> String {
    let flat: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() > 120 {
        format!("{}...", &flat[..120])
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Db {
        let log_path = std::env::temp_dir().join("timeline_ingest_db_test.log");
        Db::open(":memory:", ErrorLog::new(log_path)).expect("open in-memory db")
    }

    fn sample_account(id: i64) -> AccountUpsert<'static> {
        AccountUpsert {
            id,
            name: "Rust Language",
            handle: "rustlang",
            followers_count: 100,
            friends_count: 50,
            statuses_count: 10,
            created_at: "2010-05-01 00:00:00",
        }
    }

    #[test]
    fn upsert_account_inserts_then_refreshes_counters_only() {
        let db = test_db();
        db.upsert_account(&sample_account(42)).expect("first upsert");

        let second = AccountUpsert {
            name: "Renamed",
            handle: "renamed",
            followers_count: 200,
            friends_count: 60,
            statuses_count: 11,
            created_at: "2020-01-01 00:00:00",
            ..sample_account(42)
        };
        db.upsert_account(&second).expect("second upsert");

        assert_eq!(db.count_accounts().unwrap(), 1);
        let acct = db.get_account(42).unwrap().expect("account present");
        assert_eq!(acct.followers_count, 200);
        assert_eq!(acct.friends_count, 60);
        assert_eq!(acct.statuses_count, 11);
        // Immutable columns keep their first-insert values.
        assert_eq!(acct.name, "Rust Language");
        assert_eq!(acct.handle, "rustlang");
        assert_eq!(acct.created_at, "2010-05-01 00:00:00");
    }

    #[test]
    fn insert_status_ignores_duplicates() {
        let db = test_db();
        db.upsert_account(&sample_account(42)).unwrap();

        let status = StatusInsert {
            id: 7,
            user_id: 42,
            text: "first version",
            source: "web",
            created_at: "2014-03-25 12:05:00",
        };
        assert!(db.insert_status(&status).expect("insert"));
        assert!(!db
            .insert_status(&StatusInsert {
                text: "attempted rewrite",
                ..status
            })
            .expect("duplicate insert"));

        assert_eq!(db.count_statuses().unwrap(), 1);
        let stored = db.get_status(7).unwrap().expect("status present");
        assert_eq!(stored.text, "first version");
    }

    #[test]
    fn list_statuses_joins_author_fields() {
        let db = test_db();
        db.upsert_account(&sample_account(42)).unwrap();
        db.insert_status(&StatusInsert {
            id: 7,
            user_id: 42,
            text: "hello",
            source: "web",
            created_at: "2014-03-25 12:05:00",
        })
        .unwrap();

        let records = db.list_statuses().expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].handle, "rustlang");
        assert_eq!(records[0].name, "Rust Language");
        assert_eq!(records[0].text, "hello");
        assert_eq!(records[0].created_at, "2014-03-25 12:05:00");
    }

    #[test]
    fn scalar_distinguishes_absent_from_present() {
        let db = test_db();
        let missing: Option<i64> = db
            .scalar("SELECT id FROM account WHERE id = :id", &[(":id", &99i64)])
            .expect("scalar");
        assert!(missing.is_none());

        db.upsert_account(&sample_account(99)).unwrap();
        let present: Option<i64> = db
            .scalar("SELECT id FROM account WHERE id = :id", &[(":id", &99i64)])
            .expect("scalar");
        assert_eq!(present, Some(99));
    }

    #[test]
    fn gateway_propagates_statement_errors() {
        let db = test_db();
        assert!(db.execute("INSERT INTO missing_table VALUES (1)", &[]).is_err());
        assert!(db
            .scalar::<i64>("SELECT nope FROM account", &[])
            .is_err());
    }
}

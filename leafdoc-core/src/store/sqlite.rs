//! SQLite-backed document store

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::types::{ChatTurn, NewTurn};

use super::DocumentStore;

/// Database handle (single connection)
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path and run migrations
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        super::schema::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StoreWrite("store connection lock poisoned".to_string()))
    }

    /// Number of stored turns in a namespace, blank ones included
    pub fn count(&self, namespace: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM turns WHERE namespace = ?1",
            [namespace],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    fn insert(conn: &mut Connection, namespace: &str, turn: &NewTurn) -> Result<ChatTurn> {
        let tx = conn.transaction()?;

        let last: Option<String> = tx
            .query_row(
                "SELECT MAX(created_at) FROM turns WHERE namespace = ?1",
                [namespace],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        let now = Utc::now();
        let created_at = match last.as_deref().map(parse_timestamp).transpose()? {
            Some(last) if last > now => last,
            _ => now,
        };

        let id = uuid::Uuid::new_v4().to_string();
        tx.execute(
            r#"
            INSERT INTO turns (id, namespace, role, text, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                id,
                namespace,
                turn.role.as_str(),
                turn.text,
                format_timestamp(&created_at),
            ],
        )?;
        let seq = tx.last_insert_rowid();
        tx.commit()?;

        Ok(ChatTurn {
            id,
            role: turn.role,
            text: turn.text.clone(),
            created_at,
            seq,
        })
    }
}

impl DocumentStore for SqliteStore {
    fn append(&self, namespace: &str, turn: &NewTurn) -> Result<ChatTurn> {
        let mut conn = self.conn()?;
        Self::insert(&mut conn, namespace, turn).map_err(|e| match e {
            Error::StoreWrite(_) => e,
            other => Error::StoreWrite(other.to_string()),
        })
    }

    fn recent(&self, namespace: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT seq, id, role, text, created_at FROM (
                SELECT seq, id, role, text, created_at
                FROM turns
                WHERE namespace = ?1
                ORDER BY created_at DESC, seq DESC
                LIMIT ?2
            )
            ORDER BY created_at ASC, seq ASC
            "#,
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![namespace, limit], row_to_turn)?;
        let turns = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(turns)
    }
}

fn row_to_turn(row: &Row<'_>) -> rusqlite::Result<ChatTurn> {
    let role: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    Ok(ChatTurn {
        seq: row.get(0)?,
        id: row.get(1)?,
        role: role.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?,
        text: row.get(3)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
    })
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::StoreWrite(format!("corrupt timestamp {:?}: {}", raw, e)))
}

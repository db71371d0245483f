//! SQLite-backed user registry and append-only attendance log.
//!
//! Timestamps are stored as fixed-format local-time strings
//! (`%Y-%m-%d %H:%M:%S`); every comparison against them happens in the
//! same local timezone.

use std::path::Path;

use thiserror::Error;
use tokio_rusqlite::Connection;

use punch_core::toggle::LastEvent;
use punch_core::types::Action;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("employee ID already exists: {0}")]
    DuplicateEmployeeId(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("invalid action stored in attendance log: {0}")]
    InvalidAction(String),
}

/// A registered user row (no embedding — those live in the gallery).
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub name: String,
    pub employee_id: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub registered_date: String,
}

/// One attendance log row joined with the user's name.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AttendanceRow {
    pub name: String,
    pub employee_id: String,
    pub action: String,
    pub timestamp: String,
}

#[derive(Clone)]
pub struct AttendanceStore {
    conn: Connection,
}

impl AttendanceStore {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 CREATE TABLE IF NOT EXISTS users (
                     user_id INTEGER PRIMARY KEY AUTOINCREMENT,
                     name TEXT NOT NULL,
                     employee_id TEXT UNIQUE NOT NULL,
                     email TEXT,
                     department TEXT,
                     registered_date TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS attendance (
                     attendance_id INTEGER PRIMARY KEY AUTOINCREMENT,
                     user_id INTEGER NOT NULL,
                     employee_id TEXT NOT NULL,
                     action TEXT NOT NULL CHECK(action IN ('punch-in', 'punch-out')),
                     timestamp TEXT NOT NULL,
                     FOREIGN KEY (user_id) REFERENCES users(user_id)
                 );
                 CREATE INDEX IF NOT EXISTS idx_attendance_employee
                     ON attendance(employee_id, timestamp);",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Insert a new user. Fails with `DuplicateEmployeeId` if the key is
    /// taken; nothing is mutated in that case.
    pub async fn register_user(
        &self,
        name: &str,
        employee_id: &str,
        email: Option<&str>,
        department: Option<&str>,
        registered_date: &str,
    ) -> Result<i64, StoreError> {
        let name = name.to_string();
        let key = employee_id.to_string();
        let key_for_err = key.clone();
        let email = email.map(str::to_string);
        let department = department.map(str::to_string);
        let registered_date = registered_date.to_string();

        let result = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (name, employee_id, email, department, registered_date)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![name, key, email, department, registered_date],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await;

        match result {
            Ok(id) => Ok(id),
            Err(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, _)))
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateEmployeeId(key_for_err))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a user and all their attendance history. Returns the
    /// deleted user's name, or `UserNotFound`.
    pub async fn delete_user(&self, employee_id: &str) -> Result<String, StoreError> {
        let key = employee_id.to_string();
        let key_for_err = key.clone();

        let deleted: Option<String> = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let user: Option<(i64, String)> = tx
                    .query_row(
                        "SELECT user_id, name FROM users WHERE employee_id = ?1",
                        [&key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;

                let Some((user_id, name)) = user else {
                    return Ok(None);
                };

                tx.execute("DELETE FROM attendance WHERE user_id = ?1", [user_id])?;
                tx.execute("DELETE FROM users WHERE user_id = ?1", [user_id])?;
                tx.commit()?;
                Ok(Some(name))
            })
            .await?;

        deleted.ok_or(StoreError::UserNotFound(key_for_err))
    }

    pub async fn get_user(&self, employee_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let key = employee_id.to_string();
        self.conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT user_id, name, employee_id, email, department, registered_date
                         FROM users WHERE employee_id = ?1",
                        [&key],
                        |row| {
                            Ok(UserRecord {
                                user_id: row.get(0)?,
                                name: row.get(1)?,
                                employee_id: row.get(2)?,
                                email: row.get(3)?,
                                department: row.get(4)?,
                                registered_date: row.get(5)?,
                            })
                        },
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                Ok(user)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Most recent attendance event for an employee, if any.
    pub async fn last_attendance(
        &self,
        employee_id: &str,
    ) -> Result<Option<LastEvent>, StoreError> {
        let key = employee_id.to_string();
        let row: Option<(String, String)> = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT action, timestamp FROM attendance
                         WHERE employee_id = ?1
                         ORDER BY timestamp DESC
                         LIMIT 1",
                        [&key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                Ok(row)
            })
            .await?;

        match row {
            None => Ok(None),
            Some((action_str, timestamp)) => {
                let action = Action::parse(&action_str)
                    .ok_or(StoreError::InvalidAction(action_str))?;
                Ok(Some(LastEvent { action, timestamp }))
            }
        }
    }

    /// Append one attendance event. The log is append-only; rows are
    /// never updated or deleted except by full user deletion.
    pub async fn append_attendance(
        &self,
        employee_id: &str,
        action: Action,
        timestamp: &str,
    ) -> Result<(), StoreError> {
        let key = employee_id.to_string();
        let key_for_err = key.clone();
        let action = action.as_str();
        let timestamp = timestamp.to_string();

        let result = self
            .conn
            .call(move |conn| {
                let user_id: Option<i64> = conn
                    .query_row(
                        "SELECT user_id FROM users WHERE employee_id = ?1",
                        [&key],
                        |row| row.get(0),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;

                let Some(user_id) = user_id else {
                    return Ok(false);
                };

                conn.execute(
                    "INSERT INTO attendance (user_id, employee_id, action, timestamp)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![user_id, key, action, timestamp],
                )?;
                Ok(true)
            })
            .await?;

        if result {
            Ok(())
        } else {
            Err(StoreError::UserNotFound(key_for_err))
        }
    }

    /// All attendance rows for the given local date, newest first.
    pub async fn attendance_for_date(&self, date: &str) -> Result<Vec<AttendanceRow>, StoreError> {
        let date = date.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT u.name, a.employee_id, a.action, a.timestamp
                     FROM attendance a
                     JOIN users u ON a.user_id = u.user_id
                     WHERE DATE(a.timestamp) = DATE(?1)
                     ORDER BY a.timestamp DESC",
                )?;
                let rows = stmt.query_map([&date], |row| {
                    Ok(AttendanceRow {
                        name: row.get(0)?,
                        employee_id: row.get(1)?,
                        action: row.get(2)?,
                        timestamp: row.get(3)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(StoreError::from)
    }

    /// All registered users, ordered by name.
    pub async fn all_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, name, employee_id, email, department, registered_date
                     FROM users ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(UserRecord {
                        user_id: row.get(0)?,
                        name: row.get(1)?,
                        employee_id: row.get(2)?,
                        email: row.get(3)?,
                        department: row.get(4)?,
                        registered_date: row.get(5)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(StoreError::from)
    }

    pub async fn count_users(&self) -> Result<u64, StoreError> {
        self.conn
            .call(|conn| {
                let count: u64 =
                    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(StoreError::from)
    }
}

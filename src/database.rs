//! Persistent SQLite storage for users.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, params};
use teloxide::types::UserId;
use tracing::info;

use crate::pipeline::EventUser;

#[derive(Debug)]
pub enum DbError {
    /// The database URL has an unsupported scheme.
    Url(String),
    /// Failed to create the database directory.
    CreateDir { path: PathBuf, source: std::io::Error },
    Sqlite(rusqlite::Error),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "unsupported database URL '{}'", url),
            Self::CreateDir { path, source } => {
                write!(f, "failed to create database directory '{}': {}", path.display(), source)
            }
            Self::Sqlite(e) => write!(f, "sqlite error: {}", e),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Url(_) => None,
            Self::CreateDir { source, .. } => Some(source),
            Self::Sqlite(e) => Some(e),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

/// A stored user.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub telegram_id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub is_premium: Option<bool>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Where a database URL points.
#[derive(Debug, PartialEq)]
enum Location {
    Memory,
    File(PathBuf),
}

fn parse_url(url: &str) -> Result<Location, DbError> {
    let url = url.trim();
    if url == ":memory:" || url == "sqlite::memory:" || url == "sqlite://:memory:" {
        return Ok(Location::Memory);
    }
    let path = match url.split_once("://") {
        Some(("sqlite", path)) => path,
        Some(_) => return Err(DbError::Url(url.to_string())),
        None => url,
    };
    if path.is_empty() {
        return Err(DbError::Url(url.to_string()));
    }
    Ok(Location::File(PathBuf::from(path)))
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database named by `DB_URL`, creating it if needed.
    pub fn open(url: &str) -> Result<Self, DbError> {
        match parse_url(url)? {
            Location::Memory => Self::in_memory(),
            Location::File(path) => Self::with_path(&path),
        }
    }

    pub fn in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    pub fn with_path(path: &Path) -> Result<Self, DbError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|source| DbError::CreateDir { path: dir.to_path_buf(), source })?;
        }
        let conn = Connection::open(path)?;
        let db = Self::init(conn)?;
        info!("Opened database at {:?} ({} users)", path, db.user_count()?);
        Ok(db)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id INTEGER NOT NULL UNIQUE,
                username TEXT,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT,
                language_code TEXT,
                is_premium INTEGER,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
        "#)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    /// Insert a user on first sight, refresh their fields afterwards.
    pub fn upsert_user(&self, user: &EventUser) -> Result<(), DbError> {
        self.conn().execute(
            "INSERT INTO users (telegram_id, username, first_name, last_name, language_code, is_premium)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(telegram_id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                language_code = excluded.language_code,
                is_premium = excluded.is_premium,
                updated_at = CURRENT_TIMESTAMP",
            params![
                user.id.0 as i64,
                user.username,
                user.first_name,
                user.last_name,
                user.language_code,
                user.is_premium
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, telegram_id: UserId) -> Result<Option<User>, DbError> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, telegram_id, username, first_name, last_name, language_code, is_premium, created_at, updated_at
                 FROM users WHERE telegram_id = ?1",
                params![telegram_id.0 as i64],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        telegram_id: UserId(row.get::<_, i64>(1)? as u64),
                        username: row.get(2)?,
                        first_name: row.get(3)?,
                        last_name: row.get(4)?,
                        language_code: row.get(5)?,
                        is_premium: row.get(6)?,
                        created_at: row.get(7)?,
                        updated_at: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Stored language preference, `None` for unknown users.
    pub fn language_code(&self, telegram_id: UserId) -> Result<Option<String>, DbError> {
        let code = self
            .conn()
            .query_row(
                "SELECT language_code FROM users WHERE telegram_id = ?1",
                params![telegram_id.0 as i64],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(code.flatten())
    }

    pub fn user_count(&self) -> Result<usize, DbError> {
        let count: i64 = self.conn().query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

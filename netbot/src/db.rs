use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::session::{ChatId, Preferences, UserSession};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSubmission {
    pub chat: ChatId,
    pub netlist: String,
    pub submitted_at: String,
}

/// SQLite-backed session storage. Every write is a single statement (or a
/// transaction), so each user record changes atomically.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.initialize()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.initialize()?;
        Ok(db)
    }

    fn get_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DatabaseError::Lock(e.to_string()))
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_sessions (
                chat_id INTEGER PRIMARY KEY,
                nodal_potentials INTEGER NOT NULL DEFAULT 0,
                polar INTEGER NOT NULL DEFAULT 0,
                decibel INTEGER NOT NULL DEFAULT 0,
                awaiting_netlist INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS submissions (
                chat_id INTEGER PRIMARY KEY,
                netlist TEXT NOT NULL,
                submitted_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        Ok(())
    }

    // Session methods

    /// Load a session, creating the default record first if it is missing.
    pub fn ensure_session(&self, chat: ChatId) -> Result<UserSession> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO user_sessions (chat_id) VALUES (?1)",
            params![chat.0],
        )?;
        let session = tx.query_row(
            "SELECT chat_id, nodal_potentials, polar, decibel, awaiting_netlist
             FROM user_sessions WHERE chat_id = ?1",
            params![chat.0],
            row_to_session,
        )?;

        tx.commit()?;
        Ok(session)
    }

    pub fn find_session(&self, chat: ChatId) -> Result<Option<UserSession>> {
        let conn = self.get_conn()?;
        let session = conn
            .query_row(
                "SELECT chat_id, nodal_potentials, polar, decibel, awaiting_netlist
                 FROM user_sessions WHERE chat_id = ?1",
                params![chat.0],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    pub fn save_preferences(&self, chat: ChatId, prefs: &Preferences) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO user_sessions (chat_id, nodal_potentials, polar, decibel)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_id) DO UPDATE SET
                nodal_potentials = excluded.nodal_potentials,
                polar = excluded.polar,
                decibel = excluded.decibel,
                updated_at = CURRENT_TIMESTAMP",
            params![chat.0, prefs.nodal_potentials, prefs.polar, prefs.decibel],
        )?;
        Ok(())
    }

    pub fn set_awaiting_netlist(&self, chat: ChatId, awaiting: bool) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO user_sessions (chat_id, awaiting_netlist)
             VALUES (?1, ?2)
             ON CONFLICT(chat_id) DO UPDATE SET
                awaiting_netlist = excluded.awaiting_netlist,
                updated_at = CURRENT_TIMESTAMP",
            params![chat.0, awaiting],
        )?;
        Ok(())
    }

    /// Every private chat that has a stored session.
    pub fn known_chats(&self) -> Result<Vec<ChatId>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT chat_id FROM user_sessions WHERE chat_id > 0 ORDER BY chat_id")?;
        let chats = stmt
            .query_map([], |row| Ok(ChatId(row.get(0)?)))?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(chats)
    }

    // Submission methods

    pub fn save_submission(&self, chat: ChatId, netlist: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO submissions (chat_id, netlist, submitted_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)",
            params![chat.0, netlist],
        )?;
        Ok(())
    }

    pub fn find_submission(&self, chat: ChatId) -> Result<Option<StoredSubmission>> {
        let conn = self.get_conn()?;
        let submission = conn
            .query_row(
                "SELECT chat_id, netlist, submitted_at FROM submissions WHERE chat_id = ?1",
                params![chat.0],
                |row| {
                    Ok(StoredSubmission {
                        chat: ChatId(row.get(0)?),
                        netlist: row.get(1)?,
                        submitted_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(submission)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> SqlResult<UserSession> {
    Ok(UserSession {
        chat: ChatId(row.get(0)?),
        preferences: Preferences {
            nodal_potentials: row.get(1)?,
            polar: row.get(2)?,
            decibel: row.get(3)?,
        },
        awaiting_netlist: row.get(4)?,
    })
}

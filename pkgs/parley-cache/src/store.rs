//! Store adapter - owns the SQLite handle and the cache schema

use crate::error::CacheError;
use crate::CacheConfig;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Shared handle to the embedded cache database.
///
/// Constructed once by whoever composes the cache and cloned into each
/// component, so schema creation runs exactly once per process. The raw
/// connection is never exposed outside this crate.
#[derive(Clone)]
pub struct StoreHandle {
    conn: Arc<Mutex<Connection>>,
}

impl StoreHandle {
    /// Open (or create) the cache database at the configured path.
    ///
    /// Any failure to open or migrate is fatal for the cache and is reported
    /// as [`CacheError::StoreUnavailable`].
    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        let conn = Connection::open(&config.db_path)
            .map_err(|e| CacheError::StoreUnavailable(e.to_string()))?;
        let handle = Self::initialize(conn)?;
        info!("message cache store opened at {}", config.db_path.display());
        Ok(handle)
    }

    /// Open an in-memory store. Used by tests and diagnostics.
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CacheError::StoreUnavailable(e.to_string()))?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, CacheError> {
        Self::create_tables(&conn).map_err(|e| CacheError::StoreUnavailable(e.to_string()))?;
        Self::create_indexes(&conn).map_err(|e| CacheError::StoreUnavailable(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Lock the underlying connection for a single statement or a short
    /// batch. Never held across an await point.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender_id TEXT,
                sender_json TEXT,
                content TEXT NOT NULL,
                sequence_number INTEGER,
                is_screenshot BOOLEAN NOT NULL DEFAULT FALSE,
                screenshot_file_name TEXT,
                is_read_by_current_user BOOLEAN NOT NULL DEFAULT FALSE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                status TEXT,
                temp_id TEXT,
                client_temp_id TEXT,
                is_system_message BOOLEAN NOT NULL DEFAULT FALSE,
                file_name TEXT,
                file_size INTEGER,
                file_mime_type TEXT,
                cached_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS chat_sync_state (
                conversation_id TEXT PRIMARY KEY,
                local_min_seq INTEGER,
                local_max_seq INTEGER,
                last_known_backend_seq INTEGER,
                sync_state TEXT NOT NULL DEFAULT 'unknown',
                last_validated_at INTEGER,
                message_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS chat_meta (
                conversation_id TEXT PRIMARY KEY,
                latest_sequence INTEGER,
                last_updated INTEGER NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
            [],
        )?;

        Ok(())
    }

    fn create_indexes(conn: &Connection) -> rusqlite::Result<()> {
        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation_seq ON messages(conversation_id, sequence_number)",
            "CREATE INDEX IF NOT EXISTS idx_messages_cached_at ON messages(cached_at)",
        ];

        for idx in indexes {
            conn.execute(idx, [])?;
        }

        Ok(())
    }
}

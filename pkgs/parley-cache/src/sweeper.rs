//! Retention sweeper - time-based eviction of stale cache rows

use crate::error::CacheError;
use crate::store::StoreHandle;
use crate::sync_tracker::SyncTracker;
use chrono::Utc;
use rusqlite::params;
use tracing::info;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub messages_removed: usize,
    pub meta_removed: usize,
    pub sync_removed: usize,
}

/// Evicts cache rows past the retention window.
///
/// Idempotent and safe to invoke manually; the scheduled run is owned by the
/// facade's maintenance lifecycle.
#[derive(Clone)]
pub struct MaintenanceSweeper {
    store: StoreHandle,
    tracker: SyncTracker,
    retention_seconds: u64,
}

impl MaintenanceSweeper {
    pub fn new(store: StoreHandle, tracker: SyncTracker, retention_seconds: u64) -> Self {
        Self {
            store,
            tracker,
            retention_seconds,
        }
    }

    /// Delete messages cached before the retention cutoff, meta rows not
    /// updated since the cutoff, and sync-state rows for conversations left
    /// without any cached messages. Conversations that lost only part of
    /// their history get their local bounds recomputed.
    pub async fn sweep(&self) -> Result<SweepReport, CacheError> {
        let cutoff = (Utc::now() - chrono::Duration::seconds(self.retention_seconds as i64))
            .timestamp_millis();

        let (report, affected) = {
            let conn = self.store.conn();

            let mut stmt = conn.prepare(
                "SELECT DISTINCT conversation_id FROM messages WHERE cached_at < ?1",
            )?;
            let affected = stmt
                .query_map(params![cutoff], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, rusqlite::Error>>()?;
            drop(stmt);

            let messages_removed = conn.execute(
                "DELETE FROM messages WHERE cached_at < ?1",
                params![cutoff],
            )?;
            let meta_removed = conn.execute(
                "DELETE FROM chat_meta WHERE last_updated < ?1",
                params![cutoff],
            )?;
            let sync_removed = conn.execute(
                "DELETE FROM chat_sync_state WHERE conversation_id NOT IN (SELECT DISTINCT conversation_id FROM messages)",
                [],
            )?;

            (
                SweepReport {
                    messages_removed,
                    meta_removed,
                    sync_removed,
                },
                affected,
            )
        };

        for conversation_id in &affected {
            if self.has_messages(conversation_id)? {
                self.tracker.recompute_local_bounds(conversation_id).await?;
            }
        }

        if report.messages_removed > 0 || report.meta_removed > 0 || report.sync_removed > 0 {
            info!(
                "retention sweep removed {} messages, {} meta rows, {} sync rows",
                report.messages_removed, report.meta_removed, report.sync_removed
            );
        }

        Ok(report)
    }

    fn has_messages(&self, conversation_id: &str) -> Result<bool, CacheError> {
        let conn = self.store.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

//! Sync-state tracker - sequence validation and gap detection
//!
//! One row per conversation records the local sequence bounds, the last
//! sequence number the backend reported, and the tri-state verdict. The
//! verdict changes only through [`SyncTracker::validate`] and the two
//! external triggers ([`SyncTracker::update_remote_sequence`] and
//! [`SyncTracker::mark_all_unknown`]).

use crate::error::CacheError;
use crate::model::{SeqRange, SyncState, SyncStatus, ValidationOutcome, ValidationReason};
use crate::store::StoreHandle;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

#[derive(Clone)]
pub struct SyncTracker {
    store: StoreHandle,
}

impl SyncTracker {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Record the authoritative latest sequence reported by the backend.
    ///
    /// Forces the verdict back to `Unknown` until the next validation run.
    pub async fn update_remote_sequence(
        &self,
        conversation_id: &str,
        seq: i64,
    ) -> Result<(), CacheError> {
        let conn = self.store.conn();
        conn.execute(
            r#"
            INSERT INTO chat_sync_state (conversation_id, last_known_backend_seq, sync_state)
            VALUES (?1, ?2, 'unknown')
            ON CONFLICT(conversation_id) DO UPDATE SET
                last_known_backend_seq = excluded.last_known_backend_seq,
                sync_state = 'unknown'
            "#,
            params![conversation_id, seq],
        )?;

        debug!(
            "remote sequence for conversation {} is now {}",
            conversation_id, seq
        );
        Ok(())
    }

    /// Reset every conversation's verdict to `Unknown`. Reconnect hook.
    pub async fn mark_all_unknown(&self) -> Result<usize, CacheError> {
        let conn = self.store.conn();
        let count = conn.execute("UPDATE chat_sync_state SET sync_state = 'unknown'", [])?;

        info!("marked {} conversations as sync-unknown", count);
        Ok(count)
    }

    /// Run the validation algorithm for one conversation and persist the
    /// derived verdict.
    ///
    /// The check order matters: an unknown remote sequence defers validation
    /// before any gap or mismatch can be reported, so a conversation is
    /// never declared out of sync against a backend that has not been asked
    /// yet.
    pub async fn validate(&self, conversation_id: &str) -> Result<ValidationOutcome, CacheError> {
        let now = Utc::now().timestamp_millis();
        let conn = self.store.conn();

        let remote = last_known_backend_seq(&conn, conversation_id)?;
        let remote = match remote {
            Some(seq) => seq,
            None => {
                // Nothing to compare against; deferred, not failed. The
                // verdict stays Unknown.
                conn.execute(
                    r#"
                    INSERT INTO chat_sync_state (conversation_id, sync_state, last_validated_at)
                    VALUES (?1, 'unknown', ?2)
                    ON CONFLICT(conversation_id) DO UPDATE SET
                        last_validated_at = excluded.last_validated_at
                    "#,
                    params![conversation_id, now],
                )?;
                debug!(
                    "validation deferred for conversation {}: backend seq unknown",
                    conversation_id
                );
                return Ok(ValidationOutcome::ok(ValidationReason::BackendSeqUnknown));
            }
        };

        let seqs = cached_sequences(&conn, conversation_id)?;

        let outcome = if seqs.is_empty() {
            ValidationOutcome::invalid(
                ValidationReason::NoMessages,
                format!("no cached messages, backend at {}", remote),
            )
        } else {
            let min = seqs[0];
            let max = seqs[seqs.len() - 1];

            if max - min + 1 != seqs.len() as i64 {
                let mut details = String::from("gap among cached sequences");
                for pair in seqs.windows(2) {
                    if pair[1] != pair[0] + 1 {
                        details = format!("sequence break between {} and {}", pair[0], pair[1]);
                        break;
                    }
                }
                ValidationOutcome::invalid(ValidationReason::GapDetected, details)
            } else if max != remote {
                ValidationOutcome::invalid(
                    ValidationReason::SequenceMismatch,
                    format!("local max {} vs remote expected {}", max, remote),
                )
            } else {
                ValidationOutcome::ok(ValidationReason::Validated)
            }
        };

        let verdict = if outcome.valid {
            SyncStatus::Synced
        } else {
            SyncStatus::OutOfSync
        };
        conn.execute(
            r#"
            INSERT INTO chat_sync_state (conversation_id, sync_state, last_validated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(conversation_id) DO UPDATE SET
                sync_state = excluded.sync_state,
                last_validated_at = excluded.last_validated_at
            "#,
            params![conversation_id, verdict.as_str(), now],
        )?;

        debug!(
            "validated conversation {}: {:?} ({:?})",
            conversation_id, verdict, outcome.reason
        );
        Ok(outcome)
    }

    /// Compute the closed ranges of sequence numbers missing from the local
    /// cache, in ascending order. Never mutates state.
    pub async fn find_missing_ranges(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<SeqRange>, CacheError> {
        let conn = self.store.conn();

        // No sync-state row means nothing is known about this conversation.
        let remote = {
            let known: Option<Option<i64>> = conn
                .query_row(
                    "SELECT last_known_backend_seq FROM chat_sync_state WHERE conversation_id = ?1",
                    params![conversation_id],
                    |row| row.get(0),
                )
                .optional()?;
            match known {
                Some(remote) => remote,
                None => return Ok(Vec::new()),
            }
        };

        let seqs = cached_sequences(&conn, conversation_id)?;

        if seqs.is_empty() {
            // Full history missing, if the backend has any.
            return Ok(match remote {
                Some(r) if r >= 1 => vec![SeqRange::new(1, r)],
                _ => Vec::new(),
            });
        }

        let min = seqs[0];
        let max = seqs[seqs.len() - 1];
        let mut ranges = Vec::new();

        if min > 1 {
            ranges.push(SeqRange::new(1, min - 1));
        }
        for pair in seqs.windows(2) {
            if pair[1] > pair[0] + 1 {
                ranges.push(SeqRange::new(pair[0] + 1, pair[1] - 1));
            }
        }
        if let Some(r) = remote {
            if r > max {
                ranges.push(SeqRange::new(max + 1, r));
            }
        }

        Ok(ranges)
    }

    /// Recompute local bounds and count from the cached rows that carry a
    /// sequence number. The verdict and the remote sequence are left
    /// untouched; bound recomputation alone does not imply revalidation.
    pub async fn recompute_local_bounds(&self, conversation_id: &str) -> Result<(), CacheError> {
        let conn = self.store.conn();

        let (min, max, count): (Option<i64>, Option<i64>, i64) = conn.query_row(
            r#"
            SELECT MIN(sequence_number), MAX(sequence_number), COUNT(sequence_number)
            FROM messages
            WHERE conversation_id = ?1 AND sequence_number IS NOT NULL
            "#,
            params![conversation_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        conn.execute(
            r#"
            INSERT INTO chat_sync_state (conversation_id, local_min_seq, local_max_seq, sync_state, message_count)
            VALUES (?1, ?2, ?3, 'unknown', ?4)
            ON CONFLICT(conversation_id) DO UPDATE SET
                local_min_seq = excluded.local_min_seq,
                local_max_seq = excluded.local_max_seq,
                message_count = excluded.message_count
            "#,
            params![conversation_id, min, max, count],
        )?;

        Ok(())
    }

    pub async fn get_state(&self, conversation_id: &str) -> Result<Option<SyncState>, CacheError> {
        let conn = self.store.conn();

        let mut stmt = conn.prepare(
            r#"
            SELECT conversation_id, local_min_seq, local_max_seq,
                   last_known_backend_seq, sync_state, last_validated_at, message_count
            FROM chat_sync_state WHERE conversation_id = ?1
            "#,
        )?;
        let state = stmt
            .query_row(params![conversation_id], state_from_row)
            .optional()?;

        Ok(state)
    }

    pub async fn all_states(&self) -> Result<Vec<SyncState>, CacheError> {
        let conn = self.store.conn();

        let mut stmt = conn.prepare(
            r#"
            SELECT conversation_id, local_min_seq, local_max_seq,
                   last_known_backend_seq, sync_state, last_validated_at, message_count
            FROM chat_sync_state ORDER BY conversation_id
            "#,
        )?;
        let states = stmt
            .query_map([], state_from_row)?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        Ok(states)
    }

    /// Most recent validation time across all conversations, for diagnostics.
    pub async fn last_validated_max(&self) -> Result<Option<DateTime<Utc>>, CacheError> {
        let conn = self.store.conn();
        let millis: Option<i64> = conn.query_row(
            "SELECT MAX(last_validated_at) FROM chat_sync_state",
            [],
            |row| row.get(0),
        )?;

        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }

    pub async fn delete(&self, conversation_id: &str) -> Result<(), CacheError> {
        let conn = self.store.conn();
        conn.execute(
            "DELETE FROM chat_sync_state WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<(), CacheError> {
        let conn = self.store.conn();
        conn.execute("DELETE FROM chat_sync_state", [])?;
        Ok(())
    }
}

fn last_known_backend_seq(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Option<i64>, CacheError> {
    let known: Option<Option<i64>> = conn
        .query_row(
            "SELECT last_known_backend_seq FROM chat_sync_state WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(known.flatten())
}

fn cached_sequences(conn: &Connection, conversation_id: &str) -> Result<Vec<i64>, CacheError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT sequence_number FROM messages
        WHERE conversation_id = ?1 AND sequence_number IS NOT NULL
        ORDER BY sequence_number ASC
        "#,
    )?;
    let seqs = stmt
        .query_map(params![conversation_id], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?;

    Ok(seqs)
}

fn state_from_row(row: &Row) -> rusqlite::Result<SyncState> {
    let status: String = row.get(4)?;
    Ok(SyncState {
        conversation_id: row.get(0)?,
        local_min_seq: row.get(1)?,
        local_max_seq: row.get(2)?,
        last_known_backend_seq: row.get(3)?,
        sync_state: SyncStatus::parse(&status).ok_or(rusqlite::Error::InvalidQuery)?,
        last_validated_at: row
            .get::<_, Option<i64>>(5)?
            .map(|t| DateTime::from_timestamp_millis(t).ok_or(rusqlite::Error::InvalidQuery))
            .transpose()?,
        message_count: row.get(6)?,
    })
}

//! Cache facade - the single entry point for the rest of the application

use crate::conversation_meta::ConversationMetaStore;
use crate::error::CacheError;
use crate::message_store::MessageStore;
use crate::model::{CachedMessage, SeqRange, SyncStatus, ValidationOutcome};
use crate::store::StoreHandle;
use crate::sweeper::{MaintenanceSweeper, SweepReport};
use crate::sync_tracker::SyncTracker;
use crate::CacheConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Aggregate cache statistics for the diagnostics/settings screen.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CacheStats {
    pub conversation_count: i64,
    pub message_count: i64,
    pub size_estimate_bytes: i64,
    pub hits: u64,
    pub misses: u64,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Per-conversation cache breakdown.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConversationStats {
    pub conversation_id: String,
    pub message_count: i64,
    pub latest_sequence: Option<i64>,
    pub sync_state: SyncStatus,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Outcome of a bulk priming run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimeReport {
    pub primed: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Local message cache for support-ticket conversations.
///
/// Composes the message store, the per-conversation metadata store, the
/// sync-state tracker, and the retention sweeper behind one handle. The
/// cache is a performance layer over the remote source of truth: reads
/// degrade to cache misses on failure, and a failed write is reported only
/// to its immediate caller.
pub struct ChatCache {
    config: CacheConfig,
    messages: MessageStore,
    meta: ConversationMetaStore,
    sync: SyncTracker,
    sweeper: MaintenanceSweeper,
    hits: AtomicU64,
    misses: AtomicU64,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl ChatCache {
    /// Open the cache with the given configuration.
    ///
    /// The store handle is created exactly once here and shared with every
    /// component; an open/migration failure is surfaced as
    /// [`CacheError::StoreUnavailable`] so the caller can disable
    /// cache-dependent features.
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        let store = StoreHandle::open(&config)?;
        Ok(Self::compose(config, store))
    }

    /// In-memory cache. Used by tests and diagnostics tooling.
    pub fn in_memory() -> Result<Self, CacheError> {
        let store = StoreHandle::in_memory()?;
        Ok(Self::compose(CacheConfig::default(), store))
    }

    fn compose(config: CacheConfig, store: StoreHandle) -> Self {
        let sync = SyncTracker::new(store.clone());
        let sweeper = MaintenanceSweeper::new(
            store.clone(),
            sync.clone(),
            config.retention_seconds,
        );

        Self {
            config,
            messages: MessageStore::new(store.clone()),
            meta: ConversationMetaStore::new(store),
            sync,
            sweeper,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            maintenance: Mutex::new(None),
        }
    }

    /// Cached messages for a conversation. Never fails: a read error is
    /// logged and degrades to an empty result, which upstream treats as an
    /// ordinary cache miss.
    pub async fn get_cached_messages(&self, conversation_id: &str) -> Vec<CachedMessage> {
        match self.messages.get_messages(conversation_id).await {
            Ok(messages) => {
                if messages.is_empty() {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                }
                messages
            }
            Err(e) => {
                error!(
                    "cache read degraded to miss for conversation {}: {}",
                    conversation_id, e
                );
                self.misses.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
        }
    }

    /// Bulk-replace the cached set for a conversation after a remote fetch.
    ///
    /// An empty batch is a no-op: it never wipes previously cached history.
    pub async fn cache_messages(
        &self,
        conversation_id: &str,
        messages: &[CachedMessage],
    ) -> Result<usize, CacheError> {
        let inserted = self.messages.replace_all(conversation_id, messages).await?;
        if inserted > 0 {
            self.refresh_aggregates(conversation_id).await?;
        }
        Ok(inserted)
    }

    /// Cache a single message delivered over the push transport.
    pub async fn add_message(&self, message: &CachedMessage) -> Result<(), CacheError> {
        self.messages.append(message).await?;
        self.refresh_aggregates(&message.conversation_id).await
    }

    /// Replace an optimistic message with its server-confirmed counterpart.
    pub async fn replace_optimistic_message(
        &self,
        temp_id: &str,
        confirmed: &CachedMessage,
    ) -> Result<(), CacheError> {
        self.messages.reconcile_optimistic(temp_id, confirmed).await?;
        self.refresh_aggregates(&confirmed.conversation_id).await
    }

    /// Drop everything cached for one conversation: messages, metadata, and
    /// sync state.
    pub async fn clear_conversation(&self, conversation_id: &str) -> Result<usize, CacheError> {
        let count = self.messages.clear_conversation(conversation_id).await?;
        self.meta.delete(conversation_id).await?;
        self.sync.delete(conversation_id).await?;
        Ok(count)
    }

    /// Drop the whole cache and reset the hit/miss bookkeeping.
    pub async fn clear_all(&self) -> Result<usize, CacheError> {
        let count = self.messages.clear_all().await?;
        self.meta.clear_all().await?;
        self.sync.clear_all().await?;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);

        info!("cleared message cache ({} messages)", count);
        Ok(count)
    }

    /// Record the backend's latest sequence for a conversation.
    pub async fn update_remote_sequence(
        &self,
        conversation_id: &str,
        seq: i64,
    ) -> Result<(), CacheError> {
        self.sync.update_remote_sequence(conversation_id, seq).await
    }

    /// Validate the cached sequence run against the last known remote
    /// sequence. See [`SyncTracker::validate`] for the verdict semantics.
    pub async fn validate_sequences(
        &self,
        conversation_id: &str,
    ) -> Result<ValidationOutcome, CacheError> {
        self.sync.validate(conversation_id).await
    }

    /// Closed ranges of sequence numbers that need re-fetching.
    pub async fn find_missing_sequence_ranges(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<SeqRange>, CacheError> {
        self.sync.find_missing_ranges(conversation_id).await
    }

    /// Whether the last validation left this conversation out of sync.
    /// Degrades to `false` on a read failure; the verdict is advisory.
    pub async fn needs_resync(&self, conversation_id: &str) -> bool {
        match self.sync.get_state(conversation_id).await {
            Ok(state) => {
                state.map(|s| s.sync_state == SyncStatus::OutOfSync).unwrap_or(false)
            }
            Err(e) => {
                warn!(
                    "sync state read failed for conversation {}: {}",
                    conversation_id, e
                );
                false
            }
        }
    }

    /// Reconnect hook: every conversation's verdict becomes `Unknown`.
    pub async fn mark_all_unknown(&self) -> Result<usize, CacheError> {
        self.sync.mark_all_unknown().await
    }

    /// Mark a conversation's messages as read by the current user.
    pub async fn mark_conversation_read(&self, conversation_id: &str) -> Result<usize, CacheError> {
        self.messages.mark_conversation_read(conversation_id).await
    }

    /// Unread peer messages in a conversation.
    pub async fn unread_count(&self, conversation_id: &str) -> Result<i64, CacheError> {
        self.messages.unread_count(conversation_id).await
    }

    /// Delete cached messages whose `created_at` falls inside the closed
    /// window, across all conversations. Returns the count removed.
    pub async fn clear_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, CacheError> {
        let (count, affected) = self.messages.delete_by_created_range(from, to).await?;
        for conversation_id in &affected {
            self.refresh_aggregates(conversation_id).await?;
        }
        Ok(count)
    }

    /// Aggregate statistics for the diagnostics screen.
    pub async fn get_stats(&self) -> Result<CacheStats, CacheError> {
        let (conversation_count, message_count, size_estimate_bytes) =
            self.messages.totals().await?;
        let last_sync = self.sync.last_validated_max().await?;

        Ok(CacheStats {
            conversation_count,
            message_count,
            size_estimate_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            last_sync,
        })
    }

    /// Per-conversation breakdown, merging the metadata and sync-state rows.
    pub async fn conversation_stats(&self) -> Result<Vec<ConversationStats>, CacheError> {
        let metas = self.meta.all().await?;
        let states = self.sync.all_states().await?;

        let mut by_id: HashMap<String, ConversationStats> = HashMap::new();
        for meta in metas {
            by_id.insert(
                meta.conversation_id.clone(),
                ConversationStats {
                    conversation_id: meta.conversation_id,
                    message_count: meta.message_count,
                    latest_sequence: meta.latest_sequence,
                    sync_state: SyncStatus::Unknown,
                    last_validated_at: None,
                    last_updated: Some(meta.last_updated),
                },
            );
        }
        for state in states {
            let entry = by_id
                .entry(state.conversation_id.clone())
                .or_insert_with(|| ConversationStats {
                    conversation_id: state.conversation_id.clone(),
                    message_count: state.message_count,
                    latest_sequence: None,
                    sync_state: SyncStatus::Unknown,
                    last_validated_at: None,
                    last_updated: None,
                });
            entry.sync_state = state.sync_state;
            entry.last_validated_at = state.last_validated_at;
        }

        let mut stats: Vec<ConversationStats> = by_id.into_values().collect();
        stats.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        Ok(stats)
    }

    /// Prime the cache for many conversations in one pass.
    ///
    /// `fetch` supplies the full message set for one conversation (typically
    /// a remote call); the cancellation flag is checked between
    /// conversations, and `progress` is invoked after each one. Individual
    /// failures are counted, logged, and do not stop the run.
    pub async fn prime_all<F, Fut, P>(
        &self,
        conversation_ids: &[String],
        fetch: F,
        cancelled: &AtomicBool,
        mut progress: P,
    ) -> PrimeReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<CachedMessage>>>,
        P: FnMut(usize, usize),
    {
        let total = conversation_ids.len();
        let mut report = PrimeReport::default();

        for (done, conversation_id) in conversation_ids.iter().enumerate() {
            if cancelled.load(Ordering::Relaxed) {
                info!("bulk priming cancelled after {} of {} conversations", done, total);
                report.cancelled = true;
                break;
            }

            match fetch(conversation_id.clone()).await {
                Ok(messages) => {
                    match self.cache_messages(conversation_id, &messages).await {
                        Ok(_) => report.primed += 1,
                        Err(e) => {
                            error!(
                                "failed to cache primed conversation {}: {}",
                                conversation_id, e
                            );
                            report.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("fetch failed for conversation {}: {}", conversation_id, e);
                    report.failed += 1;
                }
            }

            progress(done + 1, total);
        }

        report
    }

    /// Run one retention sweep immediately.
    pub async fn sweep_now(&self) -> Result<SweepReport, CacheError> {
        self.sweeper.sweep().await
    }

    /// Schedule the startup retention sweep: one run after the configured
    /// delay. Idempotent while a run is still scheduled; the sweep's failure
    /// is logged, never surfaced to callers of unrelated operations.
    pub fn start_maintenance(&self) {
        let mut slot = self.maintenance.lock().unwrap();
        if slot.is_some() {
            return;
        }

        let sweeper = self.sweeper.clone();
        let delay = Duration::from_secs(self.config.sweep_delay_seconds);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = sweeper.sweep().await {
                error!("maintenance sweep failed: {}", e);
            }
        }));
    }

    /// Cancel a scheduled (or running) maintenance sweep.
    pub fn stop_maintenance(&self) {
        if let Some(handle) = self.maintenance.lock().unwrap().take() {
            handle.abort();
        }
    }

    async fn refresh_aggregates(&self, conversation_id: &str) -> Result<(), CacheError> {
        self.meta.refresh(conversation_id).await?;
        self.sync.recompute_local_bounds(conversation_id).await
    }
}

impl Drop for ChatCache {
    fn drop(&mut self) {
        if let Some(handle) = self.maintenance.lock().unwrap().take() {
            handle.abort();
        }
    }
}

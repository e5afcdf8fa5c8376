//! Parley Cache - local message cache for support-ticket conversations
//!
//! This crate gives the Parley requester client instant, offline-capable
//! chat history while staying deterministically consistent with the remote
//! backend, which remains the source of truth. It combines an embedded
//! SQLite store, a per-conversation monotonic sequence model, gap/mismatch
//! detection, and time-based retention.
//!
//! # Architecture
//!
//! The cache is organized into a facade over specialized stores:
//!
//! - **ChatCache**: the single entry point the application talks to
//! - **MessageStore**: CRUD over cached messages (bulk replace, append,
//!   optimistic reconciliation, per-conversation clear)
//! - **ConversationMetaStore**: per-conversation aggregates (latest sequence
//!   seen, message count, last update)
//! - **SyncTracker**: sequence bounds, the UNKNOWN/SYNCED/OUT_OF_SYNC
//!   verdict, validation, and the missing-range finder
//! - **MaintenanceSweeper**: retention-based eviction of stale rows
//! - **StoreHandle**: the shared SQLite handle and schema
//!
//! # Database Schema
//!
//! One SQLite file with three tables:
//!
//! - `messages`: cached message rows, indexed by conversation, by
//!   (conversation, sequence number), and by insertion time
//! - `chat_meta`: one aggregate row per conversation
//! - `chat_sync_state`: one synchronization record per conversation
//!
//! # Consistency model
//!
//! Message order inside a conversation comes from server-assigned sequence
//! numbers. The backend's latest sequence is recorded via
//! [`ChatCache::update_remote_sequence`]; [`ChatCache::validate_sequences`]
//! then derives a verdict, and [`ChatCache::find_missing_sequence_ranges`]
//! names the exact ranges to re-fetch. On reconnect,
//! [`ChatCache::mark_all_unknown`] resets every verdict.
//!
//! Cache failures degrade to cache misses: reads resolve to empty results,
//! and a failed write is reported only to its immediate caller. The one
//! fatal error is [`CacheError::StoreUnavailable`] at open time.
//!
//! # Example
//!
//! ```rust,no_run
//! use parley_cache::{CacheConfig, ChatCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ChatCache::open(CacheConfig {
//!     db_path: "parley-cache.db".into(),
//!     ..Default::default()
//! })?;
//! cache.start_maintenance();
//!
//! let history = cache.get_cached_messages("ticket-42").await;
//! if history.is_empty() || cache.needs_resync("ticket-42").await {
//!     // fall through to the remote fetch, then:
//!     // cache.cache_messages("ticket-42", &fetched).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod conversation_meta;
pub mod error;
pub mod message_store;
pub mod model;
pub mod store;
pub mod sweeper;
pub mod sync_tracker;

mod rows;

pub use cache::{CacheStats, ChatCache, ConversationStats, PrimeReport};
pub use conversation_meta::ConversationMetaStore;
pub use error::CacheError;
pub use message_store::MessageStore;
pub use model::{
    CachedMessage, ConversationMeta, MessageStatus, SenderInfo, SeqRange, SyncState, SyncStatus,
    ValidationOutcome, ValidationReason,
};
pub use store::StoreHandle;
pub use sweeper::{MaintenanceSweeper, SweepReport};
pub use sync_tracker::SyncTracker;

/// Configuration for the cache layer.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Path to the SQLite database file
    pub db_path: std::path::PathBuf,

    /// Retention window for cached rows in seconds (default: 7 days)
    pub retention_seconds: u64,

    /// Delay before the startup maintenance sweep runs (default: 30s)
    pub sweep_delay_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("parley-cache.db"),
            retention_seconds: 7 * 24 * 3600, // 7 days
            sweep_delay_seconds: 30,
        }
    }
}

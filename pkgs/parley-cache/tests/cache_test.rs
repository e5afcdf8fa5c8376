// Copyright 2026 Parley Team.
//
// Facade-level tests for ChatCache

use chrono::{Duration, Utc};
use parley_cache::{CacheConfig, CachedMessage, ChatCache, MessageStatus, SenderInfo};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::NamedTempFile;
use uuid::Uuid;

#[tokio::test]
async fn test_cache_initialization() {
    let temp_file = NamedTempFile::new().unwrap();
    ChatCache::open(CacheConfig {
        db_path: temp_file.path().to_path_buf(),
        ..Default::default()
    })
    .expect("Failed to open cache");
}

#[tokio::test]
async fn test_messages_are_ordered_by_sequence_with_pending_last() {
    let cache = ChatCache::in_memory().unwrap();

    let batch = vec![
        create_test_message("ticket-1", "m2", Some(2)),
        create_test_message("ticket-1", "m1", Some(1)),
        create_test_message("ticket-1", "m3", Some(3)),
    ];
    cache.cache_messages("ticket-1", &batch).await.unwrap();

    let mut pending = create_test_message("ticket-1", "local-1", None);
    pending.status = Some(MessageStatus::Pending);
    cache.add_message(&pending).await.unwrap();

    let messages = cache.get_cached_messages("ticket-1").await;
    let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3", "local-1"]);

    // Non-null sequence numbers must be strictly increasing.
    let seqs: Vec<i64> = messages.iter().filter_map(|m| m.sequence_number).collect();
    for pair in seqs.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}

#[tokio::test]
async fn test_empty_batch_never_wipes_cached_history() {
    let cache = ChatCache::in_memory().unwrap();

    cache
        .cache_messages("ticket-1", &[create_test_message("ticket-1", "m1", Some(1))])
        .await
        .unwrap();

    let inserted = cache.cache_messages("ticket-1", &[]).await.unwrap();
    assert_eq!(inserted, 0);

    let messages = cache.get_cached_messages("ticket-1").await;
    assert_eq!(messages.len(), 1, "empty fetch result must not clear cache");
}

#[tokio::test]
async fn test_optimistic_reconciliation_keeps_one_row() {
    let cache = ChatCache::in_memory().unwrap();

    let temp_id = format!("temp-{}", Uuid::new_v4());
    let mut optimistic = create_test_message("ticket-1", &temp_id, None);
    optimistic.status = Some(MessageStatus::Pending);
    optimistic.client_temp_id = Some(temp_id.clone());
    cache.add_message(&optimistic).await.unwrap();

    let mut confirmed = create_test_message("ticket-1", "srv-100", Some(5));
    confirmed.client_temp_id = Some(temp_id.clone());
    cache
        .replace_optimistic_message(&temp_id, &confirmed)
        .await
        .unwrap();

    let messages = cache.get_cached_messages("ticket-1").await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "srv-100");
    assert!(messages.iter().all(|m| m.id != temp_id));
}

#[tokio::test]
async fn test_clear_conversation_removes_all_three_kinds_of_state() {
    let cache = ChatCache::in_memory().unwrap();

    cache
        .cache_messages(
            "ticket-1",
            &[
                create_test_message("ticket-1", "m1", Some(1)),
                create_test_message("ticket-1", "m2", Some(2)),
            ],
        )
        .await
        .unwrap();
    cache.update_remote_sequence("ticket-1", 2).await.unwrap();

    let count = cache.clear_conversation("ticket-1").await.unwrap();
    assert_eq!(count, 2);

    assert!(cache.get_cached_messages("ticket-1").await.is_empty());
    // With the sync row gone there is nothing to report missing.
    let ranges = cache.find_missing_sequence_ranges("ticket-1").await.unwrap();
    assert!(ranges.is_empty());

    let stats = cache.conversation_stats().await.unwrap();
    assert!(stats.iter().all(|s| s.conversation_id != "ticket-1"));
}

#[tokio::test]
async fn test_retention_sweep_evicts_only_stale_rows() {
    let temp_file = NamedTempFile::new().unwrap();
    let cache = ChatCache::open(CacheConfig {
        db_path: temp_file.path().to_path_buf(),
        retention_seconds: 1, // 1 second window for testing
        ..Default::default()
    })
    .unwrap();

    cache
        .add_message(&create_test_message("ticket-old", "old-1", Some(1)))
        .await
        .unwrap();

    // Wait for the old row to age past the window.
    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

    cache
        .add_message(&create_test_message("ticket-new", "new-1", Some(1)))
        .await
        .unwrap();

    let report = cache.sweep_now().await.unwrap();
    assert!(report.messages_removed >= 1);

    assert!(cache.get_cached_messages("ticket-old").await.is_empty());
    let fresh = cache.get_cached_messages("ticket-new").await;
    assert_eq!(fresh.len(), 1, "a freshly cached message must survive");
}

#[tokio::test]
async fn test_clear_by_date_range_spans_conversations() {
    let cache = ChatCache::in_memory().unwrap();

    let base = Utc::now() - Duration::days(10);
    let mut old_a = create_test_message("ticket-a", "a1", Some(1));
    old_a.created_at = base;
    let mut old_b = create_test_message("ticket-b", "b1", Some(1));
    old_b.created_at = base + Duration::hours(1);
    let mut recent_b = create_test_message("ticket-b", "b2", Some(2));
    recent_b.created_at = Utc::now();

    cache.add_message(&old_a).await.unwrap();
    cache.add_message(&old_b).await.unwrap();
    cache.add_message(&recent_b).await.unwrap();

    let removed = cache
        .clear_by_date_range(base - Duration::hours(1), base + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(removed, 2);

    assert!(cache.get_cached_messages("ticket-a").await.is_empty());
    let remaining = cache.get_cached_messages("ticket-b").await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "b2");
}

#[tokio::test]
async fn test_stats_track_counts_and_hit_rate() {
    let cache = ChatCache::in_memory().unwrap();

    cache
        .cache_messages(
            "ticket-1",
            &[
                create_test_message("ticket-1", "m1", Some(1)),
                create_test_message("ticket-1", "m2", Some(2)),
            ],
        )
        .await
        .unwrap();
    cache
        .cache_messages("ticket-2", &[create_test_message("ticket-2", "m1", Some(1))])
        .await
        .unwrap();

    // One hit, one miss.
    assert!(!cache.get_cached_messages("ticket-1").await.is_empty());
    assert!(cache.get_cached_messages("ticket-nowhere").await.is_empty());

    let stats = cache.get_stats().await.unwrap();
    assert_eq!(stats.conversation_count, 2);
    assert_eq!(stats.message_count, 3);
    assert!(stats.size_estimate_bytes > 0);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert!(stats.last_sync.is_none());

    cache.update_remote_sequence("ticket-1", 2).await.unwrap();
    cache.validate_sequences("ticket-1").await.unwrap();
    let stats = cache.get_stats().await.unwrap();
    assert!(stats.last_sync.is_some());

    let breakdown = cache.conversation_stats().await.unwrap();
    assert_eq!(breakdown.len(), 2);
    let ticket1 = breakdown
        .iter()
        .find(|s| s.conversation_id == "ticket-1")
        .unwrap();
    assert_eq!(ticket1.message_count, 2);
    assert_eq!(ticket1.latest_sequence, Some(2));
}

#[tokio::test]
async fn test_clear_all_resets_everything() {
    let cache = ChatCache::in_memory().unwrap();

    cache
        .cache_messages("ticket-1", &[create_test_message("ticket-1", "m1", Some(1))])
        .await
        .unwrap();
    cache.get_cached_messages("ticket-1").await;

    let removed = cache.clear_all().await.unwrap();
    assert_eq!(removed, 1);

    let stats = cache.get_stats().await.unwrap();
    assert_eq!(stats.message_count, 0);
    assert_eq!(stats.conversation_count, 0);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
}

#[tokio::test]
async fn test_unread_accounting() {
    let cache = ChatCache::in_memory().unwrap();

    cache
        .add_message(&create_test_message("ticket-1", "peer-1", Some(1)))
        .await
        .unwrap();
    let mut own = create_test_message("ticket-1", "own-1", Some(2));
    own.status = Some(MessageStatus::Sent);
    own.is_read_by_current_user = false;
    cache.add_message(&own).await.unwrap();

    assert_eq!(cache.unread_count("ticket-1").await.unwrap(), 1);

    cache.mark_conversation_read("ticket-1").await.unwrap();
    assert_eq!(cache.unread_count("ticket-1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_prime_all_honors_cancellation_between_conversations() {
    let cache = ChatCache::in_memory().unwrap();

    let ids: Vec<String> = vec!["t1".into(), "t2".into(), "t3".into()];
    let cancelled = AtomicBool::new(false);
    let fetches = AtomicUsize::new(0);

    let report = cache
        .prime_all(
            &ids,
            |conversation_id| {
                fetches.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(vec![create_test_message(&conversation_id, "m1", Some(1))])
                }
            },
            &cancelled,
            |done, _total| {
                // Cancel as soon as the first conversation lands.
                if done == 1 {
                    cancelled.store(true, Ordering::SeqCst);
                }
            },
        )
        .await;

    assert!(report.cancelled);
    assert_eq!(report.primed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    assert_eq!(cache.get_cached_messages("t1").await.len(), 1);
    assert!(cache.get_cached_messages("t2").await.is_empty());
}

#[tokio::test]
async fn test_prime_all_counts_fetch_failures() {
    let cache = ChatCache::in_memory().unwrap();

    let ids: Vec<String> = vec!["t1".into(), "t2".into()];
    let cancelled = AtomicBool::new(false);

    let report = cache
        .prime_all(
            &ids,
            |conversation_id| async move {
                if conversation_id == "t1" {
                    anyhow::bail!("backend unavailable")
                }
                Ok(vec![create_test_message(&conversation_id, "m1", Some(1))])
            },
            &cancelled,
            |_done, _total| {},
        )
        .await;

    assert!(!report.cancelled);
    assert_eq!(report.primed, 1);
    assert_eq!(report.failed, 1);
}

// Helper to create test messages
fn create_test_message(conversation_id: &str, id: &str, seq: Option<i64>) -> CachedMessage {
    let now = Utc::now();
    CachedMessage {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: Some("agent-7".to_string()),
        sender: Some(SenderInfo {
            id: Some("agent-7".to_string()),
            name: "Dana".to_string(),
            email: None,
            avatar_url: None,
            role: Some("agent".to_string()),
        }),
        content: format!("content of {}", id),
        sequence_number: seq,
        is_screenshot: false,
        screenshot_file_name: None,
        is_read_by_current_user: false,
        is_system_message: false,
        file_name: None,
        file_size: None,
        file_mime_type: None,
        status: None,
        temp_id: None,
        client_temp_id: None,
        created_at: now,
        updated_at: now,
        cached_at: now,
    }
}

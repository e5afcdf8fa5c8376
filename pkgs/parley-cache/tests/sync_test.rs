// Copyright 2026 Parley Team.
//
// Sequence validation and resync tests

use chrono::Utc;
use parley_cache::{
    CachedMessage, ChatCache, SeqRange, SyncStatus, ValidationReason,
};

#[tokio::test]
async fn test_validation_defers_when_remote_sequence_unknown() {
    let cache = ChatCache::in_memory().unwrap();
    cache
        .cache_messages("ticket-1", &batch("ticket-1", &[1, 2, 3]))
        .await
        .unwrap();

    let outcome = cache.validate_sequences("ticket-1").await.unwrap();
    assert!(outcome.valid, "deferral is not a failure");
    assert_eq!(outcome.reason, ValidationReason::BackendSeqUnknown);
    assert!(!cache.needs_resync("ticket-1").await);
}

#[tokio::test]
async fn test_gap_detection() {
    let cache = ChatCache::in_memory().unwrap();
    cache
        .cache_messages("ticket-1", &batch("ticket-1", &[1, 2, 3, 6, 7]))
        .await
        .unwrap();
    cache.update_remote_sequence("ticket-1", 7).await.unwrap();

    let outcome = cache.validate_sequences("ticket-1").await.unwrap();
    assert!(!outcome.valid);
    assert_eq!(outcome.reason, ValidationReason::GapDetected);

    let ranges = cache.find_missing_sequence_ranges("ticket-1").await.unwrap();
    assert_eq!(ranges, vec![SeqRange::new(4, 5)]);
    assert!(cache.needs_resync("ticket-1").await);
}

#[tokio::test]
async fn test_sequence_mismatch_detection() {
    let cache = ChatCache::in_memory().unwrap();
    cache
        .cache_messages("ticket-1", &batch("ticket-1", &[1, 2, 3]))
        .await
        .unwrap();
    cache.update_remote_sequence("ticket-1", 5).await.unwrap();

    let outcome = cache.validate_sequences("ticket-1").await.unwrap();
    assert!(!outcome.valid);
    assert_eq!(outcome.reason, ValidationReason::SequenceMismatch);

    let ranges = cache.find_missing_sequence_ranges("ticket-1").await.unwrap();
    assert_eq!(ranges, vec![SeqRange::new(4, 5)]);
}

#[tokio::test]
async fn test_full_history_missing() {
    let cache = ChatCache::in_memory().unwrap();
    cache.update_remote_sequence("ticket-1", 10).await.unwrap();

    let outcome = cache.validate_sequences("ticket-1").await.unwrap();
    assert!(!outcome.valid);
    assert_eq!(outcome.reason, ValidationReason::NoMessages);

    let ranges = cache.find_missing_sequence_ranges("ticket-1").await.unwrap();
    assert_eq!(ranges, vec![SeqRange::new(1, 10)]);
}

#[tokio::test]
async fn test_resync_cycle_ends_in_synced() {
    let cache = ChatCache::in_memory().unwrap();
    cache
        .cache_messages("ticket-1", &batch("ticket-1", &[1, 2, 3]))
        .await
        .unwrap();
    cache.update_remote_sequence("ticket-1", 5).await.unwrap();

    cache.validate_sequences("ticket-1").await.unwrap();
    assert!(cache.needs_resync("ticket-1").await);

    // The caller re-fetches the reported ranges and caches the full run.
    cache
        .cache_messages("ticket-1", &batch("ticket-1", &[1, 2, 3, 4, 5]))
        .await
        .unwrap();
    let outcome = cache.validate_sequences("ticket-1").await.unwrap();
    assert!(outcome.valid);
    assert_eq!(outcome.reason, ValidationReason::Validated);
    assert!(!cache.needs_resync("ticket-1").await);
}

#[tokio::test]
async fn test_reconnect_resets_every_conversation_to_unknown() {
    let cache = ChatCache::in_memory().unwrap();

    for (ticket, remote) in [("ticket-1", 2), ("ticket-2", 3)] {
        cache
            .cache_messages(ticket, &batch(ticket, &[1, 2]))
            .await
            .unwrap();
        cache.update_remote_sequence(ticket, remote).await.unwrap();
        cache.validate_sequences(ticket).await.unwrap();
    }

    // ticket-1 validated SYNCED, ticket-2 OUT_OF_SYNC; both reset.
    let reset = cache.mark_all_unknown().await.unwrap();
    assert_eq!(reset, 2);

    let states = cache.conversation_stats().await.unwrap();
    assert_eq!(states.len(), 2);
    for state in states {
        assert_eq!(state.sync_state, SyncStatus::Unknown);
    }
    assert!(!cache.needs_resync("ticket-1").await);
    assert!(!cache.needs_resync("ticket-2").await);
}

#[tokio::test]
async fn test_pending_messages_do_not_affect_validation() {
    let cache = ChatCache::in_memory().unwrap();
    cache
        .cache_messages("ticket-1", &batch("ticket-1", &[1, 2]))
        .await
        .unwrap();

    let mut pending = message("ticket-1", "local-1", None);
    pending.status = Some(parley_cache::MessageStatus::Pending);
    cache.add_message(&pending).await.unwrap();

    cache.update_remote_sequence("ticket-1", 2).await.unwrap();
    let outcome = cache.validate_sequences("ticket-1").await.unwrap();
    assert!(outcome.valid, "unsequenced local rows are invisible to validation");
    assert_eq!(outcome.reason, ValidationReason::Validated);
}

fn message(conversation_id: &str, id: &str, seq: Option<i64>) -> CachedMessage {
    let now = Utc::now();
    CachedMessage {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: Some("agent-1".to_string()),
        sender: None,
        content: format!("content {}", id),
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

fn batch(conversation_id: &str, seqs: &[i64]) -> Vec<CachedMessage> {
    seqs.iter()
        .map(|seq| message(conversation_id, &format!("m{}", seq), Some(*seq)))
        .collect()
}

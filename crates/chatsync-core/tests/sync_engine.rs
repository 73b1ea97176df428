mod support;

use std::collections::BTreeSet;

use chatsync_core::identity::{bucket_document_id, channel_folder_id, thread_document_id};
use chatsync_core::providers::PlatformUser;
use chatsync_core::{
    ChunkRequest, ConnectorConfig, PermissionLevel, PlatformErrorKind, SyncConfig, SyncError,
    TimeBucket, TrackingRow,
};

use support::*;

fn week() -> TimeBucket {
    TimeBucket::containing(WEDNESDAY_S * 1000)
}

fn section_ts(doc: &chatsync_core::Document) -> Vec<String> {
    doc.sections.iter().map(|s| s.message_ts.clone()).collect()
}

#[tokio::test]
async fn test_chunk_is_idempotent() {
    let h = harness(SyncConfig::default()).await;
    h.platform.set_history(
        CHANNEL,
        vec![msg(WEDNESDAY_S, "U1", "first"), msg(WEDNESDAY_S + 60, "U2", "second")],
    );

    let request = ChunkRequest::for_bucket(CHANNEL, CONNECTOR, week());
    let first = h.engine.sync_non_threaded_chunk(request.clone()).await.unwrap();
    assert!(first.completed);
    assert_eq!(first.messages_processed, 2);

    h.platform.set_history(
        CHANNEL,
        vec![msg(WEDNESDAY_S, "U1", "first"), msg(WEDNESDAY_S + 60, "U2", "edited")],
    );
    h.engine.sync_non_threaded_chunk(request).await.unwrap();

    assert_eq!(h.ingest.row_count(CONNECTOR).await.unwrap(), 1);
    assert_eq!(h.ingest.document_count().await.unwrap(), 1);

    let doc = h
        .ingest
        .get_document(CONNECTOR, &bucket_document_id(CHANNEL, &week()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.sections.len(), 2);
    assert_eq!(doc.sections[1].content, "edited");
    assert_eq!(doc.parent_id, channel_folder_id(CHANNEL));
    assert_eq!(
        doc.source_url.as_deref(),
        Some("https://example.slack.com/archives/C100/p1704283200000000")
    );
    assert!(doc.tags.contains(&"channelName:general".to_string()));
}

#[tokio::test]
async fn test_thread_messages_share_one_document() {
    let config = SyncConfig {
        history_page_size: 1,
        ..SyncConfig::default()
    };
    let h = harness(config).await;
    let thread = WEDNESDAY_S - 300;
    h.platform.set_history(
        CHANNEL,
        vec![
            threaded(thread, thread, "U1", "question"),
            threaded(thread + 10, thread, "U2", "broadcast answer"),
        ],
    );
    h.platform.set_replies(
        CHANNEL,
        thread,
        vec![
            threaded(thread, thread, "U1", "question"),
            threaded(thread + 10, thread, "U2", "answer"),
            threaded(thread + 20, thread, "U1", "thanks"),
        ],
    );

    // One message per page: the thread is seen on two separate pages.
    let mut cursor = None;
    let mut weeks = BTreeSet::new();
    loop {
        let out = h
            .engine
            .sync_channel(CHANNEL, CONNECTOR, None, weeks, cursor)
            .await
            .unwrap();
        weeks = out.weeks_synced;
        cursor = out.next_cursor;
        if cursor.is_none() {
            break;
        }
    }

    assert_eq!(h.platform.history_calls(), 2);
    assert_eq!(h.ingest.row_count(CONNECTOR).await.unwrap(), 1);
    let doc_id = thread_document_id(CHANNEL, &ts(thread));
    let doc = h.ingest.get_document(CONNECTOR, &doc_id).await.unwrap().unwrap();
    assert_eq!(doc.sections.len(), 3);
    let row = h
        .ingest
        .find_row(CONNECTOR, CHANNEL, &doc_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.message_ts, Some(ts(thread)));
}

#[tokio::test]
async fn test_split_chunks_cover_whole_bucket() {
    let messages: Vec<_> = (0..5)
        .map(|i| msg(WEDNESDAY_S + i * 60, "U1", &format!("m{}", i)))
        .collect();

    let unbounded = harness(SyncConfig::default()).await;
    unbounded.platform.set_history(CHANNEL, messages.clone());
    unbounded
        .engine
        .sync_non_threaded_chunk(ChunkRequest::for_bucket(CHANNEL, CONNECTOR, week()))
        .await
        .unwrap();

    let config = SyncConfig {
        history_page_size: 2,
        chunk_api_call_budget: 1,
        ..SyncConfig::default()
    };
    let split = harness(config).await;
    split.platform.set_history(CHANNEL, messages);

    let mut request = ChunkRequest::for_bucket(CHANNEL, CONNECTOR, week());
    let mut invocations = 0;
    let mut processed = 0;
    loop {
        let outcome = split
            .engine
            .sync_non_threaded_chunk(request.clone())
            .await
            .unwrap();
        invocations += 1;
        processed += outcome.messages_processed;
        if outcome.completed {
            assert!(outcome.next_cursor.is_none());
            break;
        }
        request.cursor = outcome.next_cursor;
    }
    assert_eq!(invocations, 3);
    assert_eq!(processed, 5);

    let doc_id = bucket_document_id(CHANNEL, &week());
    let whole = unbounded.ingest.get_document(CONNECTOR, &doc_id).await.unwrap().unwrap();
    let pieces = split.ingest.get_document(CONNECTOR, &doc_id).await.unwrap().unwrap();
    assert_eq!(section_ts(&pieces), section_ts(&whole));
    assert_eq!(pieces.sections.len(), 5);
    assert_eq!(split.ingest.row_count(CONNECTOR).await.unwrap(), 1);
}

#[tokio::test]
async fn test_scenario_a_thread_and_bucket() {
    let h = harness(SyncConfig::default()).await;
    let thread = WEDNESDAY_S - 100;
    h.platform.set_history(
        CHANNEL,
        vec![
            msg(WEDNESDAY_S, "U1", "standalone"),
            threaded(thread + 5, thread, "U2", "reply shown in channel"),
            threaded(thread, thread, "U1", "thread parent"),
        ],
    );
    h.platform.set_replies(
        CHANNEL,
        thread,
        vec![
            threaded(thread, thread, "U1", "thread parent"),
            threaded(thread + 5, thread, "U2", "reply"),
        ],
    );

    let out = h
        .engine
        .sync_channel(CHANNEL, CONNECTOR, None, BTreeSet::new(), None)
        .await
        .unwrap();

    assert_eq!(out.weeks_synced, BTreeSet::from([MONDAY_MS]));
    assert_eq!(out.next_cursor, None);
    assert_eq!(h.ingest.document_count().await.unwrap(), 2);
    assert!(h
        .ingest
        .get_document(CONNECTOR, &thread_document_id(CHANNEL, &ts(thread)))
        .await
        .unwrap()
        .is_some());
    let bucket_doc = h
        .ingest
        .get_document(CONNECTOR, &bucket_document_id(CHANNEL, &week()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bucket_doc.sections.len(), 1);
    assert_eq!(bucket_doc.sections[0].content, "standalone");

    let folder = h
        .ingest
        .get_folder(CONNECTOR, &channel_folder_id(CHANNEL))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(folder.title, "#general");
}

#[tokio::test]
async fn test_scenario_b_message_cap_truncates() {
    let h = harness(SyncConfig::default()).await;
    let messages: Vec<_> = (0..7)
        .map(|i| msg(WEDNESDAY_S + i * 60, "U1", &format!("m{}", i)))
        .collect();
    h.platform.set_history(CHANNEL, messages);

    let mut request = ChunkRequest::for_bucket(CHANNEL, CONNECTOR, week());
    request.max_total_messages = Some(5);
    let outcome = h.engine.sync_non_threaded_chunk(request).await.unwrap();

    assert!(outcome.completed);
    assert_eq!(outcome.messages_processed, 5);
    let doc = h
        .ingest
        .get_document(CONNECTOR, &bucket_document_id(CHANNEL, &week()))
        .await
        .unwrap()
        .unwrap();
    let contents: Vec<_> = doc.sections.iter().map(|s| s.content.as_str()).collect();
    assert_eq!(contents, vec!["m2", "m3", "m4", "m5", "m6"]);
}

#[tokio::test]
async fn test_scenario_c_low_water_mark_excludes_old_thread() {
    let h = harness(SyncConfig::default()).await;
    let thread = WEDNESDAY_S - 100;
    h.platform.set_history(CHANNEL, vec![threaded(thread, thread, "U1", "old thread")]);
    h.platform
        .set_replies(CHANNEL, thread, vec![threaded(thread, thread, "U1", "old thread")]);

    let out = h
        .engine
        .sync_channel(CHANNEL, CONNECTOR, Some(WEDNESDAY_S * 1000), BTreeSet::new(), None)
        .await
        .unwrap();

    assert_eq!(out.next_cursor, None);
    assert!(out.weeks_synced.is_empty());
    assert_eq!(h.ingest.document_count().await.unwrap(), 0);
    assert_eq!(h.platform.replies_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_page_of_old_messages_stops_paging() {
    let config = SyncConfig {
        history_page_size: 1,
        ..SyncConfig::default()
    };
    let h = harness(config).await;
    let previous_week = MONDAY_MS / 1000 - 3600;
    h.platform.set_history(
        CHANNEL,
        vec![msg(previous_week - 60, "U1", "older"), msg(previous_week, "U1", "old")],
    );

    let out = h
        .engine
        .sync_channel(CHANNEL, CONNECTOR, Some(WEDNESDAY_S * 1000), BTreeSet::new(), None)
        .await
        .unwrap();

    assert_eq!(out.next_cursor, None);
    assert!(out.weeks_synced.is_empty());
    assert_eq!(h.ingest.document_count().await.unwrap(), 0);
    assert_eq!(h.platform.history_calls(), 1);
}

#[tokio::test]
async fn test_page_with_new_message_keeps_cursor() {
    let config = SyncConfig {
        history_page_size: 1,
        ..SyncConfig::default()
    };
    let h = harness(config).await;
    let previous_week = MONDAY_MS / 1000 - 3600;
    h.platform.set_history(
        CHANNEL,
        vec![
            msg(previous_week - 60, "U1", "older"),
            msg(previous_week, "U1", "old"),
            msg(WEDNESDAY_S + 60, "U2", "new"),
        ],
    );

    let out = h
        .engine
        .sync_channel(CHANNEL, CONNECTOR, Some(WEDNESDAY_S * 1000), BTreeSet::new(), None)
        .await
        .unwrap();

    assert_eq!(out.next_cursor.as_deref(), Some("offset:1"));
    assert_eq!(out.weeks_synced, BTreeSet::from([MONDAY_MS]));
    assert_eq!(h.ingest.document_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_message_in_last_microseconds_of_week_is_synced() {
    let h = harness(SyncConfig::default()).await;
    let last_ts = format!("{}.999500", (week().end_ms - 1) / 1000);
    h.platform.set_history(
        CHANNEL,
        vec![chatsync_core::Message {
            ts: last_ts.clone(),
            ..msg(0, "U1", "just before midnight")
        }],
    );

    let outcome = h
        .engine
        .sync_non_threaded_chunk(ChunkRequest::for_bucket(CHANNEL, CONNECTOR, week()))
        .await
        .unwrap();
    assert_eq!(outcome.messages_processed, 1);

    h.ingest.delete_document(CONNECTOR, &bucket_document_id(CHANNEL, &week())).await.unwrap();
    let out = h
        .engine
        .sync_channel(CHANNEL, CONNECTOR, None, BTreeSet::new(), None)
        .await
        .unwrap();
    assert_eq!(out.weeks_synced, BTreeSet::from([MONDAY_MS]));

    let doc = h
        .ingest
        .get_document(CONNECTOR, &bucket_document_id(CHANNEL, &week()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(section_ts(&doc), vec![last_ts]);
}

#[tokio::test]
async fn test_scenario_d_not_in_channel_is_soft() {
    let h = harness(SyncConfig::default()).await;
    h.platform.set_history(CHANNEL, vec![msg(WEDNESDAY_S, "U1", "hello")]);
    h.platform.fail_history(Some(PlatformErrorKind::NotInChannel));

    let outcome = h
        .engine
        .sync_non_threaded_chunk(ChunkRequest::for_bucket(CHANNEL, CONNECTOR, week()))
        .await
        .unwrap();

    assert!(outcome.completed);
    assert_eq!(outcome.messages_processed, 0);
    assert_eq!(h.ingest.document_count().await.unwrap(), 0);
    assert_eq!(h.ingest.row_count(CONNECTOR).await.unwrap(), 0);
}

#[tokio::test]
async fn test_other_history_errors_propagate() {
    let h = harness(SyncConfig::default()).await;
    h.platform.fail_history(Some(PlatformErrorKind::Transient));

    let err = h
        .engine
        .sync_non_threaded_chunk(ChunkRequest::for_bucket(CHANNEL, CONNECTOR, week()))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Platform(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_thread_filters_own_bot_and_honors_skip() {
    let h = harness(SyncConfig::default()).await;
    let thread = WEDNESDAY_S;
    h.platform.set_replies(
        CHANNEL,
        thread,
        vec![
            threaded(thread, thread, "U1", "deploy?"),
            threaded(thread + 1, thread, BOT_USER, "bot echo"),
        ],
    );

    h.engine
        .sync_thread(CHANNEL, "general", &ts(thread), CONNECTOR, false)
        .await
        .unwrap();
    let doc_id = thread_document_id(CHANNEL, &ts(thread));
    let doc = h.ingest.get_document(CONNECTOR, &doc_id).await.unwrap().unwrap();
    assert_eq!(doc.sections.len(), 1);
    assert_eq!(doc.title, "#general thread 2024-01-03T12:00:00+00:00");

    // A thread row marked skipped is left alone.
    let skipped = WEDNESDAY_S + 100;
    h.platform
        .set_replies(CHANNEL, skipped, vec![threaded(skipped, skipped, "U1", "secret")]);
    h.ingest
        .create_row(&TrackingRow {
            connector_id: CONNECTOR.to_string(),
            channel_id: CHANNEL.to_string(),
            document_id: thread_document_id(CHANNEL, &ts(skipped)),
            message_ts: Some(ts(skipped)),
            skip_reason: Some("blocked".to_string()),
        })
        .await
        .unwrap();
    h.engine
        .sync_thread(CHANNEL, "general", &ts(skipped), CONNECTOR, false)
        .await
        .unwrap();
    assert!(h
        .ingest
        .get_document(CONNECTOR, &thread_document_id(CHANNEL, &ts(skipped)))
        .await
        .unwrap()
        .is_none());

    // Only the bot's own replies: nothing to write.
    let bot_only = WEDNESDAY_S + 200;
    h.platform
        .set_replies(CHANNEL, bot_only, vec![threaded(bot_only, bot_only, BOT_USER, "status")]);
    h.engine
        .sync_thread(CHANNEL, "general", &ts(bot_only), CONNECTOR, true)
        .await
        .unwrap();
    assert_eq!(h.ingest.document_count().await.unwrap(), 1);

    // Deleted thread.
    h.engine
        .sync_thread(CHANNEL, "general", &ts(WEDNESDAY_S + 999), CONNECTOR, true)
        .await
        .unwrap();
    assert_eq!(h.ingest.document_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_revoked_permission_stops_threads() {
    let h = harness(SyncConfig::default()).await;
    let thread = WEDNESDAY_S;
    h.platform
        .set_replies(CHANNEL, thread, vec![threaded(thread, thread, "U1", "hi")]);
    h.ingest
        .upsert_channel(CONNECTOR, &tracked_channel(CHANNEL, "general", PermissionLevel::None))
        .await
        .unwrap();

    h.engine
        .sync_threads(CHANNEL, "general", &[ts(thread), ts(thread)], CONNECTOR, true)
        .await
        .unwrap();
    assert_eq!(h.platform.replies_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(h.ingest.document_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unsyncable_channel_is_a_no_op() {
    let h = harness(SyncConfig::default()).await;
    h.platform.set_history(CHANNEL, vec![msg(WEDNESDAY_S, "U1", "hi")]);
    let mut channel = tracked_channel(CHANNEL, "general", PermissionLevel::Read);
    channel.skip_reason = Some("excluded by admin".to_string());
    h.ingest.upsert_channel(CONNECTOR, &channel).await.unwrap();

    let weeks = BTreeSet::from([42]);
    let out = h
        .engine
        .sync_channel(CHANNEL, CONNECTOR, None, weeks.clone(), Some("offset:1".to_string()))
        .await
        .unwrap();
    assert_eq!(out.next_cursor, None);
    assert_eq!(out.weeks_synced, weeks);
    assert_eq!(h.platform.history_calls(), 0);
}

#[tokio::test]
async fn test_channel_metadata_is_refreshed() {
    let h = harness(SyncConfig::default()).await;
    h.platform.add_channel(CHANNEL, "general-renamed", true, false);

    h.engine
        .sync_channel(CHANNEL, CONNECTOR, None, BTreeSet::new(), None)
        .await
        .unwrap();
    let channel = h.ingest.get_channel(CONNECTOR, CHANNEL).await.unwrap().unwrap();
    assert_eq!(channel.name, "general-renamed");
    let folder = h
        .ingest
        .get_folder(CONNECTOR, &channel_folder_id(CHANNEL))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(folder.title, "#general-renamed");
}

#[tokio::test]
async fn test_missing_configuration_fails_fast() {
    let h = harness(SyncConfig::default()).await;

    let err = h
        .engine
        .sync_channel(CHANNEL, "unknown", None, BTreeSet::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ConnectorNotFound(_)));
    assert!(!err.is_retryable());

    h.platform.remove_channel(CHANNEL);
    let err = h
        .engine
        .sync_channel(CHANNEL, CONNECTOR, None, BTreeSet::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ChannelNotFound { .. }));
}

#[tokio::test]
async fn test_garbage_collection_round_trip() {
    let h = harness(SyncConfig::default()).await;
    let thread = WEDNESDAY_S - 100;
    h.platform.set_history(
        CHANNEL,
        vec![msg(WEDNESDAY_S, "U1", "hello"), threaded(thread, thread, "U1", "thread")],
    );
    h.platform
        .set_replies(CHANNEL, thread, vec![threaded(thread, thread, "U1", "thread")]);
    h.engine
        .sync_channel(CHANNEL, CONNECTOR, None, BTreeSet::new(), None)
        .await
        .unwrap();
    assert_eq!(h.ingest.row_count(CONNECTOR).await.unwrap(), 2);

    // A readable channel still visible remotely must survive.
    h.ingest
        .upsert_channel(CONNECTOR, &tracked_channel("C200", "random", PermissionLevel::Read))
        .await
        .unwrap();
    h.platform.add_channel("C200", "random", true, false);
    // Visible, but the bot was removed: not part of the remote set.
    h.platform.add_channel("C300", "lurk", false, false);
    h.platform.remove_channel(CHANNEL);

    let plan = h
        .engine
        .get_channels_to_garbage_collect(CONNECTOR)
        .await
        .unwrap();
    assert_eq!(plan.channels_to_delete_from_data_source, vec![CHANNEL.to_string()]);
    assert_eq!(plan.channels_to_delete_from_connectors_db, vec![CHANNEL.to_string()]);

    h.engine.delete_channel(CHANNEL, CONNECTOR).await.unwrap();
    assert_eq!(h.ingest.document_count().await.unwrap(), 0);
    assert_eq!(h.ingest.row_count(CONNECTOR).await.unwrap(), 0);
    assert!(h
        .ingest
        .get_folder(CONNECTOR, &channel_folder_id(CHANNEL))
        .await
        .unwrap()
        .is_none());

    h.engine
        .delete_channels_from_connector_db(&plan.channels_to_delete_from_connectors_db, CONNECTOR)
        .await
        .unwrap();
    assert!(h.ingest.get_channel(CONNECTOR, CHANNEL).await.unwrap().is_none());
    assert!(h.ingest.get_channel(CONNECTOR, "C200").await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_channel_keeps_other_connector_documents() {
    const OTHER: &str = "conn-2";
    let h = harness(SyncConfig::default()).await;
    h.ingest
        .upsert_connector(&ConnectorConfig {
            connector_id: OTHER.to_string(),
            ..ConnectorConfig::default()
        })
        .await
        .unwrap();
    h.ingest
        .upsert_channel(OTHER, &tracked_channel(CHANNEL, "general", PermissionLevel::Read))
        .await
        .unwrap();
    h.platform.set_history(CHANNEL, vec![msg(WEDNESDAY_S, "U1", "shared")]);

    let request = ChunkRequest::for_bucket(CHANNEL, CONNECTOR, week());
    h.engine.sync_non_threaded_chunk(request).await.unwrap();
    let request = ChunkRequest::for_bucket(CHANNEL, OTHER, week());
    h.engine.sync_non_threaded_chunk(request).await.unwrap();
    assert_eq!(h.ingest.document_count().await.unwrap(), 2);

    h.engine.delete_channel(CHANNEL, CONNECTOR).await.unwrap();

    let doc_id = bucket_document_id(CHANNEL, &week());
    assert!(h.ingest.get_document(CONNECTOR, &doc_id).await.unwrap().is_none());
    assert!(h.ingest.find_row(OTHER, CHANNEL, &doc_id).await.unwrap().is_some());
    let kept = h.ingest.get_document(OTHER, &doc_id).await.unwrap().unwrap();
    assert_eq!(kept.sections[0].content, "shared");
}

#[tokio::test]
async fn test_delete_channel_in_small_batches() {
    let config = SyncConfig {
        gc_batch_size: 1,
        ..SyncConfig::default()
    };
    let h = harness(config).await;
    let threads = [WEDNESDAY_S - 300, WEDNESDAY_S - 200, WEDNESDAY_S - 100];
    let mut history = Vec::new();
    for t in threads {
        history.push(threaded(t, t, "U1", "q"));
        h.platform.set_replies(CHANNEL, t, vec![threaded(t, t, "U1", "q")]);
    }
    h.platform.set_history(CHANNEL, history);
    h.engine
        .sync_channel(CHANNEL, CONNECTOR, None, BTreeSet::new(), None)
        .await
        .unwrap();
    assert_eq!(h.ingest.document_count().await.unwrap(), 3);

    let beats_before = h.heartbeat.beats();
    h.engine.delete_channel(CHANNEL, CONNECTOR).await.unwrap();
    assert_eq!(h.ingest.document_count().await.unwrap(), 0);
    assert_eq!(h.ingest.row_count(CONNECTOR).await.unwrap(), 0);
    // One liveness signal per deleted batch.
    assert_eq!(h.heartbeat.beats() - beats_before, 3);
}

#[tokio::test]
async fn test_attempt_channel_join() {
    let h = harness(SyncConfig::default()).await;
    h.platform.add_channel("C200", "random", false, false);
    h.platform.add_channel("C300", "old", false, true);

    assert!(h.engine.attempt_channel_join("C200", CONNECTOR).await.unwrap());
    assert!(!h.engine.attempt_channel_join("C300", CONNECTOR).await.unwrap());
    let err = h
        .engine
        .attempt_channel_join("C404", CONNECTOR)
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_fetch_users_resolves_names() {
    let config = SyncConfig {
        users_page_size: 1,
        ..SyncConfig::default()
    };
    let h = harness(config).await;
    h.platform.set_users(vec![
        PlatformUser {
            id: "U1".to_string(),
            real_name: Some("Alice Smith".to_string()),
            display_name: None,
        },
        PlatformUser {
            id: "U2".to_string(),
            real_name: None,
            display_name: Some("bob".to_string()),
        },
    ]);

    assert_eq!(h.engine.fetch_users(CONNECTOR).await.unwrap(), 2);
    assert_eq!(h.engine.users().name_of("U2").await.as_deref(), Some("bob"));

    h.platform
        .set_history(CHANNEL, vec![msg(WEDNESDAY_S, "U1", "ping <@U2>")]);
    h.engine
        .sync_non_threaded_chunk(ChunkRequest::for_bucket(CHANNEL, CONNECTOR, week()))
        .await
        .unwrap();
    let doc = h
        .ingest
        .get_document(CONNECTOR, &bucket_document_id(CHANNEL, &week()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.sections[0].prefix, ">> @Alice Smith [2024-01-03 12:00:00]:");
    assert_eq!(doc.sections[0].content, "ping @bob");
}

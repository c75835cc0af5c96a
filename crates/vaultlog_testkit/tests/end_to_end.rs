//! End-to-end tests: client sessions against the in-process server.

use std::sync::Arc;
use vaultlog_client::{ClientConfig, ClientError, EncryptionKey, ItemId, TransportError};
use vaultlog_testkit::prelude::*;

#[tokio::test]
async fn batch_insert_keeps_order() {
    init_tracing();
    let session = TestSession::new();

    let ids = session
        .batch_insert(&text_records(&["a", "b", "c"]))
        .await
        .unwrap();
    session.sync().await.unwrap();

    let items = session.get_items();
    let positions: Vec<_> = ids
        .iter()
        .map(|id| session.get_item_id_to_position()[id])
        .collect();
    assert_eq!(positions, vec![0, 1, 2]);
    assert_eq!(live_texts(&items), vec!["a", "b", "c"]);
    assert_eq!(session.get_max_sequence_no(), 1);
}

#[tokio::test]
async fn delete_leaves_a_tombstone() {
    init_tracing();
    let session = TestSession::new();

    let a = session.insert(&text_record("a")).await.unwrap();
    let b = session.insert(&text_record("b")).await.unwrap();
    let c = session.insert(&text_record("c")).await.unwrap();
    session.sync().await.unwrap();
    let c_before = session.get_item_id_to_position()[&c];

    session.delete(b).await.unwrap();
    session.sync().await.unwrap();

    let items = session.get_items();
    assert_eq!(
        raw_texts(&items),
        vec![Some("a".to_string()), None, Some("c".to_string())]
    );
    assert_eq!(live_texts(&items), vec!["a", "c"]);

    let map = session.get_item_id_to_position();
    assert_eq!(map[&c], c_before);
    assert_eq!(map[&a], 0);
    assert!(!map.contains_key(&b));
}

#[tokio::test]
async fn update_keeps_position() {
    init_tracing();
    let session = TestSession::new();

    session.insert(&text_record("first")).await.unwrap();
    let a = session.insert(&text_record("draft")).await.unwrap();
    session.insert(&text_record("last")).await.unwrap();
    session.sync().await.unwrap();
    let position = session.get_item_id_to_position()[&a];

    session.update(a, &text_record("final")).await.unwrap();
    session.sync().await.unwrap();

    let items = session.get_items();
    assert_eq!(session.get_item_id_to_position()[&a], position);
    assert_eq!(decode::<String>(&items.get(position).unwrap().record), "final");
    assert_eq!(items.len(), 3);
}

#[tokio::test]
async fn batch_update_and_delete() {
    let session = TestSession::new();
    let ids = session
        .batch_insert(&text_records(&["a", "b", "c", "d"]))
        .await
        .unwrap();
    session
        .batch_update(&[ids[3], ids[0]], &text_records(&["D", "A"]))
        .await
        .unwrap();
    session.batch_delete(&[ids[1], ids[2]]).await.unwrap();
    session.sync().await.unwrap();

    let items = session.get_items();
    assert_eq!(
        raw_texts(&items),
        vec![Some("A".to_string()), None, None, Some("D".to_string())]
    );
    assert_eq!(session.get_max_sequence_no(), 3);
}

#[tokio::test]
async fn sequence_number_never_goes_back() {
    let session = TestSession::new();
    let mut last = session.get_max_sequence_no();

    for round in 0..5 {
        for i in 0..round {
            session
                .insert(&text_record(&format!("{round}-{i}")))
                .await
                .unwrap();
        }
        let report = session.sync().await.unwrap();
        assert!(report.max_sequence_no >= last);
        assert!(session.get_max_sequence_no() >= last);
        last = session.get_max_sequence_no();
    }
    assert_eq!(last, 10);
}

#[tokio::test]
async fn writes_are_not_visible_before_sync() {
    let session = TestSession::new();
    session.insert(&text_record("pending")).await.unwrap();
    assert!(session.get_items().is_empty());
    assert_eq!(session.get_max_sequence_no(), 0);
}

#[tokio::test]
async fn unauthorized_sync_purges_once_and_reraises() {
    init_tracing();
    let session = TestSession::new();
    session.insert(&text_record("a")).await.unwrap();
    session.sync().await.unwrap();
    let before = session.store().snapshot();

    session.transport.expire_auth();
    let err = session.sync().await.unwrap_err();

    assert!(matches!(err, ClientError::AuthExpired(_)));
    assert_eq!(session.keys.purge_count(), 1);
    assert!(!session.keys.is_authenticated());
    assert!(Arc::ptr_eq(&before, &session.store().snapshot()));
}

#[tokio::test]
async fn unauthorized_mutation_purges_once_and_returns_no_id() {
    let session = TestSession::new();
    session
        .transport
        .fail_next(TransportError::unauthorized("token expired"));

    let err = session
        .batch_insert(&text_records(&["a", "b"]))
        .await
        .unwrap_err();
    assert!(err.is_auth_expired());
    assert_eq!(session.keys.purge_count(), 1);
    assert_eq!(session.transport.head(), 0);

    // without a key nothing reaches the server, so nothing purges again
    let err = session.insert(&text_record("c")).await.unwrap_err();
    assert_eq!(err, ClientError::NotAuthenticated);
    assert_eq!(session.keys.purge_count(), 1);
}

#[tokio::test]
async fn decryption_failure_is_all_or_nothing() {
    init_tracing();
    let session = TestSession::new();
    session.insert(&text_record("kept")).await.unwrap();
    session.sync().await.unwrap();
    let before = session.store().snapshot();

    for text in ["2", "3", "4", "5"] {
        session.insert(&text_record(text)).await.unwrap();
    }
    assert!(session.transport.corrupt_entry(3));

    let err = session.sync().await.unwrap_err();
    assert!(matches!(err, ClientError::Decryption(_)));
    assert!(Arc::ptr_eq(&before, &session.store().snapshot()));
    assert_eq!(live_texts(&session.get_items()), vec!["kept"]);
    assert_eq!(session.stats().syncs_failed, 1);
}

#[tokio::test]
async fn foreign_key_cannot_read_the_log() {
    let alice = TestSession::new();
    alice.insert(&text_record("secret")).await.unwrap();

    let eve = alice.peer();
    eve.keys.set_key(EncryptionKey::generate());
    let err = eve.sync().await.unwrap_err();
    assert!(matches!(err, ClientError::Decryption(_)));
    assert!(eve.get_items().is_empty());
}

#[tokio::test]
async fn peers_converge() {
    let laptop = TestSession::new();
    let phone = laptop.peer();

    let ids = laptop
        .batch_insert(&text_records(&["milk", "eggs"]))
        .await
        .unwrap();
    phone.sync().await.unwrap();
    phone.update(ids[1], &text_record("bread")).await.unwrap();
    phone.insert(&text_record("tea")).await.unwrap();
    laptop.delete(ids[0]).await.unwrap();

    laptop.sync().await.unwrap();
    phone.sync().await.unwrap();

    assert_eq!(raw_texts(&laptop.get_items()), raw_texts(&phone.get_items()));
    assert_eq!(live_texts(&phone.get_items()), vec!["bread", "tea"]);
    assert_eq!(laptop.get_max_sequence_no(), 4);
}

#[tokio::test]
async fn compaction_rebuilds_late_peers_from_the_bundle() {
    init_tracing();
    let writer = TestSession::with_bundling(4);
    let reader = writer.peer();

    let ids = writer
        .batch_insert(&text_records(&["a", "b", "c"]))
        .await
        .unwrap();
    for (i, id) in ids.iter().enumerate() {
        writer
            .update(*id, &text_record(&format!("v{i}")))
            .await
            .unwrap();
    }
    writer.delete(ids[1]).await.unwrap();
    writer.insert(&text_record("d")).await.unwrap();
    writer.shutdown().await;

    assert!(writer.transport.bundle_seq_no().is_some());
    assert!(writer.stats().compaction.compacted >= 1);

    let report = reader.sync().await.unwrap();
    assert!(report.bundle_seq_no.is_some());
    assert_eq!(reader.get_max_sequence_no(), 6);
    assert_eq!(
        raw_texts(&reader.get_items()),
        vec![
            Some("v0".to_string()),
            None,
            Some("v2".to_string()),
            Some("d".to_string())
        ]
    );

    // the writer has never synced, so it also starts from the bundle
    writer.sync().await.unwrap();
    assert_eq!(raw_texts(&writer.get_items()), raw_texts(&reader.get_items()));
}

#[tokio::test]
async fn synced_peer_continues_past_a_newer_bundle() {
    let writer = TestSession::with_bundling(3);
    let reader = writer.peer();

    writer.insert(&text_record("a")).await.unwrap();
    reader.sync().await.unwrap();

    writer
        .batch_insert(&text_records(&["b", "c"]))
        .await
        .unwrap();
    writer.insert(&text_record("d")).await.unwrap();
    writer.insert(&text_record("e")).await.unwrap();
    writer.shutdown().await;

    // reader is at 1 and the bundle covers more than that
    let bundle = writer.transport.bundle_seq_no().unwrap();
    assert!(bundle > 1);
    let report = reader.sync().await.unwrap();
    assert_eq!(report.bundle_seq_no, Some(bundle));
    assert_eq!(live_texts(&reader.get_items()), vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn disabled_compaction_sends_no_signals() {
    let session = TestSession::with_config(ClientConfig::default().with_compaction(false));
    session.insert(&text_record("a")).await.unwrap();
    session.delete(ItemId::new()).await.unwrap();
    session.shutdown().await;
    assert_eq!(session.stats().compaction.signals, 0);
    assert_eq!(session.stats().mutations_submitted, 2);
}

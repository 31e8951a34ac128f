mod common;

use std::{sync::Arc, time::Duration};

use boostlog::{
    config::TrackerConfig,
    core::store::OperationStore,
    operation::{RunOutcome, TargetSnapshot},
    client::ChannelMetadata,
    persist::{OperationArchive, sqlite::SqliteArchive},
    runtime::handle::spawn_tracker,
    types::{OperationId, OperationStatus, StopReason, TargetKind},
};
use tempfile::tempdir;

use common::{ScriptedClient, fast_config, recipients, wait_finished, wait_progress};

#[tokio::test]
async fn finished_operations_survive_in_the_archive() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("boosts.db");

    let archive = SqliteArchive::open(&path).expect("open");
    let handle = spawn_tracker(
        Arc::new(ScriptedClient::connected()),
        Some(Box::new(archive)),
        fast_config(),
    )
    .expect("spawn tracker");
    let mut sub = handle.subscribe();

    let id = handle
        .start_channel_boost("0029VaNEWS01", recipients(&["A", "B", "C"]))
        .await
        .expect("start");
    wait_finished(&mut sub, id).await;
    let live = handle.get_operation(id).await.expect("get").expect("operation");
    handle.shutdown().await.expect("shutdown");

    let reopened = SqliteArchive::open(&path).expect("reopen");
    assert_eq!(reopened.count().expect("count"), 1);
    assert_eq!(reopened.load(id).expect("load"), Some(live.clone()));
    assert_eq!(reopened.load_all().expect("load all"), vec![live]);
    assert_eq!(reopened.load(OperationId::new()).expect("load"), None);
}

#[tokio::test]
async fn shutdown_stops_the_active_run_and_archives_it() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("boosts.db");

    let cfg = TrackerConfig {
        group_delay: Duration::from_secs(30),
        ..fast_config()
    };
    let handle = spawn_tracker(
        Arc::new(ScriptedClient::connected()),
        Some(Box::new(SqliteArchive::open(&path).expect("open"))),
        cfg,
    )
    .expect("spawn tracker");
    let mut sub = handle.subscribe();

    let id = handle
        .start_group_boost("InviteCode42", recipients(&["A", "B", "C"]))
        .await
        .expect("start");
    wait_progress(&mut sub, id, 1).await;
    handle.shutdown().await.expect("shutdown");

    let archived = SqliteArchive::open(&path)
        .expect("reopen")
        .load(id)
        .expect("load")
        .expect("archived");
    assert_eq!(archived.status, OperationStatus::Stopped);
    assert_eq!(archived.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(archived.success_list, recipients(&["A"]));
}

#[test]
fn archive_refuses_running_operations() {
    let mut store = OperationStore::new();
    let id = OperationId::new();
    let snapshot = TargetSnapshot::Channel(ChannelMetadata {
        name: "n".into(),
        follower_count: 0,
    });
    store
        .create(id, TargetKind::Channel, "ID".into(), 1, snapshot, 1)
        .expect("create");
    store.mark_processing(id).expect("processing");

    let mut archive = SqliteArchive::open_in_memory().expect("open");
    let running = store.get_cloned(id).expect("operation");
    assert!(archive.archive(&running).is_err());

    store.record_success(id, "+1".into()).expect("success");
    store.finish(id, RunOutcome::Completed, None, 2).expect("finish");
    let done = store.get_cloned(id).expect("operation");
    archive.archive(&done).expect("archive");
    assert_eq!(archive.load_all().expect("load all"), vec![done]);
}

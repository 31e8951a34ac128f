mod common;

use std::{sync::Arc, time::Duration};

use boostlog::{config::TrackerConfig, runtime::handle::spawn_tracker, types::OperationStatus};

use common::{ScriptedClient, fast_config, recipients, wait_finished, wait_progress};

#[tokio::test]
async fn finished_operations_are_evicted_once_old_enough() {
    let handle = spawn_tracker(Arc::new(ScriptedClient::connected()), None, fast_config())
        .expect("spawn tracker");
    let mut sub = handle.subscribe();

    let id = handle
        .start_channel_boost("0029VaNEWS01", recipients(&["A", "B"]))
        .await
        .expect("start");
    wait_finished(&mut sub, id).await;

    assert_eq!(handle.evict_older_than(Duration::from_secs(3600)).await.expect("evict"), 0);
    assert_eq!(handle.list_operations().await.expect("list").len(), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.evict_older_than(Duration::from_millis(5)).await.expect("evict"), 1);
    assert!(handle.list_operations().await.expect("list").is_empty());
    assert!(handle.get_operation(id).await.expect("get").is_none());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn running_operations_are_never_evicted() {
    let cfg = TrackerConfig {
        group_delay: Duration::from_secs(30),
        ..fast_config()
    };
    let handle = spawn_tracker(Arc::new(ScriptedClient::connected()), None, cfg)
        .expect("spawn tracker");
    let mut sub = handle.subscribe();

    let id = handle
        .start_group_boost("InviteCode42", recipients(&["A", "B"]))
        .await
        .expect("start");
    wait_progress(&mut sub, id, 1).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(handle.evict_older_than(Duration::ZERO).await.expect("evict"), 0);
    let op = handle.get_operation(id).await.expect("get").expect("operation");
    assert_eq!(op.status, OperationStatus::Processing);

    handle.cancel(id).await.expect("cancel");
    wait_finished(&mut sub, id).await;
    handle.shutdown().await.expect("shutdown");
}

//! Transition history surviving a restart on the SQLite backend

use chrono::{Duration, Utc};
use livewatch::actors::history::HistoryHandle;
use livewatch::monitors::cadence::BatchSelection;
use livewatch::storage::sqlite::SqliteBackend;
use livewatch::storage::{HistoryBackend, TransitionEvent, TransitionKind};
use livewatch::{EntityId, LiveStatus};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::*;

async fn open_history(path: &std::path::Path, retention_days: Option<u32>) -> HistoryHandle {
    let backend = SqliteBackend::new(path).await.unwrap();
    HistoryHandle::spawn(Box::new(backend), retention_days)
}

#[tokio::test]
async fn test_transitions_survive_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("history.db");

    let rig = TestRig::with_history(&[1], open_history(&db_path, None).await);
    rig.seed(1, LiveStatus::Offline, "Evening stream");

    rig.source.set_room(1, LiveStatus::Live, "Evening stream");
    rig.engine.tick(BatchSelection::Full).await.unwrap();
    rig.source.set_room(1, LiveStatus::Cycling, "Evening stream");
    rig.engine.tick(BatchSelection::Full).await.unwrap();

    rig.history.flush().await.unwrap();
    assert_eq!(rig.history.stats().await.unwrap().recorded, 2);
    rig.history.shutdown().await.unwrap();

    let reopened = open_history(&db_path, None).await;
    let events = reopened.latest(EntityId(1), 10).await.unwrap();

    let kinds: Vec<_> = events.iter().map(|event| event.kind).collect();
    assert_eq!(
        kinds,
        vec![TransitionKind::LiveStart, TransitionKind::LiveEndViaCycle]
    );
    assert_eq!(events[0].host_name, "host-1");
    assert!(events[0].summary.starts_with("LiveStart! Room: 1/host-1"));
    assert!(events[0].raw_snapshot.contains("Evening stream"));

    reopened.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_retention_removes_old_transitions() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("history.db");

    {
        let backend = SqliteBackend::new(&db_path).await.unwrap();
        for (days_ago, kind) in [(45, TransitionKind::LiveStart), (44, TransitionKind::LiveEnd)] {
            backend
                .append(TransitionEvent {
                    timestamp: Utc::now() - Duration::days(days_ago),
                    entity_id: EntityId(3),
                    host_name: "Carol".to_string(),
                    kind,
                    raw_snapshot: "{}".to_string(),
                    summary: format!("{kind} for Carol"),
                })
                .await
                .unwrap();
        }
        backend
            .append(TransitionEvent {
                timestamp: Utc::now(),
                entity_id: EntityId(3),
                host_name: "Carol".to_string(),
                kind: TransitionKind::LiveStart,
                raw_snapshot: "{}".to_string(),
                summary: "fresh".to_string(),
            })
            .await
            .unwrap();
        backend.close().await.unwrap();
    }

    let history = open_history(&db_path, Some(30)).await;

    let mut stats = history.stats().await.unwrap();
    for _ in 0..50 {
        if stats.last_cleanup_time.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        stats = history.stats().await.unwrap();
    }

    assert_eq!(stats.total_deleted, 2);
    let remaining = history.latest(EntityId(3), 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].summary, "fresh");

    history.shutdown().await.unwrap();
}

//! Poller and refresh actors driving the engine

use std::time::Duration;

use chrono::NaiveTime;
use livewatch::actors::poller::PollerHandle;
use livewatch::actors::refresh::{RefreshHandle, refresh_host_names};
use livewatch::config::PollingConfig;
use livewatch::monitors::cadence::{BatchSelection, CadencePolicy, NetworkPath};
use livewatch::source::SourceError;
use livewatch::storage::TransitionKind;
use livewatch::{DestinationId, EntityId, EntityState, LiveStatus};

use crate::helpers::*;

/// Proxied cadence: 20s period, so the timer never fires during a test
fn create_policy() -> CadencePolicy {
    CadencePolicy::new(NetworkPath::Proxied, PollingConfig::default())
}

fn refresh_at() -> NaiveTime {
    NaiveTime::from_hms_opt(2, 2, 33).unwrap()
}

#[tokio::test]
async fn test_poll_now_runs_a_tick() {
    let rig = TestRig::new(&[1, 2]);
    rig.seed(1, LiveStatus::Offline, "A");
    rig.seed(2, LiveStatus::Offline, "B");
    rig.source.set_room(1, LiveStatus::Live, "A");
    rig.source.set_room(2, LiveStatus::Offline, "B");

    let poller = PollerHandle::spawn(rig.engine.clone(), create_policy());
    let report = poller.poll_now().await.unwrap();

    assert_eq!(report.selected.len(), 2);
    assert_eq!(report.transitions(), vec![(EntityId(1), TransitionKind::LiveStart)]);
    assert_eq!(rig.recorded(1).await.len(), 1);

    poller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_track_bootstraps_new_room() {
    let rig = TestRig::new(&[1]);
    rig.source.set_room(7, LiveStatus::Live, "Fresh");
    rig.directory.subscribe(EntityId(7), DestinationId(100));

    let poller = PollerHandle::spawn(rig.engine.clone(), create_policy());
    let state = poller.track(EntityId(7)).await.unwrap().unwrap();

    assert_eq!(state.status, LiveStatus::Live);
    assert_eq!(state.host_name, "host-7");
    assert_eq!(rig.cached(7), Some(state));

    let missing = poller.track(EntityId(8)).await.unwrap();
    assert!(matches!(missing, Err(SourceError::NotFound(_))));

    poller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_poll_after_shutdown_fails() {
    let rig = TestRig::new(&[1]);
    let poller = PollerHandle::spawn(rig.engine.clone(), create_policy());

    poller.shutdown().await.unwrap();
    // give the actor a chance to exit
    tokio::task::yield_now().await;

    assert!(poller.poll_now().await.is_err());
}

#[tokio::test]
async fn test_refresh_updates_cache_and_store() {
    let rig = TestRig::new(&[1, 2]);
    rig.seed(1, LiveStatus::Offline, "A");
    rig.seed(2, LiveStatus::Offline, "B");
    rig.source.set_room(1, LiveStatus::Offline, "A");
    rig.source.set_room(2, LiveStatus::Offline, "B");
    rig.source.set_host_name(1, Ok("Alice (renamed)".to_string()));
    rig.source
        .set_host_name(2, Err(SourceError::NetworkFailure("timeout".to_string())));

    let refresh = RefreshHandle::spawn(rig.engine.clone(), refresh_at());
    let report = refresh.refresh_now().await.unwrap();

    assert_eq!(report.updated, vec![EntityId(1)]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, EntityId(2));

    assert_eq!(rig.cached(1).unwrap().host_name, "Alice (renamed)");
    assert_eq!(rig.cached(1).unwrap().status, LiveStatus::Offline);
    assert_eq!(rig.cached(2).unwrap().host_name, "host-2");
    assert_eq!(
        rig.directory.host_name(EntityId(1)).as_deref(),
        Some("Alice (renamed)")
    );
    assert_eq!(rig.directory.host_name(EntityId(2)), None);

    refresh.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_refreshed_name_is_used_in_notices() {
    let rig = TestRig::new(&[1]);
    rig.seed(1, LiveStatus::Offline, "A");
    rig.source.set_room(1, LiveStatus::Offline, "A");
    rig.source.set_host_name(1, Ok("Alice".to_string()));

    let refresh = RefreshHandle::spawn(rig.engine.clone(), refresh_at());
    refresh.refresh_now().await.unwrap();

    rig.force_status(1, LiveStatus::Live);
    rig.engine.tick(BatchSelection::Full).await.unwrap();

    let sent = rig.session.sent();
    assert_eq!(sent.len(), DESTINATIONS.len());
    assert_eq!(sent[0].1.caption(), "Alice went offline");

    refresh.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_refresh_during_tick_keeps_new_name() {
    let rig = TestRig::with_slow_delivery(&[1], Duration::from_millis(300));
    rig.seed(1, LiveStatus::Offline, "A");
    rig.source.set_room(1, LiveStatus::Live, "B");
    rig.source.set_host_name(1, Ok("Renamed".to_string()));

    let engine = rig.engine.clone();
    let tick = tokio::spawn(async move { engine.tick(BatchSelection::Full).await });

    // the tick is now waiting on the slow delivery
    tokio::time::sleep(Duration::from_millis(100)).await;
    refresh_host_names(&rig.engine).await.unwrap();
    assert_eq!(rig.cached(1).unwrap().host_name, "Renamed");

    let report = tick.await.unwrap().unwrap();
    assert_eq!(report.transitions(), vec![(EntityId(1), TransitionKind::LiveStart)]);

    assert_eq!(
        rig.cached(1),
        Some(EntityState {
            status: LiveStatus::Live,
            title: "B".to_string(),
            host_name: "Renamed".to_string(),
        })
    );
    assert_eq!(
        rig.directory.host_name(EntityId(1)).as_deref(),
        Some("Renamed")
    );
}

#[tokio::test]
async fn test_refresh_walks_rooms_one_at_a_time() {
    let rig = TestRig::new(&[1, 2, 3, 4]);
    for entity in 1..=4 {
        rig.seed(entity, LiveStatus::Offline, "idle");
        rig.source.set_room(entity, LiveStatus::Offline, "idle");
        rig.source.delay(entity, Duration::from_millis(20));
    }

    let refresh = RefreshHandle::spawn(rig.engine.clone(), refresh_at());
    let report = refresh.refresh_now().await.unwrap();

    assert_eq!(report.updated.len(), 4);
    assert_eq!(rig.source.peak_concurrent_fetches(), 1);

    refresh.shutdown().await.unwrap();
}

//! Rotating batches in pool mode

use std::collections::HashMap;

use livewatch::engine::RotationQueue;
use livewatch::monitors::cadence::BatchSelection;
use livewatch::{EntityId, LiveStatus};

use crate::helpers::*;

const POOL: BatchSelection = BatchSelection::Rotating { batch_size: 2 };

fn create_rig(rooms: u64) -> TestRig {
    let entities: Vec<u64> = (1..=rooms).collect();
    let mut rig = TestRig::new(&entities);
    for &entity in &entities {
        rig.seed(entity, LiveStatus::Offline, "idle");
        rig.source.set_room(entity, LiveStatus::Offline, "idle");
    }
    rig.engine = rig.engine.with_rotation(RotationQueue::with_seed(42));
    rig
}

#[tokio::test]
async fn test_every_room_once_per_round() {
    let rig = create_rig(5);
    let mut seen: HashMap<EntityId, usize> = HashMap::new();

    // ceil(5 / 2) ticks
    for _ in 0..3 {
        let report = rig.engine.tick(POOL).await.unwrap();
        assert!(report.selected.len() <= 2);
        for entity in report.selected {
            *seen.entry(entity).or_default() += 1;
        }
    }

    assert_eq!(seen.len(), 5);
    assert!(seen.values().all(|&count| count == 1));
}

#[tokio::test]
async fn test_last_batch_of_round_is_not_topped_up() {
    let rig = create_rig(3);

    let first = rig.engine.tick(POOL).await.unwrap();
    let second = rig.engine.tick(POOL).await.unwrap();
    let third = rig.engine.tick(POOL).await.unwrap();

    assert_eq!(first.selected.len(), 2);
    assert_eq!(second.selected.len(), 1);
    assert!(!first.selected.contains(&second.selected[0]));
    // refilled only after the queue ran dry
    assert_eq!(third.selected.len(), 2);
}

#[tokio::test]
async fn test_only_selected_rooms_are_fetched() {
    let rig = create_rig(4);

    let report = rig.engine.tick(POOL).await.unwrap();

    for entity in 1..=4 {
        let expected = usize::from(report.selected.contains(&EntityId(entity)));
        assert_eq!(rig.source.fetch_count(entity), expected);
    }
}

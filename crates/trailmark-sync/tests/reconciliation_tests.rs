//! Tests for snapshot reconciliation on the client

use proptest::prelude::*;
use std::collections::HashSet;
use trailmark_model::{ActorId, Path, PathId, Point};
use trailmark_sync::*;

fn path(owner: ActorId, name: &str) -> Path {
    Path::new(Some(name), owner, "owner", "overworld")
        .with_points(vec![Point::new(0.0, 64.0, 0.0), Point::new(4.0, 64.0, 4.0)])
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_snapshot_preserves_visibility_and_local_paths() {
    let me = ActorId::new();
    let friend = ActorId::new();
    let reconciler = Reconciler::new(me);
    let mut store = PathStore::new();

    let a = path(me, "A");
    let b = path(friend, "B");
    let c = path(friend, "C");
    store.upsert(a.clone(), Origin::Local);
    store.set_visible(a.id());
    store.upsert(b.clone(), Origin::ServerShared);
    store.set_hidden(b.id());

    let report = reconciler.apply_snapshot(&mut store, vec![b.clone(), c.clone()]);

    assert_eq!(store.origin_of(&a.id()), Some(Origin::Local));
    assert!(store.is_visible(&a.id()));
    assert_eq!(store.origin_of(&b.id()), Some(Origin::ServerShared));
    assert!(!store.is_visible(&b.id()));
    assert_eq!(store.origin_of(&c.id()), Some(Origin::ServerShared));
    assert!(store.is_visible(&c.id()));

    assert_eq!(
        report,
        ReconcileReport {
            added: 1,
            retained_visible: 0,
            retained_hidden: 1,
            removed: 0,
            skipped_local: 0,
        }
    );
}

#[test]
fn test_snapshot_removes_omitted_server_paths() {
    let me = ActorId::new();
    let reconciler = Reconciler::new(me);
    let mut store = PathStore::new();

    let kept = path(me, "kept");
    let dropped = path(me, "dropped");
    store.upsert(kept.clone(), Origin::ServerOwned);
    store.upsert(dropped.clone(), Origin::ServerOwned);
    store.set_visible(kept.id());
    store.set_visible(dropped.id());

    let report = reconciler.apply_snapshot(&mut store, vec![kept.clone()]);

    assert_eq!(report.removed, 1);
    assert_eq!(report.retained_visible, 1);
    assert!(store.get(&dropped.id()).is_none());
    assert!(!store.is_visible(&dropped.id()));
    assert!(store.is_visible(&kept.id()));
}

#[test]
fn test_snapshot_reclassifies_by_owner() {
    let me = ActorId::new();
    let reconciler = Reconciler::new(me);
    let mut store = PathStore::new();

    // Tagged wrong on purpose; the snapshot re-derives the tag.
    let mine = path(me, "mine");
    store.upsert(mine.clone(), Origin::ServerShared);

    reconciler.apply_snapshot(&mut store, vec![mine.clone()]);
    assert_eq!(store.origin_of(&mine.id()), Some(Origin::ServerOwned));
}

#[test]
fn test_snapshot_replaces_server_state() {
    let me = ActorId::new();
    let reconciler = Reconciler::new(me);
    let mut store = PathStore::new();

    let mut owned = path(me, "before");
    store.upsert(owned.clone(), Origin::ServerOwned);
    owned.set_name("after").unwrap();
    owned.set_color(0xFF00FF00).unwrap();

    reconciler.apply_snapshot(&mut store, vec![owned.clone()]);
    let stored = store.get(&owned.id()).unwrap();
    assert_eq!(stored.name(), "after");
    assert_eq!(stored.color(), 0xFF00FF00);
}

#[test]
fn test_repeated_snapshot_is_stable() {
    let me = ActorId::new();
    let reconciler = Reconciler::new(me);
    let mut store = PathStore::new();
    let paths = vec![path(me, "one"), path(ActorId::new(), "two")];

    reconciler.apply_snapshot(&mut store, paths.clone());
    store.set_hidden(paths[1].id());
    let second = reconciler.apply_snapshot(&mut store, paths.clone());

    assert_eq!(second.added, 0);
    assert_eq!(second.retained_visible, 1);
    assert_eq!(second.retained_hidden, 1);
    assert_eq!(store.len(), 2);
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone)]
struct Existing {
    origin: Origin,
    visible: bool,
    in_snapshot: bool,
    mine: bool,
}

fn origin_strategy() -> impl Strategy<Value = Origin> {
    prop_oneof![
        Just(Origin::Local),
        Just(Origin::ServerOwned),
        Just(Origin::ServerShared),
    ]
}

fn existing_strategy() -> impl Strategy<Value = Vec<Existing>> {
    prop::collection::vec(
        (origin_strategy(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(origin, visible, in_snapshot, mine)| Existing {
                origin,
                visible,
                in_snapshot,
                mine,
            },
        ),
        0..24,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn reconciliation_rules_hold(existing in existing_strategy(), fresh in 0usize..6) {
        let me = ActorId::new();
        let friend = ActorId::new();
        let reconciler = Reconciler::new(me);
        let mut store = PathStore::new();
        let mut snapshot = Vec::new();
        let mut entries: Vec<(PathId, Existing)> = Vec::new();

        for e in &existing {
            let p = path(if e.mine { me } else { friend }, "p");
            store.upsert(p.clone(), e.origin);
            if e.visible {
                store.set_visible(p.id());
            }
            if e.in_snapshot && e.origin != Origin::Local {
                snapshot.push(p.clone());
            }
            entries.push((p.id(), e.clone()));
        }
        let mut new_ids = HashSet::new();
        for i in 0..fresh {
            let p = path(if i % 2 == 0 { me } else { friend }, "new");
            new_ids.insert(p.id());
            snapshot.push(p);
        }

        reconciler.apply_snapshot(&mut store, snapshot);

        for (id, e) in &entries {
            match e.origin {
                Origin::Local => {
                    prop_assert_eq!(store.origin_of(id), Some(Origin::Local));
                    prop_assert_eq!(store.is_visible(id), e.visible);
                }
                Origin::ServerOwned | Origin::ServerShared if e.in_snapshot => {
                    let expected = if e.mine { Origin::ServerOwned } else { Origin::ServerShared };
                    prop_assert_eq!(store.origin_of(id), Some(expected));
                    prop_assert_eq!(store.is_visible(id), e.visible);
                }
                Origin::ServerOwned | Origin::ServerShared => {
                    prop_assert!(store.get(id).is_none());
                    prop_assert!(!store.is_visible(id));
                }
            }
        }
        for id in &new_ids {
            prop_assert!(store.is_visible(id));
        }
    }
}

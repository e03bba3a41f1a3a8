//! Snapshot isolation across in-place updates.

use mvtreap::Treap;
use rstest::rstest;

fn entries(map: &Treap) -> Vec<(Vec<u8>, Vec<u8>)> {
    map.iter()
        .map(|(key, value)| (key.to_vec(), value.to_vec()))
        .collect()
}

#[rstest]
fn test_snapshot_observes_the_frozen_state() {
    let mut live = Treap::new()
        .insert(b"b", b"2")
        .insert(b"a", b"1")
        .insert(b"c", b"3");
    let view = live.clone();
    let record = live.snapshot();

    live.insert_mut(b"a", b"1x", None);
    live.insert_mut(b"d", b"4", None);

    assert_eq!(live.get(b"a"), Some(&b"1x"[..]));
    assert_eq!(live.get(b"d"), Some(&b"4"[..]));
    assert_eq!(live.len(), 4);

    // The snapshot-bearing handle still reads the old version, however long
    // the record stays live.
    assert_eq!(
        entries(&view),
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ]
    );

    drop(view);
    record.release();
    assert_eq!(live.len(), 4);
}

#[rstest]
fn test_record_carries_the_generation_stamp() {
    let map = Treap::new().insert(b"a", b"1").insert(b"b", b"2");
    let record = map.snapshot();
    assert_eq!(record.generation(), map.generation());
    record.release();
}

#[rstest]
fn test_snapshots_release_in_any_order() {
    let mut live = Treap::new();
    for index in 0u32..32 {
        live.insert_mut(&index.to_be_bytes(), b"v0", None);
    }

    let first_view = live.clone();
    let first = live.snapshot();
    for index in 0u32..32 {
        live.insert_mut(&index.to_be_bytes(), b"v1", None);
    }

    let second_view = live.clone();
    let second = live.snapshot();
    for index in 0u32..32 {
        live.insert_mut(&index.to_be_bytes(), b"v2", None);
    }

    // Release the newer record while the older one is still live.
    drop(second_view);
    second.release();

    assert!(first_view.values().all(|value| value == b"v0"));
    assert!(live.values().all(|value| value == b"v2"));

    drop(first_view);
    first.release();
    assert!(live.values().all(|value| value == b"v2"));
}

#[rstest]
fn test_interleaved_snapshots_each_keep_their_version() {
    let mut live = Treap::new();
    let mut views = Vec::new();
    let mut records = Vec::new();

    for round in 0u8..5 {
        live.insert_mut(b"round", &[round], None);
        views.push(live.clone());
        records.push(live.snapshot());
    }

    for (round, view) in views.iter().enumerate() {
        assert_eq!(view.get(b"round"), Some(&[round as u8][..]));
    }

    drop(views);
    for record in records {
        record.release();
    }
}

#[rstest]
fn test_excluded_record_does_not_pin_updates() {
    let mut live = Treap::new();
    for index in 0u32..16 {
        live.insert_mut(&index.to_be_bytes(), b"v", None);
    }
    let record = live.snapshot();

    // Updating "around" one's own record is the pattern the exclusion
    // parameter exists for; the content must be unaffected either way.
    for index in 0u32..16 {
        live.insert_mut(&index.to_be_bytes(), b"w", Some(&record));
    }
    assert_eq!(live.len(), 16);
    assert!(live.values().all(|value| value == b"w"));
    record.release();
}

#[rstest]
fn test_removals_under_snapshot_keep_the_view_complete() {
    let mut live: Treap = (0u32..64).map(|index| (index.to_be_bytes(), [1u8])).collect();
    let view = live.clone();
    let record = live.snapshot();

    for index in 0u32..64 {
        live.remove_mut(&index.to_be_bytes(), None);
    }
    assert!(live.is_empty());
    assert_eq!(view.len(), 64);
    assert!((0u32..64).all(|index| view.contains_key(&index.to_be_bytes())));

    drop(view);
    record.release();
}

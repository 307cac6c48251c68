use memsession::store::{OpError, Store};

const MISSING_ID: &str = "00000000-0000-4000-8000-000000000000";

#[test]
fn test_generate_and_exist() {
    let store = Store::new();

    let id = store.generate(60).expect("generate");
    assert_eq!(id.len(), 36);
    assert!(store.exist(&id).is_ok());
    assert_eq!(store.exist(MISSING_ID), Err(OpError::SessionNone));
    assert_eq!(store.session_count(), 1);
}

#[test]
fn test_key_read_write_cycle() {
    let store = Store::new();
    let id = store.generate(60).expect("generate");

    let counters = store.add_key(&id, "a", &[1, 2, 3, 4], 0).expect("add_key");
    assert_eq!(counters, (1, 0));

    let read = store.get_key(&id, "a", 0).expect("get_key");
    assert_eq!(read.data.as_ref(), &[1, 2, 3, 4]);
    assert_eq!((read.counter_keys, read.counter_record), (1, 0));

    store
        .set_key(&id, "a", &[0xAA, 0xBB], 1, 0, 0)
        .expect("set_key");

    let read = store.get_key(&id, "a", 0).expect("get_key after set");
    assert_eq!(read.data.as_ref(), &[0xAA, 0xBB]);
    assert_eq!((read.counter_keys, read.counter_record), (1, 1));
}

#[test]
fn test_set_key_rejects_stale_counters() {
    let store = Store::new();
    let id = store.generate(60).expect("generate");
    store.add_key(&id, "a", &[1], 0).expect("add_key");
    store.set_key(&id, "a", &[2], 1, 0, 0).expect("first set");

    // Stale counter_record.
    assert_eq!(
        store.set_key(&id, "a", &[3], 1, 0, 0),
        Err(OpError::RecordBeenChanged)
    );
    let read = store.get_key(&id, "a", 0).expect("get_key");
    assert_eq!(read.data.as_ref(), &[2], "failed CAS must not modify bytes");

    // Stale counter_keys after another key lands in the session.
    store.add_key(&id, "b", &[9], 0).expect("add_key b");
    assert_eq!(
        store.set_key(&id, "a", &[3], 1, 1, 0),
        Err(OpError::RecordBeenChanged)
    );
    assert!(store.set_key(&id, "a", &[3], 2, 1, 0).is_ok());
}

#[test]
fn test_set_force_key_skips_cas() {
    let store = Store::new();
    let id = store.generate(60).expect("generate");
    store.add_key(&id, "a", &[1], 0).expect("add_key");

    store.set_force_key(&id, "a", &[7, 7], 0).expect("force");
    let read = store.get_key(&id, "a", 0).expect("get_key");
    assert_eq!(read.data.as_ref(), &[7, 7]);
    assert_eq!(read.counter_record, 1, "force writes still bump the counter");
}

#[test]
fn test_key_lifetime_cannot_outlive_session() {
    let store = Store::new();
    let id = store.generate(10).expect("generate");

    assert_eq!(
        store.add_key(&id, "k", b"v", 20),
        Err(OpError::LifetimeExceeded)
    );
    assert!(store.add_key(&id, "k", b"v", 5).is_ok());

    assert_eq!(
        store.prolong_key(&id, "k", 20),
        Err(OpError::LifetimeExceeded)
    );
    assert!(store.prolong_key(&id, "k", 5).is_ok());
    // 0 disables the per-value expiry and is always within bounds.
    assert!(store.prolong_key(&id, "k", 0).is_ok());
}

#[test]
fn test_unbounded_session_accepts_any_key_lifetime() {
    let store = Store::new();
    let id = store.generate(0).expect("generate");
    assert!(store.add_key(&id, "k", b"v", 1_000_000).is_ok());
}

#[test]
fn test_duplicate_key_rejected() {
    let store = Store::new();
    let id = store.generate(60).expect("generate");
    store.add_key(&id, "k", b"v", 0).expect("add_key");
    assert_eq!(store.add_key(&id, "k", b"v", 0), Err(OpError::DuplicateKey));
}

#[test]
fn test_remove_key_then_re_add() {
    let store = Store::new();
    let id = store.generate(60).expect("generate");
    store.add_key(&id, "k", b"v", 0).expect("add_key");
    store.remove_key(&id, "k").expect("remove_key");
    assert_eq!(store.exist_key(&id, "k"), Err(OpError::KeyNone));

    let counters = store.add_key(&id, "k", b"w", 0).expect("re-add");
    assert_eq!(counters, (2, 0), "counter_keys keeps counting across removes");
}

#[test]
fn test_key_ops_against_missing_session() {
    let store = Store::new();
    assert_eq!(
        store.add_key(MISSING_ID, "k", b"v", 0),
        Err(OpError::SessionNone)
    );
    assert_eq!(store.exist_key(MISSING_ID, "k"), Err(OpError::SessionNone));
    assert_eq!(store.remove_key(MISSING_ID, "k"), Err(OpError::SessionNone));
    assert_eq!(store.get_key(MISSING_ID, "k", 0), Err(OpError::SessionNone));
    assert_eq!(store.prolong(MISSING_ID, 10), Err(OpError::SessionNone));
}

#[test]
fn test_client_supplied_session_ids() {
    let store = Store::new();

    store.add("alpha", 0).expect("add");
    assert_eq!(store.add("alpha", 0), Err(OpError::DuplicateSession));
    assert!(store.exist("alpha").is_ok());

    // A tombstoned entry is silently replaced.
    store.remove("alpha");
    assert!(store.add("alpha", 0).is_ok());
    assert!(store.exist("alpha").is_ok());
}

#[test]
fn test_remove_tombstones_until_sweep() {
    let store = Store::new();
    let id = store.generate(0).expect("generate");

    store.remove(&id);
    assert_eq!(store.exist(&id), Err(OpError::SessionNone));
    // Still occupies a map slot until the reaper runs.
    assert_eq!(store.session_count(), 1);

    store.clear_inactive();
    assert_eq!(store.session_count(), 0);
}

#[test]
fn test_remove_unknown_session_is_noop() {
    let store = Store::new();
    store.remove(MISSING_ID);
    assert_eq!(store.session_count(), 0);
}

#[test]
fn test_session_cap() {
    let store = Store::new();
    store.set_limit(2);

    store.generate(0).expect("first");
    store.generate(0).expect("second");
    assert_eq!(store.generate(0), Err(OpError::LimitExceeded));
    assert_eq!(store.add("extra", 0), Err(OpError::LimitExceeded));
    assert_eq!(store.free_sessions(), 0);
}

#[test]
fn test_unlimited_reset_clears_count() {
    let store = Store::new();
    store.set_limit(2);
    store.generate(0).expect("first");
    store.generate(0).expect("second");

    // The historical quirk: reconfiguring to unlimited forgets the count.
    store.set_limit(0);
    assert_eq!(store.session_count(), 0);
    assert!(store.generate(0).is_ok());
}

#[test]
fn test_prolong_lifts_session_expiry() {
    let store = Store::new();
    let id = store.generate(5).expect("generate");

    assert_eq!(
        store.add_key(&id, "k", b"v", 3600),
        Err(OpError::LifetimeExceeded)
    );
    store.prolong(&id, 0).expect("prolong to unbounded");
    assert!(store.add_key(&id, "k", b"v", 3600).is_ok());
}

#[test]
fn test_add_all_and_remove_all() {
    let store = Store::new();
    let ids = [
        store.generate(60).expect("u1"),
        store.generate(60).expect("u2"),
        store.generate(60).expect("u3"),
    ];
    // One session already holds the key; its value must survive.
    store.add_key(&ids[0], "k", b"mine", 0).expect("add_key");

    store.add_all_key("k", b"v");
    let read = store.get_key(&ids[0], "k", 0).expect("get u1");
    assert_eq!(read.data.as_ref(), b"mine");
    for id in &ids[1..] {
        let read = store.get_key(id, "k", 0).expect("get");
        assert_eq!(read.data.as_ref(), b"v");
        assert_eq!(read.counter_keys, 0, "bulk add does not touch counter_keys");
    }

    store.remove_all_key("k");
    for id in &ids {
        assert_eq!(store.exist_key(id, "k"), Err(OpError::KeyNone));
    }
}

#[test]
fn test_read_limiter_denies_rapid_burst() {
    let store = Store::new();
    let id = store.generate(60).expect("generate");
    store.add_key(&id, "k", b"v", 0).expect("add_key");

    // Five back-to-back reads at ceiling 1 span at most two wall-clock
    // seconds, so at least three must be denied.
    let denied = (0..5)
        .filter(|_| store.get_key(&id, "k", 1) == Err(OpError::LimitPerSecExceeded))
        .count();
    assert!(denied >= 3, "expected >= 3 denials, got {denied}");
}

#[test]
fn test_write_limiter_denies_rapid_burst() {
    let store = Store::new();
    let id = store.generate(60).expect("generate");
    store.add_key(&id, "k", b"v", 0).expect("add_key");

    let denied = (0..5)
        .filter(|_| {
            store.set_force_key(&id, "k", b"w", 1) == Err(OpError::LimitPerSecExceeded)
        })
        .count();
    assert!(denied >= 3, "expected >= 3 denials, got {denied}");
}

//! Namespace-level behaviour over in-memory tiers: round trips, freshness
//! interpretation and input validation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{keys, namespace, NamedMemoryStore, User};
use tiercache::{Error, SetOptions, Store};

const MINUTE: Duration = Duration::from_secs(60);

#[tokio::test]
async fn set_then_get_round_trips() {
    let l1 = NamedMemoryStore::new("l1");
    let l2 = NamedMemoryStore::new("l2");
    let users = namespace::<User>(
        "user",
        vec![l1.clone() as Arc<dyn Store>, l2.clone() as Arc<dyn Store>],
        10 * MINUTE,
        10 * MINUTE,
    );

    let flo = User::new("Flo", "test@example.com");
    users.set("u1", &flo, None).await.unwrap();

    assert_eq!(users.get("u1").await.unwrap(), Some(flo));
    assert_eq!(users.get("unknown").await.unwrap(), None);
}

#[tokio::test]
async fn empty_key_is_rejected() {
    let store = NamedMemoryStore::new("l1");
    let strings = namespace::<String>("s", vec![store as Arc<dyn Store>], MINUTE, MINUTE);

    assert!(matches!(
        strings.set("", &"v".to_string(), None).await,
        Err(Error::EmptyKey)
    ));
    assert!(matches!(
        strings.swr("", |_| async { Ok(None) }).await,
        Err(Error::EmptyKey)
    ));
}

#[tokio::test]
async fn empty_batches_are_rejected_except_remove() {
    let store = NamedMemoryStore::new("l1");
    let strings = namespace::<String>("s", vec![store as Arc<dyn Store>], MINUTE, MINUTE);

    assert!(matches!(strings.get_many(&[]).await, Err(Error::NoKeys)));
    assert!(matches!(
        strings.set_many(Vec::new(), None).await,
        Err(Error::NoValues)
    ));
    assert!(matches!(
        strings.swr_many(&[], |_| async { Ok(Vec::new()) }).await,
        Err(Error::NoKeys)
    ));

    // Removing nothing is a successful no-op.
    strings.remove(&[]).await.unwrap();
}

#[tokio::test]
async fn expired_entry_reads_as_miss_and_is_evicted_everywhere() {
    let l1 = NamedMemoryStore::new("l1");
    let l2 = NamedMemoryStore::new("l2");
    let strings = namespace::<String>(
        "s",
        vec![l1.clone() as Arc<dyn Store>, l2.clone() as Arc<dyn Store>],
        Duration::from_millis(40),
        Duration::from_millis(40),
    );

    strings.set("k", &"v".to_string(), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(strings.get("k").await.unwrap(), None);

    // The observation removed the entry from every tier.
    assert!(l1.get("s", "k").await.unwrap().is_none());
    assert!(l2.get("s", "k").await.unwrap().is_none());
}

#[tokio::test]
async fn get_ignores_the_fresh_deadline() {
    let store = NamedMemoryStore::new("l1");
    let strings = namespace::<String>(
        "s",
        vec![store as Arc<dyn Store>],
        Duration::from_millis(1),
        Duration::from_secs(3600),
    );

    strings.set("k", &"v".to_string(), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Past fresh, inside stale: still a plain hit.
    assert_eq!(strings.get("k").await.unwrap(), Some("v".to_string()));
}

#[tokio::test]
async fn per_call_zero_durations_fall_back_to_defaults() {
    let store = NamedMemoryStore::new("l1");
    let strings = namespace::<String>(
        "s",
        vec![store as Arc<dyn Store>],
        10 * MINUTE,
        10 * MINUTE,
    );

    let opts = SetOptions::new()
        .fresh(Duration::ZERO)
        .stale(Duration::ZERO);
    strings.set("k", &"v".to_string(), Some(opts)).await.unwrap();

    // Zero is a sentinel for "use the namespace default", not "expire now".
    assert_eq!(strings.get("k").await.unwrap(), Some("v".to_string()));
}

#[tokio::test]
async fn get_many_reports_hits_and_misses_in_input_order() {
    let store = NamedMemoryStore::new("l1");
    let strings = namespace::<String>("s", vec![store as Arc<dyn Store>], MINUTE, MINUTE);

    strings.set("a", &"A".to_string(), None).await.unwrap();
    strings.set("c", &"C".to_string(), None).await.unwrap();

    let entries = strings.get_many(&keys(&["a", "b", "c"])).await.unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].key, "a");
    assert_eq!(entries[0].value, Some("A".to_string()));
    assert!(entries[0].found);
    assert_eq!(entries[1].key, "b");
    assert_eq!(entries[1].value, None);
    assert!(!entries[1].found);
    assert_eq!(entries[2].key, "c");
    assert_eq!(entries[2].value, Some("C".to_string()));
}

#[tokio::test]
async fn remove_clears_every_tier() {
    let l1 = NamedMemoryStore::new("l1");
    let l2 = NamedMemoryStore::new("l2");
    let users = namespace::<User>(
        "user",
        vec![l1.clone() as Arc<dyn Store>, l2.clone() as Arc<dyn Store>],
        MINUTE,
        MINUTE,
    );

    users
        .set("u1", &User::new("Flo", "test@example.com"), None)
        .await
        .unwrap();
    users.remove(&keys(&["u1"])).await.unwrap();

    assert_eq!(users.get("u1").await.unwrap(), None);
    assert!(l1.get("user", "u1").await.unwrap().is_none());
    assert!(l2.get("user", "u1").await.unwrap().is_none());
}

#[tokio::test]
async fn namespaces_do_not_leak_into_each_other() {
    let store = NamedMemoryStore::new("shared");
    let a = namespace::<String>("a", vec![store.clone() as Arc<dyn Store>], MINUTE, MINUTE);
    let b = namespace::<String>("b", vec![store as Arc<dyn Store>], MINUTE, MINUTE);

    a.set("k", &"from-a".to_string(), None).await.unwrap();

    assert_eq!(b.get("k").await.unwrap(), None);
    assert_eq!(a.get("k").await.unwrap(), Some("from-a".to_string()));
}

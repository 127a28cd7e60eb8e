//! Contract tests for the in-process store.

use std::sync::Arc;
use std::time::Duration;

use cask_core::{Backend, CacheError, CacheStore, Codec, CodecError, Encode, Expiration, Slot};
use cask_moka::{MokaConfig, MokaStore};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Point {
    x: i32,
    y: i32,
}

fn store() -> MokaStore {
    let codec = Codec::builder().register::<Point>("point").build().unwrap();
    MokaStore::builder(1_000).codec(Arc::new(codec)).build()
}

#[tokio::test]
async fn add_only_writes_absent_keys() {
    let store = store();
    store.add("k", &Point { x: 1, y: 1 }, Expiration::Default).await.unwrap();
    assert!(
        store
            .add("k", &Point { x: 2, y: 2 }, Expiration::Default)
            .await
            .unwrap_err()
            .is_not_stored()
    );

    let mut point = Point::default();
    store.get("k", &mut point).await.unwrap();
    assert_eq!(point, Point { x: 1, y: 1 });
}

#[tokio::test]
async fn replace_requires_existing_key() {
    let store = store();
    assert!(
        store
            .replace("k", Some(&1i64), Expiration::Default)
            .await
            .unwrap_err()
            .is_miss()
    );

    store.set("k", &1i64, Expiration::Default).await.unwrap();
    store.replace("k", Some(&2i64), Expiration::Default).await.unwrap();
    assert!(
        store
            .replace::<i64>("k", None, Expiration::Default)
            .await
            .unwrap_err()
            .is_not_stored()
    );

    let mut value = 0i64;
    store.get("k", &mut value).await.unwrap();
    assert_eq!(value, 2);
}

#[tokio::test]
async fn counters_never_auto_create_and_floor_at_zero() {
    let store = store();
    assert!(store.increment("c", 1).await.unwrap_err().is_miss());
    assert!(store.decrement("c", 1).await.unwrap_err().is_miss());

    store.set("c", &5i64, Expiration::Never).await.unwrap();
    assert_eq!(store.decrement("c", 3).await.unwrap(), 2);
    assert_eq!(store.decrement("c", 5).await.unwrap(), 0);
    assert_eq!(store.increment("c", 40).await.unwrap(), 40);

    let mut value = 0i64;
    store.get("c", &mut value).await.unwrap();
    assert_eq!(value, 40);
}

#[tokio::test]
async fn increment_rejects_non_counters() {
    let store = store();
    store.set("p", &Point::default(), Expiration::Never).await.unwrap();
    assert!(matches!(
        store.increment("p", 1).await,
        Err(CacheError::Codec(_))
    ));

    store.set("max", &i64::MAX, Expiration::Never).await.unwrap();
    assert!(matches!(
        store.increment("max", 1).await,
        Err(CacheError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn increment_keeps_expiry() {
    let store = store();
    store
        .set("c", &1i64, Expiration::After(Duration::from_millis(200)))
        .await
        .unwrap();
    store.increment("c", 1).await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.get_raw("c").await.unwrap_err().is_miss());
}

#[tokio::test]
async fn msetnx_and_mget() {
    let store = store();
    let first: [(&str, &dyn Encode); 2] = [("a", &1i64), ("b", &2i64)];
    store.msetnx(Expiration::Default, &first).await.unwrap();
    let second: [(&str, &dyn Encode); 2] = [("a", &9i64), ("c", &3i64)];
    store.msetnx(Expiration::Default, &second).await.unwrap();

    let (mut a, mut b, mut c) = (0i64, 0i64, 0i64);
    let mut dests: [&mut dyn Slot; 3] = [&mut a, &mut b, &mut c];
    store.mget(&mut dests, &["a", "b", "c"]).await.unwrap();
    assert_eq!((a, b, c), (1, 2, 3));

    let mut missing = 0i64;
    let mut dests: [&mut dyn Slot; 2] = [&mut a, &mut missing];
    assert!(store.mget(&mut dests, &["a", "zzz"]).await.unwrap_err().is_miss());
}

#[tokio::test]
async fn delete_and_flush() {
    let store = store();
    assert!(store.delete("k").await.unwrap_err().is_miss());

    store.set("k", &1i64, Expiration::Default).await.unwrap();
    store.set("j", &1i64, Expiration::Default).await.unwrap();
    store.delete("k").await.unwrap();
    assert!(store.get_raw("k").await.unwrap_err().is_miss());

    store.flush().await.unwrap();
    assert!(store.get_raw("j").await.unwrap_err().is_miss());
}

#[tokio::test]
async fn default_ttl_comes_from_config() {
    let config = MokaConfig {
        max_capacity: 10,
        default_ttl_secs: 1,
    };
    let store = MokaStore::from_config(config, Arc::new(Codec::default()));
    store.set("k", &1i64, Expiration::Default).await.unwrap();
    store.set("forever", &1i64, Expiration::Never).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert!(store.get_raw("k").await.unwrap_err().is_miss());
    assert!(store.get_raw("forever").await.is_ok());
    assert_eq!(store.name(), "moka");
}

#[tokio::test]
async fn mget_is_all_or_nothing_on_decode_failure() {
    let store = store();
    store.set("a", &1i64, Expiration::Default).await.unwrap();
    store.set("b", &Point { x: 2, y: 3 }, Expiration::Default).await.unwrap();

    let mut a = -1i64;
    let mut text = String::from("untouched");
    let mut dests: [&mut dyn Slot; 2] = [&mut a, &mut text];
    assert!(matches!(
        store.mget(&mut dests, &["a", "b"]).await,
        Err(CacheError::Codec(CodecError::TypeMismatch { .. }))
    ));
    assert_eq!((a, text.as_str()), (-1, "untouched"));
}

mod common;

use std::time::Duration;

use cask_core::{CacheError, Expiration};
use common::{Badge, Profile, store};
use pretty_assertions::assert_eq;
use serial_test::serial;

fn profile() -> Profile {
    Profile {
        name: "ada".to_owned(),
        age: 36,
        visits: 4,
        secret: "hunter2".to_owned(),
    }
}

#[tokio::test]
#[serial]
async fn hset_counts_only_new_fields() {
    let store = store().await;

    assert_eq!(store.hset("user:1", Expiration::Never, &profile()).await.unwrap(), 3);
    assert_eq!(store.hset("user:1", Expiration::Never, &profile()).await.unwrap(), 0);

    let mut keys = store.hkeys("user:1").await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["Age", "Name", "Visits"]);
    assert!(!store.hexists("user:1", "secret").await.unwrap());
}

#[tokio::test]
#[serial]
async fn hset_with_ttl_expires_the_hash() {
    let store = store().await;
    store
        .hset("user:1", Expiration::After(Duration::from_secs(30)), &profile())
        .await
        .unwrap();

    let remaining = store.expires_in("user:1").await.unwrap();
    assert!(remaining > 0 && remaining <= 30_000, "{remaining}");
}

#[tokio::test]
#[serial]
async fn hget_reads_single_fields() {
    let store = store().await;
    store.hset("user:1", Expiration::Never, &profile()).await.unwrap();

    let mut name = String::new();
    store.hget("user:1", "Name", &mut name).await.unwrap();
    assert_eq!(name, "ada");

    let mut age = 0u8;
    store.hget("user:1", "Age", &mut age).await.unwrap();
    assert_eq!(age, 36);

    let mut missing = String::new();
    assert!(store.hget("user:1", "Email", &mut missing).await.unwrap_err().is_miss());
    assert!(store.hget("user:2", "Name", &mut missing).await.unwrap_err().is_miss());
}

#[tokio::test]
#[serial]
async fn hget_all_round_trips_exported_fields() {
    let store = store().await;
    store.hset("user:1", Expiration::Never, &profile()).await.unwrap();

    let mut read = Profile::default();
    store.hget_all("user:1", &mut read).await.unwrap();
    assert_eq!(
        read,
        Profile {
            secret: String::new(),
            ..profile()
        }
    );

    let mut absent = Profile::default();
    assert!(matches!(
        store.hget_all("user:2", &mut absent).await,
        Err(CacheError::CacheMiss)
    ));
}

#[tokio::test]
#[serial]
async fn hget_all_skips_unmapped_fields() {
    let store = store().await;
    store.hset("user:1", Expiration::Never, &profile()).await.unwrap();

    let mut badge = Badge::default();
    store.hget_all("user:1", &mut badge).await.unwrap();
    assert_eq!(
        badge,
        Badge {
            name: "ada".to_owned(),
            visits: 4,
        }
    );
}

#[tokio::test]
#[serial]
async fn hincr_by_updates_decimal_fields() {
    let store = store().await;
    store.hset("user:1", Expiration::Never, &profile()).await.unwrap();

    assert_eq!(store.hincr_by("user:1", "Visits", 6).await.unwrap(), 10);
    assert_eq!(store.hincr_by("user:1", "Fresh", -2).await.unwrap(), -2);

    let mut read = Profile::default();
    store.hget_all("user:1", &mut read).await.unwrap();
    assert_eq!(read.visits, 10);
}

#[tokio::test]
#[serial]
async fn hdel_counts_removed_fields() {
    let store = store().await;
    store.hset("user:1", Expiration::Never, &profile()).await.unwrap();
    assert_eq!(store.hlen("user:1").await.unwrap(), 3);

    assert_eq!(store.hdel("user:1", &["Name", "Email"]).await.unwrap(), 1);
    assert_eq!(store.hdel("user:1", &[]).await.unwrap(), 0);
    assert_eq!(store.hlen("user:1").await.unwrap(), 2);
    assert_eq!(store.hlen("user:2").await.unwrap(), 0);
    assert!(store.hexists("user:1", "Age").await.unwrap());
}

#[tokio::test]
#[serial]
async fn hget_all_decode_failure_leaves_record_unchanged() {
    let store = store().await;
    store.hset("user:1", Expiration::Never, &profile()).await.unwrap();
    // a decimal counter where a text field is expected
    store.hdel("user:1", &["Name"]).await.unwrap();
    store.hincr_by("user:1", "Name", 5).await.unwrap();

    let before = Profile {
        name: "keep".to_owned(),
        age: 1,
        visits: 2,
        secret: String::new(),
    };
    let mut read = before.clone();
    assert!(matches!(
        store.hget_all("user:1", &mut read).await,
        Err(CacheError::Codec(_))
    ));
    assert_eq!(read, before);
}

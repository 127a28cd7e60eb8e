#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cask_core::{Codec, Fields, Record};
use cask_redis::RedisStore;
use serde::{Deserialize, Serialize};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::{REDIS_PORT, Redis};
use tokio::sync::OnceCell;

static SERVER: OnceCell<String> = OnceCell::const_new();

/// Address of the Redis server under test.
///
/// `REDIS_SERVER` (`host:port`) wins when set; otherwise a container is
/// started once and kept alive for the rest of the test binary.
pub async fn server() -> String {
    SERVER
        .get_or_init(|| async {
            if let Ok(server) = std::env::var("REDIS_SERVER") {
                return server;
            }
            let container: ContainerAsync<Redis> = Redis::default()
                .with_tag("7-alpine")
                .start()
                .await
                .expect("Failed to start Redis container");
            let host = container.get_host().await.expect("container host");
            let port = container
                .get_host_port_ipv4(REDIS_PORT)
                .await
                .expect("container port");
            // keep the container running for the whole test binary
            Box::leak(Box::new(container));
            format!("{host}:{port}")
        })
        .await
        .clone()
}

pub fn codec() -> Arc<Codec> {
    Arc::new(
        Codec::builder()
            .register::<Point>("point")
            .register_record::<Profile>("profile")
            .register_record::<Badge>("badge")
            .build()
            .expect("codec"),
    )
}

/// Fresh store on `database`, flushed before use.
pub async fn store_on(database: i64) -> RedisStore {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let store = RedisStore::builder()
        .server(server().await)
        .database(database)
        .default_ttl(Duration::from_secs(60))
        .codec(codec())
        .build()
        .expect("store");
    cask_core::Backend::flush(&store).await.expect("flush");
    store
}

pub async fn store() -> RedisStore {
    store_on(0).await
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub age: u8,
    pub visits: i64,
    #[serde(skip)]
    pub secret: String,
}

impl Record for Profile {
    fn describe(fields: &mut Fields<Self>) {
        fields
            .field("Name", |p| &p.name, |p| &mut p.name)
            .field("Age", |p| &p.age, |p| &mut p.age)
            .field("Visits", |p| &p.visits, |p| &mut p.visits)
            .private("secret");
    }
}

/// Two fields of [`Profile`] only, used to read hashes written with more.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub name: String,
    pub visits: i64,
}

impl Record for Badge {
    fn describe(fields: &mut Fields<Self>) {
        fields
            .field("Name", |b| &b.name, |b| &mut b.name)
            .field("Visits", |b| &b.visits, |b| &mut b.visits);
    }
}
